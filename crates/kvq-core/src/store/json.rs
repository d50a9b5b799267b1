//! JSON value codec over a [`Txn`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::Txn;
use crate::error::StoreError;

pub fn get_json<T: DeserializeOwned>(tx: &Txn, key: &str) -> Result<T, StoreError> {
    let data = tx.get(key.as_bytes())?;
    serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })
}

/// Like [`get_json`], but yields `default` when (and only when) the key is
/// absent. A value that exists but does not decode is still an error.
pub fn get_json_default<T: DeserializeOwned>(
    tx: &Txn,
    key: &str,
    default: T,
) -> Result<T, StoreError> {
    match get_json(tx, key) {
        Err(StoreError::NotFound(_)) => Ok(default),
        other => other,
    }
}

pub fn set_json<T: Serialize + ?Sized>(tx: &mut Txn, key: &str, value: &T) -> Result<(), StoreError> {
    let data = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    tx.set(key.as_bytes(), data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fmt::Debug;

    use chrono::{DateTime, Utc};
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::store::Store;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inner {
        #[serde(skip_serializing_if = "String::is_empty", default)]
        a: String,
        #[serde(default)]
        b: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Outer {
        inner: Inner,
        slice: Vec<i64>,
        string: String,
        float: f64,
        flag: bool,
        null: Option<i64>,
    }

    async fn round_trip<T>(value: T)
    where
        T: Serialize + DeserializeOwned + PartialEq + Debug,
    {
        let store = Store::in_memory();
        let mut tx = store.begin().await;
        set_json(&mut tx, "key", &value).unwrap();
        let got: T = get_json(&tx, "key").unwrap();
        assert_eq!(got, value);
    }

    #[tokio::test]
    async fn get_set() {
        let store = Store::in_memory();
        let mut tx = store.begin().await;

        let err = get_json::<i64>(&tx, "key1").unwrap_err();
        assert!(err.is_not_found());

        set_json(&mut tx, "key1", &55).unwrap();
        assert_eq!(get_json::<i64>(&tx, "key1").unwrap(), 55);
    }

    #[rstest]
    #[case::none(None)]
    #[case::some(Some(2))]
    #[tokio::test]
    async fn option_values(#[case] value: Option<i64>) {
        round_trip(value).await;
    }

    #[rstest]
    #[case::string("string sg".to_string())]
    #[case::empty(String::new())]
    #[tokio::test]
    async fn string_values(#[case] value: String) {
        round_trip(value).await;
    }

    #[tokio::test]
    async fn scalar_and_compound_values() {
        round_trip(1_i64).await;
        round_trip(-666.44_f64).await;
        round_trip(true).await;
        round_trip(false).await;
        round_trip(vec![4, 8, 9, 33]).await;
        round_trip(json!({"nested": [1, "two", null]})).await;

        let now: DateTime<Utc> = Utc::now();
        round_trip(now).await;

        round_trip(Outer {
            inner: Inner {
                a: "s1_a".into(),
                b: 33,
            },
            slice: vec![444, 13, 44, -1, 0, 44],
            string: "string sg".into(),
            float: -666.44,
            flag: true,
            null: None,
        })
        .await;
    }

    #[tokio::test]
    async fn default_only_on_not_found() {
        let store = Store::in_memory();
        let mut tx = store.begin().await;

        let v: Vec<i64> = get_json_default(&tx, "missing", vec![7]).unwrap();
        assert_eq!(v, vec![7]);

        tx.set(b"broken", b"{not json".to_vec());
        let err = get_json_default::<Vec<i64>>(&tx, "broken", vec![]).unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "broken"));

        set_json(&mut tx, "wrong_shape", &"text").unwrap();
        let err = get_json_default::<i64>(&tx, "wrong_shape", 0).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[tokio::test]
    async fn concurrent_increments_are_serialized() {
        const N: usize = 500;
        let store = Store::in_memory();

        let mut joins = Vec::with_capacity(N);
        for _ in 0..N {
            let store = store.clone();
            joins.push(tokio::spawn(async move {
                store
                    .run(|tx| {
                        Box::pin(async move {
                            let val: i64 = get_json_default(tx, "key4", 0)?;
                            // 読んでから書くまでの間に他の txn が割り込まないこと
                            tokio::task::yield_now().await;
                            set_json(tx, "key4", &(val + 1))?;
                            Ok::<_, StoreError>(())
                        })
                    })
                    .await
            }));
        }
        for join in joins {
            join.await.unwrap().unwrap();
        }

        let tx = store.begin().await;
        assert_eq!(get_json::<i64>(&tx, "key4").unwrap(), N as i64);
    }
}
