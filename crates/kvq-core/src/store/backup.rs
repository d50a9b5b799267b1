//! JSON dump / restore of the whole store.
//!
//! Dump format: a single JSON object mapping every key (lossy UTF-8) to its
//! stored JSON document, so a dump is readable and diffable as-is. Documents
//! are carried as raw JSON text in both directions; numbers and formatting
//! come back byte for byte.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use serde_json::value::RawValue;
use tracing::{debug, info};

use super::Store;
use crate::error::StoreError;

type Dump = BTreeMap<String, Box<RawValue>>;

/// Write every entry of `store` to `writer`. Returns the number of keys.
pub async fn dump_json<W: Write>(store: &Store, writer: W) -> Result<usize, StoreError> {
    let tx = store.begin().await;
    let entries = tx.entries()?;
    tx.rollback();

    let mut out = Dump::new();
    for (key, value) in entries {
        let key = String::from_utf8_lossy(&key).into_owned();
        let doc: Box<RawValue> =
            serde_json::from_slice(&value).map_err(|source| StoreError::Decode {
                key: key.clone(),
                source,
            })?;
        debug!(key = %key, "dump key");
        out.insert(key, doc);
    }

    let count = out.len();
    serde_json::to_writer(writer, &out).map_err(std::io::Error::from)?;
    info!(keys = count, "dumped store");
    Ok(count)
}

/// Load a dump produced by [`dump_json`]. All keys are written in one
/// transaction; existing keys not present in the dump are left untouched.
pub async fn restore_json<R: Read>(store: &Store, mut reader: R) -> Result<usize, StoreError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let dump: Dump = serde_json::from_slice(&buf).map_err(|source| StoreError::Decode {
        key: "<dump>".to_string(),
        source,
    })?;

    let mut tx = store.begin().await;
    for (key, doc) in &dump {
        tx.set(key.as_bytes(), doc.get().as_bytes().to_vec());
        debug!(key = %key, "set key");
    }
    tx.commit()?;

    info!(keys = dump.len(), "restored store");
    Ok(dump.len())
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::store::{get_json, set_json};

    #[tokio::test]
    async fn dump_then_restore_into_fresh_store() {
        let source = Store::in_memory();
        {
            let mut tx = source.begin().await;
            set_json(&mut tx, "dbq:queue:t", &json!([{"name": "t", "ttl": 2, "args": 42}])).unwrap();
            set_json(&mut tx, "counter", &7).unwrap();
            tx.commit().unwrap();
        }

        let mut buf = Vec::new();
        assert_eq!(dump_json(&source, &mut buf).await.unwrap(), 2);

        let parsed: Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["counter"], json!(7));

        let target = Store::in_memory();
        assert_eq!(restore_json(&target, buf.as_slice()).await.unwrap(), 2);

        let tx = target.begin().await;
        assert_eq!(get_json::<i64>(&tx, "counter").unwrap(), 7);
        let queue: Value = get_json(&tx, "dbq:queue:t").unwrap();
        assert_eq!(queue[0]["args"], json!(42));
    }

    #[tokio::test]
    async fn dump_refuses_non_json_values() {
        let store = Store::in_memory();
        {
            let mut tx = store.begin().await;
            tx.set(b"raw", b"\x00\x01".to_vec());
            tx.commit().unwrap();
        }

        let err = dump_json(&store, Vec::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "raw"));
    }

    #[tokio::test]
    async fn malformed_dump_writes_nothing() {
        let store = Store::in_memory();
        let err = restore_json(&store, &b"[1, 2"[..]).await.unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));

        let tx = store.begin().await;
        assert!(tx.entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn numbers_survive_dump_and_restore_verbatim() {
        let source = Store::in_memory();
        {
            let mut tx = source.begin().await;
            tx.set(b"big", b"12345678901234567890123".to_vec());
            tx.set(b"f", b"1.10".to_vec());
            tx.set(b"doc", br#"{"n":98765432109876543210,"s":"x"}"#.to_vec());
            tx.commit().unwrap();
        }

        let mut buf = Vec::new();
        dump_json(&source, &mut buf).await.unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains(r#""big":12345678901234567890123"#));
        assert!(text.contains(r#""f":1.10"#));

        let target = Store::in_memory();
        restore_json(&target, buf.as_slice()).await.unwrap();

        let tx = target.begin().await;
        assert_eq!(tx.get(b"big").unwrap(), b"12345678901234567890123".to_vec());
        assert_eq!(tx.get(b"f").unwrap(), b"1.10".to_vec());
        assert_eq!(
            tx.get(b"doc").unwrap(),
            br#"{"n":98765432109876543210,"s":"x"}"#.to_vec()
        );
    }
}
