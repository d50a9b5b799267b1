//! Impls - ports の実装
//!
//! - **InMemoryEngine**: テスト・`:memory:` 用
//! - **RedbEngine**: 本番用（ファイル永続化）

pub mod inmem_engine;
pub mod redb_engine;

pub use self::inmem_engine::InMemoryEngine;
pub use self::redb_engine::RedbEngine;
