//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。

pub mod engine;

pub use self::engine::{Engine, Entry, WriteBatch};
