//! App - アプリケーション層
//!
//! lifecycle / bus / registry を組み合わせて、外から使える形にまとめる。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: 依存の注入と起動時検証
//! - **AppService**: イベントループ 1 本分
//! - **AppManagerHandle**: ループにコマンドを送るクライアント
//! - **Command**: ループが受け取るメッセージ

pub mod builder;
pub mod command;
pub mod service;

pub use self::builder::{AppBuilder, BuildError};
pub use self::command::{Command, LauncherReply};
pub use self::service::{AppManagerHandle, AppService, ServiceError};
