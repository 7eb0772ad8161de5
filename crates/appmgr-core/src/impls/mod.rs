//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryLaunchPointStore**: テスト用ストア（書き込み失敗の注入つき）
//! - **JsonFileLaunchPointStore**: JSON ファイル 1 つに保存するストア
//! - **ScriptedLauncher**: プロセスを作らない ProcessLauncher
//! - **TracingEventSink**: イベントを tracing に流す

pub mod inmem_store;
pub mod json_store;
pub mod scripted_launcher;
pub mod tracing_sink;

pub use self::inmem_store::InMemoryLaunchPointStore;
pub use self::json_store::JsonFileLaunchPointStore;
pub use self::scripted_launcher::{LauncherCall, ScriptedLauncher};
pub use self::tracing_sink::TracingEventSink;
