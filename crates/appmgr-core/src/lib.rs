//! appmgr-core
//!
//! Lifecycle coordinator for an embedded application manager: launch points,
//! running instances, request correlation and foreground reconciliation.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, app, launch_point, running_app, task, envelope, errors, events）
//! - **ports**: 抽象化レイヤー（ProcessLauncher, LaunchPointStore, Clock, IdGenerator, EventSink）
//! - **registry**: イベントループが所有するコレクション（カタログ, launch point, 実行中インスタンス, launcher）
//! - **queue**: リクエストの相関（LunaTaskQueue）と保留
//! - **lifecycle**: 状態遷移, watchdog, foreground の反映
//! - **bus**: メソッドのルーティングと購読
//! - **app**: builder, イベントループ, ハンドル
//! - **impls**: 実装（メモリ / JSON ストア, ScriptedLauncher など開発用）
//!
//! すべての状態変更は 1 本のイベントループ上で直列に行われる。

pub mod app;
pub mod bus;
pub mod config;
pub mod domain;
pub mod impls;
pub mod lifecycle;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod registry;
