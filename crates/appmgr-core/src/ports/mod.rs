//! Ports - 抽象化レイヤー
//!
//! コアが外部コラボレータに要求するインターフェース。
//! - プロセス起動（native / web / qml booster）
//! - launch point の永続化
//! - 時刻と ID の生成
//! - イベントの配送先

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod launch_point_store;
pub mod process_launcher;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::launch_point_store::{LaunchPointStore, StoreError};
pub use self::process_launcher::{
    LaunchRequest, LaunchResult, LauncherError, ProcessLauncher, TargetRequest,
};
