//! Lifecycle - インスタンスのライフサイクル管理
//!
//! - **AppManager**: イベントループが所有するコアと、コマンドの処理
//! - **launch / close**: 起動・再起動・一時停止・終了の流れ
//! - **installer**: カタログ同期と保留リクエストの再実行
//! - **foreground**: compositor のスナップショットの反映
//! - **Watchdog**: 遷移中状態のタイマー

mod close;
pub mod foreground;
mod installer;
mod launch;
pub mod manager;
pub mod watchdog;


pub use self::foreground::{ForegroundOutcome, reconcile};
pub use self::manager::AppManager;
pub use self::watchdog::Watchdog;
