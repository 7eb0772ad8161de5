//! Queue - リクエストの相関と保留
//!
//! - `LunaTaskQueue`: 返信待ちのリクエスト。非同期応答はバス・トークンで照合する
//! - `PendingTasks`: 依存先の準備待ちで保留しているリクエスト

mod pending;
mod task_list;

pub use pending::{PendingTasks, Readiness};
pub use task_list::{LunaTaskQueue, Subsystem};
