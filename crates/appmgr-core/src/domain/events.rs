//! Events - ライフサイクルイベント
//!
//! イベントループが状態を変えるたびに発行する。broadcast チャネルと
//! 追加の EventSink に流れ、バス購読者向けの通知にも変換される。

use serde::Serialize;
use serde_json::Value;

use crate::domain::ids::InstanceId;
use crate::domain::running_app::StatusChange;
use crate::domain::state::LifeStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LaunchPointChange {
    Added,
    Updated,
    Removed,
    Moved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    LifeStatusChanged {
        instance_id: InstanceId,
        app_id: String,
        display_id: u32,
        from: LifeStatus,
        to: LifeStatus,
        reason: String,
    },
    RunningListChanged,
    ForegroundChanged {
        fullscreen_owner: Option<String>,
        app_ids: Vec<String>,
        info: Vec<Value>,
        extra_info_only: bool,
    },
    LaunchPointChanged {
        change: LaunchPointChange,
        launch_point: Value,
    },
    CatalogChanged,
}

impl From<StatusChange> for LifecycleEvent {
    fn from(change: StatusChange) -> Self {
        LifecycleEvent::LifeStatusChanged {
            instance_id: change.instance_id,
            app_id: change.app_id,
            display_id: change.display_id,
            from: change.from,
            to: change.to,
            reason: change.reason,
        }
    }
}

impl LifecycleEvent {
    /// ログ用の短い名前
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::LifeStatusChanged { .. } => "life_status_changed",
            LifecycleEvent::RunningListChanged => "running_list_changed",
            LifecycleEvent::ForegroundChanged { .. } => "foreground_changed",
            LifecycleEvent::LaunchPointChanged { .. } => "launch_point_changed",
            LifecycleEvent::CatalogChanged => "catalog_changed",
        }
    }
}
