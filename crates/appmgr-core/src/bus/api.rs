//! Bus API - メソッドのルーティングと読み取り系・launch point 系のハンドラ
//!
//! # 返信の流れ
//! 1. リクエストを LunaTask にしてキューに入れる
//! 2. カタログ待ちのメソッドはカタログが揃うまで `PendingTasks` に保留
//! 3. ハンドラが同期的に返せるものはその場で `remove_after_reply`
//! 4. ハンドラの Err はタスクのエラーとして返信する
//!
//! 購読（`subscribe: true`）は返信の前に購読リストへ登録する。

use serde_json::{Value, json};
use tracing::debug;

use crate::bus::subscriptions::Topic;
use crate::domain::envelope::{RequestEnvelope, Responder};
use crate::domain::errors::AppMgrError;
use crate::domain::events::{LaunchPointChange, LifecycleEvent};
use crate::domain::ids::TaskUuid;
use crate::domain::launch_point::LaunchPointType;
use crate::domain::state::LifeStatus;
use crate::domain::task::LunaTask;
use crate::lifecycle::AppManager;
use crate::queue::Readiness;

const DEFAULT_WINDOW_TYPE: &str = "_WEBOS_WINDOW_TYPE_CARD";

/// カテゴリ `/` のメソッド
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Launch,
    Pause,
    Close,
    RegisterApp,
    Running,
    GetAppLifeStatus,
    GetForegroundAppInfo,
    ListApps,
    GetAppInfo,
    ListLaunchPoints,
    AddLaunchPoint,
    UpdateLaunchPoint,
    RemoveLaunchPoint,
    MoveLaunchPoint,
    SearchApps,
}

impl Method {
    pub const ALL: [Method; 15] = [
        Method::Launch,
        Method::Pause,
        Method::Close,
        Method::RegisterApp,
        Method::Running,
        Method::GetAppLifeStatus,
        Method::GetForegroundAppInfo,
        Method::ListApps,
        Method::GetAppInfo,
        Method::ListLaunchPoints,
        Method::AddLaunchPoint,
        Method::UpdateLaunchPoint,
        Method::RemoveLaunchPoint,
        Method::MoveLaunchPoint,
        Method::SearchApps,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Method::Launch => "launch",
            Method::Pause => "pause",
            Method::Close => "close",
            Method::RegisterApp => "registerApp",
            Method::Running => "running",
            Method::GetAppLifeStatus => "getAppLifeStatus",
            Method::GetForegroundAppInfo => "getForegroundAppInfo",
            Method::ListApps => "listApps",
            Method::GetAppInfo => "getAppInfo",
            Method::ListLaunchPoints => "listLaunchPoints",
            Method::AddLaunchPoint => "addLaunchPoint",
            Method::UpdateLaunchPoint => "updateLaunchPoint",
            Method::RemoveLaunchPoint => "removeLaunchPoint",
            Method::MoveLaunchPoint => "moveLaunchPoint",
            Method::SearchApps => "searchApps",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// カタログのスキャン完了まで保留するか
    pub fn waits_for_catalog(self) -> bool {
        matches!(
            self,
            Method::Launch
                | Method::ListApps
                | Method::GetAppInfo
                | Method::ListLaunchPoints
                | Method::AddLaunchPoint
                | Method::UpdateLaunchPoint
                | Method::RemoveLaunchPoint
                | Method::MoveLaunchPoint
                | Method::SearchApps
        )
    }
}

impl AppManager {
    pub(crate) fn handle_request(&mut self, request: RequestEnvelope, responder: Responder) {
        let task = LunaTask::new(self.ids.generate_task_uuid(), request, responder);
        self.dispatch(task);
    }

    /// 通常のディスパッチ経路。保留から再実行されたタスクもここを通る
    pub(crate) fn dispatch(&mut self, task: LunaTask) {
        let method = match task.request().category() {
            "/" => Method::from_name(task.method()),
            _ => None,
        };
        let Some(method) = method else {
            let kind = task.kind();
            let uuid = self.queue.add(task);
            self.queue
                .fail(uuid, &AppMgrError::validation(format!("unknown method {kind}")));
            return;
        };
        if method.waits_for_catalog() && !self.catalog_ready {
            self.pending.defer(Readiness::CatalogScan, task);
            return;
        }

        let uuid = self.queue.add(task);
        debug!(task = %uuid, method = method.name(), "dispatching");
        let result = match method {
            Method::Launch => self.launch(uuid),
            Method::Pause => self.pause(uuid),
            Method::Close => self.close(uuid),
            Method::RegisterApp => self.register_app(uuid),
            Method::Running => self.running_list(uuid),
            Method::GetAppLifeStatus => self.app_life_status(uuid),
            Method::GetForegroundAppInfo => self.foreground_app_info(uuid),
            Method::ListApps => self.list_apps(uuid),
            Method::GetAppInfo => self.app_info(uuid),
            Method::ListLaunchPoints => self.list_launch_points(uuid),
            Method::AddLaunchPoint => self.add_launch_point(uuid),
            Method::UpdateLaunchPoint => self.update_launch_point(uuid),
            Method::RemoveLaunchPoint => self.remove_launch_point(uuid),
            Method::MoveLaunchPoint => self.move_launch_point(uuid),
            Method::SearchApps => self.search_apps(uuid),
        };
        if let Err(err) = result {
            debug!(task = %uuid, method = method.name(), error = %err, "request failed");
            self.queue.fail(uuid, &err);
        }
    }

    /// 返信 payload を載せて返す
    fn reply(&mut self, uuid: TaskUuid, payload: Value) -> Result<(), AppMgrError> {
        let task = self
            .queue
            .get_mut(uuid)
            .ok_or_else(|| AppMgrError::not_found("task", uuid.to_string()))?;
        task.merge_response(payload);
        self.queue.remove_after_reply(uuid);
        Ok(())
    }

    /// `subscribe: true` なら購読に登録し、返信に `subscribed` を付ける
    fn subscribe_if_asked(
        &mut self,
        uuid: TaskUuid,
        topic: Topic,
        app_id: Option<String>,
    ) -> bool {
        let Some(task) = self.queue.get_mut(uuid) else {
            return false;
        };
        let subscribed = task.is_subscription();
        if subscribed {
            self.subscriptions
                .add(topic, task.responder().clone(), app_id);
        }
        task.set_response("subscribed", json!(subscribed));
        subscribed
    }

    fn payload(&self, uuid: TaskUuid) -> Value {
        self.queue
            .get(uuid)
            .map(|t| t.payload().clone())
            .unwrap_or(Value::Null)
    }

    fn running_list(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        self.subscribe_if_asked(uuid, Topic::Running, None);
        let running = self.running_json();
        self.reply(uuid, json!({"running": running}))
    }

    pub(crate) fn running_json(&self) -> Vec<Value> {
        self.running
            .iter()
            .filter(|app| app.life_status().is_running())
            .map(|app| {
                let window_type = self
                    .catalog
                    .get(app.app_id())
                    .map(|desc| desc.default_window_type.clone())
                    .unwrap_or_else(|| DEFAULT_WINDOW_TYPE.to_string());
                app.to_json(false, &window_type)
            })
            .collect()
    }

    fn app_life_status(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let payload = self.payload(uuid);
        let app_id = payload.get("id").and_then(Value::as_str).filter(|s| !s.is_empty());
        let subscribed =
            self.subscribe_if_asked(uuid, Topic::LifeStatus, app_id.map(str::to_string));
        let Some(app_id) = app_id else {
            if subscribed {
                return self.reply(uuid, json!({}));
            }
            return Err(AppMgrError::validation("id is required"));
        };
        let display_id = payload
            .get("displayId")
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok());
        let status = match self.running.get_by_app_id(app_id, display_id) {
            Some(app) => app.to_json(true, DEFAULT_WINDOW_TYPE),
            None => json!({"id": app_id, "status": LifeStatus::Stop}),
        };
        self.reply(
            uuid,
            json!({
                "appId": app_id,
                "status": status["status"],
                "instanceId": status.get("instanceId").cloned().unwrap_or(Value::Null),
                "processId": status.get("processId").cloned().unwrap_or(Value::Null),
            }),
        )
    }

    fn foreground_app_info(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let extra_info = self
            .payload(uuid)
            .get("extraInfo")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let topic = if extra_info {
            Topic::ForegroundExtra
        } else {
            Topic::Foreground
        };
        self.subscribe_if_asked(uuid, topic, None);
        let reply = self.foreground_payload(extra_info);
        self.reply(uuid, reply)
    }

    fn foreground_payload(&self, extra_info: bool) -> Value {
        let foreground = self.running.foreground();
        let mut reply = json!({"appId": foreground.owner_id()});
        if extra_info && let Some(map) = reply.as_object_mut() {
            map.insert("foregroundAppInfo".into(), json!(foreground.info));
        }
        reply
    }

    fn list_apps(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        self.subscribe_if_asked(uuid, Topic::Apps, None);
        let apps = self.catalog.to_json();
        self.reply(uuid, json!({"apps": apps}))
    }

    fn app_info(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let app_id = required_str(&self.payload(uuid), "id")?;
        let app = self
            .catalog
            .get(&app_id)
            .ok_or_else(|| AppMgrError::not_found("app", app_id.as_str()))?;
        self.reply(uuid, json!({"appId": app_id, "appInfo": app.to_json()}))
    }

    fn list_launch_points(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        self.subscribe_if_asked(uuid, Topic::LaunchPoints, None);
        let points = self.launch_points.to_json();
        self.reply(uuid, json!({"launchPoints": points}))
    }

    fn add_launch_point(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let payload = self.payload(uuid);
        let app_id = required_str(&payload, "id")?;
        let app = self
            .catalog
            .get(&app_id)
            .ok_or_else(|| AppMgrError::not_found("app", app_id.as_str()))?;
        let point = self.launch_points.create_bookmark(&app, &payload)?;
        let point = self.launch_points.add(point)?;
        let launch_point_id = point.launch_point_id().to_string();
        let launch_point = point.to_json();
        self.emit(LifecycleEvent::LaunchPointChanged {
            change: LaunchPointChange::Added,
            launch_point,
        });
        self.reply(uuid, json!({"launchPointId": launch_point_id}))
    }

    fn update_launch_point(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let payload = self.payload(uuid);
        let launch_point_id = required_str(&payload, "launchPointId")?;
        let launch_point = self
            .launch_points
            .update(&launch_point_id, &payload)?
            .to_json();
        self.emit(LifecycleEvent::LaunchPointChanged {
            change: LaunchPointChange::Updated,
            launch_point,
        });
        self.reply(uuid, json!({"launchPointId": launch_point_id}))
    }

    fn remove_launch_point(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let launch_point_id = required_str(&self.payload(uuid), "launchPointId")?;
        let point = self
            .launch_points
            .get_by_launch_point_id(&launch_point_id)
            .ok_or_else(|| AppMgrError::not_found("launch point", launch_point_id.as_str()))?;
        if point.lp_type() == LaunchPointType::Default {
            return Err(AppMgrError::validation(format!(
                "{launch_point_id} is a default launch point"
            )));
        }
        let in_use = self
            .running
            .iter()
            .any(|app| app.launch_point_id() == launch_point_id);
        if in_use {
            return Err(AppMgrError::conflict(format!(
                "{launch_point_id} has a running instance"
            )));
        }
        let removed = self
            .launch_points
            .remove_by_launch_point_id(&launch_point_id)?;
        self.emit(LifecycleEvent::LaunchPointChanged {
            change: LaunchPointChange::Removed,
            launch_point: removed.to_json(),
        });
        self.reply(uuid, json!({"launchPointId": launch_point_id}))
    }

    fn move_launch_point(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let payload = self.payload(uuid);
        let launch_point_id = required_str(&payload, "launchPointId")?;
        let position = payload
            .get("position")
            .and_then(Value::as_u64)
            .and_then(|p| usize::try_from(p).ok())
            .ok_or_else(|| AppMgrError::validation("position is required"))?;
        let launch_point = self
            .launch_points
            .move_to(&launch_point_id, position)?
            .to_json();
        self.emit(LifecycleEvent::LaunchPointChanged {
            change: LaunchPointChange::Moved,
            launch_point,
        });
        self.reply(uuid, json!({"launchPointId": launch_point_id}))
    }

    fn search_apps(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let keyword = required_str(&self.payload(uuid), "keyword")?;
        if keyword.chars().count() < 2 {
            return Err(AppMgrError::validation(
                "keyword must be at least 2 characters",
            ));
        }
        let found = self.launch_points.search(&keyword);
        if found.is_empty() {
            return Err(AppMgrError::not_found("app matching", keyword));
        }
        self.reply(uuid, json!({"apps": found}))
    }

    /// ライフサイクルイベントを購読者向けの payload に変換して配る
    pub(crate) fn notify(&mut self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::LifeStatusChanged {
                instance_id,
                app_id,
                display_id,
                to,
                reason,
                ..
            } => {
                let payload = json!({
                    "appId": app_id,
                    "instanceId": instance_id,
                    "displayId": display_id,
                    "status": to,
                    "reason": reason,
                });
                self.subscriptions
                    .publish_for_app(Topic::LifeStatus, app_id, payload);
            }
            LifecycleEvent::RunningListChanged => {
                if self.subscriptions.subscriber_count(Topic::Running) > 0 {
                    let running = self.running_json();
                    self.subscriptions
                        .publish(Topic::Running, json!({"running": running}));
                }
            }
            LifecycleEvent::ForegroundChanged {
                fullscreen_owner,
                info,
                extra_info_only,
                ..
            } => {
                let owner = fullscreen_owner.clone().unwrap_or_default();
                if !extra_info_only {
                    self.subscriptions
                        .publish(Topic::Foreground, json!({"appId": owner}));
                }
                self.subscriptions.publish(
                    Topic::ForegroundExtra,
                    json!({
                        "appId": owner,
                        "foregroundAppInfo": info,
                        "extraInfoOnly": extra_info_only,
                    }),
                );
            }
            LifecycleEvent::LaunchPointChanged {
                change,
                launch_point,
            } => {
                self.subscriptions.publish(
                    Topic::LaunchPoints,
                    json!({"change": change, "launchPoint": launch_point}),
                );
            }
            LifecycleEvent::CatalogChanged => {
                if self.subscriptions.subscriber_count(Topic::Apps) > 0 {
                    let apps = self.catalog.to_json();
                    self.subscriptions.publish(Topic::Apps, json!({"apps": apps}));
                }
            }
        }
    }
}

fn required_str(payload: &Value, key: &str) -> Result<String, AppMgrError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppMgrError::validation(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("launchApp"), None);
    }

    #[test]
    fn lifecycle_controls_are_never_deferred() {
        for method in [
            Method::Pause,
            Method::Close,
            Method::RegisterApp,
            Method::Running,
            Method::GetAppLifeStatus,
            Method::GetForegroundAppInfo,
        ] {
            assert!(!method.waits_for_catalog(), "{}", method.name());
        }
        assert!(Method::Launch.waits_for_catalog());
        assert!(Method::ListLaunchPoints.waits_for_catalog());
    }

    #[test]
    fn required_str_rejects_empty() {
        let payload = json!({"id": "", "keyword": "ab"});
        assert!(required_str(&payload, "id").is_err());
        assert!(required_str(&payload, "missing").is_err());
        assert_eq!(required_str(&payload, "keyword").unwrap(), "ab");
    }
}
