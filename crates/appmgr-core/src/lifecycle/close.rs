//! Close / Pause / RegisterApp
//!
//! ```text
//! close:  FOREGROUND / BACKGROUND → PAUSING → PAUSED → CLOSING → STOP
//!         PAUSED → CLOSING → STOP
//!         その他の稼働状態 → (abort) CLOSING → STOP
//! pause:  FOREGROUND / BACKGROUND → PAUSING → PAUSED
//! ```
//!
//! pause のあと close に進むかどうかはタスクの `NextStep` で決める。
//! keepAlive のインスタンスは `force` がなければ PAUSED で止める。

use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::app::AppType;
use crate::domain::errors::AppMgrError;
use crate::domain::ids::{InstanceId, TaskUuid};
use crate::domain::state::LifeStatus;
use crate::domain::task::NextStep;
use crate::lifecycle::manager::{AppManager, LauncherOp};
use crate::ports::LauncherError;

impl AppManager {
    /// `instanceId`、または `id`（+ `displayId`）で対象インスタンスを引く
    pub(crate) fn resolve_target(&self, uuid: TaskUuid) -> Result<InstanceId, AppMgrError> {
        let task = self
            .queue
            .get(uuid)
            .ok_or_else(|| AppMgrError::not_found("task", uuid.to_string()))?;
        if let Some(raw) = task.request().str_field("instanceId") {
            return InstanceId::parse(raw)
                .filter(|id| self.running.get_by_instance_id(*id).is_some())
                .ok_or_else(|| AppMgrError::not_found("instance", raw));
        }
        let app_id = task
            .app_id()
            .ok_or_else(|| AppMgrError::validation("id or instanceId is required"))?;
        let display_id = task
            .payload()
            .get("displayId")
            .map(|_| task.display_id());
        self.running
            .find_by_app_id(app_id, display_id)
            .ok_or_else(|| AppMgrError::not_found("running app", app_id))
    }

    pub(crate) fn pause(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let instance_id = self.resolve_target(uuid)?;
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            return Err(AppMgrError::not_found("instance", instance_id.to_string()));
        };
        let status = instance.life_status();
        let app_type = instance.app_type();
        if !matches!(status, LifeStatus::Foreground | LifeStatus::Background) {
            return Err(AppMgrError::conflict(format!(
                "{} cannot be paused while {status}",
                instance.app_id()
            )));
        }
        if let Some(task) = self.queue.get_mut(uuid) {
            task.set_instance_id(instance_id);
            task.set_app_type(app_type);
            task.set_next_step(None);
        }
        self.start_pause(uuid, instance_id, "pause");
        Ok(())
    }

    pub(crate) fn close(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let instance_id = self.resolve_target(uuid)?;
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            return Err(AppMgrError::not_found("instance", instance_id.to_string()));
        };
        let app_id = instance.app_id().to_string();
        let status = instance.life_status();
        let app_type = instance.app_type();
        let keep_alive = instance.flags().keep_alive;

        if status == LifeStatus::Closing {
            return Err(AppMgrError::conflict(format!("{app_id} is already closing")));
        }

        let force = self
            .queue
            .get(uuid)
            .and_then(|t| t.payload().get("force"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let stop_at_paused = keep_alive && !force;

        // 起動待ちのタスクを打ち切る
        let cancelled = self.queue.fail_where(
            |t| t.uuid() != uuid && t.kind() == "/launch" && t.instance_id() == Some(instance_id),
            &AppMgrError::Cancelled(format!("{app_id} is closing")),
        );
        if cancelled > 0 {
            debug!(%app_id, cancelled, "cancelled pending launches");
        }

        if let Some(task) = self.queue.get_mut(uuid) {
            task.set_instance_id(instance_id);
            task.set_app_type(app_type);
            task.set_next_step((!stop_at_paused).then_some(NextStep::Close));
            task.merge_response(json!({"appId": app_id, "instanceId": instance_id}));
            if stop_at_paused {
                task.set_response("keepAlive", json!(true));
            }
        }
        info!(%app_id, %instance_id, %status, force, "closing");

        match status {
            LifeStatus::Foreground | LifeStatus::Background => {
                self.start_pause(uuid, instance_id, "close");
            }
            LifeStatus::Paused if stop_at_paused => {
                self.queue.remove_after_reply(uuid);
            }
            LifeStatus::Paused => {
                self.transition(instance_id, LifeStatus::Closing, "close");
                self.start_close(Some(uuid), instance_id, "close");
            }
            LifeStatus::Stop => {
                self.finish_instance(instance_id);
                self.queue.remove_after_reply(uuid);
            }
            _ => {
                self.abort(instance_id, "close");
                self.start_close(Some(uuid), instance_id, "close");
            }
        }
        Ok(())
    }

    pub(crate) fn register_app(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let task = self
            .queue
            .get(uuid)
            .ok_or_else(|| AppMgrError::not_found("task", uuid.to_string()))?;
        let caller = task.request().caller();
        let app_id = match task.app_id() {
            _ if !caller.is_empty() => caller.to_string(),
            Some(id) => id.to_string(),
            None => return Err(AppMgrError::validation("caller or id is required")),
        };
        let channel = task.responder().sender();

        let instance_id = self
            .running
            .find_by_app_id(&app_id, None)
            .ok_or_else(|| AppMgrError::not_found("running app", app_id.as_str()))?;
        let Some(instance) = self.running.get_mut(instance_id) else {
            return Err(AppMgrError::not_found("instance", instance_id.to_string()));
        };
        if instance.app_type() != AppType::Native {
            return Err(AppMgrError::validation(format!(
                "{app_id} is not a native app"
            )));
        }
        instance.register_channel(channel);
        info!(%app_id, %instance_id, "app registered");

        if let Some(task) = self.queue.get_mut(uuid) {
            task.set_instance_id(instance_id);
            task.set_response("event", json!("registered"));
        }
        self.queue.remove_after_reply(uuid);
        Ok(())
    }

    fn start_pause(&mut self, uuid: TaskUuid, instance_id: InstanceId, reason: &str) {
        self.transition(instance_id, LifeStatus::Pausing, reason);
        if let Some(request) = self.target_request(instance_id, reason) {
            self.call_launcher(Some(uuid), instance_id, LauncherOp::Pause(request));
        }
    }

    fn start_close(&mut self, uuid: Option<TaskUuid>, instance_id: InstanceId, reason: &str) {
        if let Some(request) = self.target_request(instance_id, reason) {
            self.call_launcher(uuid, instance_id, LauncherOp::Close(request));
        }
    }

    pub(crate) fn on_paused(
        &mut self,
        task: Option<TaskUuid>,
        instance_id: InstanceId,
        result: Result<(), LauncherError>,
    ) {
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            if let Some(uuid) = task {
                self.queue.fail(
                    uuid,
                    &AppMgrError::Cancelled(format!("instance {instance_id} is gone")),
                );
            }
            return;
        };
        let runtime = instance.app_type();
        let next_step = task
            .and_then(|uuid| self.queue.get(uuid))
            .and_then(|t| t.next_step());

        match result {
            Ok(()) => {
                // pause 中に前面から外れると BACKGROUND になっていて PAUSED には進めない
                let paused = self.transition(instance_id, LifeStatus::Paused, "paused");
                match (task, next_step) {
                    (Some(uuid), Some(NextStep::Close)) => {
                        if paused {
                            self.transition(instance_id, LifeStatus::Closing, "close");
                        } else {
                            self.abort(instance_id, "close");
                        }
                        self.start_close(Some(uuid), instance_id, "close");
                    }
                    (Some(uuid), None) => {
                        if let Some(app) = self.running.get_by_instance_id(instance_id) {
                            let reply = json!({"appId": app.app_id(), "instanceId": instance_id});
                            if let Some(t) = self.queue.get_mut(uuid) {
                                t.merge_response(reply);
                            }
                        }
                        self.queue.remove_after_reply(uuid);
                    }
                    (None, _) => {}
                }
            }
            Err(e) => {
                // PAUSING からは戻れないので、プロセスを閉じる
                warn!(%instance_id, error = %e, "pause failed, closing instead");
                let err = e.into_app_error(runtime);
                self.abort(instance_id, "pause failed");
                match (task, next_step) {
                    (Some(uuid), Some(NextStep::Close)) => {
                        self.start_close(Some(uuid), instance_id, "close");
                    }
                    (Some(uuid), None) => {
                        self.queue.fail(uuid, &err);
                        self.start_close(None, instance_id, "pause failed");
                    }
                    (None, _) => self.start_close(None, instance_id, "pause failed"),
                }
            }
        }
    }

    pub(crate) fn on_closed(
        &mut self,
        task: Option<TaskUuid>,
        instance_id: InstanceId,
        result: Result<String, LauncherError>,
    ) {
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            // プロセス終了通知などで先に片付いている
            if let Some(uuid) = task {
                self.queue.remove_after_reply(uuid);
            }
            return;
        };
        let app_id = instance.app_id().to_string();
        let runtime = instance.app_type();

        match result {
            Ok(closed) => {
                debug!(%app_id, %instance_id, %closed, "launcher closed the app");
                self.transition(instance_id, LifeStatus::Stop, "closed");
                self.finish_instance(instance_id);
                if let Some(uuid) = task {
                    self.queue.remove_after_reply(uuid);
                }
            }
            Err(e) => {
                // CLOSING のまま。watchdog が STOP に落とす
                warn!(%app_id, %instance_id, error = %e, "close failed");
                if let Some(uuid) = task {
                    self.queue.fail(uuid, &e.into_app_error(runtime));
                }
            }
        }
    }
}
