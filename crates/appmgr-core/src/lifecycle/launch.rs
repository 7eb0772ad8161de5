//! Launch - 起動と再起動
//!
//! ```text
//! 新規:   STOP → PRELOADING                     (preload 指定)
//!         STOP → SPLASHING → LAUNCHING          (スプラッシュあり)
//!         STOP → LAUNCHING                      (それ以外)
//! 再起動: PAUSED / PRELOADED → RELAUNCHING
//!         FOREGROUND / BACKGROUND はそのまま（登録済み native はイベントで通知）
//! ```
//!
//! 返信は launcher の応答を受けた時点で送る。FOREGROUND への遷移は compositor の
//! スナップショットが行う。

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::domain::app::{AppDescription, AppType};
use crate::domain::errors::AppMgrError;
use crate::domain::events::LifecycleEvent;
use crate::domain::ids::{InstanceId, TaskUuid};
use crate::domain::launch_point::default_launch_point_id;
use crate::domain::running_app::{LaunchFlags, PidSource, RunningApp};
use crate::domain::state::LifeStatus;
use crate::lifecycle::manager::{AppManager, LauncherOp};
use crate::ports::{LaunchRequest, LaunchResult, LauncherError};

impl AppManager {
    pub(crate) fn launch(&mut self, uuid: TaskUuid) -> Result<(), AppMgrError> {
        let task = self
            .queue
            .get(uuid)
            .ok_or_else(|| AppMgrError::not_found("task", uuid.to_string()))?;
        let app_id = task
            .app_id()
            .ok_or_else(|| AppMgrError::validation("id is required"))?
            .to_string();
        let app = self
            .catalog
            .get(&app_id)
            .ok_or_else(|| AppMgrError::not_found("app", app_id.as_str()))?;
        let launch_point_id = match task.launch_point_id() {
            Some(lp_id) => {
                let point = self
                    .launch_points
                    .get_by_launch_point_id(lp_id)
                    .ok_or_else(|| AppMgrError::not_found("launch point", lp_id))?;
                if point.app_id() != app_id {
                    return Err(AppMgrError::validation(format!(
                        "launch point {lp_id} does not belong to {app_id}"
                    )));
                }
                lp_id.to_string()
            }
            None => default_launch_point_id(&app_id),
        };
        let display_id = task.display_id();
        let payload = task.payload().clone();

        if let Some(instance_id) = self.running.find_by_app_id(&app_id, Some(display_id)) {
            return self.relaunch(uuid, instance_id, &app, &payload);
        }

        let flags = LaunchFlags::from_payload(
            &payload,
            self.config.lifecycle.is_keep_alive(&app_id),
            !app.splash_on_launch,
        );
        let instance_id = self.ids.generate_instance_id();
        let instance = RunningApp::new(
            instance_id,
            app_id.as_str(),
            launch_point_id,
            app.app_type,
            display_id,
            self.clock.now(),
        )
        .with_flags(flags.clone());
        self.running.add(instance)?;
        if let Some(task) = self.queue.get_mut(uuid) {
            task.set_instance_id(instance_id);
            task.set_app_type(app.app_type);
        }
        info!(%app_id, %instance_id, display_id, "launching");

        if flags.preload.is_some() {
            self.transition(instance_id, LifeStatus::Preloading, "preload");
        } else if !flags.no_splash && !flags.launched_hidden {
            self.transition(instance_id, LifeStatus::Splashing, "splash");
            self.transition(instance_id, LifeStatus::Launching, "launch");
        } else {
            self.transition(instance_id, LifeStatus::Launching, "launch");
        }

        let request = launch_request(&app, instance_id, display_id, &payload, &flags, false);
        self.call_launcher(Some(uuid), instance_id, LauncherOp::Launch(request));
        Ok(())
    }

    fn relaunch(
        &mut self,
        uuid: TaskUuid,
        instance_id: InstanceId,
        app: &Arc<AppDescription>,
        payload: &Value,
    ) -> Result<(), AppMgrError> {
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            return Err(AppMgrError::not_found("instance", instance_id.to_string()));
        };
        let status = instance.life_status();
        let registered = instance.is_registered();
        let display_id = instance.display_id();
        let flags = instance.flags().clone();

        match status {
            LifeStatus::Paused | LifeStatus::Preloaded => {
                self.bind_task(uuid, instance_id, app.app_type);
                self.transition(instance_id, LifeStatus::Relaunching, "relaunch");
            }
            LifeStatus::Foreground | LifeStatus::Background => {
                self.bind_task(uuid, instance_id, app.app_type);
                if app.app_type == AppType::Native && registered {
                    let params = payload.get("params").cloned().unwrap_or_else(|| json!({}));
                    let delivered = self
                        .running
                        .get_mut(instance_id)
                        .is_some_and(|instance| instance.send_event("relaunch", &params));
                    if delivered {
                        debug!(app_id = %app.id, %instance_id, "relaunch delivered to registered app");
                        self.reply_launched(uuid, instance_id);
                        return Ok(());
                    }
                }
            }
            other => {
                return Err(AppMgrError::conflict(format!(
                    "{} cannot be launched while {other}",
                    app.id
                )));
            }
        }

        let request = launch_request(app, instance_id, display_id, payload, &flags, true);
        self.call_launcher(Some(uuid), instance_id, LauncherOp::Launch(request));
        Ok(())
    }

    fn bind_task(&mut self, uuid: TaskUuid, instance_id: InstanceId, app_type: AppType) {
        if let Some(task) = self.queue.get_mut(uuid) {
            task.set_instance_id(instance_id);
            task.set_app_type(app_type);
        }
    }

    /// `{appId, instanceId, processId, displayId}` を返信する
    fn reply_launched(&mut self, uuid: TaskUuid, instance_id: InstanceId) {
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            return;
        };
        let reply = json!({
            "appId": instance.app_id(),
            "instanceId": instance_id,
            "processId": instance.process_id(),
            "displayId": instance.display_id(),
        });
        if let Some(task) = self.queue.get_mut(uuid) {
            task.merge_response(reply);
        }
        self.queue.remove_after_reply(uuid);
    }

    pub(crate) fn on_launched(
        &mut self,
        task: Option<TaskUuid>,
        instance_id: InstanceId,
        result: Result<LaunchResult, LauncherError>,
    ) {
        let Some(instance) = self.running.get_by_instance_id(instance_id) else {
            debug!(%instance_id, "launch finished for an instance that is gone");
            if let Some(uuid) = task {
                self.queue.fail(
                    uuid,
                    &AppMgrError::Cancelled(format!("instance {instance_id} is gone")),
                );
            }
            return;
        };
        let runtime = instance.app_type();
        let status = instance.life_status();
        let hidden = instance.flags().launched_hidden;

        match result {
            Ok(result) => {
                let pid_changed =
                    self.running
                        .set_process_id(instance_id, result.process_id, PidSource::Launcher);
                if let Some(instance) = self.running.get_mut(instance_id) {
                    instance.set_web_process_id(result.web_process_id);
                }
                match status {
                    LifeStatus::Preloading => {
                        self.transition(instance_id, LifeStatus::Preloaded, "preloaded");
                    }
                    LifeStatus::Launching if hidden => {
                        self.transition(instance_id, LifeStatus::Background, "launched hidden");
                    }
                    _ => {}
                }
                if pid_changed && status.is_running() {
                    self.emit(LifecycleEvent::RunningListChanged);
                }
                if let Some(uuid) = task {
                    self.reply_launched(uuid, instance_id);
                }
            }
            Err(e) => {
                let err = e.into_app_error(runtime);
                if let Some(uuid) = task {
                    self.queue.fail(uuid, &err);
                }
                if matches!(
                    status,
                    LifeStatus::Preloading
                        | LifeStatus::Splashing
                        | LifeStatus::Splashed
                        | LifeStatus::Launching
                        | LifeStatus::Relaunching
                ) {
                    info!(%instance_id, error = %err, "rolling back failed launch");
                    self.tear_down(instance_id, "launch failed");
                }
            }
        }
    }
}

fn launch_request(
    app: &AppDescription,
    instance_id: InstanceId,
    display_id: u32,
    payload: &Value,
    flags: &LaunchFlags,
    relaunch: bool,
) -> LaunchRequest {
    LaunchRequest {
        app_id: app.id.clone(),
        instance_id,
        main: app.main.clone(),
        display_id,
        params: payload.get("params").cloned().unwrap_or_else(|| json!({})),
        preload: flags.preload.clone(),
        launched_hidden: flags.launched_hidden,
        relaunch,
    }
}
