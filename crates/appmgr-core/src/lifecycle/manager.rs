//! AppManager - イベントループが所有するコア
//!
//! # 学習ポイント
//! - レジストリ・キュー・購読はすべてこの構造体が排他的に所有する（ロック不要）
//! - launcher 呼び出しは `tokio::spawn` し、結果は `Command::LauncherReply` で戻ってくる
//! - 状態遷移はすべて `transition` / `abort` を通し、watchdog・イベント発行を 1 箇所で行う
//!
//! launch / pause / close の流れは `launch.rs` と `close.rs`、
//! カタログの同期は `installer.rs`、バスのメソッドは `bus::api` にある。

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::command::{Command, LauncherReply};
use crate::bus::Subscriptions;
use crate::config::AppMgrConfig;
use crate::domain::errors::AppMgrError;
use crate::domain::events::LifecycleEvent;
use crate::domain::foreground::ForegroundSnapshot;
use crate::domain::ids::{BusToken, InstanceId, TaskUuid, TokenAllocator};
use crate::domain::running_app::StatusChange;
use crate::domain::state::LifeStatus;
use crate::lifecycle::foreground;
use crate::lifecycle::watchdog::Watchdog;
use crate::observability::RegistryCounts;
use crate::ports::{
    Clock, EventSink, IdGenerator, LaunchRequest, LauncherError, TargetRequest,
};
use crate::queue::{LunaTaskQueue, PendingTasks, Subsystem};
use crate::registry::{AppCatalog, LaunchPointRegistry, LauncherRegistry, RunningAppRegistry};

/// launcher に投げる操作
#[derive(Debug, Clone)]
pub(crate) enum LauncherOp {
    Launch(LaunchRequest),
    Pause(TargetRequest),
    Close(TargetRequest),
}

pub struct AppManager {
    pub(crate) config: AppMgrConfig,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) ids: Arc<dyn IdGenerator>,
    pub(crate) catalog: AppCatalog,
    pub(crate) catalog_ready: bool,
    pub(crate) launch_points: LaunchPointRegistry,
    pub(crate) running: RunningAppRegistry,
    pub(crate) launchers: LauncherRegistry,
    pub(crate) queue: LunaTaskQueue,
    pub(crate) pending: PendingTasks,
    pub(crate) subscriptions: Subscriptions,
    pub(crate) tokens: TokenAllocator,
    pub(crate) watchdog: Watchdog,
    pub(crate) events: broadcast::Sender<LifecycleEvent>,
    pub(crate) sinks: Vec<Arc<dyn EventSink>>,
    pub(crate) commands: mpsc::UnboundedSender<Command>,
}

impl AppManager {
    pub fn counts(&self) -> RegistryCounts {
        RegistryCounts {
            instances: self.running.len(),
            foreground: self.running.foreground().targets.len(),
            launch_points: self.launch_points.len(),
            in_flight_tasks: self.queue.len(),
            deferred_tasks: self.pending.len(),
            subscribers: self.subscriptions.len(),
        }
    }

    pub fn is_catalog_ready(&self) -> bool {
        self.catalog_ready
    }

    /// イベントを broadcast・追加の sink・バス購読者に流す
    pub(crate) fn emit(&mut self, event: LifecycleEvent) {
        debug!(event = event.name(), "lifecycle event");
        self.events.emit(&event);
        for sink in &self.sinks {
            sink.emit(&event);
        }
        self.notify(&event);
    }

    /// グラフに沿った遷移。拒否されたら false（ログは RunningApp 側で出る）
    pub(crate) fn transition(
        &mut self,
        instance_id: InstanceId,
        next: LifeStatus,
        reason: &str,
    ) -> bool {
        let now = self.clock.now();
        match self.running.set_life_status(instance_id, next, reason, now) {
            Ok(Some(change)) => {
                self.after_transition(change);
                true
            }
            Ok(None) => true,
            Err(e) => {
                debug!(%instance_id, error = %e, "transition not applied");
                false
            }
        }
    }

    /// 強制終了経路で CLOSING へ
    pub(crate) fn abort(&mut self, instance_id: InstanceId, reason: &str) -> bool {
        let now = self.clock.now();
        match self.running.abort_to_closing(instance_id, reason, now) {
            Some(change) => {
                self.after_transition(change);
                true
            }
            None => false,
        }
    }

    /// 遷移の後処理。遷移中状態なら watchdog を arm、そうでなければ解除する
    pub(crate) fn after_transition(&mut self, change: StatusChange) {
        info!(
            app_id = %change.app_id,
            instance_id = %change.instance_id,
            from = %change.from,
            to = %change.to,
            reason = %change.reason,
            "life status changed"
        );
        if change.to.is_transitional() {
            self.watchdog.arm(change.instance_id);
        } else {
            self.watchdog.disarm(change.instance_id);
        }
        let running_changed = change.from.is_running() != change.to.is_running();
        self.emit(LifecycleEvent::from(change));
        if running_changed {
            self.emit(LifecycleEvent::RunningListChanged);
        }
    }

    /// STOP になったインスタンスをレジストリから外す
    pub(crate) fn finish_instance(&mut self, instance_id: InstanceId) {
        self.watchdog.disarm(instance_id);
        if let Some(app) = self.running.remove(instance_id) {
            debug!(app_id = app.app_id(), %instance_id, "instance removed");
        }
    }

    /// CLOSING を経由して STOP にし、レジストリから外す
    pub(crate) fn tear_down(&mut self, instance_id: InstanceId, reason: &str) {
        self.abort(instance_id, reason);
        self.transition(instance_id, LifeStatus::Stop, reason);
        self.finish_instance(instance_id);
    }

    pub(crate) fn next_token(&mut self) -> BusToken {
        self.tokens.next_token()
    }

    /// launcher を非同期に呼ぶ。タスクがあれば最新のトークンを付ける
    pub(crate) fn call_launcher(
        &mut self,
        task: Option<TaskUuid>,
        instance_id: InstanceId,
        op: LauncherOp,
    ) -> BusToken {
        let token = self.next_token();
        if let Some(task) = task.and_then(|uuid| self.queue.get_mut(uuid)) {
            task.set_token(token);
        }
        let Some(runtime) = self
            .running
            .get_by_instance_id(instance_id)
            .map(|app| app.app_type())
        else {
            warn!(%instance_id, %token, "launcher call for unknown instance");
            return token;
        };
        debug!(%instance_id, %token, %runtime, ?op, "calling launcher");

        let tx = self.commands.clone();
        let Some(launcher) = self.launchers.get(runtime) else {
            let err = LauncherError::Unsupported(format!("no launcher for {runtime} apps"));
            let reply = match op {
                LauncherOp::Launch(_) => LauncherReply::Launched(Err(err)),
                LauncherOp::Pause(_) => LauncherReply::Paused(Err(err)),
                LauncherOp::Close(_) => LauncherReply::Closed(Err(err)),
            };
            let _ = tx.send(Command::LauncherReply {
                token,
                instance_id,
                reply,
            });
            return token;
        };

        tokio::spawn(async move {
            let reply = match op {
                LauncherOp::Launch(request) => LauncherReply::Launched(launcher.launch(request).await),
                LauncherOp::Pause(request) => LauncherReply::Paused(launcher.pause(request).await),
                LauncherOp::Close(request) => LauncherReply::Closed(launcher.close(request).await),
            };
            // ループが止まっていれば応答は捨てる
            let _ = tx.send(Command::LauncherReply {
                token,
                instance_id,
                reply,
            });
        });
        token
    }

    pub(crate) fn target_request(&self, instance_id: InstanceId, reason: &str) -> Option<TargetRequest> {
        let app = self.running.get_by_instance_id(instance_id)?;
        Some(TargetRequest {
            app_id: app.app_id().to_string(),
            instance_id,
            process_id: app.process_id(),
            reason: reason.to_string(),
        })
    }

    /// launcher の応答をトークンでタスクに結びつけて処理する
    pub(crate) fn on_launcher_reply(
        &mut self,
        token: BusToken,
        instance_id: InstanceId,
        reply: LauncherReply,
    ) {
        let task = self.queue.get_by_token(token);
        if task.is_none() {
            debug!(%token, %instance_id, "no task waits for this launcher reply");
        }
        match reply {
            LauncherReply::Launched(result) => self.on_launched(task, instance_id, result),
            LauncherReply::Paused(result) => self.on_paused(task, instance_id, result),
            LauncherReply::Closed(result) => self.on_closed(task, instance_id, result),
        }
    }

    /// compositor のスナップショットを反映する
    pub(crate) fn on_foreground(&mut self, value: &Value) {
        let snapshot = match ForegroundSnapshot::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "ignoring foreground snapshot");
                return;
            }
        };
        let now = self.clock.now();
        let outcome = foreground::reconcile(
            &mut self.running,
            &snapshot,
            &self.config.lifecycle,
            now,
        );
        for change in outcome.changes {
            self.after_transition(change);
        }
        // running list には pid が載る
        if outcome.pids_changed {
            self.emit(LifecycleEvent::RunningListChanged);
        }
        let state = outcome.state;
        self.emit(LifecycleEvent::ForegroundChanged {
            app_ids: state.app_ids(),
            fullscreen_owner: state.fullscreen_owner,
            info: state.info,
            extra_info_only: outcome.extra_info_only,
        });
    }

    /// launcher からのプロセス終了通知
    pub(crate) fn on_process_exited(&mut self, pid: u32) {
        let Some(app) = self.running.get_by_pid(pid) else {
            debug!(pid, "exit of unknown process");
            return;
        };
        let instance_id = app.instance_id();
        let app_id = app.app_id().to_string();
        let runtime = app.app_type();
        let status = app.life_status();

        let waiting = self
            .queue
            .find_all(|t| t.instance_id() == Some(instance_id));
        if status == LifeStatus::Closing {
            info!(%app_id, %instance_id, pid, "process exited while closing");
            for uuid in waiting {
                self.complete_close(uuid, instance_id, &app_id);
            }
            self.transition(instance_id, LifeStatus::Stop, "exited");
            self.finish_instance(instance_id);
            return;
        }

        warn!(%app_id, %instance_id, pid, %status, "process exited unexpectedly");
        let err = AppMgrError::Collaborator {
            runtime: runtime.to_string(),
            message: format!("process {pid} of {app_id} exited"),
        };
        for uuid in waiting {
            self.queue.fail(uuid, &err);
        }
        self.tear_down(instance_id, "crashed");
    }

    /// close 系のタスクは成功で返し、それ以外は打ち切る
    pub(crate) fn complete_close(&mut self, uuid: TaskUuid, instance_id: InstanceId, app_id: &str) {
        let Some(task) = self.queue.get_mut(uuid) else {
            return;
        };
        if task.kind() == "/close" {
            task.merge_response(json!({"appId": app_id, "instanceId": instance_id}));
            self.queue.remove_after_reply(uuid);
        } else {
            self.queue
                .fail(uuid, &AppMgrError::Cancelled(format!("{app_id} was closed")));
        }
    }

    /// サブシステム停止。該当タスクをまとめて打ち切る
    pub(crate) fn on_subsystem_down(&mut self, subsystem: Subsystem) {
        let runtime = match subsystem {
            Subsystem::Runtime(app_type) => app_type.to_string(),
            Subsystem::Compositor => "compositor".to_string(),
        };
        let err = AppMgrError::Collaborator {
            runtime: runtime.clone(),
            message: "disconnected".to_string(),
        };
        let removed = self.queue.remove_by_subsystem(subsystem, &err);
        warn!(%runtime, removed, "subsystem went down");
    }

    /// watchdog の期限切れ。古い世代の通知は捨てる
    pub(crate) fn on_watchdog(&mut self, instance_id: InstanceId, generation: u64) {
        if !self.watchdog.expire(instance_id, generation) {
            debug!(%instance_id, generation, "stale watchdog expiry");
            return;
        }
        let Some(app) = self.running.get_by_instance_id(instance_id) else {
            return;
        };
        let app_id = app.app_id().to_string();
        let status = app.life_status();
        error!(%app_id, %instance_id, %status, "transition watchdog expired");

        let err = AppMgrError::Timeout {
            app_id: app_id.clone(),
            status,
            timeout_ms: self.config.lifecycle.transition_timeout_ms,
        };
        self.queue
            .fail_where(|t| t.instance_id() == Some(instance_id), &err);

        if status == LifeStatus::Closing {
            self.transition(instance_id, LifeStatus::Stop, "timeout");
            self.finish_instance(instance_id);
            return;
        }
        self.abort(instance_id, "timeout");
        if let Some(request) = self.target_request(instance_id, "timeout") {
            self.call_launcher(None, instance_id, LauncherOp::Close(request));
        }
    }

    /// 残っているタスクをすべて打ち切り、タイマーを止める
    pub(crate) fn shutdown(&mut self) {
        let err = AppMgrError::Cancelled("app manager is shutting down".to_string());
        let mut cancelled = 0;
        for mut task in self.queue.drain().into_iter().chain(self.pending.drain_all()) {
            task.fail(&err);
            task.send_reply();
            cancelled += 1;
        }
        self.watchdog.clear();
        self.subscriptions.clear();
        info!(cancelled, "app manager stopped");
    }

    /// 1 コマンドを処理する。ループを抜けるなら false
    pub(crate) fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Request(request, responder) => self.handle_request(request, responder),
            Command::LauncherReply {
                token,
                instance_id,
                reply,
            } => self.on_launcher_reply(token, instance_id, reply),
            Command::Foreground(value) => self.on_foreground(&value),
            Command::CatalogScanned(apps) => self.on_catalog_scanned(apps),
            Command::Install(app, done) => {
                let _ = done.send(self.install(app));
            }
            Command::Uninstall(app_id, done) => {
                let _ = done.send(self.uninstall(&app_id));
            }
            Command::ProcessExited(pid) => self.on_process_exited(pid),
            Command::SubsystemDown(subsystem) => self.on_subsystem_down(subsystem),
            Command::WatchdogExpired {
                instance_id,
                generation,
            } => self.on_watchdog(instance_id, generation),
            Command::Counts(reply) => {
                let _ = reply.send(self.counts());
            }
            Command::Shutdown(done) => {
                self.shutdown();
                let _ = done.send(());
                return false;
            }
        }
        true
    }

    /// イベントループ本体。`Command::Shutdown` で抜ける
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("app manager started");
        while let Some(command) = commands.recv().await {
            if !self.handle_command(command) {
                return;
            }
        }
        self.shutdown();
    }
}
