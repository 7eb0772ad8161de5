//! RunningApp - 起動中（または起動途中）のアプリインスタンス
//!
//! # 学習ポイント
//! - instanceId はコンストラクタでのみ設定し、setter を持たない
//! - 状態遷移は `set_life_status` を経由し、グラフにない遷移は警告して無視する
//! - pid は起動結果（launcher）が compositor の報告より優先される

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::app::AppType;
use crate::domain::ids::InstanceId;
use crate::domain::state::LifeStatus;

/// 起動時に確定するフラグ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchFlags {
    pub keep_alive: bool,
    pub no_splash: bool,
    pub spinner: bool,
    pub launched_hidden: bool,
    /// "full", "partial" などのプリロードモード。空ならプリロードしない
    pub preload: Option<String>,
    pub first_launch: bool,
}

impl LaunchFlags {
    /// launch リクエストの payload からフラグを読む。
    /// keepAlive は payload になければ設定の keep-alive リストで決まる。
    pub fn from_payload(payload: &Value, keep_alive_default: bool, no_splash_default: bool) -> Self {
        let preload = payload
            .get("preload")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self {
            keep_alive: payload
                .get("keepAlive")
                .and_then(Value::as_bool)
                .unwrap_or(keep_alive_default),
            no_splash: payload
                .get("noSplash")
                .and_then(Value::as_bool)
                .unwrap_or(no_splash_default),
            spinner: payload
                .get("spinner")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            launched_hidden: payload
                .pointer("/params/launchedHidden")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            preload,
            first_launch: true,
        }
    }
}

/// pid の出どころ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidSource {
    Launcher,
    Compositor,
}

/// 実際に適用された遷移
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub instance_id: InstanceId,
    pub app_id: String,
    pub display_id: u32,
    pub from: LifeStatus,
    pub to: LifeStatus,
    pub reason: String,
}

#[derive(Debug)]
pub struct RunningApp {
    instance_id: InstanceId,
    app_id: String,
    launch_point_id: String,
    app_type: AppType,
    display_id: u32,
    process_id: Option<u32>,
    pid_source: Option<PidSource>,
    web_process_id: Option<u32>,
    life_status: LifeStatus,
    flags: LaunchFlags,
    reason: String,
    launched_at: DateTime<Utc>,
    foreground_at: Option<DateTime<Utc>>,
    /// registerApp で登録されたイベントチャネル（native アプリのみ）
    event_channel: Option<mpsc::UnboundedSender<Value>>,
}

impl RunningApp {
    pub fn new(
        instance_id: InstanceId,
        app_id: impl Into<String>,
        launch_point_id: impl Into<String>,
        app_type: AppType,
        display_id: u32,
        launched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id,
            app_id: app_id.into(),
            launch_point_id: launch_point_id.into(),
            app_type,
            display_id,
            process_id: None,
            pid_source: None,
            web_process_id: None,
            life_status: LifeStatus::Stop,
            flags: LaunchFlags::default(),
            reason: String::new(),
            launched_at,
            foreground_at: None,
            event_channel: None,
        }
    }

    pub fn with_flags(mut self, flags: LaunchFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn launch_point_id(&self) -> &str {
        &self.launch_point_id
    }

    pub fn app_type(&self) -> AppType {
        self.app_type
    }

    pub fn display_id(&self) -> u32 {
        self.display_id
    }

    pub fn process_id(&self) -> Option<u32> {
        self.process_id
    }

    pub fn web_process_id(&self) -> Option<u32> {
        self.web_process_id
    }

    pub fn life_status(&self) -> LifeStatus {
        self.life_status
    }

    pub fn flags(&self) -> &LaunchFlags {
        &self.flags
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launched_at
    }

    pub fn foreground_at(&self) -> Option<DateTime<Utc>> {
        self.foreground_at
    }

    /// グラフに沿って状態を変える。
    ///
    /// - 同じ状態への要求は no-op（`Ok(None)`）
    /// - グラフにない遷移は warn ログを出し、状態は変えずに Err を返す
    pub fn set_life_status(
        &mut self,
        next: LifeStatus,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, (LifeStatus, LifeStatus)> {
        let current = self.life_status;
        if current == next {
            return Ok(None);
        }
        if !current.can_transition_to(next) {
            warn!(
                app_id = %self.app_id,
                instance_id = %self.instance_id,
                from = %current,
                to = %next,
                reason,
                "rejected life status transition"
            );
            return Err((current, next));
        }
        Ok(Some(self.apply(next, reason, now)))
    }

    /// 強制終了経路。STOP / CLOSING 以外から CLOSING へ移す
    pub fn abort_to_closing(&mut self, reason: &str, now: DateTime<Utc>) -> Option<StatusChange> {
        if !self.life_status.can_abort() {
            return None;
        }
        Some(self.apply(LifeStatus::Closing, reason, now))
    }

    /// compositor の前面から外れたときの遷移。FOREGROUND はグラフどおり BACKGROUND へ。
    /// PAUSING も BACKGROUND へ移す（グラフにない、この経路だけの辺）
    pub fn leave_foreground(&mut self, now: DateTime<Utc>) -> Option<StatusChange> {
        match self.life_status {
            LifeStatus::Foreground | LifeStatus::Pausing => {
                Some(self.apply(LifeStatus::Background, "background", now))
            }
            _ => None,
        }
    }

    fn apply(&mut self, next: LifeStatus, reason: &str, now: DateTime<Utc>) -> StatusChange {
        let from = self.life_status;
        self.life_status = next;
        self.reason = reason.to_string();
        if next == LifeStatus::Foreground {
            self.foreground_at = Some(now);
            self.flags.first_launch = false;
        }
        StatusChange {
            instance_id: self.instance_id,
            app_id: self.app_id.clone(),
            display_id: self.display_id,
            from,
            to: next,
            reason: reason.to_string(),
        }
    }

    /// pid を設定する。compositor 由来の値は launcher 由来の値を上書きしない。
    /// 実際に変わったら true。
    pub(crate) fn set_process_id(&mut self, pid: u32, source: PidSource) -> bool {
        if source == PidSource::Compositor && self.pid_source == Some(PidSource::Launcher) {
            return false;
        }
        if self.process_id == Some(pid) {
            self.pid_source = Some(source);
            return false;
        }
        self.process_id = Some(pid);
        self.pid_source = Some(source);
        true
    }

    pub fn set_web_process_id(&mut self, pid: Option<u32>) {
        self.web_process_id = pid;
    }

    pub fn register_channel(&mut self, channel: mpsc::UnboundedSender<Value>) {
        self.event_channel = Some(channel);
    }

    pub fn is_registered(&self) -> bool {
        self.event_channel
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// 登録済みチャネルにイベントを送る。送れなかったら false
    pub fn send_event(&mut self, event: &str, parameters: &Value) -> bool {
        let Some(tx) = &self.event_channel else {
            return false;
        };
        let payload = json!({
            "returnValue": true,
            "event": event,
            "appId": self.app_id,
            "instanceId": self.instance_id,
            "parameters": parameters,
        });
        if tx.send(payload).is_err() {
            self.event_channel = None;
            return false;
        }
        true
    }

    /// running list や lifeStatus 通知で使う JSON。
    /// `with_status` が true なら status/reason/type、false なら defaultWindowType/appType を付ける。
    pub fn to_json(&self, with_status: bool, default_window_type: &str) -> Value {
        let mut value = json!({
            "instanceId": self.instance_id,
            "launchPointId": self.launch_point_id,
            "id": self.app_id,
            "displayId": self.display_id,
            "processId": self.process_id.map(|p| p.to_string()).unwrap_or_default(),
            "webprocessid": self.web_process_id.map(|p| p.to_string()).unwrap_or_default(),
        });
        if let Some(map) = value.as_object_mut() {
            if with_status {
                map.insert("status".into(), json!(self.life_status));
                map.insert("reason".into(), json!(self.reason));
                map.insert("type".into(), json!(self.app_type));
            } else {
                map.insert("defaultWindowType".into(), json!(default_window_type));
                map.insert("appType".into(), json!(self.app_type));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn app() -> RunningApp {
        RunningApp::new(
            InstanceId::from_ulid(Ulid::new()),
            "com.foo",
            "com.foo_default",
            AppType::Native,
            0,
            now(),
        )
    }

    #[test]
    fn starts_in_stop() {
        assert_eq!(app().life_status(), LifeStatus::Stop);
    }

    #[test]
    fn legal_walk_is_applied() {
        let mut app = app();
        let walk = [
            LifeStatus::Launching,
            LifeStatus::Foreground,
            LifeStatus::Pausing,
            LifeStatus::Paused,
            LifeStatus::Closing,
            LifeStatus::Stop,
        ];
        for next in walk {
            let change = app.set_life_status(next, "test", now()).unwrap().unwrap();
            assert_eq!(change.to, next);
        }
        assert_eq!(app.reason(), "test");
    }

    #[test]
    fn illegal_transition_keeps_prior_state() {
        let mut app = app();
        app.set_life_status(LifeStatus::Launching, "launch", now())
            .unwrap();

        let result = app.set_life_status(LifeStatus::Paused, "bogus", now());

        assert_eq!(result, Err((LifeStatus::Launching, LifeStatus::Paused)));
        assert_eq!(app.life_status(), LifeStatus::Launching);
        assert_eq!(app.reason(), "launch");
    }

    #[test]
    fn self_transition_is_a_noop() {
        let mut app = app();
        app.set_life_status(LifeStatus::Launching, "launch", now())
            .unwrap();
        app.set_life_status(LifeStatus::Foreground, "shown", now())
            .unwrap();

        assert_eq!(
            app.set_life_status(LifeStatus::Foreground, "again", now()),
            Ok(None)
        );
        assert_eq!(app.reason(), "shown");
    }

    #[test]
    fn abort_reaches_closing_from_any_live_state() {
        let mut app = app();
        app.set_life_status(LifeStatus::Preloading, "preload", now())
            .unwrap();

        let change = app.abort_to_closing("timeout", now()).unwrap();
        assert_eq!(change.from, LifeStatus::Preloading);
        assert_eq!(change.to, LifeStatus::Closing);

        // CLOSING からはもう abort できない
        assert!(app.abort_to_closing("again", now()).is_none());
    }

    #[test]
    fn leaving_foreground_moves_pausing_to_background() {
        let mut app = app();
        for next in [LifeStatus::Launching, LifeStatus::Foreground, LifeStatus::Pausing] {
            app.set_life_status(next, "test", now()).unwrap();
        }

        let change = app.leave_foreground(now()).unwrap();
        assert_eq!(change.from, LifeStatus::Pausing);
        assert_eq!(change.to, LifeStatus::Background);

        app.set_life_status(LifeStatus::Pausing, "pause", now()).unwrap();
        app.set_life_status(LifeStatus::Paused, "paused", now()).unwrap();
        assert!(app.leave_foreground(now()).is_none());
        assert_eq!(app.life_status(), LifeStatus::Paused);
    }

    #[test]
    fn launcher_pid_wins_over_compositor_pid() {
        let mut app = app();
        assert!(app.set_process_id(100, PidSource::Compositor));
        assert!(app.set_process_id(200, PidSource::Launcher));
        assert!(!app.set_process_id(300, PidSource::Compositor));
        assert_eq!(app.process_id(), Some(200));
    }

    #[test]
    fn flags_fall_back_to_keep_alive_config() {
        let payload = json!({"id": "com.foo", "params": {"launchedHidden": true}, "preload": ""});
        let flags = LaunchFlags::from_payload(&payload, true, false);

        assert!(flags.keep_alive);
        assert!(flags.launched_hidden);
        assert_eq!(flags.preload, None);
        assert!(flags.first_launch);

        let explicit = LaunchFlags::from_payload(&json!({"keepAlive": false}), true, false);
        assert!(!explicit.keep_alive);
    }

    #[test]
    fn json_shape_depends_on_status_flag() {
        let mut app = app();
        app.set_process_id(42, PidSource::Launcher);

        let running = app.to_json(false, "card");
        assert_eq!(running["processId"], "42");
        assert_eq!(running["defaultWindowType"], "card");
        assert!(running.get("status").is_none());

        let status = app.to_json(true, "card");
        assert_eq!(status["status"], "stop");
        assert_eq!(status["type"], "native");
    }

    #[test]
    fn events_go_to_registered_channel() {
        let mut app = app();
        assert!(!app.send_event("relaunch", &json!({})));

        let (tx, mut rx) = mpsc::unbounded_channel();
        app.register_channel(tx);
        assert!(app.is_registered());
        assert!(app.send_event("relaunch", &json!({"a": 1})));

        let event = rx.try_recv().unwrap();
        assert_eq!(event["event"], "relaunch");
        assert_eq!(event["parameters"]["a"], 1);
    }
}
