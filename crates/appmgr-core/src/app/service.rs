//! Service - イベントループの起動と、外から話しかけるためのハンドル
//!
//! # 学習ポイント
//! - `AppService` はループ 1 本分。`spawn()` で tokio タスクにする
//! - `AppManagerHandle` は clone 可能。コマンドを mpsc で送り、必要なら oneshot で待つ
//! - ループは `shutdown()` を受けるまで止まらない（launcher の応答のために送信側を自分でも持つ）

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::app::command::Command;
use crate::domain::app::AppDescription;
use crate::domain::envelope::{RequestEnvelope, Responder};
use crate::domain::errors::AppMgrError;
use crate::domain::events::LifecycleEvent;
use crate::lifecycle::AppManager;
use crate::observability::RegistryCounts;
use crate::queue::Subsystem;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("app manager is not running")]
    Closed,

    #[error("app manager dropped the reply")]
    ReplyDropped,

    #[error(transparent)]
    App(#[from] AppMgrError),
}

/// 構築済みのイベントループ
pub struct AppService {
    manager: AppManager,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl AppService {
    pub(crate) fn new(manager: AppManager, commands: mpsc::UnboundedReceiver<Command>) -> Self {
        Self { manager, commands }
    }

    pub fn manager(&self) -> &AppManager {
        &self.manager
    }

    /// 現在のタスクでループを回す
    pub async fn run(self) {
        self.manager.run(self.commands).await;
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[derive(Clone)]
pub struct AppManagerHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl AppManagerHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        events: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self { commands, events }
    }

    fn post(&self, command: Command) -> Result<(), ServiceError> {
        self.commands.send(command).map_err(|_| ServiceError::Closed)
    }

    /// リクエストを送り、返信（と購読通知）を受け取るチャネルを返す
    pub fn send(
        &self,
        request: RequestEnvelope,
    ) -> Result<mpsc::UnboundedReceiver<Value>, ServiceError> {
        let (responder, rx) = Responder::channel();
        self.post(Command::Request(request, responder))?;
        Ok(rx)
    }

    /// カテゴリ `/` のメソッドを呼んで最初の返信を待つ
    pub async fn call(&self, method: &str, payload: Value) -> Result<Value, ServiceError> {
        let mut rx = self.send(RequestEnvelope::new("/", method, payload))?;
        rx.recv().await.ok_or(ServiceError::ReplyDropped)
    }

    /// `subscribe: true` を付けて送る。最初の 1 通が返信、以降が変更通知
    pub fn subscribe(
        &self,
        method: &str,
        mut payload: Value,
    ) -> Result<mpsc::UnboundedReceiver<Value>, ServiceError> {
        if let Some(map) = payload.as_object_mut() {
            map.insert("subscribe".into(), Value::Bool(true));
        } else {
            payload = serde_json::json!({"subscribe": true});
        }
        self.send(RequestEnvelope::new("/", method, payload))
    }

    pub fn push_foreground(&self, snapshot: Value) -> Result<(), ServiceError> {
        self.post(Command::Foreground(snapshot))
    }

    pub fn catalog_scanned(&self, apps: Vec<AppDescription>) -> Result<(), ServiceError> {
        self.post(Command::CatalogScanned(apps))
    }

    pub async fn install_app(&self, app: AppDescription) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.post(Command::Install(app, tx))?;
        Ok(rx.await.map_err(|_| ServiceError::ReplyDropped)??)
    }

    pub async fn uninstall_app(&self, app_id: &str) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.post(Command::Uninstall(app_id.to_string(), tx))?;
        Ok(rx.await.map_err(|_| ServiceError::ReplyDropped)??)
    }

    pub fn process_exited(&self, pid: u32) -> Result<(), ServiceError> {
        self.post(Command::ProcessExited(pid))
    }

    pub fn subsystem_down(&self, subsystem: Subsystem) -> Result<(), ServiceError> {
        self.post(Command::SubsystemDown(subsystem))
    }

    pub async fn counts(&self) -> Result<RegistryCounts, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.post(Command::Counts(tx))?;
        rx.await.map_err(|_| ServiceError::ReplyDropped)
    }

    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// 残りのタスクを打ち切ってループを止める。止まるまで待つ
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.post(Command::Shutdown(tx))?;
        rx.await.map_err(|_| ServiceError::ReplyDropped)
    }
}
