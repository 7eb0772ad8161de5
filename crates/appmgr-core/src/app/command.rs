//! Command - イベントループへの入力
//!
//! ハンドル・launcher 呼び出し・watchdog はすべてこの型でループに投げ込む。
//! ループの外からレジストリに触る経路はない。

use serde_json::Value;
use tokio::sync::oneshot;

use crate::domain::app::AppDescription;
use crate::domain::envelope::{RequestEnvelope, Responder};
use crate::domain::errors::AppMgrError;
use crate::domain::ids::{BusToken, InstanceId};
use crate::observability::RegistryCounts;
use crate::ports::{LaunchResult, LauncherError};
use crate::queue::Subsystem;

/// launcher 呼び出しの結果。どの操作に対する応答かを保持する
#[derive(Debug)]
pub enum LauncherReply {
    Launched(Result<LaunchResult, LauncherError>),
    Paused(Result<(), LauncherError>),
    Closed(Result<String, LauncherError>),
}

#[derive(Debug)]
pub enum Command {
    Request(RequestEnvelope, Responder),
    LauncherReply {
        token: BusToken,
        instance_id: InstanceId,
        reply: LauncherReply,
    },
    Foreground(Value),
    CatalogScanned(Vec<AppDescription>),
    Install(AppDescription, oneshot::Sender<Result<(), AppMgrError>>),
    Uninstall(String, oneshot::Sender<Result<(), AppMgrError>>),
    ProcessExited(u32),
    SubsystemDown(Subsystem),
    WatchdogExpired {
        instance_id: InstanceId,
        generation: u64,
    },
    Counts(oneshot::Sender<RegistryCounts>),
    Shutdown(oneshot::Sender<()>),
}
