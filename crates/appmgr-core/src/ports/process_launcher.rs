//! ProcessLauncher port - アプリプロセスの起動・一時停止・終了
//!
//! ランタイム種別（native / web / qml booster）ごとに別の実装を用意し、
//! 起動時にアプリの宣言した種別で 1 つ選ぶ。
//!
//! # 契約
//! - 1 回の論理リクエストにつき 1 回だけ呼ばれる（自動リトライなし）
//! - 失敗（到達不能・不正な結果・未対応）は成功と区別して返す

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::app::AppType;
use crate::domain::errors::AppMgrError;
use crate::domain::ids::InstanceId;

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub app_id: String,
    pub instance_id: InstanceId,
    pub main: String,
    pub display_id: u32,
    pub params: Value,
    pub preload: Option<String>,
    pub launched_hidden: bool,
    /// 既存プロセスへの再起動要求
    pub relaunch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchResult {
    pub app_id: String,
    pub process_id: u32,
    pub web_process_id: Option<u32>,
}

/// pause / close の対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    pub app_id: String,
    pub instance_id: InstanceId,
    pub process_id: Option<u32>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LauncherError {
    #[error("launcher unreachable: {0}")]
    Unreachable(String),

    #[error("launcher rejected request ({code}): {text}")]
    Rejected { code: i32, text: String },

    #[error("malformed launcher result: {0}")]
    Malformed(String),

    #[error("not supported: {0}")]
    Unsupported(String),
}

impl LauncherError {
    pub fn into_app_error(self, runtime: AppType) -> AppMgrError {
        AppMgrError::Collaborator {
            runtime: runtime.to_string(),
            message: self.to_string(),
        }
    }
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// この実装が担当するランタイム
    fn runtime(&self) -> AppType;

    async fn launch(&self, request: LaunchRequest) -> Result<LaunchResult, LauncherError>;

    async fn pause(&self, request: TargetRequest) -> Result<(), LauncherError>;

    async fn close(&self, request: TargetRequest) -> Result<String, LauncherError>;
}
