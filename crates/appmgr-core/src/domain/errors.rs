//! Errors - エラー型と分類
//!
//! リクエスト単位のエラーは全て `AppMgrError` に集約し、LunaTask の
//! `errorCode` / `errorText` に変換して返信する。イベントループを止めるエラーは存在しない。

use thiserror::Error;

use crate::domain::state::LifeStatus;

/// ErrorKind はエラーの運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 必須フィールド欠落・不正な値。状態は変更しない
    Validation,
    /// 未知の appId / launchPointId / instanceId
    NotFound,
    /// プロセス起動やバス呼び出しの失敗
    Collaborator,
    /// 状態遷移グラフにない遷移
    TransitionRejected,
    /// watchdog 期限切れ
    Timeout,
    /// close やシャットダウンで打ち切られた
    Cancelled,
    /// launch point の永続化失敗
    Storage,
    /// 実行中インスタンスとの競合
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppMgrError {
    #[error("{0}")]
    Validation(String),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("{runtime} launcher error: {message}")]
    Collaborator { runtime: String, message: String },

    #[error("cannot move {app_id} from {from} to {to}")]
    TransitionRejected {
        app_id: String,
        from: LifeStatus,
        to: LifeStatus,
    },

    #[error("{app_id} stayed {status} longer than {timeout_ms}ms")]
    Timeout {
        app_id: String,
        status: LifeStatus,
        timeout_ms: u64,
    },

    #[error("request cancelled: {0}")]
    Cancelled(String),

    #[error("launch point store error: {0}")]
    Storage(String),

    #[error("{0}")]
    Conflict(String),
}

impl AppMgrError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppMgrError::Validation(_) => ErrorKind::Validation,
            AppMgrError::NotFound { .. } => ErrorKind::NotFound,
            AppMgrError::Collaborator { .. } => ErrorKind::Collaborator,
            AppMgrError::TransitionRejected { .. } => ErrorKind::TransitionRejected,
            AppMgrError::Timeout { .. } => ErrorKind::Timeout,
            AppMgrError::Cancelled(_) => ErrorKind::Cancelled,
            AppMgrError::Storage(_) => ErrorKind::Storage,
            AppMgrError::Conflict(_) => ErrorKind::Conflict,
        }
    }

    /// バス返信の `errorCode`
    pub fn code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation => -1,
            ErrorKind::NotFound => -101,
            ErrorKind::Collaborator => -102,
            ErrorKind::TransitionRejected => -103,
            ErrorKind::Timeout => -104,
            ErrorKind::Cancelled => -105,
            ErrorKind::Storage => -106,
            ErrorKind::Conflict => -107,
        }
    }
}
