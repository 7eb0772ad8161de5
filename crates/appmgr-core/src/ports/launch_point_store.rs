//! LaunchPointStore port - launch point の永続化
//!
//! launchPointId をキーにしたフラットなレコードの insert / update / delete / load。
//! 結果は同期的に返す。失敗したらレジストリ側はメモリ上の変更を行わない。

use serde_json::Value;
use thiserror::Error;

use crate::domain::errors::AppMgrError;
use crate::domain::launch_point::LaunchPointRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<StoreError> for AppMgrError {
    fn from(err: StoreError) -> Self {
        AppMgrError::Storage(err.to_string())
    }
}

pub trait LaunchPointStore: Send {
    fn insert(&mut self, record: &LaunchPointRecord) -> Result<(), StoreError>;

    /// 部分レコードをマージする
    fn update(&mut self, launch_point_id: &str, fields: &Value) -> Result<(), StoreError>;

    fn delete(&mut self, launch_point_id: &str) -> Result<(), StoreError>;

    fn load_all(&self) -> Result<Vec<LaunchPointRecord>, StoreError>;
}
