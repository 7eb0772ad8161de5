//! ScriptedLauncher - プロセスを作らない ProcessLauncher
//!
//! 開発用 CLI とテストで使う。pid を連番で払い出し、呼び出しを記録する。
//! アプリ単位で失敗・応答なし・pid 欠落を仕込める。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::app::AppType;
use crate::ports::{LaunchRequest, LaunchResult, LauncherError, ProcessLauncher, TargetRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherCall {
    Launch { app_id: String, relaunch: bool },
    Pause { app_id: String },
    Close { app_id: String },
}

#[derive(Debug)]
struct Script {
    next_pid: u32,
    calls: Vec<LauncherCall>,
    launch_failures: HashMap<String, LauncherError>,
    close_failures: HashMap<String, LauncherError>,
    hanging: HashSet<String>,
    missing_pid: HashSet<String>,
    pause_supported: bool,
}

/// clone してもスクリプトと呼び出し記録は共有される
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    runtime: AppType,
    delay: Option<Duration>,
    script: Arc<Mutex<Script>>,
}

impl ScriptedLauncher {
    pub fn new(runtime: AppType) -> Self {
        Self {
            runtime,
            delay: None,
            script: Arc::new(Mutex::new(Script {
                next_pid: 1000,
                calls: Vec::new(),
                launch_failures: HashMap::new(),
                close_failures: HashMap::new(),
                hanging: HashSet::new(),
                missing_pid: HashSet::new(),
                pause_supported: true,
            })),
        }
    }

    /// qml booster 相当。pause は未対応エラーになる
    pub fn booster() -> Self {
        let launcher = Self::new(AppType::Qml);
        launcher.lock().pause_supported = false;
        launcher
    }

    /// 払い出す pid の開始値
    pub fn starting_pid(self, pid: u32) -> Self {
        self.lock().next_pid = pid;
        self
    }

    /// 全呼び出しを遅らせる
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fail_launch(&self, app_id: &str, err: LauncherError) {
        self.lock().launch_failures.insert(app_id.to_string(), err);
    }

    pub fn fail_close(&self, app_id: &str, err: LauncherError) {
        self.lock().close_failures.insert(app_id.to_string(), err);
    }

    /// launch / pause / close が永遠に返らない
    pub fn hang(&self, app_id: &str) {
        self.lock().hanging.insert(app_id.to_string());
    }

    /// launch の結果に pid を含めない（不正な結果として扱われる）
    pub fn omit_pid(&self, app_id: &str) {
        self.lock().missing_pid.insert(app_id.to_string());
    }

    pub fn calls(&self) -> Vec<LauncherCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn settle(&self, app_id: &str) {
        let hanging = self.lock().hanging.contains(app_id);
        if hanging {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    fn runtime(&self) -> AppType {
        self.runtime
    }

    async fn launch(&self, request: LaunchRequest) -> Result<LaunchResult, LauncherError> {
        self.lock().calls.push(LauncherCall::Launch {
            app_id: request.app_id.clone(),
            relaunch: request.relaunch,
        });
        self.settle(&request.app_id).await;

        let mut script = self.lock();
        if let Some(err) = script.launch_failures.get(&request.app_id) {
            return Err(err.clone());
        }
        if script.missing_pid.contains(&request.app_id) {
            return Err(LauncherError::Malformed(format!(
                "no processId for {}",
                request.app_id
            )));
        }
        let process_id = script.next_pid;
        script.next_pid += 1;
        Ok(LaunchResult {
            app_id: request.app_id,
            process_id,
            web_process_id: (self.runtime == AppType::Web).then_some(process_id + 50_000),
        })
    }

    async fn pause(&self, request: TargetRequest) -> Result<(), LauncherError> {
        self.lock().calls.push(LauncherCall::Pause {
            app_id: request.app_id.clone(),
        });
        self.settle(&request.app_id).await;

        if !self.lock().pause_supported {
            return Err(LauncherError::Unsupported(format!(
                "no pause interface for {} apps",
                self.runtime
            )));
        }
        Ok(())
    }

    async fn close(&self, request: TargetRequest) -> Result<String, LauncherError> {
        self.lock().calls.push(LauncherCall::Close {
            app_id: request.app_id.clone(),
        });
        self.settle(&request.app_id).await;

        if let Some(err) = self.lock().close_failures.get(&request.app_id) {
            return Err(err.clone());
        }
        Ok(request.app_id)
    }
}
