//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::app::service::{AppManagerHandle, AppService};
use crate::bus::Subscriptions;
use crate::config::{AppMgrConfig, ConfigError};
use crate::domain::app::AppType;
use crate::domain::ids::TokenAllocator;
use crate::impls::InMemoryLaunchPointStore;
use crate::lifecycle::{AppManager, Watchdog};
use crate::ports::{
    Clock, EventSink, IdGenerator, LaunchPointStore, ProcessLauncher, SystemClock, UlidGenerator,
};
use crate::queue::{LunaTaskQueue, PendingTasks};
use crate::registry::{
    AppCatalog, LaunchPointRegistry, LauncherRegistry, RegistryError, RunningAppRegistry,
};

const EVENT_CAPACITY: usize = 256;

/// AppBuilder はイベントループと、そのハンドルを構築する
///
/// # 使用例
/// ```ignore
/// let (service, handle) = AppBuilder::new()
///     .launcher(Arc::new(ScriptedLauncher::new(AppType::Native)))?
///     .expect_runtimes(&[AppType::Native])
///     .build()?;
/// service.spawn();
/// ```
///
/// # Fail-fast 設計
/// - expect_runtimes() で必要なランタイムを宣言
/// - build() 時に「期待集合 ⊆ 登録済み launcher」をチェック
/// - 不足があれば BuildError を返す
pub struct AppBuilder {
    config: AppMgrConfig,
    store: Option<Box<dyn LaunchPointStore>>,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    launchers: LauncherRegistry,
    sinks: Vec<Arc<dyn EventSink>>,
    expected_runtimes: Option<Vec<AppType>>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing launchers for runtimes: {0:?}. These runtimes were expected but not registered.")]
    MissingRuntimes(Vec<AppType>),

    #[error(transparent)]
    Launcher(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: AppMgrConfig::default(),
            store: None,
            clock: Arc::new(SystemClock),
            ids: None,
            launchers: LauncherRegistry::new(),
            sinks: Vec::new(),
            expected_runtimes: None,
        }
    }

    pub fn config(mut self, config: AppMgrConfig) -> Self {
        self.config = config;
        self
    }

    /// 未設定ならメモリ上のストア
    pub fn store(mut self, store: impl LaunchPointStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 未設定なら clock を使う ULID 生成器
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// launcher を登録する。同じランタイムの二重登録はエラー
    pub fn launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Result<Self, BuildError> {
        self.launchers.register(launcher)?;
        Ok(self)
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn expect_runtimes(mut self, runtimes: &[AppType]) -> Self {
        self.expected_runtimes = Some(runtimes.to_vec());
        self
    }

    /// # 検証
    /// - 設定値の検証
    /// - expect_runtimes() で宣言したランタイムに launcher があるか
    pub fn build(self) -> Result<(AppService, AppManagerHandle), BuildError> {
        self.config.validate()?;
        if let Some(expected) = &self.expected_runtimes {
            let registered = self.launchers.registered_types();
            let missing: Vec<AppType> = expected
                .iter()
                .filter(|runtime| !registered.contains(*runtime))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingRuntimes(missing));
            }
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let store = self
            .store
            .unwrap_or_else(|| Box::new(InMemoryLaunchPointStore::new()));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));

        let manager = AppManager {
            launch_points: LaunchPointRegistry::new(
                store,
                Arc::clone(&self.clock),
                self.config.launch_points.bookmark_attempt_limit,
            ),
            watchdog: Watchdog::new(
                self.config.lifecycle.transition_timeout(),
                commands_tx.clone(),
            ),
            config: self.config,
            clock: self.clock,
            ids,
            catalog: AppCatalog::new(),
            catalog_ready: false,
            running: RunningAppRegistry::new(),
            launchers: self.launchers,
            queue: LunaTaskQueue::new(),
            pending: PendingTasks::new(),
            subscriptions: Subscriptions::new(),
            tokens: TokenAllocator::new(),
            events: events.clone(),
            sinks: self.sinks,
            commands: commands_tx.clone(),
        };
        Ok((
            AppService::new(manager, commands_rx),
            AppManagerHandle::new(commands_tx, events),
        ))
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ScriptedLauncher;

    #[test]
    fn test_build_success() {
        let built = AppBuilder::new()
            .launcher(Arc::new(ScriptedLauncher::new(AppType::Native)))
            .unwrap()
            .expect_runtimes(&[AppType::Native])
            .build();
        assert!(built.is_ok());
    }

    #[test]
    fn test_build_missing_runtimes() {
        let built = AppBuilder::new()
            .launcher(Arc::new(ScriptedLauncher::new(AppType::Native)))
            .unwrap()
            .expect_runtimes(&[AppType::Native, AppType::Web, AppType::Qml])
            .build();
        assert!(matches!(
            built,
            Err(BuildError::MissingRuntimes(missing)) if missing == vec![AppType::Web, AppType::Qml]
        ));
    }

    #[test]
    fn test_build_no_expect_runtimes() {
        assert!(AppBuilder::new().build().is_ok());
    }

    #[test]
    fn test_duplicate_launcher() {
        let result = AppBuilder::new()
            .launcher(Arc::new(ScriptedLauncher::new(AppType::Web)))
            .unwrap()
            .launcher(Arc::new(ScriptedLauncher::new(AppType::Web)));
        assert!(matches!(
            result,
            Err(BuildError::Launcher(RegistryError::AlreadyRegistered(AppType::Web)))
        ));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppMgrConfig::default();
        config.lifecycle.transition_timeout_ms = 0;
        let built = AppBuilder::new().config(config).build();
        assert!(matches!(built, Err(BuildError::Config(_))));
    }
}
