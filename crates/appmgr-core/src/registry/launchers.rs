//! LauncherRegistry - ランタイム種別ごとの ProcessLauncher
//!
//! # 学習ポイント
//! - HashMap で trait object（`Arc<dyn ProcessLauncher>`）を管理
//! - 二重登録はエラー

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::app::AppType;
use crate::ports::ProcessLauncher;

#[derive(Default)]
pub struct LauncherRegistry {
    launchers: HashMap<AppType, Arc<dyn ProcessLauncher>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("launcher for runtime '{0}' is already registered")]
    AlreadyRegistered(AppType),
}

impl LauncherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// launcher 自身が申告するランタイムで登録する
    pub fn register(&mut self, launcher: Arc<dyn ProcessLauncher>) -> Result<(), RegistryError> {
        let runtime = launcher.runtime();
        if self.launchers.contains_key(&runtime) {
            return Err(RegistryError::AlreadyRegistered(runtime));
        }
        self.launchers.insert(runtime, launcher);
        Ok(())
    }

    pub fn get(&self, runtime: AppType) -> Option<Arc<dyn ProcessLauncher>> {
        self.launchers.get(&runtime).cloned()
    }

    pub fn registered_types(&self) -> Vec<AppType> {
        let mut types: Vec<_> = self.launchers.keys().copied().collect();
        types.sort();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::ScriptedLauncher;

    #[test]
    fn register_and_get() {
        let mut registry = LauncherRegistry::new();
        registry
            .register(Arc::new(ScriptedLauncher::new(AppType::Web)))
            .unwrap();

        assert!(registry.get(AppType::Web).is_some());
        assert!(registry.get(AppType::Native).is_none());
    }

    #[test]
    fn double_registration() {
        let mut registry = LauncherRegistry::new();
        registry
            .register(Arc::new(ScriptedLauncher::new(AppType::Native)))
            .unwrap();
        let result = registry.register(Arc::new(ScriptedLauncher::new(AppType::Native)));
        assert_eq!(result, Err(RegistryError::AlreadyRegistered(AppType::Native)));
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = LauncherRegistry::new();
        registry.register(Arc::new(ScriptedLauncher::booster())).unwrap();
        registry
            .register(Arc::new(ScriptedLauncher::new(AppType::Native)))
            .unwrap();

        assert_eq!(registry.registered_types(), vec![AppType::Native, AppType::Qml]);
    }
}
