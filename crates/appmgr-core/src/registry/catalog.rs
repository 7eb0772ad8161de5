//! AppCatalog - インストール済みアプリの記述
//!
//! launch point やインスタンスは `Arc<AppDescription>` を共有参照する。
//! カタログから外れたアプリの記述は、参照が残っていてもここからは引けなくなる。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::app::AppDescription;

#[derive(Debug, Default)]
pub struct AppCatalog {
    apps: BTreeMap<String, Arc<AppDescription>>,
}

impl AppCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加または置き換え。置き換えなら古い記述を返す
    pub fn install(&mut self, app: AppDescription) -> Option<Arc<AppDescription>> {
        self.apps.insert(app.id.clone(), Arc::new(app))
    }

    pub fn uninstall(&mut self, app_id: &str) -> Option<Arc<AppDescription>> {
        self.apps.remove(app_id)
    }

    pub fn get(&self, app_id: &str) -> Option<Arc<AppDescription>> {
        self.apps.get(app_id).cloned()
    }

    pub fn contains(&self, app_id: &str) -> bool {
        self.apps.contains_key(app_id)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// id 順
    pub fn iter(&self) -> impl Iterator<Item = &Arc<AppDescription>> {
        self.apps.values()
    }

    pub fn to_json(&self) -> Vec<Value> {
        self.apps.values().map(|app| app.to_json()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::AppType;

    #[test]
    fn install_replaces_and_uninstall_removes() {
        let mut catalog = AppCatalog::new();
        assert!(catalog.install(AppDescription::new("com.foo", AppType::Web)).is_none());

        let old = catalog
            .install(AppDescription::new("com.foo", AppType::Web).with_title("Foo 2"))
            .unwrap();
        assert_eq!(old.title, "");
        assert_eq!(catalog.get("com.foo").unwrap().title, "Foo 2");

        assert!(catalog.uninstall("com.foo").is_some());
        assert!(!catalog.contains("com.foo"));
    }

    #[test]
    fn shared_reference_outlives_uninstall() {
        let mut catalog = AppCatalog::new();
        catalog.install(AppDescription::new("com.foo", AppType::Native));
        let held = catalog.get("com.foo").unwrap();

        catalog.uninstall("com.foo");
        assert_eq!(held.id, "com.foo");
        assert!(catalog.get("com.foo").is_none());
    }
}
