//! InMemoryLaunchPointStore - 開発・テスト用の launch point ストア
//!
//! clone したハンドル同士で中身を共有するので、レジストリに渡したあとも
//! テスト側から内容を確認できる。`fail_writes` で書き込み失敗を注入できる。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::domain::launch_point::LaunchPointRecord;
use crate::ports::{LaunchPointStore, StoreError};

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<String, LaunchPointRecord>,
    fail_writes: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLaunchPointStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryLaunchPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = LaunchPointRecord>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for record in records {
                state.records.insert(record.launch_point_id.clone(), record);
            }
        }
        store
    }

    /// true にすると以降の insert / update / delete が失敗する
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn get(&self, launch_point_id: &str) -> Option<LaunchPointRecord> {
        self.lock().records.get(launch_point_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // テスト用ストアなので poison されても中身はそのまま使う
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn writable(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        let state = self.lock();
        if state.fail_writes {
            return Err(StoreError::Rejected("writes disabled".into()));
        }
        Ok(state)
    }
}

impl LaunchPointStore for InMemoryLaunchPointStore {
    fn insert(&mut self, record: &LaunchPointRecord) -> Result<(), StoreError> {
        let mut state = self.writable()?;
        state
            .records
            .insert(record.launch_point_id.clone(), record.clone());
        Ok(())
    }

    fn update(&mut self, launch_point_id: &str, fields: &Value) -> Result<(), StoreError> {
        let mut state = self.writable()?;
        let Some(current) = state.records.get(launch_point_id) else {
            return Err(StoreError::Rejected(format!(
                "no record for {launch_point_id}"
            )));
        };
        let merged = merge_record(current, fields)?;
        state.records.insert(launch_point_id.to_string(), merged);
        Ok(())
    }

    fn delete(&mut self, launch_point_id: &str) -> Result<(), StoreError> {
        let mut state = self.writable()?;
        state.records.remove(launch_point_id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<LaunchPointRecord>, StoreError> {
        Ok(self.lock().records.values().cloned().collect())
    }
}

/// 既存レコードに部分レコードを重ねる。キー項目（launchPointId / id / lptype）は変えない
pub(crate) fn merge_record(
    current: &LaunchPointRecord,
    fields: &Value,
) -> Result<LaunchPointRecord, StoreError> {
    let mut value = serde_json::to_value(current)?;
    if let (Some(target), Some(patch)) = (value.as_object_mut(), fields.as_object()) {
        for (key, v) in patch {
            if matches!(key.as_str(), "launchPointId" | "id" | "lptype") {
                continue;
            }
            target.insert(key.clone(), v.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::launch_point::LaunchPointType;
    use serde_json::json;

    fn record(id: &str) -> LaunchPointRecord {
        LaunchPointRecord {
            launch_point_id: id.into(),
            app_id: "com.foo".into(),
            lptype: LaunchPointType::Bookmark,
            title: "Foo".into(),
            icon: String::new(),
            bg_image: String::new(),
            bg_color: String::new(),
            tile_size: String::new(),
            unmovable: false,
            visible: true,
            position: None,
            params: json!({}),
        }
    }

    #[test]
    fn clones_share_records() {
        let store = InMemoryLaunchPointStore::new();
        let mut writer = store.clone();
        writer.insert(&record("a")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().title, "Foo");
    }

    #[test]
    fn update_merges_but_keeps_identity() {
        let mut store = InMemoryLaunchPointStore::with_records([record("a")]);
        store
            .update("a", &json!({"title": "Bar", "position": 2, "id": "other"}))
            .unwrap();

        let stored = store.get("a").unwrap();
        assert_eq!(stored.title, "Bar");
        assert_eq!(stored.position, Some(2));
        assert_eq!(stored.app_id, "com.foo");
    }

    #[test]
    fn update_of_unknown_record_fails() {
        let mut store = InMemoryLaunchPointStore::new();
        assert!(matches!(
            store.update("missing", &json!({})),
            Err(StoreError::Rejected(_))
        ));
    }

    #[test]
    fn injected_failure_blocks_writes() {
        let mut store = InMemoryLaunchPointStore::new();
        store.fail_writes(true);

        assert!(store.insert(&record("a")).is_err());
        assert!(store.is_empty());

        store.fail_writes(false);
        assert!(store.insert(&record("a")).is_ok());
    }
}
