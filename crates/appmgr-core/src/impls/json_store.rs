//! JsonFileLaunchPointStore - JSON ファイル 1 つに全レコードを保存するストア
//!
//! ファイルは `{ "<launchPointId>": { ...record } }` の形。
//! 変更のたびに一時ファイルへ書いてから rename で置き換える。

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::inmem_store::merge_record;
use crate::domain::launch_point::LaunchPointRecord;
use crate::ports::{LaunchPointStore, StoreError};

#[derive(Debug)]
pub struct JsonFileLaunchPointStore {
    path: PathBuf,
    records: BTreeMap<String, LaunchPointRecord>,
}

impl JsonFileLaunchPointStore {
    /// ファイルがなければ空のストアとして開く
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), records = records.len(), "opened launch point db");
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 書き込みに失敗したらメモリ側も元に戻す
    fn commit(
        &mut self,
        next: BTreeMap<String, LaunchPointRecord>,
    ) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&next)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        self.records = next;
        Ok(())
    }
}

impl LaunchPointStore for JsonFileLaunchPointStore {
    fn insert(&mut self, record: &LaunchPointRecord) -> Result<(), StoreError> {
        let mut next = self.records.clone();
        next.insert(record.launch_point_id.clone(), record.clone());
        self.commit(next)
    }

    fn update(&mut self, launch_point_id: &str, fields: &Value) -> Result<(), StoreError> {
        let Some(current) = self.records.get(launch_point_id) else {
            return Err(StoreError::Rejected(format!(
                "no record for {launch_point_id}"
            )));
        };
        let merged = merge_record(current, fields)?;
        let mut next = self.records.clone();
        next.insert(launch_point_id.to_string(), merged);
        self.commit(next)
    }

    fn delete(&mut self, launch_point_id: &str) -> Result<(), StoreError> {
        if !self.records.contains_key(launch_point_id) {
            return Ok(());
        }
        let mut next = self.records.clone();
        next.remove(launch_point_id);
        self.commit(next)
    }

    fn load_all(&self) -> Result<Vec<LaunchPointRecord>, StoreError> {
        Ok(self.records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::launch_point::LaunchPointType;
    use serde_json::json;

    fn scratch_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "appmgr-json-store-{}-{}",
            name,
            ulid::Ulid::new()
        ));
        dir.join("launchpoints.json")
    }

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
            position: Some(1),
            params: json!({"deep": "link"}),
        }
    }

    #[test]
    fn missing_file_opens_empty() {
        let store = JsonFileLaunchPointStore::open(scratch_path("missing")).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn records_survive_reopen() {
        let path = scratch_path("reopen");
        {
            let mut store = JsonFileLaunchPointStore::open(&path).unwrap();
            store.insert(&record("com.foo_1")).unwrap();
            store.insert(&record("com.foo_2")).unwrap();
            store.update("com.foo_2", &json!({"title": "Renamed"})).unwrap();
            store.delete("com.foo_1").unwrap();
        }

        let reopened = JsonFileLaunchPointStore::open(&path).unwrap();
        let records = reopened.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].launch_point_id, "com.foo_2");
        assert_eq!(records[0].title, "Renamed");
        assert_eq!(records[0].params, json!({"deep": "link"}));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = scratch_path("corrupt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileLaunchPointStore::open(&path),
            Err(StoreError::Serde(_))
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
