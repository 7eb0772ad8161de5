//! Foreground - compositor から届く前面アプリのスナップショットと、その派生ビュー

use serde::Deserialize;
use serde_json::Value;

use crate::domain::errors::AppMgrError;

/// スナップショットの 1 エントリ
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundEntry {
    pub app_id: String,
    #[serde(default)]
    pub display_id: u32,
    #[serde(default, deserialize_with = "de_pid")]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub window_type: String,
    #[serde(default)]
    pub window_group: bool,
    #[serde(default)]
    pub window_group_owner: bool,
}

// compositor は pid を数値でも文字列でも送ってくる
fn de_pid<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

impl ForegroundEntry {
    /// windowGroup でなければ自分がオーナー扱い
    pub fn owns_window_group(&self) -> bool {
        self.window_group_owner || !self.window_group
    }
}

/// compositor のプッシュ 1 回分。raw は値比較用にそのまま保持する
#[derive(Debug, Clone, PartialEq)]
pub struct ForegroundSnapshot {
    pub entries: Vec<ForegroundEntry>,
    pub raw: Vec<Value>,
}

impl ForegroundSnapshot {
    /// `{"foregroundAppInfo": [...]}` または配列そのものを受け付ける。
    /// 解釈できないエントリ（appId なしなど）は落とす。
    pub fn from_value(value: &Value) -> Result<Self, AppMgrError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("foregroundAppInfo") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(AppMgrError::validation(
                        "foregroundAppInfo must be an array",
                    ));
                }
            },
            _ => return Err(AppMgrError::validation("foreground snapshot must be JSON")),
        };

        let mut entries = Vec::with_capacity(items.len());
        let mut raw = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<ForegroundEntry>(item.clone()) {
                Ok(entry) if !entry.app_id.is_empty() => {
                    entries.push(entry);
                    raw.push(item.clone());
                }
                _ => tracing::debug!(entry = %item, "dropping malformed foreground entry"),
            }
        }
        Ok(Self { entries, raw })
    }
}

/// 前面アプリの派生ビュー。3 つのフィールドは必ず同じスナップショットから作る
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForegroundState {
    /// (appId, displayId) をスナップショット順に
    pub targets: Vec<(String, u32)>,
    pub fullscreen_owner: Option<String>,
    pub info: Vec<Value>,
}

impl ForegroundState {
    pub fn app_ids(&self) -> Vec<String> {
        self.targets.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn contains(&self, app_id: &str, display_id: u32) -> bool {
        self.targets
            .iter()
            .any(|(id, d)| id == app_id && *d == display_id)
    }

    pub fn owner_id(&self) -> &str {
        self.fullscreen_owner.as_deref().unwrap_or("")
    }
}
