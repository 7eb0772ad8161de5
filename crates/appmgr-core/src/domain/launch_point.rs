//! LaunchPoint - ユーザーに見える起動エントリ
//!
//! - DEFAULT: アプリごとに 1 つ。id は `appId + "_default"` で決定的
//! - BOOKMARK: 0..n 個。id はレジストリ側で一意性を確認して払い出す
//!
//! 永続化レコード（`LaunchPointRecord`）は launchPointId をキーにしたフラットな key/value。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const DEFAULT_SUFFIX: &str = "_default";

pub fn default_launch_point_id(app_id: &str) -> String {
    format!("{app_id}{DEFAULT_SUFFIX}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchPointType {
    Default,
    Bookmark,
}

fn default_visible() -> bool {
    true
}

/// ストレージに書くレコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchPointRecord {
    pub launch_point_id: String,
    #[serde(rename = "id")]
    pub app_id: String,
    pub lptype: LaunchPointType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub bg_image: String,
    #[serde(default)]
    pub bg_color: String,
    #[serde(default)]
    pub tile_size: String,
    #[serde(default)]
    pub unmovable: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPoint {
    launch_point_id: String,
    app_id: String,
    lp_type: LaunchPointType,
    pub title: String,
    pub icon: String,
    pub bg_image: String,
    pub bg_color: String,
    pub tile_size: String,
    pub unmovable: bool,
    pub visible: bool,
    pub position: Option<u32>,
    pub params: Value,
}

impl LaunchPoint {
    pub(crate) fn new(
        launch_point_id: String,
        app_id: String,
        lp_type: LaunchPointType,
    ) -> Self {
        Self {
            launch_point_id,
            app_id,
            lp_type,
            title: String::new(),
            icon: String::new(),
            bg_image: String::new(),
            bg_color: String::new(),
            tile_size: String::new(),
            unmovable: false,
            visible: true,
            position: None,
            params: Value::Object(Map::new()),
        }
    }

    pub fn launch_point_id(&self) -> &str {
        &self.launch_point_id
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn lp_type(&self) -> LaunchPointType {
        self.lp_type
    }

    pub fn is_default(&self) -> bool {
        self.lp_type == LaunchPointType::Default
    }

    /// クライアントから渡された部分レコードで表示用フィールドを上書きする。
    /// id / type / appId は変更できない。変更があれば true。
    pub fn apply_fields(&mut self, fields: &Value) -> bool {
        let mut changed = false;
        let mut set_str = |key: &str, slot: &mut String| {
            if let Some(v) = fields.get(key).and_then(Value::as_str)
                && slot != v
            {
                *slot = v.to_string();
                changed = true;
            }
        };
        set_str("title", &mut self.title);
        set_str("icon", &mut self.icon);
        set_str("bgImage", &mut self.bg_image);
        set_str("bgColor", &mut self.bg_color);
        set_str("tileSize", &mut self.tile_size);

        if let Some(v) = fields.get("unmovable").and_then(Value::as_bool)
            && self.unmovable != v
        {
            self.unmovable = v;
            changed = true;
        }
        if let Some(v) = fields.get("visible").and_then(Value::as_bool)
            && self.visible != v
        {
            self.visible = v;
            changed = true;
        }
        if let Some(v) = fields.get("params")
            && v.is_object()
            && &self.params != v
        {
            self.params = v.clone();
            changed = true;
        }
        changed
    }

    pub fn to_record(&self) -> LaunchPointRecord {
        LaunchPointRecord {
            launch_point_id: self.launch_point_id.clone(),
            app_id: self.app_id.clone(),
            lptype: self.lp_type,
            title: self.title.clone(),
            icon: self.icon.clone(),
            bg_image: self.bg_image.clone(),
            bg_color: self.bg_color.clone(),
            tile_size: self.tile_size.clone(),
            unmovable: self.unmovable,
            visible: self.visible,
            position: self.position,
            params: self.params.clone(),
        }
    }

    pub fn from_record(record: LaunchPointRecord) -> Self {
        Self {
            launch_point_id: record.launch_point_id,
            app_id: record.app_id,
            lp_type: record.lptype,
            title: record.title,
            icon: record.icon,
            bg_image: record.bg_image,
            bg_color: record.bg_color,
            tile_size: record.tile_size,
            unmovable: record.unmovable,
            visible: record.visible,
            position: record.position,
            params: record.params,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "launchPointId": self.launch_point_id,
            "id": self.app_id,
            "lptype": self.lp_type,
            "title": self.title,
            "icon": self.icon,
            "bgImage": self.bg_image,
            "bgColor": self.bg_color,
            "tileSize": self.tile_size,
            "unmovable": self.unmovable,
            "removable": self.lp_type == LaunchPointType::Bookmark,
            "params": self.params,
        })
    }
}
