//! AppDescription - カタログに載るアプリケーション記述
//!
//! マニフェストの解析は外部の責務。ここでは起動と表示に必要な属性だけを持つ。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// アプリのランタイム種別。起動戦略（ProcessLauncher）の選択キーになる
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Native,
    Web,
    /// booster 経由で起動する qml アプリ
    Qml,
}

impl AppType {
    pub fn as_str(self) -> &'static str {
        match self {
            AppType::Native => "native",
            AppType::Web => "web",
            AppType::Qml => "qml",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

fn default_window_type() -> String {
    "_WEBOS_WINDOW_TYPE_CARD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDescription {
    pub id: String,
    #[serde(rename = "type")]
    pub app_type: AppType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub icon: String,
    /// 実行エントリ（実行ファイルや index.html）
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub splash_on_launch: bool,
    #[serde(default)]
    pub spinner_on_launch: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub removable: bool,
    #[serde(default = "default_window_type")]
    pub default_window_type: String,
}

impl AppDescription {
    pub fn new(id: impl Into<String>, app_type: AppType) -> Self {
        Self {
            id: id.into(),
            app_type,
            title: String::new(),
            icon: String::new(),
            main: String::new(),
            version: String::new(),
            splash_on_launch: false,
            spinner_on_launch: false,
            visible: true,
            removable: true,
            default_window_type: default_window_type(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_splash(mut self) -> Self {
        self.splash_on_launch = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.app_type,
            "title": self.title,
            "icon": self.icon,
            "main": self.main,
            "version": self.version,
            "splashOnLaunch": self.splash_on_launch,
            "spinnerOnLaunch": self.spinner_on_launch,
            "visible": self.visible,
            "removable": self.removable,
            "defaultWindowType": self.default_window_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_entries_fill_defaults() {
        let app: AppDescription =
            serde_json::from_value(json!({"id": "com.foo", "type": "web", "title": "Foo"}))
                .unwrap();

        assert_eq!(app.app_type, AppType::Web);
        assert!(app.visible);
        assert!(!app.splash_on_launch);
        assert_eq!(app.default_window_type, "_WEBOS_WINDOW_TYPE_CARD");
    }

    #[test]
    fn unknown_type_is_rejected() {
        let parsed =
            serde_json::from_value::<AppDescription>(json!({"id": "x", "type": "flash"}));
        assert!(parsed.is_err());
    }
}
