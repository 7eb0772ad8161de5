//! State - インスタンスのライフサイクル状態
//!
//! # 状態遷移グラフ
//! ```text
//! STOP        → PRELOADING, SPLASHING, LAUNCHING(hidden)
//! PRELOADING  → PRELOADED
//! PRELOADED   → RELAUNCHING
//! SPLASHING   → SPLASHED, LAUNCHING
//! SPLASHED    → LAUNCHING
//! LAUNCHING   → FOREGROUND, BACKGROUND
//! RELAUNCHING → FOREGROUND
//! FOREGROUND  → BACKGROUND, PAUSING
//! BACKGROUND  → PAUSING, FOREGROUND
//! PAUSING     → PAUSED
//! PAUSED      → CLOSING, RELAUNCHING
//! CLOSING     → STOP
//! ```
//!
//! 通常の遷移はこのグラフだけを許可する。強制終了（watchdog・ロールバック・クラッシュ）用に
//! `can_abort()` の別経路を用意し、STOP/CLOSING 以外から CLOSING へ移れるようにしている。
//! compositor の前面から外れたときだけ、PAUSING → BACKGROUND も許す（`RunningApp::leave_foreground`）。

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifeStatus {
    Stop,
    Preloading,
    Preloaded,
    Splashing,
    Splashed,
    Launching,
    Relaunching,
    Foreground,
    Background,
    Pausing,
    Paused,
    Closing,
}

impl LifeStatus {
    pub const ALL: [LifeStatus; 12] = [
        LifeStatus::Stop,
        LifeStatus::Preloading,
        LifeStatus::Preloaded,
        LifeStatus::Splashing,
        LifeStatus::Splashed,
        LifeStatus::Launching,
        LifeStatus::Relaunching,
        LifeStatus::Foreground,
        LifeStatus::Background,
        LifeStatus::Pausing,
        LifeStatus::Paused,
        LifeStatus::Closing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LifeStatus::Stop => "stop",
            LifeStatus::Preloading => "preloading",
            LifeStatus::Preloaded => "preloaded",
            LifeStatus::Splashing => "splashing",
            LifeStatus::Splashed => "splashed",
            LifeStatus::Launching => "launching",
            LifeStatus::Relaunching => "relaunching",
            LifeStatus::Foreground => "foreground",
            LifeStatus::Background => "background",
            LifeStatus::Pausing => "pausing",
            LifeStatus::Paused => "paused",
            LifeStatus::Closing => "closing",
        }
    }

    /// このステータスから遷移できる先
    pub fn legal_targets(self) -> &'static [LifeStatus] {
        use LifeStatus::*;
        match self {
            Stop => &[Preloading, Splashing, Launching],
            Preloading => &[Preloaded],
            Preloaded => &[Relaunching],
            Splashing => &[Splashed, Launching],
            Splashed => &[Launching],
            Launching => &[Foreground, Background],
            Relaunching => &[Foreground],
            Foreground => &[Background, Pausing],
            Background => &[Pausing, Foreground],
            Pausing => &[Paused],
            Paused => &[Closing, Relaunching],
            Closing => &[Stop],
        }
    }

    pub fn can_transition_to(self, next: LifeStatus) -> bool {
        self.legal_targets().contains(&next)
    }

    /// watchdog で監視する短命な状態
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            LifeStatus::Preloading
                | LifeStatus::Splashing
                | LifeStatus::Launching
                | LifeStatus::Relaunching
                | LifeStatus::Pausing
                | LifeStatus::Closing
        )
    }

    /// 強制終了経路で CLOSING に移れるか
    pub fn can_abort(self) -> bool {
        !matches!(self, LifeStatus::Stop | LifeStatus::Closing)
    }

    /// running list に「動いている」として数える状態
    pub fn is_running(self) -> bool {
        !matches!(self, LifeStatus::Stop | LifeStatus::Closing)
    }
}

impl fmt::Display for LifeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::stop_to_preloading(LifeStatus::Stop, LifeStatus::Preloading, true)]
    #[case::stop_to_splashing(LifeStatus::Stop, LifeStatus::Splashing, true)]
    #[case::stop_to_launching(LifeStatus::Stop, LifeStatus::Launching, true)]
    #[case::stop_to_foreground(LifeStatus::Stop, LifeStatus::Foreground, false)]
    #[case::preloading_to_preloaded(LifeStatus::Preloading, LifeStatus::Preloaded, true)]
    #[case::preloaded_to_relaunching(LifeStatus::Preloaded, LifeStatus::Relaunching, true)]
    #[case::preloaded_to_foreground(LifeStatus::Preloaded, LifeStatus::Foreground, false)]
    #[case::splashing_to_launching(LifeStatus::Splashing, LifeStatus::Launching, true)]
    #[case::splashed_to_launching(LifeStatus::Splashed, LifeStatus::Launching, true)]
    #[case::launching_to_foreground(LifeStatus::Launching, LifeStatus::Foreground, true)]
    #[case::launching_to_background(LifeStatus::Launching, LifeStatus::Background, true)]
    #[case::launching_to_closing(LifeStatus::Launching, LifeStatus::Closing, false)]
    #[case::relaunching_to_background(LifeStatus::Relaunching, LifeStatus::Background, false)]
    #[case::foreground_to_pausing(LifeStatus::Foreground, LifeStatus::Pausing, true)]
    #[case::foreground_to_closing(LifeStatus::Foreground, LifeStatus::Closing, false)]
    #[case::background_to_foreground(LifeStatus::Background, LifeStatus::Foreground, true)]
    #[case::pausing_to_background(LifeStatus::Pausing, LifeStatus::Background, false)]
    #[case::paused_to_closing(LifeStatus::Paused, LifeStatus::Closing, true)]
    #[case::paused_to_relaunching(LifeStatus::Paused, LifeStatus::Relaunching, true)]
    #[case::closing_to_stop(LifeStatus::Closing, LifeStatus::Stop, true)]
    #[case::closing_to_foreground(LifeStatus::Closing, LifeStatus::Foreground, false)]
    fn transition_graph(#[case] from: LifeStatus, #[case] to: LifeStatus, #[case] legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn stop_is_reachable_only_from_closing() {
        let sources: Vec<_> = LifeStatus::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(LifeStatus::Stop))
            .collect();
        assert_eq!(sources, vec![LifeStatus::Closing]);
    }

    #[test]
    fn transitional_states() {
        let transitional: Vec<_> = LifeStatus::ALL
            .into_iter()
            .filter(|s| s.is_transitional())
            .collect();
        assert_eq!(
            transitional,
            vec![
                LifeStatus::Preloading,
                LifeStatus::Splashing,
                LifeStatus::Launching,
                LifeStatus::Relaunching,
                LifeStatus::Pausing,
                LifeStatus::Closing,
            ]
        );
    }

    #[test]
    fn abort_is_not_available_from_stop_or_closing() {
        assert!(!LifeStatus::Stop.can_abort());
        assert!(!LifeStatus::Closing.can_abort());
        assert!(LifeStatus::Preloaded.can_abort());
        assert!(LifeStatus::Launching.can_abort());
    }

    #[test]
    fn serializes_lowercase() {
        let value = serde_json::to_value(LifeStatus::Relaunching).unwrap();
        assert_eq!(value, serde_json::json!("relaunching"));
        assert_eq!(LifeStatus::Foreground.to_string(), "foreground");
    }
}
