use serde::{Deserialize, Serialize};

/// イベントループが持つコレクションの件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCounts {
    pub instances: usize,
    pub foreground: usize,
    pub launch_points: usize,
    pub in_flight_tasks: usize,
    pub deferred_tasks: usize,
    pub subscribers: usize,
}
