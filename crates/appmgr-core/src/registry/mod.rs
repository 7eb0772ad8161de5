//! Registry - イベントループが排他的に所有するコレクション
//!
//! どれもグローバルな singleton ではなく、`AppManager` が 1 つずつ所有する。

pub mod catalog;
pub mod launch_points;
pub mod launchers;
pub mod running_apps;

pub use self::catalog::AppCatalog;
pub use self::launch_points::LaunchPointRegistry;
pub use self::launchers::{LauncherRegistry, RegistryError};
pub use self::running_apps::RunningAppRegistry;
