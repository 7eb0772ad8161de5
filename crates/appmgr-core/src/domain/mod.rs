//! Domain model (ids, life status, launch points, instances, tasks, ...).

pub mod app;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod foreground;
pub mod ids;
pub mod launch_point;
pub mod running_app;
pub mod state;
pub mod task;

pub use self::app::{AppDescription, AppType};
pub use self::envelope::{RequestEnvelope, Responder};
pub use self::errors::{AppMgrError, ErrorKind};
pub use self::events::{LaunchPointChange, LifecycleEvent};
pub use self::foreground::{ForegroundEntry, ForegroundSnapshot, ForegroundState};
pub use self::ids::{BusToken, InstanceId, TaskUuid, TokenAllocator};
pub use self::launch_point::{
    LaunchPoint, LaunchPointRecord, LaunchPointType, default_launch_point_id,
};
pub use self::running_app::{LaunchFlags, PidSource, RunningApp, StatusChange};
pub use self::state::LifeStatus;
pub use self::task::{LunaTask, NextStep};
