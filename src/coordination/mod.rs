pub mod lifecycle;
pub mod timer;

pub use lifecycle::{LifecycleCoordinator, LifecycleOptions, LifecycleOutcome, RunContext};
pub use timer::{FaultSlot, Timer, TimerTask};
