//! Embassy async tasks
//!
//! Each task runs independently and communicates via channels/signals.

pub mod encoder;
pub mod estop;
pub mod host;
pub mod supervisor;
pub mod tmc;

pub use encoder::{encoder0_task, encoder1_task};
pub use estop::estop_task;
pub use host::host_task;
pub use supervisor::supervisor_task;
pub use tmc::{tmc_task, TmcBus};
