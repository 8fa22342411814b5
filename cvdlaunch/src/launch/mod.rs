//! Launch command construction, subprocess supervision, and result
//! reporting.

mod command;
mod post_boot;
mod report;
mod supervisor;

pub use command::{LaunchCommand, LaunchCommandBuilder};
pub use post_boot::{launch_browser, unlock_screen};
pub use report::{BootErrorKind, DeviceInfo, LaunchReport, Reporter};
pub use supervisor::{LaunchSupervisor, SupervisionVerdict};

pub(crate) use supervisor::stop_instance;
