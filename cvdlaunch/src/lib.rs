//! Local Cuttlefish Virtual Device launcher.
//!
//! Launches CVD instances from locally built images and host tools:
//! instance slot selection and locking, artifact resolution, optional
//! super-image mixing, launch command construction, subprocess
//! supervision with a boot deadline, and structured boot reports.
//!
//! The entry point is [`LocalLauncher`]:
//!
//! ```no_run
//! use cvdlaunch::{AvdSpec, LauncherOptions, LocalLauncher};
//!
//! # async fn run() -> cvdlaunch::CvdResult<()> {
//! let launcher = LocalLauncher::new(LauncherOptions::default())?;
//! let mut spec = AvdSpec::new("/path/to/android/out");
//! spec.connect_webrtc = true;
//! let report = launcher.create(&spec).await?;
//! println!("{}", serde_json::to_string_pretty(&report).unwrap());
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use tracing_subscriber::EnvFilter;

pub mod artifacts;
pub mod constants;
pub mod errors;
pub mod host_check;
pub mod image;
pub mod instance;
pub mod launch;
pub mod launcher;
pub mod spec;

pub(crate) mod util;

pub use errors::{CvdResult, LaunchError};
pub use instance::InstanceId;
pub use launch::{BootErrorKind, DeviceInfo, LaunchReport};
pub use launcher::LocalLauncher;
pub use spec::{AvdSpec, HwProperty, LauncherOptions};

/// Initialize tracing with file logging.
///
/// Logs are written to `{base_dir}/logs/cvdlaunch.log` with daily
/// rotation. Returns the guard that must be kept alive to maintain the
/// background writer thread.
pub fn init_logging(base_dir: &Path) -> CvdResult<tracing_appender::non_blocking::WorkerGuard> {
    let logs_dir = base_dir.join(constants::filenames::LOGS_DIR);
    std::fs::create_dir_all(&logs_dir).map_err(|e| {
        LaunchError::Storage(format!(
            "failed to create logs dir {}: {}",
            logs_dir.display(),
            e
        ))
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, "cvdlaunch.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| LaunchError::Internal(format!("invalid log filter: {}", e)))?;

    util::register_to_tracing(non_blocking, env_filter);
    Ok(guard)
}
