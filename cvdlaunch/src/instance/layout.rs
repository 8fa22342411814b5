//! Per-instance directory layout.
//!
//! Pure computation from an [`InstanceId`] to the fixed on-disk layout.
//! Path methods do no I/O; callers invoke [`InstanceLayout::prepare`]
//! to create the directories they need.

use std::path::{Path, PathBuf};

use crate::constants::filenames;
use crate::errors::{CvdResult, LaunchError};
use crate::instance::InstanceId;

/// Filesystem layout of a single local instance.
///
/// ```text
/// <base>/cuttlefish-<id>/
/// ├── cuttlefish_runtime/      # launcher runtime dir (-instance_dir)
/// ├── cuttlefish_config.json   # instance config, read by CVD tooling
/// ├── logs/
/// │   ├── launcher.log
/// │   ├── kernel.log
/// │   └── logcat
/// ├── mixed_super.img          # only when a system image was mixed in
/// ├── stdout                   # child stdout capture
/// └── stderr                   # child stderr capture
/// ```
///
/// The home directory is exclusively owned by the current lock holder
/// for the id; it is never read by other processes.
#[derive(Clone, Debug)]
pub struct InstanceLayout {
    id: InstanceId,
    home: PathBuf,
}

impl InstanceLayout {
    /// Compute the layout for `id` under `base` (the user cache dir in
    /// production, a temp dir in tests).
    pub fn new(base: &Path, id: InstanceId) -> Self {
        let home = base.join(format!("{}{}", filenames::HOME_DIR_PREFIX, id.value()));
        Self { id, home }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Instance home: `<base>/cuttlefish-<id>`.
    pub fn home_dir(&self) -> &Path {
        &self.home
    }

    /// Launcher runtime directory under home.
    pub fn runtime_dir(&self) -> PathBuf {
        self.home.join(filenames::RUNTIME_DIR)
    }

    /// Instance config file path under home.
    pub fn config_path(&self) -> PathBuf {
        self.home.join(filenames::CONFIG_FILE)
    }

    /// Log directory under home.
    pub fn logs_dir(&self) -> PathBuf {
        self.home.join(filenames::LOGS_DIR)
    }

    /// `logs/launcher.log`
    pub fn launcher_log_path(&self) -> PathBuf {
        self.logs_dir().join(filenames::LAUNCHER_LOG)
    }

    /// `logs/kernel.log`
    pub fn kernel_log_path(&self) -> PathBuf {
        self.logs_dir().join(filenames::KERNEL_LOG)
    }

    /// `logs/logcat`
    pub fn logcat_path(&self) -> PathBuf {
        self.logs_dir().join(filenames::LOGCAT)
    }

    /// Child stdout capture file.
    pub fn stdout_path(&self) -> PathBuf {
        self.home.join(filenames::STDOUT)
    }

    /// Child stderr capture file.
    pub fn stderr_path(&self) -> PathBuf {
        self.home.join(filenames::STDERR)
    }

    /// Where a mixed super image lands, isolated per instance.
    pub fn mixed_super_image_path(&self) -> PathBuf {
        self.home.join(filenames::MIXED_SUPER_IMAGE)
    }

    /// Create home, runtime, and log directories.
    pub fn prepare(&self) -> CvdResult<()> {
        for dir in [self.home.clone(), self.runtime_dir(), self.logs_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                LaunchError::Storage(format!(
                    "failed to create instance dir {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
