//! Structured launch results.
//!
//! The reporter turns internal launch state into a [`LaunchReport`]
//! suitable for serialization by the caller. Post-boot verification
//! goes through the external status query so a launcher that exited
//! zero without actually leaving a device behind is still caught.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::artifacts::ArtifactPaths;
use crate::constants::binaries;
use crate::errors::{CvdResult, LaunchError};
use crate::instance::InstanceLayout;
use crate::launch::supervisor::instance_env;

/// Failure classification carried by a `BootFailure` report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootErrorKind {
    WebrtcUnsupported,
    VncUnsupported,
    Timeout,
    LaunchNonZero,
    PostbootStatusFailed,
}

/// Addresses and metadata of a successfully launched device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub instance_name: String,
    pub host: String,
    pub adb_port: u16,
    pub vnc_port: u16,
    pub webrtc_port: u16,
    /// Log files the caller may want to surface.
    pub logs: Vec<PathBuf>,
    /// Free-form extras (e.g. the WebRTC URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_data: Option<HashMap<String, String>>,
}

/// The structured result of one `create` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LaunchReport {
    Success(DeviceInfo),
    BootFailure {
        instance_name: String,
        host: String,
        error_message: String,
        logs: Vec<PathBuf>,
        error_kind: BootErrorKind,
    },
}

impl LaunchReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The failure classification, if this is a failure.
    pub fn error_kind(&self) -> Option<BootErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::BootFailure { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// Builds reports for one instance.
pub struct Reporter<'a> {
    artifacts: &'a ArtifactPaths,
    layout: &'a InstanceLayout,
}

impl<'a> Reporter<'a> {
    pub fn new(artifacts: &'a ArtifactPaths, layout: &'a InstanceLayout) -> Self {
        Self { artifacts, layout }
    }

    /// The log files surfaced with every report.
    fn log_paths(&self) -> Vec<PathBuf> {
        vec![
            self.layout.launcher_log_path(),
            self.layout.kernel_log_path(),
            self.layout.logcat_path(),
        ]
    }

    /// Compose a success report after verifying the instance is
    /// actually up, per the external status query.
    ///
    /// A zero launcher exit with a failing status query yields a
    /// `PostbootStatusFailed` boot failure, distinct from launch
    /// failure: logs exist and the slot is left free. A status query
    /// that cannot even be run (legacy host packages ship neither
    /// `cvd` nor `cvd_status`) gets the same classification; the
    /// launcher has already started a device, so the caller must
    /// receive a report, not an error.
    pub async fn verify_and_report_success(
        &self,
        update_data: Option<HashMap<String, String>>,
    ) -> CvdResult<LaunchReport> {
        let up = match self.query_status().await {
            Ok(up) => up,
            Err(e) => {
                tracing::warn!(instance = %self.layout.id(), "status query unavailable: {}", e);
                return Ok(self.boot_failure(
                    BootErrorKind::PostbootStatusFailed,
                    format!("could not verify the booted device: {}", e),
                ));
            }
        };
        if !up {
            tracing::warn!(
                instance = %self.layout.id(),
                "launcher exited zero but status query does not see the instance"
            );
            return Ok(self.boot_failure(
                BootErrorKind::PostbootStatusFailed,
                format!(
                    "launcher reported success but {} does not show instance {} running",
                    binaries::CVD_STATUS,
                    self.layout.id()
                ),
            ));
        }

        let id = self.layout.id();
        Ok(LaunchReport::Success(DeviceInfo {
            instance_name: id.instance_name(),
            host: "localhost".into(),
            adb_port: id.adb_port(),
            vnc_port: id.vnc_port(),
            webrtc_port: id.webrtc_port(),
            logs: self.log_paths(),
            update_data,
        }))
    }

    /// Compose a boot-failure report.
    pub fn boot_failure(&self, kind: BootErrorKind, message: String) -> LaunchReport {
        LaunchReport::BootFailure {
            instance_name: self.layout.id().instance_name(),
            host: "localhost".into(),
            error_message: message,
            logs: self.log_paths(),
            error_kind: kind,
        }
    }

    /// Run the external status query for this instance.
    ///
    /// Prefers the standalone `cvd_status` binary, falling back to
    /// `cvd status`. Exit code zero means the instance is up.
    async fn query_status(&self) -> CvdResult<bool> {
        let bin_dir = self.artifacts.host_bins.join("bin");
        let standalone = bin_dir.join(binaries::CVD_STATUS);
        let mut cmd = if standalone.is_file() {
            Command::new(standalone)
        } else {
            let mut cmd = Command::new(bin_dir.join(binaries::CVD));
            cmd.arg("status");
            cmd
        };
        let status = cmd
            .envs(instance_env(self.artifacts, self.layout))
            .current_dir(&self.artifacts.host_bins)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                LaunchError::Internal(format!("failed to run status query: {}", e))
            })?;
        Ok(status.success())
    }
}
