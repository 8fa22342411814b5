//! Launch supervision: run the launcher subprocess, capture its output,
//! enforce the boot deadline, and classify the outcome.
//!
//! The supervisor runs cooperatively on the current task; multiple
//! instances are supervised by separate processes, serialized per-id by
//! the instance lock. The only cancellation is the boot timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::artifacts::ArtifactPaths;
use crate::constants::{binaries, defaults, envs, markers};
use crate::errors::{CvdResult, LaunchError};
use crate::instance::InstanceLayout;
use crate::launch::command::LaunchCommand;
use crate::launch::report::BootErrorKind;
use crate::util::tail_lines;

/// How the supervised launch ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SupervisionVerdict {
    /// The launcher daemonized successfully (exit code zero).
    Success,
    /// The launch failed; the orchestrator turns this into a
    /// `BootFailure` report rather than an error.
    Failure {
        kind: BootErrorKind,
        message: String,
    },
}

/// Environment injected into every CVD tooling subprocess for an
/// instance: the launcher itself, the stop command, and the status
/// query all read the same variables.
pub(crate) fn instance_env(
    artifacts: &ArtifactPaths,
    layout: &InstanceLayout,
) -> Vec<(String, String)> {
    vec![
        (
            envs::ANDROID_HOST_OUT.into(),
            artifacts.host_bins.display().to_string(),
        ),
        (
            envs::ANDROID_SOONG_HOST_OUT.into(),
            artifacts.host_artifacts.display().to_string(),
        ),
        (envs::HOME.into(), layout.home_dir().display().to_string()),
        (
            envs::CUTTLEFISH_INSTANCE.into(),
            layout.id().value().to_string(),
        ),
        (
            envs::CUTTLEFISH_CONFIG_FILE.into(),
            layout.config_path().display().to_string(),
        ),
    ]
}

/// Invoke the external stop command for this instance.
///
/// Prefers the standalone `stop_cvd` binary, falling back to
/// `cvd stop`. Returns whether the stop reported success; a stop
/// command that cannot even be run counts as a failed stop, so callers
/// fall through to their own cleanup instead of erroring.
pub(crate) async fn stop_instance(
    artifacts: &ArtifactPaths,
    layout: &InstanceLayout,
) -> bool {
    let bin_dir = artifacts.host_bins.join("bin");
    let standalone = bin_dir.join(binaries::STOP_CVD);
    let mut cmd = if standalone.is_file() {
        Command::new(standalone)
    } else {
        let mut cmd = Command::new(bin_dir.join(binaries::CVD));
        cmd.arg("stop");
        cmd
    };
    cmd.envs(instance_env(artifacts, layout))
        .current_dir(&artifacts.host_bins)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    tracing::info!(instance = %layout.id(), "stopping instance");
    let status = tokio::time::timeout(
        Duration::from_secs(defaults::STOP_GRACE_SECS),
        async { cmd.status().await },
    )
    .await;

    match status {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::warn!(instance = %layout.id(), "could not run stop command: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!(instance = %layout.id(), "stop command timed out");
            false
        }
    }
}

/// Runs one launch command to completion or deadline.
pub struct LaunchSupervisor<'a> {
    artifacts: &'a ArtifactPaths,
    layout: &'a InstanceLayout,
}

impl<'a> LaunchSupervisor<'a> {
    pub fn new(artifacts: &'a ArtifactPaths, layout: &'a InstanceLayout) -> Self {
        Self { artifacts, layout }
    }

    /// Execute `command` with the instance environment, waiting up to
    /// `boot_timeout` for the launcher to daemonize.
    ///
    /// A zero deadline takes the timeout path immediately. On timeout
    /// the external stop command is attempted first; only if that fails
    /// is the child terminated directly.
    pub async fn run(
        &self,
        command: &LaunchCommand,
        boot_timeout: Duration,
    ) -> CvdResult<SupervisionVerdict> {
        let stdout_file = self.open_capture(self.layout.stdout_path())?;
        let stderr_file = self.open_capture(self.layout.stderr_path())?;

        tracing::info!(
            instance = %self.layout.id(),
            command = %command.display(),
            timeout_secs = boot_timeout.as_secs(),
            "starting launcher"
        );

        let mut child = Command::new(&command.binary)
            .args(&command.args)
            .envs(instance_env(self.artifacts, self.layout))
            .current_dir(&self.artifacts.host_bins)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|e| {
                LaunchError::Internal(format!(
                    "failed to spawn {}: {}",
                    command.binary.display(),
                    e
                ))
            })?;

        match tokio::time::timeout(boot_timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                tracing::info!(instance = %self.layout.id(), "launcher daemonized");
                Ok(SupervisionVerdict::Success)
            }
            Ok(Ok(status)) => Ok(self.classify_nonzero_exit(status.code())),
            Ok(Err(e)) => Err(LaunchError::Internal(format!(
                "failed to wait on launcher: {}",
                e
            ))),
            Err(_) => self.handle_timeout(&mut child, boot_timeout).await,
        }
    }

    fn open_capture(&self, path: PathBuf) -> CvdResult<std::fs::File> {
        std::fs::File::create(&path).map_err(|e| {
            LaunchError::Storage(format!("failed to open {}: {}", path.display(), e))
        })
    }

    /// Classify a nonzero launcher exit by scanning its stderr for the
    /// transport-unsupported markers, attaching the last lines either way.
    ///
    /// The markers are searched in the whole capture, not just the tail:
    /// the launcher prints usage text after an unknown-flag diagnostic,
    /// which would otherwise push the marker out of the tail window.
    fn classify_nonzero_exit(&self, code: Option<i32>) -> SupervisionVerdict {
        let stderr_path = self.layout.stderr_path();
        let haystack = std::fs::read_to_string(&stderr_path)
            .unwrap_or_default()
            .to_lowercase();
        let tail = tail_lines(&stderr_path, defaults::STDERR_TAIL_LINES).unwrap_or_default();
        let tail_text = tail.join("\n");

        let (kind, guidance) = if haystack.contains(markers::WEBRTC_UNSUPPORTED) {
            (
                BootErrorKind::WebrtcUnsupported,
                "this build does not support WebRTC; retry with connect_vnc",
            )
        } else if haystack.contains(markers::VNC_UNSUPPORTED) {
            (
                BootErrorKind::VncUnsupported,
                "this build does not support VNC; retry with connect_webrtc",
            )
        } else {
            (BootErrorKind::LaunchNonZero, "launcher exited with an error")
        };

        let message = format!(
            "{} (exit code {:?}); last stderr lines:\n{}",
            guidance, code, tail_text
        );
        tracing::warn!(instance = %self.layout.id(), ?kind, "launch failed");
        SupervisionVerdict::Failure { kind, message }
    }

    async fn handle_timeout(
        &self,
        child: &mut tokio::process::Child,
        boot_timeout: Duration,
    ) -> CvdResult<SupervisionVerdict> {
        tracing::warn!(
            instance = %self.layout.id(),
            timeout_secs = boot_timeout.as_secs(),
            "boot deadline exceeded, attempting graceful stop"
        );

        let stopped = stop_instance(self.artifacts, self.layout).await;
        if !stopped {
            if let Err(e) = child.start_kill() {
                tracing::warn!(instance = %self.layout.id(), "failed to kill launcher: {}", e);
            }
        }

        // Brief cleanup wait; a child that still refuses to exit gets
        // reaped by the OS when we drop the handle (kill_on_drop is not
        // set, the daemonized children belong to stop_cvd anyway).
        let _ = tokio::time::timeout(
            Duration::from_secs(defaults::STOP_GRACE_SECS),
            child.wait(),
        )
        .await;

        Ok(SupervisionVerdict::Failure {
            kind: BootErrorKind::Timeout,
            message: format!(
                "device did not boot within {} seconds",
                boot_timeout.as_secs()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceId;
    use cvdlaunch_test_utils::FakeHostTree;
    use tempfile::TempDir;

    fn setup(host: &FakeHostTree) -> (TempDir, ArtifactPaths, InstanceLayout) {
        let base = TempDir::new().unwrap();
        let layout = InstanceLayout::new(base.path(), InstanceId::new(1).unwrap());
        layout.prepare().unwrap();
        let artifacts = ArtifactPaths {
            image_dir: host.image_dir(),
            host_bins: host.root(),
            host_artifacts: host.root(),
            misc_info: None,
            ota_tools_dir: None,
            system_image: None,
            boot_image: None,
            vendor_boot_image: None,
        };
        (base, artifacts, layout)
    }

    fn command(artifacts: &ArtifactPaths) -> LaunchCommand {
        LaunchCommand {
            binary: artifacts.host_bins.join("bin").join("launch_cvd"),
            args: vec!["-daemon".into()],
        }
    }

    #[tokio::test]
    async fn test_successful_exit() {
        let host = FakeHostTree::builder().launcher_exit_code(0).build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(verdict, SupervisionVerdict::Success);
    }

    #[tokio::test]
    async fn test_nonzero_exit_attaches_stderr_tail() {
        let host = FakeHostTree::builder()
            .launcher_exit_code(2)
            .launcher_stderr("something exploded")
            .build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::from_secs(10))
            .await
            .unwrap();
        match verdict {
            SupervisionVerdict::Failure { kind, message } => {
                assert_eq!(kind, BootErrorKind::LaunchNonZero);
                assert!(message.contains("something exploded"), "{message}");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_webrtc_marker_classification() {
        let host = FakeHostTree::builder()
            .launcher_exit_code(1)
            .launcher_stderr("ERROR: unknown command line flag 'start_webrtc'")
            .build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::from_secs(10))
            .await
            .unwrap();
        match verdict {
            SupervisionVerdict::Failure { kind, message } => {
                assert_eq!(kind, BootErrorKind::WebrtcUnsupported);
                assert!(message.contains("retry with connect_vnc"), "{message}");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_marker_buried_under_usage_text_still_classified() {
        // gflags prints the full usage listing after the unknown-flag
        // diagnostic, pushing the marker well past the attached tail.
        let usage: String = (0..30).map(|i| format!("  -some_flag_{} (doc)\n", i)).collect();
        let stderr = format!("unknown command line flag 'start_vnc_server'\n{}", usage);
        let host = FakeHostTree::builder()
            .launcher_exit_code(1)
            .launcher_stderr(&stderr)
            .build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            SupervisionVerdict::Failure {
                kind: BootErrorKind::VncUnsupported,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_timeout_path() {
        let host = FakeHostTree::builder().launcher_hang_secs(30).build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::from_secs(1))
            .await
            .unwrap();
        match verdict {
            SupervisionVerdict::Failure { kind, message } => {
                assert_eq!(kind, BootErrorKind::Timeout);
                assert!(message.contains("1 seconds"), "{message}");
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
        // The stop command was attempted before termination.
        assert!(host.stop_invoked());
    }

    #[tokio::test]
    async fn test_timeout_on_legacy_host_without_stop_command() {
        // No stop_cvd and no cvd: the failed stop falls through to a
        // direct kill and still yields a timeout verdict.
        let host = FakeHostTree::builder()
            .legacy_host()
            .launcher_hang_secs(30)
            .build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            SupervisionVerdict::Failure {
                kind: BootErrorKind::Timeout,
                ..
            }
        ));
        assert!(!host.stop_invoked());
    }

    #[tokio::test]
    async fn test_zero_timeout_is_immediate_timeout() {
        let host = FakeHostTree::builder().launcher_hang_secs(30).build();
        let (_base, artifacts, layout) = setup(&host);
        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command(&artifacts), Duration::ZERO)
            .await
            .unwrap();
        assert!(matches!(
            verdict,
            SupervisionVerdict::Failure {
                kind: BootErrorKind::Timeout,
                ..
            }
        ));
    }
}
