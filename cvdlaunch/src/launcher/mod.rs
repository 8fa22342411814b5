//! The launch orchestrator.
//!
//! [`LocalLauncher::create`] drives one launch end to end: platform
//! check, artifact resolution, slot selection, optional super-image
//! mixing and cert installation, command construction, supervision,
//! and reporting. Launch-phase failures become structured
//! [`LaunchReport::BootFailure`] values; only pre-launch problems (bad
//! spec, missing artifacts, busy slots) surface as errors.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::artifacts::{
    discover_flavor, install_webrtc_certs, tool_search_path, ArtifactPaths, ArtifactResolver,
};
use crate::constants::{defaults, instance as instance_consts};
use crate::errors::{CvdResult, LaunchError};
use crate::host_check::check_host_support;
use crate::image::SuperImageMixer;
use crate::instance::{InstanceId, InstanceLayout, InstanceLock, LockGuard};
use crate::launch::{
    launch_browser, stop_instance, unlock_screen, DeviceInfo, LaunchCommandBuilder, LaunchReport,
    LaunchSupervisor, Reporter, SupervisionVerdict,
};
use crate::spec::{AvdSpec, LauncherOptions};

/// Cert material installed by `mkcert` defaults to this subdirectory of
/// the user config dir.
const DEFAULT_CERT_SOURCE_SUBDIR: &str = "cvdlaunch/webrtc_certs";

/// Launches and supervises local CVD instances.
pub struct LocalLauncher {
    options: LauncherOptions,
    locks: InstanceLock,
}

impl LocalLauncher {
    pub fn new(options: LauncherOptions) -> CvdResult<Self> {
        let locks = InstanceLock::new(&options.lock_dir)?;
        Ok(Self { options, locks })
    }

    /// Launch the device described by `spec`.
    ///
    /// On success the slot's in-use flag is set and the advisory lock
    /// released, so other launchers skip the slot while the device
    /// runs. On boot failure the slot is left free and a `BootFailure`
    /// report is returned rather than an error.
    pub async fn create(&self, spec: &AvdSpec) -> CvdResult<LaunchReport> {
        spec.validate()?;
        if !self.options.skip_host_check {
            let support = check_host_support()?;
            tracing::debug!(reason = %support.reason, "host check passed");
        }

        let resolver = ArtifactResolver::new(tool_search_path(&spec.local_tool_dirs));
        let artifacts = resolver.resolve(spec)?;

        let mut guard = match self.select_slot(spec, &artifacts).await? {
            SlotSelection::Fresh(guard) => guard,
            SlotSelection::AlreadyRunning(id) => {
                tracing::info!(instance = %id, "device already running, leaving it alone");
                return Ok(self.existing_device_report(id));
            }
        };
        let id = guard.id();
        let layout = InstanceLayout::new(&self.options.base_dir, id);
        layout.prepare()?;

        let mixed_super_image = self.mix_super_image(&artifacts, &layout)?;
        self.install_certs(spec, &artifacts)?;

        let flavor = spec
            .flavor
            .clone()
            .or_else(|| discover_flavor(&artifacts.image_dir))
            .unwrap_or_else(|| defaults::CONFIG_FLAVOR.to_string());

        let command = LaunchCommandBuilder::new(
            spec,
            &artifacts,
            &layout,
            &flavor,
            mixed_super_image,
        )
        .build()?;

        let verdict = LaunchSupervisor::new(&artifacts, &layout)
            .run(&command, spec.boot_timeout())
            .await?;

        let reporter = Reporter::new(&artifacts, &layout);
        let report = match verdict {
            SupervisionVerdict::Failure { kind, message } => reporter.boot_failure(kind, message),
            SupervisionVerdict::Success => {
                let report = reporter
                    .verify_and_report_success(self.update_data(spec, id))
                    .await?;
                if report.is_success() {
                    self.post_boot(spec, id).await;
                    guard.set_in_use(true)?;
                }
                report
            }
        };
        // The guard drops here; the advisory lock is released and only
        // the in-use bit (set on verified success) persists.
        Ok(report)
    }

    /// Pick and lock a slot per the spec, distinguishing a fresh slot
    /// from an explicitly requested slot that already hosts a device.
    async fn select_slot(
        &self,
        spec: &AvdSpec,
        artifacts: &ArtifactPaths,
    ) -> CvdResult<SlotSelection> {
        if let Some(raw) = spec.local_instance_id {
            let id = InstanceId::new(raw)?;
            let Some(mut guard) = self.locks.try_acquire(id)? else {
                return Err(LaunchError::InstanceBusy(format!(
                    "instance {} is locked by another launcher",
                    id
                )));
            };
            if guard.in_use()? {
                if !spec.auto_reset {
                    return Ok(SlotSelection::AlreadyRunning(id));
                }
                tracing::info!(instance = %id, "slot in use, resetting");
                self.reset_slot(artifacts, &mut guard).await?;
            }
            return Ok(SlotSelection::Fresh(guard));
        }

        for id in InstanceId::all() {
            if let Some(guard) = self.locks.acquire_if_not_in_use(id, Duration::ZERO)? {
                tracing::debug!(instance = %id, "auto-selected slot");
                return Ok(SlotSelection::Fresh(guard));
            }
        }
        Err(LaunchError::InstanceBusy(format!(
            "all {} instance slots are locked or in use; stop an instance or clear a stale \
             in-use flag under {}",
            instance_consts::MAX_INSTANCES,
            self.options.lock_dir.display()
        )))
    }

    /// Stop whatever occupies the slot and clear its in-use bit.
    async fn reset_slot(&self, artifacts: &ArtifactPaths, guard: &mut LockGuard) -> CvdResult<()> {
        let id = guard.id();
        let layout = InstanceLayout::new(&self.options.base_dir, id);
        let stopped = stop_instance(artifacts, &layout).await;
        if !stopped {
            tracing::warn!(instance = %id, "stop command did not report success");
        }
        guard.set_in_use(false)
    }

    /// Report a slot that already hosts a running device, untouched.
    fn existing_device_report(&self, id: InstanceId) -> LaunchReport {
        let layout = InstanceLayout::new(&self.options.base_dir, id);
        LaunchReport::Success(DeviceInfo {
            instance_name: id.instance_name(),
            host: "localhost".into(),
            adb_port: id.adb_port(),
            vnc_port: id.vnc_port(),
            webrtc_port: id.webrtc_port(),
            logs: vec![
                layout.launcher_log_path(),
                layout.kernel_log_path(),
                layout.logcat_path(),
            ],
            update_data: None,
        })
    }

    /// Assemble the mixed super image when the resolver staged all the
    /// mixing inputs.
    fn mix_super_image(
        &self,
        artifacts: &ArtifactPaths,
        layout: &InstanceLayout,
    ) -> CvdResult<Option<PathBuf>> {
        if !artifacts.mix_ready() {
            return Ok(None);
        }
        // mix_ready() guarantees all three are present.
        let (Some(system_image), Some(misc_info), Some(ota_tools_dir)) = (
            &artifacts.system_image,
            &artifacts.misc_info,
            &artifacts.ota_tools_dir,
        ) else {
            return Ok(None);
        };
        let output = layout.mixed_super_image_path();
        SuperImageMixer::new(&artifacts.image_dir, system_image, misc_info, ota_tools_dir)
            .mix(&output)?;
        Ok(Some(output))
    }

    /// Install trusted WebRTC certs when requested.
    ///
    /// An explicitly configured source that is missing is an error; the
    /// implicit default source is skipped with a warning when absent.
    fn install_certs(&self, spec: &AvdSpec, artifacts: &ArtifactPaths) -> CvdResult<()> {
        if !spec.mkcert {
            return Ok(());
        }
        let (source, explicit) = match &spec.webrtc_cert_source {
            Some(source) => (source.clone(), true),
            None => {
                let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("/etc"));
                (config_dir.join(DEFAULT_CERT_SOURCE_SUBDIR), false)
            }
        };
        if !source.is_dir() {
            if explicit {
                return Err(LaunchError::CheckPath(format!(
                    "webrtc cert source {} does not exist",
                    source.display()
                )));
            }
            tracing::warn!(
                source = %source.display(),
                "default webrtc cert source missing, skipping cert install"
            );
            return Ok(());
        }
        let installed = install_webrtc_certs(&source, &artifacts.host_artifacts)?;
        tracing::info!(installed, "installed webrtc certs");
        Ok(())
    }

    fn update_data(&self, spec: &AvdSpec, id: InstanceId) -> Option<HashMap<String, String>> {
        if !spec.connect_webrtc {
            return None;
        }
        let mut data = HashMap::new();
        data.insert(
            "webrtc_url".to_string(),
            format!("https://localhost:{}", id.webrtc_port()),
        );
        Some(data)
    }

    async fn post_boot(&self, spec: &AvdSpec, id: InstanceId) {
        if spec.unlock_screen {
            unlock_screen(id.adb_port()).await;
        }
        if spec.launch_browser {
            launch_browser(id.webrtc_port()).await;
        }
    }
}

enum SlotSelection {
    /// A locked slot ready for a new device.
    Fresh(LockGuard),
    /// The requested slot already hosts a running device and
    /// `auto_reset` is off.
    AlreadyRunning(InstanceId),
}
