//! Input configuration for a local CVD launch.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::errors::{CvdResult, LaunchError};

/// Hardware property overrides passed through to the launcher.
///
/// `memory_mb` is a megabyte integer by definition; free-form memory
/// strings are rejected at the type level rather than guessed at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwProperty {
    /// Guest vCPU count (`-cpus`).
    pub cpu: u32,
    /// Guest memory in MB (`-memory_mb`).
    pub memory_mb: u32,
    /// Display width in pixels (`-x_res`).
    pub x_res: u32,
    /// Display height in pixels (`-y_res`).
    pub y_res: u32,
    /// Display density (`-dpi`).
    pub dpi: u32,
    /// Userdata disk size in MB. When present the launcher is told to
    /// always create a blank data image of this size.
    #[serde(default)]
    pub disk_mb: Option<u64>,
}

/// Description of the virtual device to launch.
///
/// This is the library-level analogue of a parsed command line; CLI and
/// config-file handling live outside this crate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AvdSpec {
    /// Requested instance slot. `None` auto-selects the first free slot.
    #[serde(default)]
    pub local_instance_id: Option<u32>,

    /// Root to search for `*.img` build outputs.
    pub local_image_dir: PathBuf,

    /// Replacement system image (file, or directory to scan).
    #[serde(default)]
    pub local_system_image: Option<PathBuf>,

    /// Replacement boot/kernel image (file, or directory to scan).
    #[serde(default)]
    pub local_kernel_image: Option<PathBuf>,

    /// Ordered search path for CVD host tools and OTA tools. The
    /// standard Android build environment variables are appended as
    /// fallbacks by [`crate::artifacts::tool_search_path`].
    #[serde(default)]
    pub local_tool_dirs: Vec<PathBuf>,

    /// Hardware property overrides; absent means launcher defaults.
    #[serde(default)]
    pub hw_property: Option<HwProperty>,

    /// Device config preset (e.g. `phone`). When unset, discovered from
    /// `android-info.txt` in the image dir, falling back to `phone`.
    #[serde(default)]
    pub flavor: Option<String>,

    /// Expose adb (`-run_adb_connector`); on by default.
    #[serde(default = "default_true")]
    pub connect_adb: bool,

    /// Start the VNC server.
    #[serde(default)]
    pub connect_vnc: bool,

    /// Start the WebRTC operator.
    #[serde(default)]
    pub connect_webrtc: bool,

    /// Enable the OpenWrt guest console device (`-console=true`).
    #[serde(default)]
    pub openwrt: bool,

    /// Install trusted WebRTC certs into the host-artifacts tree.
    #[serde(default)]
    pub mkcert: bool,

    /// Directory holding the cert material installed by `mkcert`.
    /// Defaults to `<user-config>/cvdlaunch/webrtc_certs`.
    #[serde(default)]
    pub webrtc_cert_source: Option<PathBuf>,

    /// Send an unlock gesture over adb once the device is up.
    #[serde(default)]
    pub unlock_screen: bool,

    /// Open the WebRTC page in the default browser once the device is up.
    #[serde(default)]
    pub launch_browser: bool,

    /// Launch supervision deadline in seconds. Zero means the timeout
    /// path is taken immediately.
    #[serde(default)]
    pub boot_timeout_secs: Option<u64>,

    /// Raw extra argument string appended verbatim to the launch
    /// command, tokenized shell-style.
    #[serde(default)]
    pub launch_args: Option<String>,

    /// Prefer the legacy `launch_cvd` binary over `cvd start`.
    #[serde(default)]
    pub use_launch_cvd: bool,

    /// Non-interactive stand-in for the "stop and recreate?" prompt:
    /// when the chosen slot already hosts a running device, `true`
    /// stops it and recreates, `false` leaves it alone and reports the
    /// running device.
    #[serde(default)]
    pub auto_reset: bool,
}

fn default_true() -> bool {
    true
}

impl AvdSpec {
    /// Spec for the common case: launch from a local image dir.
    pub fn new(local_image_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_image_dir: local_image_dir.into(),
            connect_adb: true,
            ..Self::default()
        }
    }

    /// Effective supervision deadline.
    pub fn boot_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.boot_timeout_secs.unwrap_or(defaults::BOOT_TIMEOUT_SECS),
        )
    }

    /// Validate the parts of the spec that are checkable without I/O.
    pub fn validate(&self) -> CvdResult<()> {
        if let Some(raw) = self.local_instance_id {
            // Range check happens in InstanceId::new; surface it here so
            // bad input fails before any filesystem work.
            crate::instance::InstanceId::new(raw)?;
        }
        if self.local_image_dir.as_os_str().is_empty() {
            return Err(LaunchError::InvalidSpec(
                "local_image_dir must be set".into(),
            ));
        }
        Ok(())
    }
}

/// Launcher-wide options, separate from the per-device [`AvdSpec`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LauncherOptions {
    /// Directory under which `cuttlefish-<id>` homes are created.
    /// Defaults to the user cache directory.
    pub base_dir: PathBuf,

    /// Directory holding the per-instance lock files.
    /// Defaults to `<base_dir>/locks`.
    pub lock_dir: PathBuf,

    /// Skip the KVM platform check. Set by [`Self::rooted_at`] so tests
    /// can drive launches against fake host trees.
    #[serde(default)]
    pub skip_host_check: bool,
}

impl Default for LauncherOptions {
    fn default() -> Self {
        let base_dir = dirs::cache_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".cache")
        });
        let lock_dir = base_dir.join(crate::constants::filenames::LOCKS_DIR);
        Self {
            base_dir,
            lock_dir,
            skip_host_check: false,
        }
    }
}

impl LauncherOptions {
    /// Options rooted at an explicit base directory (used by tests).
    /// The platform check is skipped so launches can be driven against
    /// fake host trees.
    pub fn rooted_at(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let lock_dir = base_dir.join(crate::constants::filenames::LOCKS_DIR);
        Self {
            base_dir,
            lock_dir,
            skip_host_check: true,
        }
    }
}
