//! Constants for the local CVD launcher.
//!
//! Centralized location for slot limits, port bases, well-known file
//! names, and the external binaries this crate drives.

/// Instance slot limits and port arithmetic bases.
pub mod instance {
    /// Number of pre-provisioned instance slots on a host.
    ///
    /// Matches the number of network interfaces the CVD host package
    /// sets up, so ids above this have no interface to bind to.
    pub const MAX_INSTANCES: u32 = 10;

    /// adb port of instance 1; instance N listens on `BASE + N - 1`.
    pub const BASE_ADB_PORT: u16 = 6520;

    /// VNC port of instance 1.
    pub const BASE_VNC_PORT: u16 = 6444;

    /// WebRTC operator port of instance 1.
    pub const BASE_WEBRTC_PORT: u16 = 8443;
}

/// Environment variables injected into the launcher subprocess.
///
/// These are the names the CVD tooling reads; the crate itself does not
/// require any of them in its own environment.
pub mod envs {
    pub const ANDROID_HOST_OUT: &str = "ANDROID_HOST_OUT";
    pub const ANDROID_SOONG_HOST_OUT: &str = "ANDROID_SOONG_HOST_OUT";
    pub const HOME: &str = "HOME";
    pub const CUTTLEFISH_INSTANCE: &str = "CUTTLEFISH_INSTANCE";
    pub const CUTTLEFISH_CONFIG_FILE: &str = "CUTTLEFISH_CONFIG_FILE";
}

/// External executables consumed from the host-binaries tree.
pub mod binaries {
    /// Modern launcher front-end (`cvd start`).
    pub const CVD: &str = "cvd";

    /// Legacy launcher binary.
    pub const LAUNCH_CVD: &str = "launch_cvd";

    /// Standalone status query; older host packages ship this instead
    /// of `cvd status`.
    pub const CVD_STATUS: &str = "cvd_status";

    /// Standalone stop command.
    pub const STOP_CVD: &str = "stop_cvd";

    /// OTA-tools super image packer.
    pub const BUILD_SUPER_IMAGE: &str = "build_super_image";

    /// Host adb, used for the post-boot unlock gesture.
    pub const ADB: &str = "adb";
}

/// Well-known file and directory names.
pub mod filenames {
    /// Per-instance home directory, formatted with the instance id.
    pub const HOME_DIR_PREFIX: &str = "cuttlefish-";

    /// Runtime directory under the instance home.
    pub const RUNTIME_DIR: &str = "cuttlefish_runtime";

    /// Instance config file under the instance home.
    pub const CONFIG_FILE: &str = "cuttlefish_config.json";

    /// Log directory under the instance home.
    pub const LOGS_DIR: &str = "logs";

    /// Child stdout capture file under the instance home.
    pub const STDOUT: &str = "stdout";

    /// Child stderr capture file under the instance home.
    pub const STDERR: &str = "stderr";

    /// Mixed super image produced when a replacement system image is used.
    pub const MIXED_SUPER_IMAGE: &str = "mixed_super.img";

    /// Launcher log inside the log directory.
    pub const LAUNCHER_LOG: &str = "launcher.log";

    /// Kernel log inside the log directory.
    pub const KERNEL_LOG: &str = "kernel.log";

    /// Logcat capture inside the log directory.
    pub const LOGCAT: &str = "logcat";

    /// Build metadata file carrying the `config=<flavor>` line.
    pub const ANDROID_INFO: &str = "android-info.txt";

    /// Partition layout description consumed by the OTA packer.
    pub const MISC_INFO: &str = "misc_info.txt";

    /// Target-files subdirectory that may hold images / misc info.
    pub const TARGET_FILES_IMAGES: &str = "IMAGES";
    pub const TARGET_FILES_META: &str = "META";

    /// Lock files live under `<base>/locks/`.
    pub const LOCKS_DIR: &str = "locks";
}

/// Relative paths inside the host-artifacts tree.
pub mod host_artifacts {
    /// WebRTC server certificate, the probe file for tree detection.
    pub const WEBRTC_CERTS_DIR: &str = "usr/share/webrtc/certs";
    pub const WEBRTC_SERVER_CRT: &str = "server.crt";
}

/// stderr markers used to classify launcher failures.
///
/// The launcher binaries reject transport flags they were built without
/// via a gflags-style "unknown flag" diagnostic; matching is done
/// case-insensitively on these fragments.
pub mod markers {
    pub const WEBRTC_UNSUPPORTED: &str = "unknown command line flag 'start_webrtc'";
    pub const VNC_UNSUPPORTED: &str = "unknown command line flag 'start_vnc_server'";
}

/// Defaults applied when the spec leaves a knob unset.
pub mod defaults {
    /// Launch supervision deadline in seconds.
    pub const BOOT_TIMEOUT_SECS: u64 = 450;

    /// Device config preset when neither the spec nor android-info.txt
    /// names one.
    pub const CONFIG_FLAVOR: &str = "phone";

    /// Number of trailing stderr lines attached to a launch failure.
    pub const STDERR_TAIL_LINES: usize = 10;

    /// How long a graceful stop gets before the child is killed.
    pub const STOP_GRACE_SECS: u64 = 5;
}
