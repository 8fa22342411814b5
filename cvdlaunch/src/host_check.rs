//! Host platform prerequisites.
//!
//! Local CVD launches need KVM, so the check fails fast with concrete
//! guidance before any filesystem or lock work happens.

use crate::errors::{CvdResult, LaunchError};

/// Result of a successful platform check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSupport {
    /// Human-readable confirmation of what was detected.
    pub reason: String,
}

/// Check that this host can run a local Cuttlefish device.
///
/// # Errors
///
/// Returns `LaunchError::PlatformUnsupported` with suggestions when the
/// platform is not Linux or `/dev/kvm` is missing or inaccessible.
pub fn check_host_support() -> CvdResult<HostSupport> {
    #[cfg(target_os = "linux")]
    {
        check_linux_kvm()
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(LaunchError::PlatformUnsupported(
            "local CVD launches require a Linux host with KVM".into(),
        ))
    }
}

#[cfg(target_os = "linux")]
fn check_linux_kvm() -> CvdResult<HostSupport> {
    use std::path::Path;

    const KVM_DEVICE: &str = "/dev/kvm";
    let kvm_path = Path::new(KVM_DEVICE);

    if !kvm_path.exists() {
        return Err(LaunchError::PlatformUnsupported(format!(
            "{} does not exist\n\n\
             Suggestions:\n\
             - Enable KVM in your BIOS/UEFI settings (VT-x for Intel, AMD-V for AMD)\n\
             - Check if kvm module is loaded: lsmod | grep kvm\n\
             - Try: sudo modprobe kvm_intel  # Intel\n\
                    sudo modprobe kvm_amd    # AMD",
            KVM_DEVICE
        )));
    }

    match std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(kvm_path)
    {
        Ok(_) => Ok(HostSupport {
            reason: "KVM is available and accessible".to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(LaunchError::PlatformUnsupported(format!(
                "{} exists but access denied (permissions)\n\n\
                 Suggestions:\n\
                 - Add your user to the kvm group: sudo usermod -aG kvm $USER\n\
                 - Log out and log back in for group changes to take effect\n\
                 - Check permissions: ls -l {}",
                KVM_DEVICE, KVM_DEVICE
            )))
        }
        Err(e) => Err(LaunchError::PlatformUnsupported(format!(
            "{} exists but couldn't be accessed: {}\n\n\
             Suggestions:\n\
             - Check if another VM process is locking the device\n\
             - Review system logs: dmesg | tail -50",
            KVM_DEVICE, e
        ))),
    }
}
