//! Error types shared across the launcher.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type CvdResult<T> = std::result::Result<T, LaunchError>;

/// Errors surfaced to callers of the launcher library.
///
/// Artifact and platform errors propagate as values of this enum.
/// Launch-phase errors (timeout, nonzero exit, failed post-boot status)
/// are *not* represented here: the orchestrator catches those and turns
/// them into a structured [`crate::launch::LaunchReport::BootFailure`]
/// so the caller gets logs and a classification rather than a bare error.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Host OS or virtualization support is missing. Fatal, no retry.
    #[error("platform unsupported: {0}")]
    PlatformUnsupported(String),

    /// No tool directory contains the CVD host binaries.
    #[error("CVD host package not found: {0}")]
    CvdHostPackageNotFound(String),

    /// The local image directory holds no usable `*.img` files.
    #[error("local image not found: {0}")]
    LocalImageNotFound(String),

    /// A user-supplied path failed validation.
    #[error("path check failed: {0}")]
    CheckPath(String),

    /// No free instance slot, or the requested slot is taken.
    #[error("instance busy: {0}")]
    InstanceBusy(String),

    /// The `AvdSpec` failed input validation.
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    /// The OTA packer failed to assemble the mixed super image.
    #[error("super image mixing failed: {0}")]
    Mix(String),

    /// Filesystem operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invariant violation inside the launcher itself.
    #[error("internal error: {0}")]
    Internal(String),
}
