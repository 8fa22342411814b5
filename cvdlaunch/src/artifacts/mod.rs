//! Artifact resolution: locating images and host tools on the local
//! filesystem.
//!
//! Turns an [`AvdSpec`](crate::spec::AvdSpec) into an [`ArtifactPaths`]
//! record by probing an ordered list of candidate directories. No
//! artifact is ever downloaded; everything must already be on disk.

mod certs;
mod resolver;

pub use certs::install_webrtc_certs;
pub use resolver::{discover_flavor, tool_search_path, ArtifactResolver};

use std::path::PathBuf;

/// The resolved on-disk locations of everything a launch needs.
///
/// Immutable once constructed. `host_bins` and `host_artifacts` are
/// separate fields because the executables and the webrtc assets may
/// come from different tarballs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Directory containing the build's `*.img` files.
    pub image_dir: PathBuf,

    /// Directory containing `bin/launch_cvd` (and `bin/cvd`).
    pub host_bins: PathBuf,

    /// Directory containing `usr/share/webrtc/certs/server.crt`.
    pub host_artifacts: PathBuf,

    /// Partition layout description for the OTA packer; present only
    /// when a replacement system image was requested.
    pub misc_info: Option<PathBuf>,

    /// OTA image-packing utilities; present only when mixing.
    pub ota_tools_dir: Option<PathBuf>,

    /// Replacement `system.img`.
    pub system_image: Option<PathBuf>,

    /// Replacement boot image.
    pub boot_image: Option<PathBuf>,

    /// Replacement vendor boot image.
    pub vendor_boot_image: Option<PathBuf>,
}

impl ArtifactPaths {
    /// Whether super-image mixing will happen for this launch.
    pub fn mix_ready(&self) -> bool {
        self.system_image.is_some() && self.misc_info.is_some() && self.ota_tools_dir.is_some()
    }
}
