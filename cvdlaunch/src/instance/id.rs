//! Instance id newtype and the port arithmetic derived from it.

use serde::{Deserialize, Serialize};

use crate::constants::instance::{
    BASE_ADB_PORT, BASE_VNC_PORT, BASE_WEBRTC_PORT, MAX_INSTANCES,
};
use crate::errors::{CvdResult, LaunchError};

/// A local instance slot number in `1..=MAX_INSTANCES`.
///
/// The id deterministically names the instance's home directory, its
/// network interface binding, and the trio of TCP ports the device
/// exposes. Ports are pre-reserved by arithmetic; there is no dynamic
/// allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u32);

impl InstanceId {
    /// Validate and wrap a raw id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpec` for ids outside `1..=MAX_INSTANCES`.
    pub fn new(id: u32) -> CvdResult<Self> {
        if id == 0 || id > MAX_INSTANCES {
            return Err(LaunchError::InvalidSpec(format!(
                "instance id must be in 1..={}, got {}",
                MAX_INSTANCES, id
            )));
        }
        Ok(Self(id))
    }

    /// The raw integer value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Display name used in lock files and reports: `local-instance-<id>`.
    pub fn instance_name(self) -> String {
        format!("local-instance-{}", self.0)
    }

    /// adb port: `6520 + id - 1`.
    pub fn adb_port(self) -> u16 {
        BASE_ADB_PORT + (self.0 as u16) - 1
    }

    /// VNC port: `6444 + id - 1`.
    pub fn vnc_port(self) -> u16 {
        BASE_VNC_PORT + (self.0 as u16) - 1
    }

    /// WebRTC operator port: `8443 + id - 1`.
    pub fn webrtc_port(self) -> u16 {
        BASE_WEBRTC_PORT + (self.0 as u16) - 1
    }

    /// Iterate every valid id in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=MAX_INSTANCES).map(Self)
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
