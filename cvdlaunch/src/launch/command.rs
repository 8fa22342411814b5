//! Launch command construction.
//!
//! Assembles the exact argument vector for the CVD launcher binary. The
//! builder is pure: identical inputs yield byte-identical argv, and no
//! filesystem state is consulted.

use std::path::PathBuf;

use crate::artifacts::ArtifactPaths;
use crate::constants::binaries;
use crate::errors::{CvdResult, LaunchError};
use crate::instance::InstanceLayout;
use crate::spec::AvdSpec;

/// A fully assembled launcher invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Executable to run (`bin/cvd` or `bin/launch_cvd` under host bins).
    pub binary: PathBuf,
    /// Arguments, in order. For `cvd` the first argument is `start`.
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// One-line rendering for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.binary.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Builds the `cvd start` / `launch_cvd` argument vector.
///
/// The two launcher binaries accept overlapping flag sets; everything
/// emitted here is understood by both, so binary selection only changes
/// the executable (and the `start` subcommand).
#[derive(Clone, Debug)]
pub struct LaunchCommandBuilder<'a> {
    spec: &'a AvdSpec,
    artifacts: &'a ArtifactPaths,
    layout: &'a InstanceLayout,
    config_flavor: &'a str,
    mixed_super_image: Option<PathBuf>,
}

impl<'a> LaunchCommandBuilder<'a> {
    pub fn new(
        spec: &'a AvdSpec,
        artifacts: &'a ArtifactPaths,
        layout: &'a InstanceLayout,
        config_flavor: &'a str,
        mixed_super_image: Option<PathBuf>,
    ) -> Self {
        Self {
            spec,
            artifacts,
            layout,
            config_flavor,
            mixed_super_image,
        }
    }

    /// Assemble the argument vector.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpec` when the raw `launch_args` string cannot be
    /// tokenized.
    pub fn build(&self) -> CvdResult<LaunchCommand> {
        let bin_dir = self.artifacts.host_bins.join("bin");
        let (binary, mut args) = if self.spec.use_launch_cvd {
            (bin_dir.join(binaries::LAUNCH_CVD), Vec::new())
        } else {
            (bin_dir.join(binaries::CVD), vec!["start".to_string()])
        };

        // Always present.
        args.push("-daemon".into());
        args.push(format!("-config={}", self.config_flavor));
        args.push(format!(
            "-system_image_dir={}",
            self.artifacts.image_dir.display()
        ));
        args.push(format!(
            "-instance_dir={}",
            self.layout.runtime_dir().display()
        ));
        args.push("-undefok=report_anonymous_usage_stats,config".into());
        args.push("-report_anonymous_usage_stats=n".into());

        // Hardware block.
        if let Some(hw) = &self.spec.hw_property {
            args.push(format!("-cpus={}", hw.cpu));
            args.push(format!("-x_res={}", hw.x_res));
            args.push(format!("-y_res={}", hw.y_res));
            args.push(format!("-dpi={}", hw.dpi));
            args.push(format!("-memory_mb={}", hw.memory_mb));
            if let Some(disk_mb) = hw.disk_mb {
                args.push("-data_policy=always_create".into());
                args.push(format!("-blank_data_image_mb={}", disk_mb));
            }
        }

        // Transport flags.
        if !self.spec.connect_adb {
            args.push("-run_adb_connector=false".into());
        }
        if self.spec.connect_webrtc {
            args.push("-start_webrtc=true".into());
        }
        if self.spec.connect_vnc {
            args.push("-start_vnc_server=true".into());
        }

        // Image overrides.
        if let Some(mixed) = &self.mixed_super_image {
            args.push(format!("-super_image={}", mixed.display()));
        }
        if let Some(boot) = &self.artifacts.boot_image {
            args.push(format!("-boot_image={}", boot.display()));
        }
        if let Some(vendor_boot) = &self.artifacts.vendor_boot_image {
            args.push(format!("-vendor_boot_image={}", vendor_boot.display()));
        }

        if self.spec.openwrt {
            args.push("-console=true".into());
        }

        // Raw extra args come last so they can override anything above.
        if let Some(raw) = &self.spec.launch_args {
            let extra = shell_words::split(raw).map_err(|e| {
                LaunchError::InvalidSpec(format!("failed to tokenize launch_args {:?}: {}", raw, e))
            })?;
            args.extend(extra);
        }

        Ok(LaunchCommand { binary, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceId;
    use crate::spec::HwProperty;
    use std::path::Path;

    fn artifacts() -> ArtifactPaths {
        ArtifactPaths {
            image_dir: "/data/out".into(),
            host_bins: "/data/host".into(),
            host_artifacts: "/data/host".into(),
            misc_info: None,
            ota_tools_dir: None,
            system_image: None,
            boot_image: None,
            vendor_boot_image: None,
        }
    }

    fn layout() -> InstanceLayout {
        InstanceLayout::new(Path::new("/base"), InstanceId::new(1).unwrap())
    }

    #[test]
    fn test_default_binary_is_cvd_start() {
        let spec = AvdSpec::new("/data/out");
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        assert_eq!(cmd.binary, PathBuf::from("/data/host/bin/cvd"));
        assert_eq!(cmd.args[0], "start");
    }

    #[test]
    fn test_legacy_binary_selection() {
        let mut spec = AvdSpec::new("/data/out");
        spec.use_launch_cvd = true;
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        assert_eq!(cmd.binary, PathBuf::from("/data/host/bin/launch_cvd"));
        assert_eq!(cmd.args[0], "-daemon");
    }

    #[test]
    fn test_always_present_flags() {
        let mut spec = AvdSpec::new("/data/out");
        spec.connect_webrtc = true;
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        for expected in [
            "-daemon",
            "-config=phone",
            "-system_image_dir=/data/out",
            "-instance_dir=/base/cuttlefish-1/cuttlefish_runtime",
            "-start_webrtc=true",
        ] {
            assert!(
                cmd.args.iter().any(|a| a == expected),
                "missing {expected} in {:?}",
                cmd.args
            );
        }
    }

    #[test]
    fn test_hw_block_with_disk() {
        let mut spec = AvdSpec::new("/data/out");
        spec.hw_property = Some(HwProperty {
            cpu: 4,
            memory_mb: 4096,
            x_res: 1080,
            y_res: 1920,
            dpi: 480,
            disk_mb: Some(10240),
        });
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        for expected in [
            "-cpus=4",
            "-x_res=1080",
            "-y_res=1920",
            "-dpi=480",
            "-memory_mb=4096",
            "-data_policy=always_create",
            "-blank_data_image_mb=10240",
        ] {
            assert!(cmd.args.iter().any(|a| a == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_hw_block_without_disk_has_no_blank_image_flag() {
        let mut spec = AvdSpec::new("/data/out");
        spec.hw_property = Some(HwProperty {
            cpu: 2,
            memory_mb: 2048,
            x_res: 720,
            y_res: 1280,
            dpi: 320,
            disk_mb: None,
        });
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        assert!(!cmd
            .args
            .iter()
            .any(|a| a.starts_with("-blank_data_image_mb")));
        assert!(!cmd.args.iter().any(|a| a.starts_with("-data_policy")));
    }

    #[test]
    fn test_adb_disabled_emits_connector_off() {
        let mut spec = AvdSpec::new("/data/out");
        spec.connect_adb = false;
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        assert!(cmd.args.iter().any(|a| a == "-run_adb_connector=false"));
    }

    #[test]
    fn test_image_overrides() {
        let spec = AvdSpec::new("/data/out");
        let mut artifacts = artifacts();
        artifacts.boot_image = Some("/custom/boot.img".into());
        artifacts.vendor_boot_image = Some("/custom/vendor_boot.img".into());
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(
            &spec,
            &artifacts,
            &layout,
            "phone",
            Some("/base/cuttlefish-1/mixed_super.img".into()),
        )
        .build()
        .unwrap();
        for expected in [
            "-super_image=/base/cuttlefish-1/mixed_super.img",
            "-boot_image=/custom/boot.img",
            "-vendor_boot_image=/custom/vendor_boot.img",
        ] {
            assert!(cmd.args.iter().any(|a| a == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_launch_args_appended_last() {
        let mut spec = AvdSpec::new("/data/out");
        spec.openwrt = true;
        spec.launch_args = Some("-guest_enforce_security=false -extra 'a b'".into());
        let artifacts = artifacts();
        let layout = layout();
        let cmd = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        let n = cmd.args.len();
        assert_eq!(cmd.args[n - 3], "-guest_enforce_security=false");
        assert_eq!(cmd.args[n - 2], "-extra");
        assert_eq!(cmd.args[n - 1], "a b");
        assert!(cmd.args.iter().any(|a| a == "-console=true"));
    }

    #[test]
    fn test_unbalanced_quote_in_launch_args_fails() {
        let mut spec = AvdSpec::new("/data/out");
        spec.launch_args = Some("-flag='unterminated".into());
        let artifacts = artifacts();
        let layout = layout();
        assert!(
            LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_builder_is_deterministic() {
        let mut spec = AvdSpec::new("/data/out");
        spec.connect_webrtc = true;
        spec.launch_args = Some("-a -b".into());
        let artifacts = artifacts();
        let layout = layout();
        let one = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        let two = LaunchCommandBuilder::new(&spec, &artifacts, &layout, "phone", None)
            .build()
            .unwrap();
        assert_eq!(one, two);
    }
}
