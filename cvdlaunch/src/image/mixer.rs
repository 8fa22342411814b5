//! Super image assembly.
//!
//! When a replacement system image is requested, the build's dynamic
//! partitions and that system image are packed into a single super
//! image by the OTA tools. The packer itself is opaque to this crate:
//! we prepare its misc-info input and invoke it as a subprocess.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::constants::binaries;
use crate::errors::{CvdResult, LaunchError};

/// Misc-info key listing the partitions carried by the super image.
const DYNAMIC_PARTITION_LIST: &str = "dynamic_partition_list";

/// Assembles a mixed super image in the instance home directory.
#[derive(Clone, Debug)]
pub struct SuperImageMixer {
    image_dir: PathBuf,
    system_image: PathBuf,
    misc_info: PathBuf,
    ota_tools_dir: PathBuf,
}

impl SuperImageMixer {
    pub fn new(
        image_dir: &Path,
        system_image: &Path,
        misc_info: &Path,
        ota_tools_dir: &Path,
    ) -> Self {
        Self {
            image_dir: image_dir.to_path_buf(),
            system_image: system_image.to_path_buf(),
            misc_info: misc_info.to_path_buf(),
            ota_tools_dir: ota_tools_dir.to_path_buf(),
        }
    }

    /// Produce the mixed super image at `output_path`.
    ///
    /// For each partition the build uses, the replacement system image
    /// is picked for `system` and the build's own image for everything
    /// else. The staged misc-info (with per-partition image paths
    /// appended) is written next to the output so the run is
    /// reproducible from the instance home alone.
    pub fn mix(&self, output_path: &Path) -> CvdResult<()> {
        let partitions = self.partition_images()?;
        let staged_misc_info = self.stage_misc_info(output_path, &partitions)?;

        let packer = self.packer_path()?;
        tracing::info!(
            packer = %packer.display(),
            output = %output_path.display(),
            "packing mixed super image"
        );

        let output = Command::new(&packer)
            .arg(&staged_misc_info)
            .arg(output_path)
            .current_dir(&self.ota_tools_dir)
            .output()
            .map_err(|e| {
                LaunchError::Mix(format!("failed to run {}: {}", packer.display(), e))
            })?;

        if !output.status.success() {
            return Err(LaunchError::Mix(format!(
                "{} exited with {}: {}",
                packer.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if !output_path.is_file() {
            return Err(LaunchError::Mix(format!(
                "{} reported success but {} was not created",
                packer.display(),
                output_path.display()
            )));
        }

        tracing::info!(output = %output_path.display(), "mixed super image ready");
        Ok(())
    }

    /// Map each dynamic partition to the image file that should back it.
    fn partition_images(&self) -> CvdResult<BTreeMap<String, PathBuf>> {
        let misc_info = std::fs::read_to_string(&self.misc_info).map_err(|e| {
            LaunchError::Mix(format!(
                "failed to read {}: {}",
                self.misc_info.display(),
                e
            ))
        })?;

        let partition_list = misc_info
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once('=')?;
                (key.trim() == DYNAMIC_PARTITION_LIST).then(|| value.trim().to_string())
            })
            .ok_or_else(|| {
                LaunchError::Mix(format!(
                    "{} has no {} entry",
                    self.misc_info.display(),
                    DYNAMIC_PARTITION_LIST
                ))
            })?;

        let mut images = BTreeMap::new();
        for partition in partition_list.split_whitespace() {
            let image = if partition == "system" {
                self.system_image.clone()
            } else {
                self.image_dir.join(format!("{}.img", partition))
            };
            if !image.is_file() {
                return Err(LaunchError::Mix(format!(
                    "partition '{}' needs {}, which does not exist",
                    partition,
                    image.display()
                )));
            }
            images.insert(partition.to_string(), image);
        }
        Ok(images)
    }

    /// Write the packer's misc-info input: the original contents with
    /// one `<partition>_image=<path>` line appended per partition.
    fn stage_misc_info(
        &self,
        output_path: &Path,
        partitions: &BTreeMap<String, PathBuf>,
    ) -> CvdResult<PathBuf> {
        let home = output_path.parent().ok_or_else(|| {
            LaunchError::Internal(format!(
                "super image output {} has no parent directory",
                output_path.display()
            ))
        })?;

        let mut contents = std::fs::read_to_string(&self.misc_info).map_err(|e| {
            LaunchError::Mix(format!(
                "failed to read {}: {}",
                self.misc_info.display(),
                e
            ))
        })?;
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        for (partition, image) in partitions {
            contents.push_str(&format!("{}_image={}\n", partition, image.display()));
        }

        let staged = home.join("mixed_super_misc_info.txt");
        std::fs::write(&staged, contents).map_err(|e| {
            LaunchError::Storage(format!("failed to write {}: {}", staged.display(), e))
        })?;
        Ok(staged)
    }

    /// The packer executable, at the OTA tool dir root or under `bin/`.
    fn packer_path(&self) -> CvdResult<PathBuf> {
        let direct = self.ota_tools_dir.join(binaries::BUILD_SUPER_IMAGE);
        if direct.is_file() {
            return Ok(direct);
        }
        let under_bin = self
            .ota_tools_dir
            .join("bin")
            .join(binaries::BUILD_SUPER_IMAGE);
        if under_bin.is_file() {
            return Ok(under_bin);
        }
        Err(LaunchError::Mix(format!(
            "{} not found in {} (or its bin/)",
            binaries::BUILD_SUPER_IMAGE,
            self.ota_tools_dir.display()
        )))
    }
}
