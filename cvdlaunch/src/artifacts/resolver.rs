//! Filesystem search turning an `AvdSpec` into `ArtifactPaths`.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::constants::{binaries, envs, filenames, host_artifacts};
use crate::errors::{CvdResult, LaunchError};
use crate::spec::AvdSpec;

use super::ArtifactPaths;

/// Build the ordered tool search path: the spec's directories first,
/// then the standard Android build environment fallbacks.
///
/// The fallback list is constructed here, explicitly, rather than read
/// implicitly deeper in the resolver; callers can see and test exactly
/// what gets probed.
pub fn tool_search_path(spec_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = spec_dirs.to_vec();
    for var in [envs::ANDROID_HOST_OUT, envs::ANDROID_SOONG_HOST_OUT] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                dirs.push(PathBuf::from(value));
            }
        }
    }
    dirs
}

/// Parse `android-info.txt` in the image dir for a `config=<name>` line.
///
/// Treats a missing or unparsable file as "no override".
pub fn discover_flavor(image_dir: &Path) -> Option<String> {
    let info_path = image_dir.join(filenames::ANDROID_INFO);
    let contents = std::fs::read_to_string(&info_path).ok()?;
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "config" && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Resolves the five artifact roles against an ordered tool search path.
#[derive(Clone, Debug)]
pub struct ArtifactResolver {
    tool_dirs: Vec<PathBuf>,
}

impl ArtifactResolver {
    /// Create a resolver over an explicit, ordered tool directory list
    /// (typically produced by [`tool_search_path`]).
    pub fn new(tool_dirs: Vec<PathBuf>) -> Self {
        Self { tool_dirs }
    }

    /// Run the full resolution procedure for one spec.
    pub fn resolve(&self, spec: &AvdSpec) -> CvdResult<ArtifactPaths> {
        let host_bins = self.find_host_bins()?;
        let host_artifacts = self.find_host_artifacts()?;
        let image_dir = find_image_dir(&spec.local_image_dir)?;

        let system_image = match &spec.local_system_image {
            Some(path) => Some(resolve_image_input(path, "system.img")?),
            None => None,
        };

        // Misc info and OTA tools are only relevant when a replacement
        // system image was requested.
        let (misc_info, ota_tools_dir) = if system_image.is_some() {
            (
                Some(find_misc_info(&image_dir)?),
                Some(self.find_ota_tools()?),
            )
        } else {
            (None, None)
        };

        let (boot_image, vendor_boot_image) = match &spec.local_kernel_image {
            Some(path) => resolve_kernel_input(path)?,
            None => (None, None),
        };

        let paths = ArtifactPaths {
            image_dir,
            host_bins,
            host_artifacts,
            misc_info,
            ota_tools_dir,
            system_image,
            boot_image,
            vendor_boot_image,
        };
        tracing::debug!(?paths, "resolved artifacts");
        Ok(paths)
    }

    /// First tool dir containing `bin/launch_cvd`.
    fn find_host_bins(&self) -> CvdResult<PathBuf> {
        for dir in &self.tool_dirs {
            if dir.join("bin").join(binaries::LAUNCH_CVD).is_file() {
                return absolute(dir);
            }
        }
        Err(LaunchError::CvdHostPackageNotFound(format!(
            "no directory in {:?} contains bin/{}; build the cvd host package \
             (`m hosttar`) or pass its location via local_tool_dirs",
            self.tool_dirs,
            binaries::LAUNCH_CVD
        )))
    }

    /// First tool dir containing the webrtc certificate assets.
    fn find_host_artifacts(&self) -> CvdResult<PathBuf> {
        for dir in &self.tool_dirs {
            let probe = dir
                .join(host_artifacts::WEBRTC_CERTS_DIR)
                .join(host_artifacts::WEBRTC_SERVER_CRT);
            if probe.is_file() {
                return absolute(dir);
            }
        }
        Err(LaunchError::CvdHostPackageNotFound(format!(
            "no directory in {:?} contains {}/{}; the cvd host artifacts \
             (soong host output) are required for webrtc assets",
            self.tool_dirs,
            host_artifacts::WEBRTC_CERTS_DIR,
            host_artifacts::WEBRTC_SERVER_CRT
        )))
    }

    /// First tool dir shipping the OTA super-image packer.
    fn find_ota_tools(&self) -> CvdResult<PathBuf> {
        for dir in &self.tool_dirs {
            if dir.join(binaries::BUILD_SUPER_IMAGE).is_file()
                || dir.join("bin").join(binaries::BUILD_SUPER_IMAGE).is_file()
            {
                return absolute(dir);
            }
        }
        Err(LaunchError::CheckPath(format!(
            "no directory in {:?} contains the OTA tools ({}); they are \
             required to mix a replacement system image into a super image",
            self.tool_dirs,
            binaries::BUILD_SUPER_IMAGE
        )))
    }
}

/// Accept `dir` as the image dir if it directly contains `*.img`, else
/// its `IMAGES/` subdirectory if that does.
fn find_image_dir(dir: &Path) -> CvdResult<PathBuf> {
    if contains_images(dir) {
        return absolute(dir);
    }
    let images_subdir = dir.join(filenames::TARGET_FILES_IMAGES);
    if contains_images(&images_subdir) {
        return absolute(&images_subdir);
    }
    Err(LaunchError::LocalImageNotFound(format!(
        "neither {} nor its {}/ subdirectory contains *.img files; point \
         local_image_dir at a build output or an extracted image zip",
        dir.display(),
        filenames::TARGET_FILES_IMAGES
    )))
}

fn contains_images(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries
        .flatten()
        .any(|e| e.path().extension().map(|ext| ext == "img").unwrap_or(false))
}

/// `image_dir/misc_info.txt`, else `image_dir/META/misc_info.txt`.
fn find_misc_info(image_dir: &Path) -> CvdResult<PathBuf> {
    let direct = image_dir.join(filenames::MISC_INFO);
    if direct.is_file() {
        return absolute(&direct);
    }
    let meta = image_dir
        .join(filenames::TARGET_FILES_META)
        .join(filenames::MISC_INFO);
    if meta.is_file() {
        return absolute(&meta);
    }
    Err(LaunchError::CheckPath(format!(
        "{} not found in {} or its {}/ subdirectory; it is required to \
         mix a replacement system image",
        filenames::MISC_INFO,
        image_dir.display(),
        filenames::TARGET_FILES_META
    )))
}

/// Resolve a file-or-directory image input to a concrete file.
///
/// A file is accepted as-is; a directory is scanned for `wanted`.
fn resolve_image_input(path: &Path, wanted: &str) -> CvdResult<PathBuf> {
    if path.is_file() {
        return absolute(path);
    }
    if path.is_dir() {
        for entry in WalkDir::new(path).max_depth(2).into_iter().flatten() {
            if entry.file_type().is_file() && entry.file_name() == wanted {
                return absolute(entry.path());
            }
        }
        return Err(LaunchError::CheckPath(format!(
            "no {} found under {}",
            wanted,
            path.display()
        )));
    }
    Err(LaunchError::CheckPath(format!(
        "{} does not exist",
        path.display()
    )))
}

/// Resolve the kernel image input to `(boot_image, vendor_boot_image)`.
///
/// A file whose name starts with `vendor_boot` is treated as the vendor
/// boot image; any other file is the boot image. A directory is scanned
/// for both `boot.img` and `vendor_boot.img`.
fn resolve_kernel_input(path: &Path) -> CvdResult<(Option<PathBuf>, Option<PathBuf>)> {
    if path.is_file() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return if name.starts_with("vendor_boot") {
            Ok((None, Some(absolute(path)?)))
        } else {
            Ok((Some(absolute(path)?), None))
        };
    }
    if path.is_dir() {
        let boot = path.join("boot.img");
        let vendor_boot = path.join("vendor_boot.img");
        let boot = boot.is_file().then(|| absolute(&boot)).transpose()?;
        let vendor_boot = vendor_boot
            .is_file()
            .then(|| absolute(&vendor_boot))
            .transpose()?;
        if boot.is_none() && vendor_boot.is_none() {
            return Err(LaunchError::CheckPath(format!(
                "no boot.img or vendor_boot.img under {}",
                path.display()
            )));
        }
        return Ok((boot, vendor_boot));
    }
    Err(LaunchError::CheckPath(format!(
        "{} does not exist",
        path.display()
    )))
}

/// Normalize to an absolute path without requiring every component to
/// be canonicalizable (image trees may contain symlinks on purpose).
fn absolute(path: &Path) -> CvdResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| {
        LaunchError::Storage(format!("failed to read current dir: {}", e))
    })?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn fake_host_tree(root: &Path) {
        touch(&root.join("bin/launch_cvd"));
        touch(&root.join("bin/cvd"));
        touch(&root.join("usr/share/webrtc/certs/server.crt"));
    }

    #[test]
    fn test_resolve_minimal_spec() {
        let tmp = TempDir::new().unwrap();
        let host = tmp.path().join("host");
        let out = tmp.path().join("out");
        fake_host_tree(&host);
        touch(&out.join("system.img"));
        touch(&out.join("super.img"));

        let mut spec = AvdSpec::new(&out);
        spec.local_tool_dirs = vec![host.clone()];

        let resolver = ArtifactResolver::new(spec.local_tool_dirs.clone());
        let paths = resolver.resolve(&spec).unwrap();
        assert_eq!(paths.host_bins, host);
        assert_eq!(paths.host_artifacts, host);
        assert_eq!(paths.image_dir, out);
        assert!(!paths.mix_ready());
        assert!(paths.misc_info.is_none());
    }

    #[test]
    fn test_missing_host_bins_is_actionable() {
        let tmp = TempDir::new().unwrap();
        let resolver = ArtifactResolver::new(vec![tmp.path().to_path_buf()]);
        let spec = AvdSpec::new(tmp.path());
        let err = resolver.resolve(&spec).unwrap_err();
        match err {
            LaunchError::CvdHostPackageNotFound(msg) => {
                assert!(msg.contains("launch_cvd"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_image_dir_falls_back_to_images_subdir() {
        let tmp = TempDir::new().unwrap();
        let host = tmp.path().join("host");
        let out = tmp.path().join("target_files");
        fake_host_tree(&host);
        touch(&out.join("IMAGES/system.img"));

        let mut spec = AvdSpec::new(&out);
        spec.local_tool_dirs = vec![host];

        let resolver = ArtifactResolver::new(spec.local_tool_dirs.clone());
        let paths = resolver.resolve(&spec).unwrap();
        assert_eq!(paths.image_dir, out.join("IMAGES"));
    }

    #[test]
    fn test_no_images_anywhere_fails() {
        let tmp = TempDir::new().unwrap();
        let host = tmp.path().join("host");
        fake_host_tree(&host);
        let empty = tmp.path().join("empty");
        fs::create_dir_all(&empty).unwrap();

        let mut spec = AvdSpec::new(&empty);
        spec.local_tool_dirs = vec![host];

        let resolver = ArtifactResolver::new(spec.local_tool_dirs.clone());
        assert!(matches!(
            resolver.resolve(&spec),
            Err(LaunchError::LocalImageNotFound(_))
        ));
    }

    #[test]
    fn test_system_image_requires_misc_info_and_ota_tools() {
        let tmp = TempDir::new().unwrap();
        let host = tmp.path().join("host");
        let out = tmp.path().join("out");
        fake_host_tree(&host);
        touch(&out.join("system.img"));
        let custom = tmp.path().join("custom/system.img");
        touch(&custom);

        let mut spec = AvdSpec::new(&out);
        spec.local_tool_dirs = vec![host.clone()];
        spec.local_system_image = Some(custom.clone());

        // Without misc_info the resolution fails.
        let resolver = ArtifactResolver::new(spec.local_tool_dirs.clone());
        assert!(matches!(
            resolver.resolve(&spec),
            Err(LaunchError::CheckPath(_))
        ));

        // With META/misc_info.txt and OTA tools it succeeds and is mix-ready.
        touch(&out.join("META/misc_info.txt"));
        touch(&host.join("build_super_image"));
        let paths = resolver.resolve(&spec).unwrap();
        assert!(paths.mix_ready());
        assert_eq!(paths.system_image.as_deref(), Some(custom.as_path()));
        assert_eq!(
            paths.misc_info.as_deref(),
            Some(out.join("META/misc_info.txt").as_path())
        );
    }

    #[test]
    fn test_system_image_dir_is_scanned() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sys");
        touch(&dir.join("system.img"));
        let found = resolve_image_input(&dir, "system.img").unwrap();
        assert_eq!(found, dir.join("system.img"));
    }

    #[test]
    fn test_kernel_file_classification() {
        let tmp = TempDir::new().unwrap();
        let boot = tmp.path().join("boot.img");
        let vendor = tmp.path().join("vendor_boot-debug.img");
        touch(&boot);
        touch(&vendor);

        let (b, v) = resolve_kernel_input(&boot).unwrap();
        assert!(b.is_some() && v.is_none());

        let (b, v) = resolve_kernel_input(&vendor).unwrap();
        assert!(b.is_none() && v.is_some());
    }

    #[test]
    fn test_kernel_dir_scan() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("boot.img"));
        touch(&tmp.path().join("vendor_boot.img"));
        let (b, v) = resolve_kernel_input(tmp.path()).unwrap();
        assert!(b.is_some() && v.is_some());
    }

    #[test]
    fn test_discover_flavor() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("android-info.txt"),
            "require board=vsoc_x86_64\nconfig=tablet\n",
        )
        .unwrap();
        assert_eq!(discover_flavor(tmp.path()).as_deref(), Some("tablet"));
    }

    #[test]
    fn test_discover_flavor_absent_or_garbled() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(discover_flavor(tmp.path()), None);
        fs::write(tmp.path().join("android-info.txt"), "no equals here\n").unwrap();
        assert_eq!(discover_flavor(tmp.path()), None);
    }

    #[test]
    fn test_tool_search_path_appends_env_fallbacks() {
        // Env mutation is process-global; keep the assertion tolerant of
        // parallel tests by only checking ordering of explicit entries.
        let explicit = vec![PathBuf::from("/a"), PathBuf::from("/b")];
        let dirs = tool_search_path(&explicit);
        assert_eq!(&dirs[..2], &explicit[..]);
    }
}
