//! Test fixtures for the cvdlaunch crates.
//!
//! [`FakeHostTree`] builds a throwaway CVD host-package directory whose
//! binaries are small shell scripts with scripted behavior, so launch
//! supervision and orchestration can be exercised without real
//! Cuttlefish tooling or KVM.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A fake CVD host package plus image directory, rooted in a temp dir.
///
/// Layout:
///
/// ```text
/// <root>/
/// ├── bin/
/// │   ├── launch_cvd         # scripted: stderr, hang, exit code
/// │   ├── cvd                # dispatches start/stop/status
/// │   ├── cvd_status         # scripted exit code
/// │   ├── stop_cvd           # touches the stop marker
/// │   └── build_super_image  # optional, copies misc-info to output
/// ├── usr/share/webrtc/certs/server.crt
/// ├── launcher_stderr.txt    # text the fake launcher emits on stderr
/// └── image/                 # *.img files, optional misc_info.txt
/// ```
pub struct FakeHostTree {
    dir: TempDir,
}

impl FakeHostTree {
    pub fn builder() -> FakeHostTreeBuilder {
        FakeHostTreeBuilder::default()
    }

    /// Root of the fake host package (contains `bin/`).
    pub fn root(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Directory holding the fake `*.img` build outputs.
    pub fn image_dir(&self) -> PathBuf {
        self.dir.path().join("image")
    }

    /// Whether `stop_cvd` (or `cvd stop`) was invoked.
    pub fn stop_invoked(&self) -> bool {
        self.dir.path().join("stop_invoked").exists()
    }
}

/// Configures the scripted behavior of the fake binaries.
pub struct FakeHostTreeBuilder {
    launcher_exit_code: i32,
    launcher_stderr: String,
    launcher_hang_secs: u64,
    status_exit_code: i32,
    with_ota_tools: bool,
    legacy_host: bool,
    misc_info: Option<String>,
    android_info: Option<String>,
}

impl Default for FakeHostTreeBuilder {
    fn default() -> Self {
        Self {
            launcher_exit_code: 0,
            launcher_stderr: String::new(),
            launcher_hang_secs: 0,
            status_exit_code: 0,
            with_ota_tools: false,
            legacy_host: false,
            misc_info: None,
            android_info: None,
        }
    }
}

impl FakeHostTreeBuilder {
    /// Exit code of the fake launcher.
    pub fn launcher_exit_code(mut self, code: i32) -> Self {
        self.launcher_exit_code = code;
        self
    }

    /// Text the fake launcher writes to stderr before exiting.
    pub fn launcher_stderr(mut self, text: &str) -> Self {
        self.launcher_stderr = text.to_string();
        self
    }

    /// Seconds the fake launcher sleeps before exiting, for timeout tests.
    pub fn launcher_hang_secs(mut self, secs: u64) -> Self {
        self.launcher_hang_secs = secs;
        self
    }

    /// Exit code of the fake status query (`cvd_status` / `cvd status`).
    pub fn status_exit_code(mut self, code: i32) -> Self {
        self.status_exit_code = code;
        self
    }

    /// Ship only `bin/launch_cvd`, like an old host package that
    /// predates `cvd`, `cvd_status`, and `stop_cvd`.
    pub fn legacy_host(mut self) -> Self {
        self.legacy_host = true;
        self
    }

    /// Ship a fake `build_super_image` that copies its misc-info input
    /// to the output path.
    pub fn with_ota_tools(mut self) -> Self {
        self.with_ota_tools = true;
        self
    }

    /// Write `misc_info.txt` with these contents into the image dir.
    pub fn misc_info(mut self, contents: &str) -> Self {
        self.misc_info = Some(contents.to_string());
        self
    }

    /// Write `android-info.txt` with these contents into the image dir.
    pub fn android_info(mut self, contents: &str) -> Self {
        self.android_info = Some(contents.to_string());
        self
    }

    pub fn build(self) -> FakeHostTree {
        let dir = TempDir::new().expect("create fake host tree");
        let root = dir.path();
        let bin = root.join("bin");
        fs::create_dir_all(&bin).unwrap();

        fs::write(root.join("launcher_stderr.txt"), &self.launcher_stderr).unwrap();

        // The launcher script replays its scripted stderr from a side
        // file so arbitrary quoting in the text is harmless.
        let launcher = format!(
            "#!/bin/sh\n\
             root=\"$(cd \"$(dirname \"$0\")/..\" && pwd)\"\n\
             cat \"$root/launcher_stderr.txt\" >&2\n\
             sleep {}\n\
             exit {}\n",
            self.launcher_hang_secs, self.launcher_exit_code
        );
        write_script(&bin.join("launch_cvd"), &launcher);

        if !self.legacy_host {
            let cvd = format!(
                "#!/bin/sh\n\
                 root=\"$(cd \"$(dirname \"$0\")/..\" && pwd)\"\n\
                 case \"$1\" in\n\
                   stop) touch \"$root/stop_invoked\"; exit 0 ;;\n\
                   status) exit {} ;;\n\
                   start) shift; exec \"$root/bin/launch_cvd\" \"$@\" ;;\n\
                   *) exit 64 ;;\n\
                 esac\n",
                self.status_exit_code
            );
            write_script(&bin.join("cvd"), &cvd);

            write_script(
                &bin.join("cvd_status"),
                &format!("#!/bin/sh\nexit {}\n", self.status_exit_code),
            );
            write_script(
                &bin.join("stop_cvd"),
                "#!/bin/sh\ntouch \"$(cd \"$(dirname \"$0\")/..\" && pwd)/stop_invoked\"\nexit 0\n",
            );
        }

        if self.with_ota_tools {
            write_script(
                &bin.join("build_super_image"),
                "#!/bin/sh\ncp \"$1\" \"$2\"\n",
            );
        }

        let certs = root.join("usr/share/webrtc/certs");
        fs::create_dir_all(&certs).unwrap();
        fs::write(certs.join("server.crt"), b"fake cert").unwrap();

        let image = root.join("image");
        fs::create_dir_all(&image).unwrap();
        for name in ["system.img", "vendor.img", "product.img", "super.img"] {
            fs::write(image.join(name), name.as_bytes()).unwrap();
        }
        if let Some(contents) = &self.misc_info {
            fs::write(image.join("misc_info.txt"), contents).unwrap();
        }
        if let Some(contents) = &self.android_info {
            fs::write(image.join("android-info.txt"), contents).unwrap();
        }

        FakeHostTree { dir }
    }
}

fn write_script(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}
