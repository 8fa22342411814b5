//! Best-effort conveniences after a verified boot.
//!
//! Nothing here affects the launch outcome: failures are logged and
//! swallowed so a missing `adb` or browser never turns a booted device
//! into an error.

use std::process::Stdio;

use tokio::process::Command;

use crate::constants::binaries;

/// adb keyevent codes.
const KEYCODE_MENU: &str = "82";
const KEYCODE_WAKEUP: &str = "224";

/// Wake the device and dismiss the keyguard over adb.
pub async fn unlock_screen(adb_port: u16) {
    let serial = format!("127.0.0.1:{}", adb_port);
    for keycode in [KEYCODE_WAKEUP, KEYCODE_MENU] {
        let result = Command::new(binaries::ADB)
            .args(["-s", &serial, "shell", "input", "keyevent", keycode])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => {}
            Ok(status) => {
                tracing::warn!(%serial, keycode, %status, "adb keyevent failed");
                return;
            }
            Err(e) => {
                tracing::warn!(%serial, "could not run adb: {}", e);
                return;
            }
        }
    }
    tracing::debug!(%serial, "screen unlocked");
}

/// Open the WebRTC page for the instance in the default browser.
pub async fn launch_browser(webrtc_port: u16) {
    let url = format!("https://localhost:{}", webrtc_port);
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    let result = Command::new(opener)
        .arg(&url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {
            tracing::info!(%url, "opened browser");
        }
        Ok(status) => tracing::warn!(%url, %status, "browser launcher failed"),
        Err(e) => tracing::warn!(%url, "could not run {}: {}", opener, e),
    }
}
