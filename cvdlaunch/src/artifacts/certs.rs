//! Idempotent WebRTC certificate installation.
//!
//! Copies trusted cert material into the host-artifacts tree. That tree
//! may be shared by several instances launching concurrently, so the
//! copy is content-addressed: a destination file whose sha256 already
//! matches the source is left untouched, which makes the concurrent
//! case benign (every writer writes the same bytes).

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::constants::host_artifacts;
use crate::errors::{CvdResult, LaunchError};

/// Install every regular file from `source_dir` into the webrtc certs
/// directory of `host_artifacts_dir`.
///
/// Returns the number of files actually copied (zero when everything
/// was already up to date).
pub fn install_webrtc_certs(source_dir: &Path, host_artifacts_dir: &Path) -> CvdResult<usize> {
    if !source_dir.is_dir() {
        return Err(LaunchError::CheckPath(format!(
            "webrtc cert source {} is not a directory",
            source_dir.display()
        )));
    }

    let dest_dir = host_artifacts_dir.join(host_artifacts::WEBRTC_CERTS_DIR);
    std::fs::create_dir_all(&dest_dir).map_err(|e| {
        LaunchError::Storage(format!(
            "failed to create cert dir {}: {}",
            dest_dir.display(),
            e
        ))
    })?;

    let entries = std::fs::read_dir(source_dir).map_err(|e| {
        LaunchError::Storage(format!(
            "failed to read cert source {}: {}",
            source_dir.display(),
            e
        ))
    })?;

    let mut copied = 0;
    for entry in entries.flatten() {
        let src = entry.path();
        if !src.is_file() {
            continue;
        }
        let dest = dest_dir.join(entry.file_name());
        if dest.is_file() && file_digest(&src)? == file_digest(&dest)? {
            tracing::debug!(cert = %dest.display(), "cert already current, skipping");
            continue;
        }
        std::fs::copy(&src, &dest).map_err(|e| {
            LaunchError::Storage(format!(
                "failed to install cert {} -> {}: {}",
                src.display(),
                dest.display(),
                e
            ))
        })?;
        tracing::info!(cert = %dest.display(), "installed webrtc cert");
        copied += 1;
    }
    Ok(copied)
}

fn file_digest(path: &Path) -> CvdResult<[u8; 32]> {
    let bytes = std::fs::read(path).map_err(|e| {
        LaunchError::Storage(format!("failed to read {}: {}", path.display(), e))
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_install_copies_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("certs");
        let artifacts = tmp.path().join("host");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("server.crt"), b"cert").unwrap();
        fs::write(src.join("server.key"), b"key").unwrap();

        let copied = install_webrtc_certs(&src, &artifacts).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(
            fs::read(artifacts.join("usr/share/webrtc/certs/server.crt")).unwrap(),
            b"cert"
        );
    }

    #[test]
    fn test_install_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("certs");
        let artifacts = tmp.path().join("host");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("server.crt"), b"cert").unwrap();

        assert_eq!(install_webrtc_certs(&src, &artifacts).unwrap(), 1);
        assert_eq!(install_webrtc_certs(&src, &artifacts).unwrap(), 0);
    }

    #[test]
    fn test_changed_source_is_reinstalled() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("certs");
        let artifacts = tmp.path().join("host");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("server.crt"), b"old").unwrap();
        install_webrtc_certs(&src, &artifacts).unwrap();

        fs::write(src.join("server.crt"), b"new").unwrap();
        assert_eq!(install_webrtc_certs(&src, &artifacts).unwrap(), 1);
        assert_eq!(
            fs::read(artifacts.join("usr/share/webrtc/certs/server.crt")).unwrap(),
            b"new"
        );
    }

    #[test]
    fn test_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let err = install_webrtc_certs(&tmp.path().join("nope"), tmp.path());
        assert!(matches!(err, Err(LaunchError::CheckPath(_))));
    }
}
