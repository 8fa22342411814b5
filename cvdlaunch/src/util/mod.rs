//! Small shared helpers: log-file tails and tracing registration.

use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing_appender::non_blocking::NonBlocking;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::errors::{CvdResult, LaunchError};

/// Read the last `n` lines of a text file.
///
/// Used to attach launcher stderr to failure reports; capture files are
/// small enough that a full sequential read is fine.
pub fn tail_lines(path: &Path, n: usize) -> CvdResult<Vec<String>> {
    let file = std::fs::File::open(path).map_err(|e| {
        LaunchError::Storage(format!("failed to open {}: {}", path.display(), e))
    })?;
    let mut lines: Vec<String> = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| {
            LaunchError::Storage(format!("failed to read {}: {}", path.display(), e))
        })?;
        lines.push(line);
        if lines.len() > n {
            lines.remove(0);
        }
    }
    Ok(lines)
}

pub fn register_to_tracing(non_blocking: NonBlocking, env_filter: EnvFilter) {
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tail_shorter_than_limit() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log");
        std::fs::write(&path, "a\nb\n").unwrap();
        assert_eq!(tail_lines(&path, 10).unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("log");
        let contents: String = (0..100).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&path, contents).unwrap();
        let tail = tail_lines(&path, 3).unwrap();
        assert_eq!(tail, ["line 97", "line 98", "line 99"]);
    }

    #[test]
    fn test_tail_missing_file_is_error() {
        let tmp = TempDir::new().unwrap();
        assert!(tail_lines(&tmp.path().join("absent"), 5).is_err());
    }
}
