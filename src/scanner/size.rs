// src/scanner/size.rs

//! On-disk size measurement via an external `du`-style command

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

/// Measure `path` with `<command> -sk <path>`, returning bytes
///
/// Any failure (missing command, non-zero exit, unparsable output) is logged
/// and yields `None`.
pub async fn measure_size(command: &str, path: &Path) -> Option<u64> {
    let output = match Command::new(command)
        .arg("-sk")
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to run {} for {}: {}", command, path.display(), e);
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            "{} failed for {}: {}",
            command,
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let size = parse_du_output(&String::from_utf8_lossy(&output.stdout));
    if size.is_none() {
        warn!("Unreadable size output for {}", path.display());
    }
    size
}

/// First whitespace-separated token, in KiB, converted to bytes
pub fn parse_du_output(stdout: &str) -> Option<u64> {
    let kib: u64 = stdout.split_whitespace().next()?.parse().ok()?;
    kib.checked_mul(1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_du_output() {
        assert_eq!(parse_du_output("1234\t/opt/homebrew/Cellar/wget\n"), Some(1234 * 1024));
        assert_eq!(parse_du_output("0 /tmp/x"), Some(0));
        assert_eq!(parse_du_output(""), None);
        assert_eq!(parse_du_output("du: cannot access"), None);
        assert_eq!(parse_du_output("18446744073709551615\t/huge"), None);
    }

    #[tokio::test]
    async fn test_measure_missing_command() {
        let size = measure_size("definitely-not-a-size-tool", Path::new("/tmp")).await;
        assert!(size.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_measure_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("blob"), vec![0u8; 64 * 1024]).unwrap();
        let size = measure_size("du", temp.path()).await.unwrap();
        assert!(size > 0);
    }
}
