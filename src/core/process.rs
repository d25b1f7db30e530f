use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Run a command with arguments and a timeout, returning stdout as a String.
pub async fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<String> {
    run_in(cmd, args, None, timeout).await
}

/// Same as [`run_command`] but with an explicit working directory.
pub async fn run_command_in(
    cmd: &str,
    args: &[&str],
    dir: &Path,
    timeout: Duration,
) -> Result<String> {
    run_in(cmd, args, Some(dir), timeout).await
}

async fn run_in(cmd: &str, args: &[&str], dir: Option<&Path>, timeout: Duration) -> Result<String> {
    debug!(cmd, ?args, ?dir, "running command");

    let mut command = tokio::process::Command::new(cmd);
    command.args(args);
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .context(format!("Command `{}` timed out", cmd))?
        .context(format!("Failed to execute `{}`", cmd))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "`{}` exited with {}: {}",
            cmd,
            output.status,
            stderr.trim()
        );
    }

    let stdout = String::from_utf8(output.stdout)
        .context(format!("Non-UTF8 output from `{}`", cmd))?;
    Ok(stdout.trim().to_string())
}

/// Check if a binary exists in PATH. Returns the full path if found.
pub fn which(binary: &str) -> Option<PathBuf> {
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(binary))
            .find(|p| p.is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_existing_binary() {
        assert!(which("ls").is_some());
    }

    #[test]
    fn which_returns_none_for_nonexistent() {
        assert!(which("totally_nonexistent_binary_xyz").is_none());
    }

    #[tokio::test]
    async fn run_command_echo() {
        let result = run_command("echo", &["hello"], Duration::from_secs(5)).await;
        assert_eq!(result.unwrap(), "hello");
    }

    #[tokio::test]
    async fn run_command_failure() {
        let result = run_command("false", &[], Duration::from_secs(5)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_command_in_respects_dir() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_command_in("pwd", &[], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        // Canonicalize both sides; macOS tempdirs resolve through /private.
        let got = std::fs::canonicalize(&result).unwrap();
        let want = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(got, want);
    }
}
