//! Execution of tasks delivered by the kernel
//!
//! The reboot command is special-cased by the heartbeat loop (its
//! confirmation must be flushed before the syscall runs); everything else
//! executes as a shell command with a timeout and captured output.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Command class that opens the kernel-side restart suppression window
pub const REBOOT_COMMAND: &str = "reboot";

/// Run a task command through the shell; the returned string becomes the
/// buffered result reported on the next heartbeat.
pub async fn run_shell(command: &str, timeout_secs: u64) -> String {
    info!("executing command: {command}");

    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;

    match output {
        Ok(Ok(out)) => {
            let mut text = String::from_utf8_lossy(&out.stdout).trim_end().to_string();
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.trim().is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(stderr.trim_end());
            }
            if !out.status.success() {
                text.push_str(&format!("\n(exit code {})", out.status.code().unwrap_or(-1)));
            }
            if text.is_empty() {
                "(no output)".to_string()
            } else {
                text
            }
        }
        Ok(Err(e)) => format!("failed to spawn: {e}"),
        Err(_) => format!("timed out after {timeout_secs}s"),
    }
}

/// Schedule the actual reboot, detached with a short grace delay so the
/// in-flight heartbeat response can still go out.
pub async fn schedule_reboot() {
    warn!("rebooting on kernel command");

    let result = if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "shutdown /r /t 2"]).spawn()
    } else {
        Command::new("sh").args(["-c", "(sleep 2 && reboot) &"]).spawn()
    };

    if let Err(e) = result {
        warn!("failed to schedule reboot: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_shell_captures_output() {
        let out = run_shell("echo hello", 5).await;
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_run_shell_reports_exit_code() {
        let out = run_shell("exit 3", 5).await;
        assert!(out.contains("exit code 3"));
    }

    #[tokio::test]
    async fn test_run_shell_times_out() {
        let out = run_shell("sleep 5", 1).await;
        assert!(out.contains("timed out"));
    }
}
