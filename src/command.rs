use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

use crate::error::ExtractError;

/// Runs an external program with a hard timeout. The child is killed when the
/// timeout elapses. A non-zero exit status is returned as `Ok`; callers decide
/// what a failure means for them.
pub async fn run_with_timeout(
    cmd: &mut Command,
    program: &str,
    timeout_secs: u64,
) -> Result<Output, ExtractError> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| ExtractError::Timeout {
            program: program.to_string(),
            secs: timeout_secs,
        })?
        .map_err(|e| ExtractError::Spawn {
            program: program.to_string(),
            message: e.to_string(),
        })
}

/// Exit status plus trimmed stderr, for error messages.
pub fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit {}", output.status)
    } else {
        format!("exit {}: {}", output.status, stderr)
    }
}
