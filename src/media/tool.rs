use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::FetchError;

/// Captured output of a finished external tool
#[derive(Debug, Clone)]
pub(crate) struct ToolOutput {
    pub stdout: Vec<u8>,
}

/// Run an external program to completion, failing on timeout or non-zero exit
pub(crate) async fn run_tool(
    program: &Path,
    args: &[OsString],
    timeout: Duration,
) -> Result<ToolOutput, FetchError> {
    let tool = program
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| program.to_string_lossy().to_string());

    tracing::debug!(%tool, ?args, "Running external tool");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| FetchError::Tool {
            tool: tool.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| FetchError::Tool {
            tool: tool.clone(),
            message: format!("timed out after {}s", timeout.as_secs()),
        })?
        .map_err(|e| FetchError::Tool {
            tool: tool.clone(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Err(FetchError::Tool {
            tool,
            message: format!("exited with {}: {}", output.status, last_line.trim()),
        });
    }

    Ok(ToolOutput {
        stdout: output.stdout,
    })
}
