use std::{process::Stdio, time::Duration};

use tokio::process::Command;

use crate::error::ProcessError;

/// Default limit for one external tool invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub code: Option<i32>,
    pub stderr: String,
}

/// Runs a command to completion.
///
/// The child is spawned with `kill_on_drop`, so it is killed when the timeout
/// expires and never outlives this call. Only stderr is captured.
pub async fn run_scoped(
    mut command: Command,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    tracing::debug!(
        "Running {program} {:?}",
        command.as_std().get_args().collect::<Vec<_>>()
    );

    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Io {
            program: program.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ProcessError::Io { program, source }),
        Err(_) => return Err(ProcessError::Timeout { program, timeout }),
    };

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        return Err(ProcessError::NonZeroExit {
            program,
            code: output.status.code(),
            stderr,
        });
    }

    Ok(ProcessOutput {
        code: output.status.code(),
        stderr,
    })
}
