use crate::error::SessionError;
use core::fmt::Display;
use core::time::Duration;
use js::ScriptError;
use log::debug;
use std::io::{Error as IoError, Result as IoResult};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt as _;
use tokio::process::{Child, Command};
use tokio::time::timeout;

fn failure(command: &str, detail: impl Display) -> SessionError {
    SessionError::Execution(ScriptError::Internal(format!("{command}: {detail}")))
}

/// Pipe `source` through an external command (stdin to stdout).
///
/// `command` is split on whitespace into a program and its arguments. The
/// child is killed if it has not finished within `limit`.
///
/// # Errors
/// Returns [`SessionError::Execution`] if the command cannot be run, exits
/// unsuccessfully or runs past `limit`.
pub async fn transpile(command: &str, source: &str, limit: Duration) -> Result<String, SessionError> {
    let mut words = command.split_whitespace();
    let program = words.next().ok_or_else(|| failure(command, "empty command"))?;
    let child = Command::new(program)
        .args(words)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| failure(command, err))?;

    let output = timeout(limit, pipe_through(child, source))
        .await
        .map_err(|_| failure(command, format!("no result after {limit:?}")))?
        .map_err(|err| failure(command, err))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failure(command, format!("{} {}", output.status, stderr.trim())));
    }
    let rewritten = String::from_utf8_lossy(&output.stdout).into_owned();
    debug!("{program}: {} -> {} bytes", source.len(), rewritten.len());
    Ok(rewritten)
}

/// Feed stdin while stdout and stderr are drained, so neither pipe can fill up.
async fn pipe_through(mut child: Child, source: &str) -> IoResult<Output> {
    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(source.as_bytes()).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), IoError>(())
    };
    let (written, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    // A failing child may exit before reading everything; report its status instead.
    if output.status.success() {
        written?;
    }
    Ok(output)
}
