//! SSH execution transport.
//!
//! Uses the `ssh` binary directly. The script is piped to a remote `bash`
//! on stdin, so payload size is not bounded by argument limits.

use super::ExecOutput;
use crate::core::error::{Error, Result};
use crate::core::types::Machine;
use std::io::Write;
use std::process::{Command, Stdio};

/// Expand a leading `~/` against `$HOME`.
fn expand_key_path(key: &str) -> String {
    match (key.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home, rest),
        _ => key.to_string(),
    }
}

/// Arguments passed to `ssh` for a machine.
pub fn ssh_args(machine: &Machine) -> Vec<String> {
    let mut args: Vec<String> = [
        "-o",
        "BatchMode=yes",
        "-o",
        "ConnectTimeout=5",
        "-o",
        "StrictHostKeyChecking=accept-new",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if let Some(ref key) = machine.ssh_key {
        args.push("-i".to_string());
        args.push(expand_key_path(key));
    }

    args.push(format!("{}@{}", machine.user, machine.addr));
    args.push("bash".to_string());
    args
}

/// Execute a shell script on a remote machine via SSH.
pub fn exec_ssh(machine: &Machine, script: &str) -> Result<ExecOutput> {
    let mut child = Command::new("ssh")
        .args(ssh_args(machine))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::Transport(format!("failed to spawn ssh to {}: {}", machine.addr, e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .map_err(|e| Error::Transport(format!("stdin write error: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| Error::Transport(format!("ssh wait error: {}", e)))?;

    // ssh reserves 255 for its own failures (unreachable host, auth)
    if output.status.code() == Some(255) {
        return Err(Error::Transport(format!(
            "ssh to {}@{} failed: {}",
            machine.user,
            machine.addr,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(ExecOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}
