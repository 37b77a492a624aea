//! Transport abstraction — local and SSH execution.

pub mod local;
pub mod ssh;

use crate::core::error::{Error, Result};
use crate::core::types::Machine;

/// Output from executing a script on a target.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into a classified error.
    pub fn into_result(self) -> Result<ExecOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::from_script_failure(self.exit_code, &self.stderr))
        }
    }
}

/// Whether scripts for this machine run locally rather than over SSH.
pub fn is_local(machine: &Machine) -> bool {
    is_local_addr(&machine.addr)
}

/// Execute a shell script on a machine.
/// Dispatches to local or SSH based on address.
pub fn exec_script(machine: &Machine, script: &str) -> Result<ExecOutput> {
    let local = is_local(machine);
    log::debug!(
        "exec on {} via {} ({} bytes)",
        machine.hostname,
        if local { "bash" } else { "ssh" },
        script.len()
    );
    let out = if local {
        local::exec_local(script)?
    } else {
        ssh::exec_ssh(machine, script)?
    };
    log::trace!(
        "exit {} stdout={:?} stderr={:?}",
        out.exit_code,
        out.stdout,
        out.stderr
    );
    Ok(out)
}

/// Execute a read-only query (check and state-query scripts).
pub fn query(machine: &Machine, cmd: &str) -> Result<ExecOutput> {
    exec_script(machine, cmd)
}

/// Check if an address is this machine.
fn is_local_addr(addr: &str) -> bool {
    if addr == "127.0.0.1" || addr == "localhost" || addr == "::1" {
        return true;
    }
    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        if addr == hostname.trim() {
            return true;
        }
    }
    false
}
