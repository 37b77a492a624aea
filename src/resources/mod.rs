//! Resource handlers — generate shell for each resource type.
//!
//! Each handler produces:
//! 1. A "check" script that reports current state
//! 2. An "apply" script that converges to desired state
//! 3. A "state query" script whose output is hashed after apply

pub mod file;
pub mod package;
pub mod template;

/// Exit code of an apply script whose owner or group does not exist.
pub const IDENTITY_EXIT_CODE: i32 = 3;

/// Single-quote a string for bash.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Lines that abort with [`IDENTITY_EXIT_CODE`] when the owner or group is
/// unknown on the target. Emitted before any mutation.
pub fn identity_checks(owner: Option<&str>, group: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(owner) = owner {
        let q = shell_quote(owner);
        lines.push(format!(
            "id -u {q} >/dev/null 2>&1 || {{ echo \"unknown owner: \"{q} >&2; exit {}; }}",
            IDENTITY_EXIT_CODE
        ));
    }
    if let Some(group) = group {
        let q = shell_quote(group);
        lines.push(format!(
            "getent group {q} >/dev/null 2>&1 \
             || grep -q \"^\"{q}\":\" /etc/group 2>/dev/null \
             || {{ echo \"unknown group: \"{q} >&2; exit {}; }}",
            IDENTITY_EXIT_CODE
        ));
    }
    lines
}

/// chown/chmod lines for a path.
pub fn ownership_lines(
    path: &str,
    owner: Option<&str>,
    group: Option<&str>,
    mode: Option<&str>,
) -> Vec<String> {
    let target = shell_quote(path);
    let mut lines = Vec::new();
    match (owner, group) {
        (Some(o), Some(g)) => {
            let owner_group = shell_quote(&format!("{}:{}", o, g));
            lines.push(format!("chown {} {}", owner_group, target));
        }
        (Some(o), None) => lines.push(format!("chown {} {}", shell_quote(o), target)),
        (None, Some(g)) => lines.push(format!("chgrp {} {}", shell_quote(g), target)),
        (None, None) => {}
    }
    if let Some(mode) = mode {
        lines.push(format!("chmod {} {}", shell_quote(mode), target));
    }
    lines
}
