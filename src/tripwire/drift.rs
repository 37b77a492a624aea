//! Drift detection — compare live state to what the lock recorded.
//!
//! On the control host, file and template resources are checked against the
//! recorded content hash and mode. On remote machines only their presence
//! (or absence, for deletes) is checked, through the check script over the
//! machine's transport. Packages are checked on their machine. Only
//! converged entries are considered.

use crate::core::codegen;
use crate::core::error::Result;
use crate::core::types::{
    FileAction, Machine, ResolvedResource, Resource, ResourceLock, ResourceStatus, ResourceType,
    StateLock,
};
use crate::resources::package;
use crate::transport::{self, ExecOutput};
use crate::tripwire::hasher;
use indexmap::IndexMap;
use std::path::Path;

/// A single drift finding.
#[derive(Debug, Clone)]
pub struct DriftFinding {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub expected_hash: String,
    pub actual_hash: String,
    pub detail: String,
}

fn detail_str<'a>(rl: &'a ResourceLock, key: &str) -> Option<&'a str> {
    match rl.details.get(key) {
        Some(serde_yaml_ng::Value::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

/// Check a single deployed file for content or mode drift.
pub fn check_file_drift(
    resource_id: &str,
    resource_type: ResourceType,
    path: &str,
    expected_hash: &str,
    expected_mode: Option<&str>,
) -> Option<DriftFinding> {
    let finding = |actual: String, detail: String| DriftFinding {
        resource_id: resource_id.to_string(),
        resource_type: resource_type.clone(),
        expected_hash: expected_hash.to_string(),
        actual_hash: actual,
        detail,
    };

    let file_path = Path::new(path);
    if !file_path.is_file() {
        return Some(finding(
            "MISSING".to_string(),
            format!("{} does not exist", path),
        ));
    }

    let actual = hasher::hash_file(file_path).unwrap_or_else(|e| format!("ERROR:{}", e));
    if actual != expected_hash {
        return Some(finding(actual, format!("{} content changed", path)));
    }

    if let Some(actual_mode) = mode_drift(file_path, expected_mode) {
        return Some(finding(
            actual,
            format!(
                "{} mode is {}, expected {}",
                path,
                actual_mode,
                expected_mode.unwrap_or("?")
            ),
        ));
    }

    None
}

/// The actual mode, formatted as octal, when it differs from `expected`.
#[cfg(unix)]
fn mode_drift(path: &Path, expected: Option<&str>) -> Option<String> {
    use std::os::unix::fs::PermissionsExt;
    let expected = u32::from_str_radix(expected?, 8).ok()?;
    let actual = std::fs::metadata(path).ok()?.permissions().mode() & 0o7777;
    (actual != expected).then(|| format!("{:04o}", actual))
}

#[cfg(not(unix))]
fn mode_drift(_path: &Path, _expected: Option<&str>) -> Option<String> {
    None
}

/// Check all file and template resources in a lock for drift.
pub fn detect_drift(lock: &StateLock) -> Vec<DriftFinding> {
    let mut findings = Vec::new();

    for (id, rl) in &lock.resources {
        if rl.status != ResourceStatus::Converged {
            continue;
        }
        if !matches!(rl.resource_type, ResourceType::File | ResourceType::Template) {
            continue;
        }
        let Some(path) = detail_str(rl, "path") else {
            continue;
        };

        if detail_str(rl, "action") == Some("delete") {
            if Path::new(path).exists() {
                findings.push(DriftFinding {
                    resource_id: id.clone(),
                    resource_type: rl.resource_type.clone(),
                    expected_hash: "ABSENT".to_string(),
                    actual_hash: "PRESENT".to_string(),
                    detail: format!("{} was deleted but exists again", path),
                });
            }
            continue;
        }

        let Some(expected) = detail_str(rl, "content_hash") else {
            continue;
        };
        if let Some(finding) = check_file_drift(
            id,
            rl.resource_type.clone(),
            path,
            expected,
            detail_str(rl, "mode"),
        ) {
            findings.push(finding);
        }
    }

    findings
}

/// Rebuild the declaration a lock entry describes, enough to run its check script.
fn locked_resource(id: &str, rl: &ResourceLock) -> ResolvedResource {
    let mut resource = Resource::new(rl.resource_type.clone());
    resource.path = detail_str(rl, "path").map(str::to_string);
    resource.state = detail_str(rl, "state").map(str::to_string);
    if detail_str(rl, "action") == Some("delete") {
        resource.action = Some(FileAction::Delete);
    }
    if let Some(serde_yaml_ng::Value::Sequence(pkgs)) = rl.details.get("packages") {
        resource.packages = pkgs
            .iter()
            .filter_map(|p| p.as_str().map(str::to_string))
            .collect();
    }
    ResolvedResource {
        id: id.to_string(),
        resource,
        payload: None,
        generated: IndexMap::new(),
    }
}

/// Run check scripts for converged entries and report what no longer holds.
///
/// File and template entries are included only with `include_files`.
/// Packages declared absent are skipped.
fn check_on_machine<F>(
    lock: &StateLock,
    include_files: bool,
    mut query: F,
) -> Result<Vec<DriftFinding>>
where
    F: FnMut(&str) -> Result<ExecOutput>,
{
    let mut findings = Vec::new();

    for (id, rl) in &lock.resources {
        if rl.status != ResourceStatus::Converged {
            continue;
        }
        let resolved = locked_resource(id, rl);
        let skip = match rl.resource_type {
            ResourceType::Package => {
                resolved.resource.packages.is_empty() || detail_str(rl, "state") == Some("absent")
            }
            ResourceType::File | ResourceType::Template => {
                !include_files || resolved.resource.path.is_none()
            }
        };
        if skip {
            continue;
        }

        let out = query(&codegen::check_script(&resolved)?)?;
        let finding = |actual: &str, detail: String| DriftFinding {
            resource_id: id.clone(),
            resource_type: rl.resource_type.clone(),
            expected_hash: rl.hash.clone(),
            actual_hash: actual.to_string(),
            detail,
        };

        match rl.resource_type {
            ResourceType::Package => {
                let missing = package::missing_from_check(&out.stdout);
                if !missing.is_empty() {
                    let detail = format!("not installed: {}", missing.join(", "));
                    findings.push(finding("MISSING", detail));
                }
            }
            ResourceType::File | ResourceType::Template => {
                let path = resolved.resource.path.as_deref().unwrap_or_default();
                if out.stdout.contains("missing:file") {
                    findings.push(finding("MISSING", format!("{} does not exist", path)));
                } else if out.stdout.contains("exists:present") {
                    let detail = format!("{} was deleted but exists again", path);
                    findings.push(finding("PRESENT", detail));
                }
            }
        }
    }

    Ok(findings)
}

/// Check converged, present packages on their machine.
pub fn detect_package_drift(lock: &StateLock, machine: &Machine) -> Result<Vec<DriftFinding>> {
    check_on_machine(lock, false, |script| transport::query(machine, script))
}

/// All drift checks for one machine.
///
/// The control host gets full content and mode checks from the local
/// filesystem. Any other machine gets presence checks over its transport.
pub fn detect_machine_drift(lock: &StateLock, machine: &Machine) -> Result<Vec<DriftFinding>> {
    if transport::is_local(machine) {
        let mut findings = detect_drift(lock);
        findings.extend(detect_package_drift(lock, machine)?);
        Ok(findings)
    } else {
        check_on_machine(lock, true, |script| transport::query(machine, script))
    }
}

/// Mark drifted resources so the next plan re-applies them.
pub fn mark_drifted(lock: &mut StateLock, findings: &[DriftFinding]) -> usize {
    let mut marked = 0;
    for finding in findings {
        if let Some(rl) = lock.resources.get_mut(&finding.resource_id) {
            if rl.status != ResourceStatus::Drifted {
                rl.status = ResourceStatus::Drifted;
                marked += 1;
            }
        }
    }
    marked
}
