//! Lock file management — load, save (atomic), path derivation.

use super::error::{Error, Result};
use super::types::StateLock;
use std::path::{Path, PathBuf};

/// Derive the lock file path for a machine within the state directory.
pub fn lock_file_path(state_dir: &Path, machine: &str) -> PathBuf {
    state_dir.join(machine).join("state.lock.yaml")
}

/// Load a lock file for a machine. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, machine: &str) -> Result<Option<StateLock>> {
    let path = lock_file_path(state_dir, machine);
    if !path.exists() {
        log::debug!("no lock for {} at {}", machine, path.display());
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::State(format!("cannot read {}: {}", path.display(), e)))?;
    let lock: StateLock = serde_yaml_ng::from_str(&content).map_err(|e| Error::Parse {
        origin: path.display().to_string(),
        message: e.to_string(),
    })?;
    log::debug!(
        "loaded lock for {} ({} resources)",
        machine,
        lock.resources.len()
    );
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &StateLock) -> Result<()> {
    let path = lock_file_path(state_dir, &lock.machine);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::State(format!("cannot create dir {}: {}", parent.display(), e)))?;
    }

    let yaml = serde_yaml_ng::to_string(lock)
        .map_err(|e| Error::State(format!("serialize error: {}", e)))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| Error::State(format!("cannot write {}: {}", tmp_path.display(), e)))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        Error::State(format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;

    log::debug!("saved lock {}", path.display());
    Ok(())
}

/// Create a new empty StateLock for a machine.
pub fn new_lock(machine: &str, hostname: &str) -> StateLock {
    use crate::tripwire::eventlog::now_iso8601;
    StateLock {
        schema: "1.0".to_string(),
        machine: machine.to_string(),
        hostname: hostname.to_string(),
        generated_at: now_iso8601(),
        generator: format!("receta {}", env!("CARGO_PKG_VERSION")),
        blake3_version: "1.8".to_string(),
        resources: indexmap::IndexMap::new(),
    }
}

/// List machine names that have a lock in the state directory, sorted.
pub fn list_locked_machines(state_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(state_dir).map_err(|e| {
        Error::State(format!(
            "cannot read state dir {}: {}",
            state_dir.display(),
            e
        ))
    })?;
    let mut machines: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| lock_file_path(state_dir, name).exists())
        .collect();
    machines.sort();
    Ok(machines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ResourceLock, ResourceStatus, ResourceType};
    use std::collections::HashMap;

    fn make_lock() -> StateLock {
        let mut resources = indexmap::IndexMap::new();
        resources.insert(
            "app_setup/cron".to_string(),
            ResourceLock {
                resource_type: ResourceType::Package,
                status: ResourceStatus::Converged,
                applied_at: Some("2026-10-19T14:00:00Z".to_string()),
                duration_seconds: Some(1.5),
                hash: "blake3:abc123".to_string(),
                details: HashMap::new(),
                generated: indexmap::IndexMap::new(),
            },
        );
        StateLock {
            schema: "1.0".to_string(),
            machine: "test".to_string(),
            hostname: "test-box".to_string(),
            generated_at: "2026-10-19T14:00:00Z".to_string(),
            generator: "receta 0.3.0".to_string(),
            blake3_version: "1.8".to_string(),
            resources,
        }
    }

    #[test]
    fn test_lock_file_path() {
        let p = lock_file_path(Path::new("/state"), "web");
        assert_eq!(p, PathBuf::from("/state/web/state.lock.yaml"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        save_lock(dir.path(), &make_lock()).unwrap();

        let loaded = load_lock(dir.path(), "test").unwrap().unwrap();
        assert_eq!(loaded.machine, "test");
        assert_eq!(
            loaded.resources["app_setup/cron"].status,
            ResourceStatus::Converged
        );
    }

    #[test]
    fn test_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_lock(dir.path(), "ghost").unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_file_path(dir.path(), "bad");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "resources: [not, a, map").unwrap();
        let err = load_lock(dir.path(), "bad").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        save_lock(dir.path(), &make_lock()).unwrap();
        assert!(!dir.path().join("test").join("state.lock.yaml.tmp").exists());
        assert!(lock_file_path(dir.path(), "test").exists());
    }

    #[test]
    fn test_new_lock() {
        let lock = new_lock("web", "web-01");
        assert_eq!(lock.machine, "web");
        assert!(lock.generator.starts_with("receta "));
        assert!(lock.resources.is_empty());
    }

    #[test]
    fn test_list_locked_machines() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = make_lock();
        lock.machine = "b".to_string();
        save_lock(dir.path(), &lock).unwrap();
        lock.machine = "a".to_string();
        save_lock(dir.path(), &lock).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        assert_eq!(list_locked_machines(dir.path()).unwrap(), vec!["a", "b"]);
    }
}
