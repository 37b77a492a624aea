//! File resource handler.
//!
//! Content is shipped base64-encoded and decoded on the target, so the
//! deployed file is byte-identical to its source. Owner and group are
//! checked before anything on the target is touched.

use super::{identity_checks, ownership_lines, shell_quote};
use crate::core::content::{ContentKind, ContentStore};
use crate::core::error::{Error, Result};
use crate::core::types::{FileAction, Resource};
use base64::Engine;
use std::path::Path;

const HEREDOC_MARKER: &str = "RECETA_EOF";
const BASE64_LINE: usize = 76;

fn target_path(resource: &Resource) -> Result<&str> {
    resource
        .path
        .as_deref()
        .ok_or_else(|| Error::Config("file resource has no path".to_string()))
}

/// Load the bytes a `create` should write: inline `content` or the
/// `source` reference under the resource's `files/` directory.
pub fn load_payload(resource: &Resource) -> Result<Vec<u8>> {
    if let Some(ref content) = resource.content {
        return Ok(content.as_bytes().to_vec());
    }
    let source = resource
        .source
        .as_deref()
        .ok_or_else(|| Error::Config("file resource needs source or content".to_string()))?;
    let root = resource.content_root.as_deref().unwrap_or(Path::new("."));
    ContentStore::new(root).read(ContentKind::File, source)
}

/// Generate shell to check file state.
pub fn check_script(resource: &Resource) -> Result<String> {
    let path = shell_quote(target_path(resource)?);
    Ok(match resource.file_action() {
        FileAction::Delete => format!(
            "test -e {path} && echo 'exists:present' || echo 'missing:absent'"
        ),
        FileAction::Create | FileAction::Touch => {
            format!("test -f {path} && echo 'exists:file' || echo 'missing:file'")
        }
    })
}

/// Generate shell to converge the path to the declared action.
///
/// `payload` is required for `create` and ignored otherwise.
pub fn apply_script(resource: &Resource, payload: Option<&[u8]>) -> Result<String> {
    let path = target_path(resource)?;
    let quoted = shell_quote(path);
    let owner = resource.owner.as_deref();
    let group = resource.group.as_deref();
    let mode = resource.mode.as_deref();

    let mut lines = vec!["set -euo pipefail".to_string()];

    match resource.file_action() {
        FileAction::Delete => {
            lines.push(format!("rm -f {}", quoted));
        }
        FileAction::Touch => {
            lines.extend(identity_checks(owner, group));
            lines.extend(mkdir_parent(path));
            lines.push(format!("touch {}", quoted));
            lines.extend(ownership_lines(path, owner, group, mode));
        }
        FileAction::Create => {
            let payload = payload.ok_or_else(|| {
                Error::Resolution(format!("no content loaded for {}", path))
            })?;
            lines.extend(identity_checks(owner, group));
            lines.extend(mkdir_parent(path));
            let tmp = shell_quote(&format!("{}.receta-tmp", path));
            lines.push(format!(
                "base64 -d > {} <<'{}'\n{}\n{}",
                tmp,
                HEREDOC_MARKER,
                encode_wrapped(payload),
                HEREDOC_MARKER
            ));
            lines.push(format!("mv -f {} {}", tmp, quoted));
            lines.extend(ownership_lines(path, owner, group, mode));
        }
    }

    Ok(lines.join("\n"))
}

/// Generate shell to query file state (for hashing).
pub fn state_query_script(resource: &Resource) -> Result<String> {
    let path = shell_quote(target_path(resource)?);
    Ok(format!(
        "if [ -e {path} ]; then\n\
           stat -c 'owner=%U group=%G mode=%a size=%s' {path} 2>/dev/null || \
           stat -f 'owner=%Su group=%Sg mode=%Lp size=%z' {path} 2>/dev/null\n\
           if [ -f {path} ]; then\n\
             b3sum --no-names {path} 2>/dev/null || sha256sum {path} | cut -d' ' -f1\n\
           fi\n\
         else\n\
           echo 'MISSING'\n\
         fi"
    ))
}

fn mkdir_parent(path: &str) -> Option<String> {
    let parent = Path::new(path).parent()?;
    if parent == Path::new("/") || parent.as_os_str().is_empty() {
        return None;
    }
    Some(format!("mkdir -p {}", shell_quote(&parent.display().to_string())))
}

fn encode_wrapped(payload: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(payload);
    encoded
        .as_bytes()
        .chunks(BASE64_LINE)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}
