//! Content lookup — resolves `source` references under a content root.
//!
//! A content root is a project or recipe directory. File sources live in
//! `<root>/files/`, template sources in `<root>/templates/`. References are
//! relative and may not escape their directory.

use super::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Which namespace a reference is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    File,
    Template,
}

impl ContentKind {
    fn dir_name(self) -> &'static str {
        match self {
            Self::File => "files",
            Self::Template => "templates",
        }
    }
}

/// Content store rooted at a project or recipe directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a reference to an existing path.
    pub fn locate(&self, kind: ContentKind, reference: &str) -> Result<PathBuf> {
        let rel = Path::new(reference);
        if reference.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::Resolution(format!(
                "invalid {} reference '{}': must be relative and stay inside {}/",
                kind.dir_name(),
                reference,
                kind.dir_name()
            )));
        }

        let path = self.root.join(kind.dir_name()).join(rel);
        if !path.is_file() {
            return Err(Error::Resolution(format!(
                "{} reference '{}' not found (looked in {})",
                kind.dir_name(),
                reference,
                path.display()
            )));
        }
        Ok(path)
    }

    /// Read the referenced bytes.
    pub fn read(&self, kind: ContentKind, reference: &str) -> Result<Vec<u8>> {
        let path = self.locate(kind, reference)?;
        std::fs::read(&path)
            .map_err(|e| Error::Resolution(format!("cannot read {}: {}", path.display(), e)))
    }

    /// Read a template as UTF-8 text.
    pub fn read_template(&self, reference: &str) -> Result<String> {
        let bytes = self.read(ContentKind::Template, reference)?;
        String::from_utf8(bytes).map_err(|_| {
            Error::Resolution(format!("template '{}' is not valid UTF-8", reference))
        })
    }
}
