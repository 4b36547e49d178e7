//! Filesystem collaborators: note access and media resolution relative to a
//! vault root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use ankimark_core::{MediaResolver, NoteContext, Result as CoreResult, SyncError};

pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vault".to_string())
    }

    /// Snapshot the note and derive its vault-relative origin metadata.
    pub fn note_context(&self, file: &Path) -> Result<NoteContext> {
        let text = fs::read_to_string(file)
            .with_context(|| format!("reading note {}", file.display()))?;
        let relative = file.strip_prefix(&self.root).unwrap_or(file);
        let source_path = path_str(relative);
        let folder_path = relative
            .parent()
            .map(path_str)
            .filter(|folder| !folder.is_empty());
        Ok(NoteContext {
            text,
            source_path,
            vault_name: self.name(),
            folder_path,
        })
    }

    pub fn write_note(&self, file: &Path, text: &str) -> Result<()> {
        fs::write(file, text).with_context(|| format!("writing note {}", file.display()))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Resolves embeds next to the note first, then from the vault root.
pub struct VaultMediaResolver {
    root: PathBuf,
}

impl VaultMediaResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MediaResolver for VaultMediaResolver {
    fn resolve(&self, name: &str, source_path: &str) -> CoreResult<Option<Vec<u8>>> {
        let mut candidates = Vec::with_capacity(2);
        if let Some(parent) = Path::new(source_path).parent() {
            candidates.push(self.root.join(parent).join(name));
        }
        candidates.push(self.root.join(name));
        for candidate in candidates {
            if candidate.is_file() {
                return fs::read(&candidate).map(Some).map_err(|_| SyncError::MediaRead {
                    name: name.to_string(),
                });
            }
        }
        Ok(None)
    }
}
