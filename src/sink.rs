use crate::model::{CapturedCase, Document, DocumentKind};
use crate::util::{ensure_dir, file_component, now_rfc3339, sha256_hex};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Destination for captured cases. Returns an identifier for the stored case.
pub trait CaseSink: Send {
    fn store(&mut self, case: &CapturedCase, documents: &[Document]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct DocumentEntry<'a> {
    file_name: &'a str,
    kind: DocumentKind,
    bytes: usize,
    sha256: String,
}

#[derive(Debug, Serialize)]
struct StoredCase<'a> {
    id: &'a str,
    stored_at: String,
    case: &'a CapturedCase,
    documents: Vec<DocumentEntry<'a>>,
}

/// One pretty-printed JSON file per case under `<dir>/`.
pub struct JsonDirSink {
    dir: PathBuf,
    stored: usize,
}

impl JsonDirSink {
    pub fn new(dir: &Path) -> Result<Self> {
        ensure_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            stored: 0,
        })
    }

    pub fn stored(&self) -> usize {
        self.stored
    }
}

impl CaseSink for JsonDirSink {
    fn store(&mut self, case: &CapturedCase, documents: &[Document]) -> Result<String> {
        let id = format!(
            "case_{:04}_{}",
            self.stored + 1,
            file_component(&case.row.serial)
        );
        let record = StoredCase {
            id: &id,
            stored_at: now_rfc3339(),
            case,
            documents: documents
                .iter()
                .map(|d| DocumentEntry {
                    file_name: &d.file_name,
                    kind: d.kind,
                    bytes: d.bytes.len(),
                    sha256: sha256_hex(&d.bytes),
                })
                .collect(),
        };
        let path = self.dir.join(format!("{id}.json"));
        std::fs::write(&path, serde_json::to_string_pretty(&record)?)
            .with_context(|| format!("writing {}", path.display()))?;
        self.stored += 1;
        Ok(id)
    }
}
