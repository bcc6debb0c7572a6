//! Upload staging and the registry of ingested files.

use crate::config::{self, Lookup};
use crate::database::VectorIndex;
use crate::document::DocumentFormat;
use crate::embeddings::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::rag::RagEngine;
use chrono::{DateTime, Utc};
use log::{info, warn};
use mime_guess::from_path;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_MAX_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory stored copies are written to
    pub dir: PathBuf,
    pub max_bytes: u64,
}

impl UploadConfig {
    pub fn from_lookup(lookup: Lookup) -> Result<Self> {
        Ok(UploadConfig {
            dir: PathBuf::from(config::string_or(lookup, "UPLOAD_DIR", "uploads")),
            max_bytes: config::parse_or(lookup, "UPLOAD_MAX_BYTES", DEFAULT_MAX_BYTES)?,
        })
    }
}

/// A stored upload
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub original_name: String,
    pub stored_name: String,
    pub path: PathBuf,
    pub mime_type: String,
    pub upload_time: DateTime<Utc>,
    pub size: u64,
    pub chunks: usize,
}

/// Reduce a file name to ASCII letters, digits, `.`, `-` and `_`.
///
/// Whitespace runs become a single `_`; leading and trailing dots and
/// underscores are dropped so the result can never name a hidden file.
pub fn sanitize_file_name(name: &str) -> String {
    let words: Vec<String> = name
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(*c, '.' | '-' | '_'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect();

    words.join("_").trim_matches(|c: char| c == '.' || c == '_').to_string()
}

pub struct UploadStore {
    config: UploadConfig,
    files: Vec<FileRecord>,
}

impl UploadStore {
    /// Create the store, making sure the upload directory exists
    pub fn new(config: UploadConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(UploadStore {
            config,
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Validate a file and copy it into the upload directory under a unique name.
    ///
    /// The record is not registered until [`UploadStore::commit`] is called.
    pub fn stage(&self, path: &Path) -> Result<FileRecord> {
        let raw_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RagError::extraction(path, "no file name"))?;

        let original_name = sanitize_file_name(raw_name);
        if original_name.is_empty() {
            return Err(RagError::extraction(path, "no usable characters in file name"));
        }
        DocumentFormat::from_path(Path::new(&original_name))?;

        let size = fs::metadata(path)?.len();
        if size > self.config.max_bytes {
            return Err(RagError::FileTooLarge {
                size,
                limit: self.config.max_bytes,
            });
        }

        let stored_name = format!("{}_{}", Uuid::new_v4(), original_name);
        let stored_path = self.config.dir.join(&stored_name);
        fs::copy(path, &stored_path)?;

        Ok(FileRecord {
            mime_type: from_path(&stored_path).first_or_octet_stream().to_string(),
            original_name,
            stored_name,
            path: stored_path,
            upload_time: Utc::now(),
            size,
            chunks: 0,
        })
    }

    pub fn commit(&mut self, record: FileRecord) {
        self.files.push(record);
    }

    /// Remove the stored copy of a staged file
    pub fn discard(&self, record: &FileRecord) -> Result<()> {
        fs::remove_file(&record.path)?;
        Ok(())
    }

    /// Registered uploads in upload order
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }
}

/// Stage a file, ingest the stored copy and register it.
///
/// When ingestion fails the stored copy is deleted and the registry is left
/// untouched.
pub async fn upload_document<E, I, G>(
    store: &mut UploadStore,
    engine: &RagEngine<E, I, G>,
    path: &Path,
) -> Result<FileRecord>
where
    E: EmbeddingProvider,
    I: VectorIndex,
    G: GenerationProvider,
{
    let mut record = store.stage(path)?;

    let metadata = HashMap::from([
        ("source".to_string(), record.original_name.clone()),
        ("original_name".to_string(), record.original_name.clone()),
        ("stored_name".to_string(), record.stored_name.clone()),
    ]);

    match engine.ingest(&record.path, metadata).await {
        Ok(chunks) => {
            record.chunks = chunks;
            info!("Uploaded {} ({} chunks)", record.original_name, chunks);
            store.commit(record.clone());
            Ok(record)
        }
        Err(e) => {
            if let Err(cleanup) = store.discard(&record) {
                warn!("Failed to remove {}: {}", record.path.display(), cleanup);
            }
            Err(e)
        }
    }
}
