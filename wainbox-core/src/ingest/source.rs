// src/ingest/source.rs

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tracing::debug;

use crate::Error;

/// One named unit of ingestion: a file, a webhook body, a queue entry.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Identifies the source in logs and reports.
    fn label(&self) -> &str;

    async fn read(&self) -> Result<Vec<u8>, Error>;
}

pub struct FileSource {
    path: PathBuf,
    label: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, label }
    }
}

#[async_trait]
impl PayloadSource for FileSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn read(&self) -> Result<Vec<u8>, Error> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

pub struct InlineSource {
    label: String,
    body: Vec<u8>,
}

impl InlineSource {
    pub fn new(label: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
impl PayloadSource for InlineSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn read(&self) -> Result<Vec<u8>, Error> {
        Ok(self.body.clone())
    }
}

/// Every `*.json` file directly inside `dir`, sorted by file name.
pub async fn sources_from_dir(dir: &Path) -> Result<Vec<Box<dyn PayloadSource>>, Error> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    debug!("Found {} payload file(s) in {}", paths.len(), dir.display());

    Ok(paths
        .into_iter()
        .map(|p| Box::new(FileSource::new(p)) as Box<dyn PayloadSource>)
        .collect())
}
