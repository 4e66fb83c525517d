use anyhow::Context;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Builder;
use tokio::fs as async_fs;
use tracing::{debug, info};
use zstd::stream::write::Encoder as ZstdEncoder;

use crate::models::DocumentReport;

pub const HEATMAP_FILE_NAME: &str = "ela.png";
pub const REPORT_FILE_NAME: &str = "report.json";

/// Per-document folders holding the upload, its heatmap and the report
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_dir(&self, document_id: &str) -> anyhow::Result<PathBuf> {
        let valid = !document_id.is_empty()
            && document_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            anyhow::bail!("Invalid document id: {:?}", document_id);
        }
        Ok(self.root.join(document_id))
    }

    async fn write_file(&self, document_id: &str, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let dir = self.document_dir(document_id)?;
        async_fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create evidence directory {:?}", dir))?;
        let path = dir.join(file_name);
        async_fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        debug!(document_id, file = file_name, bytes = bytes.len(), "evidence stored");
        Ok(path)
    }

    /// Keep the upload as `original.<ext>`
    pub async fn store_upload(&self, document_id: &str, extension: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        self.write_file(document_id, &format!("original.{}", extension), bytes)
            .await
    }

    pub async fn store_heatmap(&self, document_id: &str, png: &[u8]) -> anyhow::Result<PathBuf> {
        self.write_file(document_id, HEATMAP_FILE_NAME, png).await
    }

    pub async fn store_report(&self, document_id: &str, report: &DocumentReport) -> anyhow::Result<PathBuf> {
        let json = serde_json::to_vec_pretty(report)?;
        self.write_file(document_id, REPORT_FILE_NAME, &json).await
    }

    pub async fn load_report(&self, document_id: &str) -> anyhow::Result<DocumentReport> {
        let path = self.document_dir(document_id)?.join(REPORT_FILE_NAME);
        let json = async_fs::read(&path)
            .await
            .with_context(|| format!("No stored report for document {}", document_id))?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Pack the document folder into a tar.zst archive at `out`
    pub fn export_bundle(&self, document_id: &str, out: &Path) -> anyhow::Result<()> {
        let dir = self.document_dir(document_id)?;
        if !dir.is_dir() {
            anyhow::bail!("No evidence stored for document {}", document_id);
        }
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(out).with_context(|| format!("Failed to create bundle {:?}", out))?;
        let encoder =
            ZstdEncoder::new(file, 3).with_context(|| format!("Failed to create zstd encoder for {:?}", out))?;

        let mut tar = Builder::new(encoder);
        tar.append_dir_all(document_id, &dir)
            .with_context(|| format!("Failed to add {:?} to tar", dir))?;

        let encoder = tar
            .into_inner()
            .with_context(|| format!("Failed to finalize tar for {:?}", out))?;
        encoder
            .finish()
            .with_context(|| format!("Failed to finalize zstd stream for {:?}", out))?;

        info!(document_id, bundle = %out.display(), "evidence bundle exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ids_cannot_escape_the_root() {
        let store = EvidenceStore::new("/srv/uploads");
        assert!(store.document_dir("../etc").is_err());
        assert!(store.document_dir("a/b").is_err());
        assert!(store.document_dir("").is_err());
        assert_eq!(
            store.document_dir("3f2a-11").unwrap(),
            PathBuf::from("/srv/uploads/3f2a-11")
        );
    }

    #[test]
    fn export_of_unknown_document_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = EvidenceStore::new(dir.path());
        assert!(store.export_bundle("missing", &dir.path().join("x.tar.zst")).is_err());
    }
}
