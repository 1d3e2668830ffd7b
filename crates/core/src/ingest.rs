use crate::IngestError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Flat directory of uploaded PDFs, keyed by their upload file name.
#[derive(Debug, Clone)]
pub struct PdfStorage {
    dir: PathBuf,
}

impl PdfStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `payload` to `<dir>/<filename>`, replacing any file of the same
    /// name, and returns the written path.
    pub fn store(&self, payload: &[u8], filename: &str) -> Result<PathBuf, IngestError> {
        validate_file_name(filename)?;
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(filename);
        fs::write(&path, payload)?;

        info!(path = %path.display(), bytes = payload.len(), "stored upload");
        Ok(path)
    }

    /// Copies a local file into storage under its own file name.
    pub fn store_file(&self, source: &Path) -> Result<PathBuf, IngestError> {
        let filename = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(source.display().to_string()))?;
        let payload = fs::read(source)?;
        self.store(&payload, filename)
    }

    pub fn list(&self) -> Vec<PathBuf> {
        discover_pdf_files(&self.dir)
    }
}

fn validate_file_name(filename: &str) -> Result<(), IngestError> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(IngestError::InvalidFileName(filename.to_string())),
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    debug!(folder = %folder.display(), count = files.len(), "discovered pdf files");
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::{digest_file, discover_pdf_files, PdfStorage};
    use crate::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn store_creates_missing_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = PdfStorage::new(dir.path().join("pdfs"));

        let path = storage.store(b"%PDF-1.4\n%fake", "a.pdf")?;

        assert_eq!(path, dir.path().join("pdfs").join("a.pdf"));
        assert_eq!(fs::read(&path)?, b"%PDF-1.4\n%fake");
        Ok(())
    }

    #[test]
    fn storing_same_name_twice_keeps_last_payload() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = PdfStorage::new(dir.path());

        storage.store(b"first upload, longer payload", "a.pdf")?;
        let path = storage.store(b"second", "a.pdf")?;

        assert_eq!(fs::read(&path)?, b"second");
        assert_eq!(storage.list().len(), 1);
        Ok(())
    }

    #[test]
    fn store_rejects_names_that_leave_the_directory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let storage = PdfStorage::new(dir.path().join("pdfs"));

        for name in ["../escape.pdf", "nested/a.pdf", "", "..", "/abs.pdf"] {
            let result = storage.store(b"x", name);
            assert!(
                matches!(result, Err(IngestError::InvalidFileName(_))),
                "{name:?} should be rejected"
            );
        }
        assert!(!dir.path().join("escape.pdf").exists());
        Ok(())
    }

    #[test]
    fn store_file_uses_source_file_name() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let local = dir.path().join("report.pdf");
        fs::write(&local, b"%PDF-1.4")?;
        let storage = PdfStorage::new(dir.path().join("pdfs"));

        let stored = storage.store_file(&local)?;

        assert_eq!(stored.file_name().and_then(|n| n.to_str()), Some("report.pdf"));
        assert_eq!(fs::read(stored)?, b"%PDF-1.4");
        Ok(())
    }

    #[test]
    fn discover_pdf_files_is_recursive_and_case_insensitive(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        fs::write(dir.path().join("a.pdf"), b"%PDF-1.4")?;
        fs::write(nested.join("B.PDF"), b"%PDF-1.4")?;
        fs::write(dir.path().join("notes.txt"), b"ignored")?;

        let files = discover_pdf_files(dir.path());
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.pdf");
        fs::write(&file_path, b"abc")?;

        let first = digest_file(&file_path)?;
        let second = digest_file(&file_path)?;
        assert_eq!(first, second);
        assert_eq!(
            first,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }
}
