//! The seam between an upload handler and the analysis.
//!
//! The handler owns wherever the uploaded bytes live (memory, a temp file)
//! and passes a handle in; the analysis never reaches for shared storage.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{analyze, JaError, JourneyAnalysis, Params};

pub trait UploadSource {
    /// Client-supplied file name, used only to pick the format.
    fn file_name(&self) -> &str;
    fn read_bytes(&self) -> Result<Cow<'_, [u8]>, JaError>;
}

#[derive(Clone, Debug)]
pub struct MemoryUpload {
    name: String,
    bytes: Vec<u8>,
}

impl MemoryUpload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl UploadSource for MemoryUpload {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Cow<'_, [u8]>, JaError> {
        Ok(Cow::Borrowed(&self.bytes))
    }
}

/// An upload already written to disk by the caller.
#[derive(Clone, Debug)]
pub struct FileUpload {
    path: PathBuf,
    name: String,
}

impl FileUpload {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UploadSource for FileUpload {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&self) -> Result<Cow<'_, [u8]>, JaError> {
        fs::read(&self.path)
            .map(Cow::Owned)
            .map_err(|source| JaError::Io {
                name: self.path.display().to_string(),
                source,
            })
    }
}

/// Read the upload through its handle and analyse it.
pub fn analyze_upload<S: UploadSource + ?Sized>(
    source: &S,
    params: &Params,
) -> Result<JourneyAnalysis, JaError> {
    let bytes = source.read_bytes()?;
    analyze(&bytes, source.file_name(), params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_upload_roundtrip() {
        let csv = "Time,Speed\n0,0\n10,36\n20,0\n";
        let upload = MemoryUpload::new("run.csv", csv.as_bytes().to_vec());
        let analysis = analyze_upload(&upload, &Params::default()).unwrap();
        assert_eq!(analysis.metrics.record_count, 3);
        assert_eq!(analysis.stops.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let upload = FileUpload::new("/nonexistent/journey_analyzer/run.csv");
        assert_eq!(upload.file_name(), "run.csv");
        assert!(matches!(
            analyze_upload(&upload, &Params::default()),
            Err(JaError::Io { .. })
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let upload = MemoryUpload::new("run.pdf", b"%PDF".to_vec());
        assert!(matches!(
            analyze_upload(&upload, &Params::default()),
            Err(JaError::Format(_))
        ));
    }
}
