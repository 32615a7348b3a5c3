
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::{Result, StudyError};

/// A lecture handed to the retrieval core: cache identity plus plain text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LectureDocument {
    pub identity: String,
    pub text: String,
}

/// Read a lecture file, extracting text from PDFs.
///
/// The identity defaults to the path as given, so the same path always maps
/// to the same cached store.
#[inline]
pub fn load_document(path: &Path, identity: Option<String>) -> Result<LectureDocument> {
    let bytes = fs::read(path).map_err(|e| {
        StudyError::InvalidArgument(format!("Failed to read {}: {e}", path.display()))
    })?;

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        extract_pdf(&bytes)?
    } else {
        String::from_utf8(bytes).map_err(|e| {
            StudyError::InvalidArgument(format!("{} is not UTF-8 text: {e}", path.display()))
        })?
    };

    if text.trim().is_empty() {
        warn!("No text extracted from {}", path.display());
        return Err(StudyError::InvalidArgument(format!(
            "Unable to extract content from {}; it might be image-based",
            path.display()
        )));
    }

    let identity = identity.unwrap_or_else(|| path.to_string_lossy().into_owned());
    debug!(
        "Loaded '{}' ({} words)",
        identity,
        text.split_whitespace().count()
    );

    Ok(LectureDocument { identity, text })
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| StudyError::InvalidArgument(format!("PDF extraction failed: {e}")))
}
