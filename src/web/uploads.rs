// Ingress limits and file extraction for multipart requests.

use axum::extract::multipart::Field;

use super::api_response::ApiError;
use crate::core::ai::UploadedFile;

pub const MAX_FILES_PER_REQUEST: usize = 10;
pub const MAX_FILE_BYTES: usize = 25 * 1024 * 1024;
/// Room for every file at its cap plus the text fields.
pub const MAX_BODY_BYTES: usize = MAX_FILES_PER_REQUEST * MAX_FILE_BYTES + 1024 * 1024;

/// Buffers one file part, enforcing the per-file cap.
pub async fn read_file(field: Field<'_>) -> Result<UploadedFile, ApiError> {
    let name = field
        .file_name()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("file part is missing a file name".to_string()))?;
    let mime_type = field
        .content_type()
        .filter(|m| !m.is_empty() && *m != "application/octet-stream")
        .map(str::to_string)
        .unwrap_or_else(|| guess_mime(&name));

    let bytes = field.bytes().await?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest(format!("{} is empty", name)));
    }
    if bytes.len() > MAX_FILE_BYTES {
        return Err(ApiError::BadRequest(format!(
            "{} exceeds the {} MiB limit",
            name,
            MAX_FILE_BYTES / (1024 * 1024)
        )));
    }

    tracing::debug!(file = %name, size = bytes.len(), mime = %mime_type, "Received file");
    Ok(UploadedFile::new(name, mime_type, bytes.to_vec()))
}

/// Browsers often send `application/octet-stream`; the vendors want the real type.
pub fn guess_mime(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime("Syllabus.PDF"), "application/pdf");
        assert_eq!(guess_mime("notes.md"), "text/markdown");
        assert_eq!(
            guess_mime("week1.docx"),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(guess_mime("README"), "application/octet-stream");
    }
}
