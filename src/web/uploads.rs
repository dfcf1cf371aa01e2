use std::collections::HashMap;

use axum::{
    Json, async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use mime::Mime;
use serde::de::DeserializeOwned;

use crate::web::ApiError;

/// Result type used by the shared upload helpers.
pub type UploadResult<T> = Result<T, UploadError>;

/// Error returned when validating uploaded form data.
#[derive(Debug)]
pub struct UploadError {
    message: String,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for UploadError {}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::BadRequest(err.message)
    }
}

/// Expectations for a single multipart file field.
#[derive(Debug, Clone, Copy)]
pub struct FileFieldConfig<'a> {
    pub field_name: &'a str,
    pub max_files: usize,
    pub min_files: usize,
}

impl<'a> FileFieldConfig<'a> {
    /// An optional single-file field.
    pub fn optional(field_name: &'a str) -> Self {
        Self {
            field_name,
            max_files: 1,
            min_files: 0,
        }
    }

    pub fn with_min_files(mut self, min_files: usize) -> Self {
        self.min_files = min_files;
        self
    }
}

/// A file part held in memory for the lifetime of the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub original_name: String,
    /// Sanitized name safe to echo back to clients and logs.
    pub display_name: String,
    pub bytes: Vec<u8>,
}

/// Aggregated output of the shared form reader.
#[derive(Debug, Default)]
pub struct SubmissionForm {
    pub files: Vec<UploadedFile>,
    pub text_fields: HashMap<String, Vec<String>>,
}

impl SubmissionForm {
    pub fn take_file(&mut self, field_name: &str) -> Option<UploadedFile> {
        let idx = self
            .files
            .iter()
            .position(|file| file.field_name == field_name)?;
        Some(self.files.remove(idx))
    }

    /// First value of a text field, trimmed; blank values count as absent.
    pub fn first_text(&self, field_name: &str) -> Option<&str> {
        self.text_fields
            .get(field_name)
            .and_then(|values| values.first())
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// Parses multipart form data, buffering files according to the provided configuration.
pub async fn read_submission_form(
    mut multipart: Multipart,
    field_configs: &[FileFieldConfig<'_>],
) -> UploadResult<SubmissionForm> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for config in field_configs {
        if config.min_files > config.max_files {
            return Err(UploadError::new(format!(
                "field `{}` requires more files than it allows",
                config.field_name
            )));
        }
        counts.insert(config.field_name, 0);
    }

    let mut form = SubmissionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| UploadError::new(format!("failed to parse form: {err}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        let file_name = match field.file_name().map(str::to_string) {
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| UploadError::new(format!("failed to read field `{field_name}`: {err}")))?;
                form.text_fields.entry(field_name).or_default().push(value);
                continue;
            }
            // Browsers send an empty file part when nothing was selected.
            Some(name) if name.is_empty() => continue,
            Some(name) => name,
        };

        let Some(config) = field_configs
            .iter()
            .find(|config| config.field_name == field_name)
        else {
            return Err(UploadError::new(format!(
                "unsupported file field: `{field_name}`"
            )));
        };

        let count = counts.entry(config.field_name).or_default();
        if *count >= config.max_files {
            return Err(UploadError::new(format!(
                "field `{}` accepts at most {} file(s)",
                config.field_name, config.max_files
            )));
        }
        *count += 1;

        let bytes = field
            .bytes()
            .await
            .map_err(|err| UploadError::new(format!("failed to read upload data: {err}")))?;

        let mut display_name = sanitize_filename::sanitize(&file_name);
        if display_name.is_empty() {
            display_name = format!("upload_{}", form.files.len());
        }

        form.files.push(UploadedFile {
            field_name: config.field_name.to_string(),
            original_name: file_name,
            display_name,
            bytes: bytes.to_vec(),
        });
    }

    for config in field_configs {
        let count = counts.get(config.field_name).copied().unwrap_or_default();
        if count < config.min_files {
            return Err(UploadError::new(format!(
                "field `{}` requires at least {} file(s)",
                config.field_name, config.min_files
            )));
        }
    }

    Ok(form)
}

/// A body that may arrive as JSON or as a multipart form.
pub enum JsonOrMultipart<T> {
    Json(T),
    Multipart(Multipart),
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrMultipart<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Mime>().ok())
            .is_some_and(|parsed| {
                parsed.type_() == mime::MULTIPART && parsed.subtype() == mime::FORM_DATA
            });

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
            return Ok(Self::Multipart(multipart));
        }

        let Json(body) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Self::Json(body))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{Part, multipart_body, multipart_content_type};
    use super::*;
    use axum::body::Body;

    async fn multipart_from(parts: &[Part<'_>]) -> Multipart {
        let request = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, multipart_content_type())
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        Multipart::from_request(request, &()).await.unwrap()
    }

    #[tokio::test]
    async fn collects_text_fields_and_files() {
        let multipart = multipart_from(&[
            Part::Text("task_type", "code"),
            Part::File("file", "../../etc/main.rs", b"fn main() {}"),
        ])
        .await;

        let mut form = read_submission_form(multipart, &[FileFieldConfig::optional("file")])
            .await
            .unwrap();

        assert_eq!(form.first_text("task_type"), Some("code"));
        let file = form.take_file("file").unwrap();
        assert_eq!(file.original_name, "../../etc/main.rs");
        assert!(!file.display_name.contains('/'));
        assert_eq!(file.bytes, b"fn main() {}");
        assert!(form.take_file("file").is_none());
    }

    #[tokio::test]
    async fn missing_required_file_is_rejected() {
        let multipart = multipart_from(&[Part::Text("task_type", "essay")]).await;
        let err = read_submission_form(
            multipart,
            &[FileFieldConfig::optional("file").with_min_files(1)],
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[tokio::test]
    async fn too_many_files_are_rejected() {
        let multipart = multipart_from(&[
            Part::File("file", "a.txt", b"a"),
            Part::File("file", "b.txt", b"b"),
        ])
        .await;
        let err = read_submission_form(multipart, &[FileFieldConfig::optional("file")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at most 1"));
    }

    #[tokio::test]
    async fn unknown_file_field_is_rejected() {
        let multipart = multipart_from(&[Part::File("attachment", "a.txt", b"a")]).await;
        let err = read_submission_form(multipart, &[FileFieldConfig::optional("file")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported file field"));
    }

    #[tokio::test]
    async fn empty_file_part_counts_as_absent() {
        let multipart = multipart_from(&[Part::File("file", "", b""), Part::Text("text", " ")]).await;
        let mut form = read_submission_form(multipart, &[FileFieldConfig::optional("file")])
            .await
            .unwrap();
        assert!(form.take_file("file").is_none());
        assert_eq!(form.first_text("text"), None);
    }
}
