use async_trait::async_trait;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

use crate::capabilities::{HttpClient, HttpError, HttpMethod, HttpRequest, ValidatedUrl};
use crate::MAX_IMAGE_BYTES;

pub const MAX_FILENAME_CHARS: usize = 255;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UploadError {
    #[error("Image size {size} bytes exceeds maximum of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("No image data")]
    EmptyInput,
    #[error("Unsupported image format")]
    UnsupportedFormat,
    #[error("Invalid file name '{name}': {reason}")]
    InvalidFilename { name: String, reason: String },
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("Upload response did not contain a URL")]
    MissingUrl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

/// Sniffs the image container from its magic bytes. Only formats every shell
/// can display are accepted.
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, UploadError> {
    if bytes.is_empty() {
        return Err(UploadError::EmptyInput);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }

    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => Ok(format),
        _ => Err(UploadError::UnsupportedFormat),
    }
}

pub fn validate_filename(name: &str) -> Result<(), UploadError> {
    let invalid = |reason: &str| UploadError::InvalidFilename {
        name: name.chars().take(50).collect(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("file name cannot be empty"));
    }
    if name.chars().count() > MAX_FILENAME_CHARS {
        return Err(invalid("file name is too long"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("file name cannot contain path separators"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("file name contains control characters"));
    }
    Ok(())
}

/// Stores an image somewhere the shell can load it from.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedAsset, UploadError>;
}

/// Posts raw image bytes to the asset endpoint.
#[derive(Clone)]
pub struct Uploader {
    client: HttpClient,
    upload_path: String,
    timeout: Duration,
}

impl Uploader {
    pub fn new(client: HttpClient, upload_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            upload_path: upload_path.into(),
            timeout,
        }
    }

    fn endpoint(&self, filename: &str) -> Result<ValidatedUrl, HttpError> {
        let mut url = self.client.base_url().join(&self.upload_path)?.to_url()?;
        url.query_pairs_mut().append_pair("filename", filename);
        ValidatedUrl::new(url.to_string())
    }
}

#[async_trait]
impl ImageUploader for Uploader {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedAsset, UploadError> {
        validate_filename(filename)?;
        let format = validate_image(&bytes)?;

        let request = HttpRequest::new(HttpMethod::Post, self.endpoint(filename)?)
            .with_header("Content-Type", format.to_mime_type())?
            .with_timeout(self.timeout)?
            .with_body(bytes)?;

        let response = self.client.send(request).await?;
        let body: UploadResponse = response.json()?;
        match body.url {
            Some(url) if !url.is_empty() => {
                info!(%url, "image uploaded");
                Ok(UploadedAsset { url })
            }
            _ => Err(UploadError::MissingUrl),
        }
    }
}
