use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::{RpcError, RpcErrorCode};
use crate::capabilities::{HttpError, KvError};
use crate::upload::UploadError;
use crate::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    RateLimited,
    Storage,
    Serialization,
    ImageTooLarge,
    ImageFormatUnsupported,
    Internal,
    Unknown,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::Authorization => "FORBIDDEN",
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Storage => "STORAGE_ERROR",
            Self::Serialization => "SERIALIZATION_ERROR",
            Self::ImageTooLarge => "IMAGE_TOO_LARGE",
            Self::ImageFormatUnsupported => "IMAGE_FORMAT_UNSUPPORTED",
            Self::Internal => "INTERNAL_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Timeout | Self::RateLimited | Self::Storage => {
                ErrorSeverity::Transient
            }

            Self::Serialization | Self::Internal => ErrorSeverity::Fatal,

            Self::Authentication
            | Self::Authorization
            | Self::Validation
            | Self::NotFound
            | Self::Conflict
            | Self::ImageTooLarge
            | Self::ImageFormatUnsupported
            | Self::Unknown => ErrorSeverity::Permanent,
        }
    }

    /// Whether re-triggering the same action can succeed. Nothing is retried
    /// automatically; this only shapes the message shown to the user.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimited | Self::Storage
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    /// Text for a toast. Server-provided messages are shown as-is, matching
    /// how mutation failures are reported.
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network if self.message.is_empty() => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Storage => "Unable to save settings on this device.".into(),
            ErrorKind::Serialization | ErrorKind::Internal | ErrorKind::Unknown
                if self.message.is_empty() =>
            {
                "An unexpected error occurred. Please try again.".into()
            }
            _ => self.message.clone(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<RpcError> for AppError {
    fn from(e: RpcError) -> Self {
        let kind = match e.code {
            RpcErrorCode::BadRequest | RpcErrorCode::ParseError => ErrorKind::Validation,
            RpcErrorCode::Unauthorized => ErrorKind::Authentication,
            RpcErrorCode::Forbidden => ErrorKind::Authorization,
            RpcErrorCode::NotFound => ErrorKind::NotFound,
            RpcErrorCode::Conflict => ErrorKind::Conflict,
            RpcErrorCode::Timeout => ErrorKind::Timeout,
            RpcErrorCode::TooManyRequests => ErrorKind::RateLimited,
            RpcErrorCode::Network => ErrorKind::Network,
            RpcErrorCode::InternalServerError => ErrorKind::Internal,
            RpcErrorCode::Unknown => ErrorKind::Unknown,
        };
        AppError::new(kind, e.message).with_context("rpc_code", e.code.as_str())
    }
}

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        let kind = match &e {
            HttpError::Timeout { .. } => ErrorKind::Timeout,
            HttpError::ConnectionError { .. } | HttpError::Cancelled { .. } => ErrorKind::Network,
            HttpError::HttpStatus { status: 404, .. } => ErrorKind::NotFound,
            HttpError::HttpStatus { status: 409, .. } => ErrorKind::Conflict,
            HttpError::HttpStatus { status: 429, .. } => ErrorKind::RateLimited,
            HttpError::HttpStatus { status, .. } if (500..600).contains(status) => {
                ErrorKind::Internal
            }
            HttpError::InvalidResponse { .. } | HttpError::SerializationError { .. } => {
                ErrorKind::Serialization
            }
            _ => ErrorKind::Unknown,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<KvError> for AppError {
    fn from(e: KvError) -> Self {
        let kind = match &e {
            KvError::Serialization { .. } => ErrorKind::Serialization,
            KvError::InvalidKey { .. } | KvError::ValueTooLarge { .. } => ErrorKind::Validation,
            KvError::Storage { .. } => ErrorKind::Storage,
        };
        AppError::new(kind, e.to_string())
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooLarge { .. } => AppError::new(ErrorKind::ImageTooLarge, e.to_string()),
            UploadError::EmptyInput | UploadError::UnsupportedFormat => {
                AppError::new(ErrorKind::ImageFormatUnsupported, e.to_string())
            }
            UploadError::InvalidFilename { .. } => {
                AppError::new(ErrorKind::Validation, e.to_string())
            }
            UploadError::Http(inner) => inner.into(),
            UploadError::MissingUrl => {
                AppError::new(ErrorKind::Serialization, "Upload response did not contain a URL")
            }
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(e: ValidationErrors) -> Self {
        let mut error = AppError::new(ErrorKind::Validation, e.to_string());
        for field in e.iter() {
            error = error.with_context(field.field, field.message.clone());
        }
        error
    }
}
