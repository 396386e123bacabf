//! Form input checks that run before anything is submitted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_INGREDIENT_NAME_CHARS: usize = 3;
pub const MAX_INGREDIENT_NAME_CHARS: usize = 50;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_PASSWORD_CHARS: usize = 20;
pub const MIN_PROMPT_CHARS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Error)]
#[error("{}", join_fields(.0))]
pub struct ValidationErrors(Vec<FieldError>);

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// First message for a field, for rendering next to the input.
    pub fn message_for(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    min: usize,
    max: Option<usize>,
) {
    let count = value.chars().count();
    if count < min {
        errors.push(field, format!("Needs at least {min} characters"));
    } else if let Some(max) = max {
        if count > max {
            errors.push(field, format!("Needs at most {max} characters"));
        }
    }
}

pub fn validate_ingredient_name(name: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_length(
        &mut errors,
        "newIngredientName",
        name,
        MIN_INGREDIENT_NAME_CHARS,
        Some(MAX_INGREDIENT_NAME_CHARS),
    );
    errors.into_result()
}

pub fn validate_notes(notes: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if notes.is_empty() {
        errors.push("notes", "Notes cannot be empty");
    }
    errors.into_result()
}

pub fn validate_prompt(message: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    check_length(&mut errors, "message", message, MIN_PROMPT_CHARS, None);
    errors.into_result()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !looks_like_email(&self.email) {
            errors.push("email", "Invalid email");
        }
        check_length(
            &mut errors,
            "password",
            &self.password,
            MIN_PASSWORD_CHARS,
            Some(MAX_PASSWORD_CHARS),
        );
        errors.into_result()
    }

    /// Accounts are keyed by the lower-cased e-mail address.
    pub fn username(&self) -> String {
        self.email.to_lowercase()
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingredient_name_bounds() {
        assert!(validate_ingredient_name("ab").is_err());
        assert!(validate_ingredient_name("egg").is_ok());
        assert!(validate_ingredient_name(&"x".repeat(50)).is_ok());

        let errors = validate_ingredient_name(&"x".repeat(51)).unwrap_err();
        assert_eq!(
            errors.message_for("newIngredientName"),
            Some("Needs at most 50 characters")
        );
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // three characters, nine bytes
        assert!(validate_ingredient_name("日本語").is_ok());
    }

    #[test]
    fn test_notes_required() {
        assert!(validate_notes("").is_err());
        assert!(validate_notes("less salt").is_ok());
    }

    #[test]
    fn test_sign_up_reports_every_field() {
        let input = SignUp {
            email: "not-an-email".into(),
            password: "123".into(),
        };
        let errors = input.validate().unwrap_err();
        assert_eq!(errors.message_for("email"), Some("Invalid email"));
        assert_eq!(errors.message_for("password"), Some("Needs at least 6 characters"));
        assert_eq!(errors.to_string(), "email: Invalid email; password: Needs at least 6 characters");
    }

    #[test]
    fn test_errors_chain_as_std_error() {
        let errors = validate_notes("").unwrap_err();
        let boxed: Box<dyn std::error::Error> = Box::new(errors);
        assert_eq!(boxed.to_string(), "notes: Notes cannot be empty");
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_sign_up_username_is_lowercased() {
        let input = SignUp {
            email: "Cook@Example.com".into(),
            password: "secret1".into(),
        };
        assert!(input.validate().is_ok());
        assert_eq!(input.username(), "cook@example.com");
    }

    #[test]
    fn test_prompt_minimum() {
        assert!(validate_prompt("soup").is_err());
        assert!(validate_prompt("a vegan soup").is_ok());
    }
}
