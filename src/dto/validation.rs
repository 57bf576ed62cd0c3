//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_USERNAME_LEN: usize = 64;

/// Validates that a chat username is non-blank, at most 64 characters and free of whitespace.
///
/// # Examples
///
/// ```ignore
/// validate_username("some_viewer") // Ok
/// validate_username("two words")   // Err - whitespace
/// validate_username("   ")         // Err - blank
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("Username must not be blank".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_USERNAME_LEN {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be at most {MAX_USERNAME_LEN} characters").into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("username_format");
        err.message = Some("Username must not contain whitespace".into());
        return Err(err);
    }

    Ok(())
}
