//! Validation and persistence behind the CRUD routes

pub mod catalog;
pub mod deployments;
pub mod infrastructure;

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::ForgeError;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier regex"));

static EXTENSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]*$").expect("valid extension regex"));

/// `ValidationError` naming `field` when `value` is blank
pub(crate) fn require(value: &str, field: &str) -> Result<(), ForgeError> {
    if value.trim().is_empty() {
        return Err(ForgeError::ValidationError(format!("{} is required", field)));
    }
    Ok(())
}

/// Client-supplied ids end up in file names, so they are limited to
/// letters, digits, `_` and `-`
pub(crate) fn require_identifier(value: &str, field: &str) -> Result<(), ForgeError> {
    if !IDENTIFIER.is_match(value) {
        return Err(ForgeError::ValidationError(format!(
            "{} may only contain letters, digits, '_' and '-'",
            field
        )));
    }
    Ok(())
}

/// Normalize a file extension, rejecting anything but letters and digits
pub(crate) fn file_extension(value: &str) -> Result<String, ForgeError> {
    let extension = value.trim().trim_start_matches('.');
    if !EXTENSION.is_match(extension) {
        return Err(ForgeError::ValidationError(
            "extension may only contain letters and digits".to_string(),
        ));
    }
    Ok(extension.to_string())
}
