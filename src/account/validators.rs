//! Format rules for the identity fields of a new account.

use std::sync::LazyLock;

use regex_lite::Regex;
use validator::ValidateEmail;

use crate::error::{AccountError, Result};

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 30;
pub const PASSWORD_MIN_LENGTH: usize = 2;
pub const PASSWORD_MAX_LENGTH: usize = 75;
pub const EMAIL_MIN_LENGTH: usize = 3;
pub const EMAIL_MAX_LENGTH: usize = 254;

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").unwrap());

/// Which bound a value length breaks.
enum Length {
    TooShort,
    TooLong,
}

fn check_length(value: &str, min: usize, max: usize) -> Option<Length> {
    match value.chars().count() {
        length if length < min => Some(Length::TooShort),
        length if length > max => Some(Length::TooLong),
        _ => None,
    }
}

/// Check that `username` has the right length and is slug-shaped.
pub fn validate_username(username: &str) -> Result<()> {
    match check_length(username, USERNAME_MIN_LENGTH, USERNAME_MAX_LENGTH) {
        Some(Length::TooShort) => {
            return Err(AccountError::UsernameInvalid(format!(
                "Username '{username}' must be at least {USERNAME_MIN_LENGTH} characters long"
            )));
        },
        Some(Length::TooLong) => {
            return Err(AccountError::UsernameInvalid(format!(
                "Username '{username}' must be at most {USERNAME_MAX_LENGTH} characters long"
            )));
        },
        None => {},
    }

    if !SLUG.is_match(username) {
        return Err(AccountError::UsernameInvalid(format!(
            "Username '{username}' must contain only A-Z, a-z, 0-9, -, or _ characters"
        )));
    }

    Ok(())
}

/// Check the length of `password` and that it differs from `username`.
pub fn validate_password(password: &str, username: &str) -> Result<()> {
    match check_length(password, PASSWORD_MIN_LENGTH, PASSWORD_MAX_LENGTH) {
        Some(Length::TooShort) => {
            return Err(AccountError::PasswordInvalid(format!(
                "Password must be at least {PASSWORD_MIN_LENGTH} characters long"
            )));
        },
        Some(Length::TooLong) => {
            return Err(AccountError::PasswordInvalid(format!(
                "Password must be at most {PASSWORD_MAX_LENGTH} characters long"
            )));
        },
        None => {},
    }

    if password == username {
        return Err(AccountError::PasswordInvalid(
            "Password cannot be the same as the username".to_owned(),
        ));
    }

    Ok(())
}

/// Check the length and syntax of `email`.
pub fn validate_email(email: &str) -> Result<()> {
    match check_length(email, EMAIL_MIN_LENGTH, EMAIL_MAX_LENGTH) {
        Some(Length::TooShort) => {
            return Err(AccountError::EmailInvalid(format!(
                "Email '{email}' must be at least {EMAIL_MIN_LENGTH} characters long"
            )));
        },
        Some(Length::TooLong) => {
            return Err(AccountError::EmailInvalid(format!(
                "Email '{email}' must be at most {EMAIL_MAX_LENGTH} characters long"
            )));
        },
        None => {},
    }

    if !email.validate_email() {
        return Err(AccountError::EmailInvalid(format!(
            "Email '{email}' format is not valid"
        )));
    }

    Ok(())
}
