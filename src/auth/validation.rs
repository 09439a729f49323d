//! Request field rules for registration and password changes.

use super::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 128;
pub const MAX_FULL_NAME_LENGTH: usize = 100;
pub const MAX_PHONE_LENGTH: usize = 32;
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Canonical form used for every email lookup and insert.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Expects an already normalized address.
pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() {
        return Err(AuthError::validation("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AuthError::validation("Email is too long"));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AuthError::validation("Email cannot contain whitespace"));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::validation("Invalid email address"));
    };
    if local.is_empty() || domain.contains('@') {
        return Err(AuthError::validation("Invalid email address"));
    }
    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(AuthError::validation("Invalid email domain"));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(AuthError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(AuthError::validation(format!(
            "Password cannot be longer than {} characters",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_full_name(full_name: &str) -> Result<(), AuthError> {
    if full_name.trim().is_empty() {
        return Err(AuthError::validation("Full name cannot be empty"));
    }
    if full_name.chars().count() > MAX_FULL_NAME_LENGTH {
        return Err(AuthError::validation(format!(
            "Full name cannot be longer than {} characters",
            MAX_FULL_NAME_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), AuthError> {
    if phone.trim().is_empty() {
        return Err(AuthError::validation("Phone cannot be empty"));
    }
    if phone.chars().count() > MAX_PHONE_LENGTH {
        return Err(AuthError::validation(format!(
            "Phone cannot be longer than {} characters",
            MAX_PHONE_LENGTH
        )));
    }
    Ok(())
}
