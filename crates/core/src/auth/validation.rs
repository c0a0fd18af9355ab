use super::AuthError;

/// bcrypt only looks at the first 72 bytes of a password.
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Validates a `return_to` value to prevent open redirects.
///
/// Accepts only same-origin relative paths: a single leading `/`, no
/// backslashes (browsers read `/\` as `//`), no control characters and no
/// embedded scheme.
///
/// ```
/// use trailsync_core::auth::validate_return_to;
///
/// assert_eq!(validate_return_to("/activities?page=2"), Some("/activities?page=2"));
/// assert_eq!(validate_return_to("//evil.com"), None);
/// assert_eq!(validate_return_to("https://evil.com"), None);
/// ```
pub fn validate_return_to(url: &str) -> Option<&str> {
    if !url.starts_with('/') || url.starts_with("//") {
        return None;
    }

    if url.chars().any(|c| c.is_control() || c == '\\') || url.contains("://") {
        return None;
    }

    Some(url)
}

/// Usernames are 3..=64 characters of ASCII letters, digits, `.`, `_` or `-`.
pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    if !(3..=64).contains(&len) {
        return Err(AuthError::InvalidUsername(
            "must be between 3 and 64 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(AuthError::InvalidUsername(
            "only letters, digits, '.', '_' and '-' are allowed".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AuthError::InvalidPassword(format!(
            "must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::InvalidPassword(format!(
            "must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }

    Ok(())
}
