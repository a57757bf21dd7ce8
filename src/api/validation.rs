use super::ApiError;

const MAX_USERNAME_LEN: usize = 50;

/// Path-parameter usernames; blank values are left to the service.
pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();

    if trimmed.len() > MAX_USERNAME_LEN {
        return Err(ApiError::validation(format!(
            "Username must be {MAX_USERNAME_LEN} characters or less"
        )));
    }

    if !trimmed
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, dots, hyphens, and underscores",
        ));
    }

    Ok(trimmed)
}

/// Shape check only. Blank values pass so required-field errors stay uniform.
pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Ok(trimmed);
    }

    let valid = trimmed
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@')
        })
        && !trimmed.chars().any(char::is_whitespace);

    if !valid {
        return Err(ApiError::validation("Invalid email address"));
    }

    Ok(trimmed)
}
