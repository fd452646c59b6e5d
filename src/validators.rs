/// Input validators for account registration
///
/// - Email: trimmed, length-bounded, RFC 5322 (simplified) format, stored lower-cased
/// - Username: trimmed, 3 to 32 characters from `[A-Za-z0-9_.-]`
///
/// Passwords are checked against the configured `PasswordPolicy` in
/// `auth::password`, not here.

use regex::Regex;
use lazy_static::lazy_static;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_LOCAL_PART_LENGTH: usize = 64;
const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 32;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap();
}

/// Validates an email address and returns its canonical (trimmed, lower-cased) form
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }

    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort("email".to_string(), MIN_EMAIL_LENGTH));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email".to_string(), MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) || has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_lowercase())
}

/// Validates a username and returns it trimmed; case is preserved
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    let length = trimmed.chars().count();
    if length < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort(
            "username".to_string(),
            MIN_USERNAME_LENGTH,
        ));
    }

    if length > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "username".to_string(),
            MAX_USERNAME_LENGTH,
        ));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(trimmed.to_string())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if email.matches('@').count() != 1 {
        return true;
    }

    if let Some(at_pos) = email.find('@') {
        if email[..at_pos].len() > MAX_LOCAL_PART_LENGTH {
            return true;
        }
    }

    email.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("user@example.com").is_ok());
        assert!(is_valid_email("test.email@domain.co.uk").is_ok());
        assert!(is_valid_email("user+tag@example.com").is_ok());
    }

    #[test]
    fn test_email_is_normalized() {
        assert_eq!(
            is_valid_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn test_invalid_email_format() {
        assert!(is_valid_email("invalid").is_err());
        assert!(is_valid_email("user@").is_err());
        assert!(is_valid_email("@example.com").is_err());
        assert!(is_valid_email("user@@example.com").is_err());
        assert!(is_valid_email("user@localhost").is_err());
    }

    #[test]
    fn test_email_length_limits() {
        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(matches!(
            is_valid_email(&too_long),
            Err(ValidationError::TooLong(_, MAX_EMAIL_LENGTH))
        ));

        let long_local_part = format!("{}@example.com", "a".repeat(65));
        assert!(is_valid_email(&long_local_part).is_err());

        assert!(is_valid_email("a@b.").is_err());
    }

    #[test]
    fn test_empty_email() {
        assert!(matches!(
            is_valid_email("   "),
            Err(ValidationError::EmptyField(_))
        ));
    }

    #[test]
    fn test_valid_username() {
        assert_eq!(is_valid_username("alice").unwrap(), "alice");
        assert_eq!(is_valid_username(" Bob_99 ").unwrap(), "Bob_99");
        assert!(is_valid_username("jean-pierre.x").is_ok());
        assert!(is_valid_username(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn test_username_length_limits() {
        assert!(matches!(
            is_valid_username("ab"),
            Err(ValidationError::TooShort(_, MIN_USERNAME_LENGTH))
        ));
        assert!(matches!(
            is_valid_username(&"a".repeat(33)),
            Err(ValidationError::TooLong(_, MAX_USERNAME_LENGTH))
        ));
        assert!(matches!(
            is_valid_username(""),
            Err(ValidationError::EmptyField(_))
        ));
    }

    #[test]
    fn test_username_charset() {
        assert!(is_valid_username("john doe").is_err());
        assert!(is_valid_username("robert'); DROP").is_err());
        assert!(is_valid_username("name\0null").is_err());
        assert!(is_valid_username("émile").is_err());
    }
}
