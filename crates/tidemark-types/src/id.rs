//! Identifier and key validation.
//!
//! Identifiers are externally assigned and opaque. The only structural rule
//! is that neither identifiers nor property keys may be empty.

use crate::error::TypeError;

/// Reject empty identifiers.
pub fn validate_id(id: &str) -> Result<(), TypeError> {
    if id.is_empty() {
        return Err(TypeError::EmptyId);
    }
    Ok(())
}

/// Reject empty property keys. `id` is only used for the error message.
pub fn validate_key(id: &str, key: &str) -> Result<(), TypeError> {
    if key.is_empty() {
        return Err(TypeError::EmptyKey(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_rejected() {
        assert_eq!(validate_id(""), Err(TypeError::EmptyId));
    }

    #[test]
    fn uri_like_ids_accepted() {
        assert!(validate_id("file:/tmp/a.txt").is_ok());
        assert!(validate_id("imap://user@host/INBOX;UID=7").is_ok());
        assert!(validate_id(" ").is_ok());
    }

    #[test]
    fn empty_key_rejected_with_context() {
        let err = validate_key("file:/a", "").unwrap_err();
        assert_eq!(err, TypeError::EmptyKey("file:/a".into()));
        assert!(err.to_string().contains("file:/a"));
    }
}
