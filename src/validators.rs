//! Field validation run at every CRUD entry point, before the store is touched.

use crate::error::Error;
use crate::models::Status;

const NAME_MAX_LEN: usize = 256;
const DESCRIPTION_MAX_LEN: usize = 2000;

/// Trim and bound-check a `name` field.
pub fn name(value: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("name must not be empty".into()));
    }
    if trimmed.chars().count() > NAME_MAX_LEN {
        return Err(Error::Validation(format!(
            "name exceeds maximum length of {NAME_MAX_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Normalize an optional `description` field; an empty-after-trim string
/// collapses to `None`.
pub fn description(value: Option<&str>) -> Result<Option<String>, Error> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(Error::Validation(format!(
            "description exceeds maximum length of {DESCRIPTION_MAX_LEN} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Parse a status token, rejecting anything outside the closed set.
pub fn status(value: &str) -> Result<Status, Error> {
    Status::from_str(value)
        .ok_or_else(|| Error::Validation(format!("invalid status value: {value}")))
}

/// Bound-check an `order_index`.
pub fn order_index(value: i64) -> Result<i64, Error> {
    if value < 0 {
        return Err(Error::Validation(format!(
            "order_index must be >= 0, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_trims_and_rejects_empty() {
        assert_eq!(name("  Project  ").unwrap(), "Project");
        assert!(name("   ").is_err());
    }

    #[test]
    fn name_rejects_too_long() {
        let long = "x".repeat(257);
        assert!(name(&long).is_err());
        let ok = "x".repeat(256);
        assert!(name(&ok).is_ok());
    }

    #[test]
    fn description_normalizes_blank_to_none() {
        assert_eq!(description(Some("  ")).unwrap(), None);
        assert_eq!(description(None).unwrap(), None);
        assert_eq!(
            description(Some(" hi ")).unwrap(),
            Some("hi".to_string())
        );
    }

    #[test]
    fn description_rejects_too_long() {
        let long = "x".repeat(2001);
        assert!(description(Some(&long)).is_err());
    }

    #[test]
    fn status_accepts_only_closed_set() {
        assert_eq!(status("DONE").unwrap(), Status::Done);
        assert!(status("done").is_err());
        assert!(status("FINISHED").is_err());
    }

    #[test]
    fn order_index_rejects_negative() {
        assert!(order_index(-1).is_err());
        assert_eq!(order_index(0).unwrap(), 0);
    }
}
