//! Post and comment content rules.

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::domain::error::ValidationError;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

/// The literal placeholder some authors submit instead of writing anything.
/// Rejected as a content rule, not a structural one.
const PLACEHOLDER_TEXT: &str = "1";

/// Validate post body text, returning the trimmed form that gets stored.
pub fn validate_post_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("post text must not be empty"));
    }
    if trimmed == PLACEHOLDER_TEXT {
        return Err(ValidationError::new(
            "post text must contain an actual thought, not a placeholder",
        ));
    }
    Ok(trimmed.to_string())
}

/// Validate comment body text. Comments carry no placeholder guard.
pub fn validate_comment_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("comment text must not be empty"));
    }
    Ok(trimmed.to_string())
}

pub fn format_human_date(at: OffsetDateTime) -> String {
    at.date()
        .format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| at.date().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_text_is_rejected() {
        assert!(validate_post_text("1").is_err());
    }

    #[test]
    fn placeholder_text_is_rejected_after_trimming() {
        assert!(validate_post_text("1 ").is_err());
        assert!(validate_post_text("  1\n").is_err());
    }

    #[test]
    fn text_containing_the_placeholder_is_accepted() {
        assert_eq!(validate_post_text("11").unwrap(), "11");
        assert_eq!(validate_post_text(" 1 thought ").unwrap(), "1 thought");
    }

    #[test]
    fn validation_errors_expose_their_message() {
        let err = validate_post_text("").unwrap_err();
        assert_eq!(err.message(), "post text must not be empty");
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(validate_post_text("").is_err());
        assert!(validate_post_text("   \n\t").is_err());
    }

    #[test]
    fn comment_text_allows_the_placeholder() {
        assert_eq!(validate_comment_text("1").unwrap(), "1");
        assert!(validate_comment_text("  ").is_err());
    }
}
