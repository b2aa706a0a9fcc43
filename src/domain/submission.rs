//! Typed submissions and the notification jobs built from them.

use crate::domain::validation::{
    CleanFields, FieldSpec, Predicate, RawForm, RuleSet, ValidationErrorMap,
};
use std::sync::OnceLock;

/// Message shown when the contact message length is out of bounds.
pub const MESSAGE_LENGTH_ERROR: &str = "Message must be between 10 and 500 characters.";

/// Message shown when a single-line field carries control characters.
pub const CONTROL_CHARACTER_ERROR: &str = "Please remove line breaks and control characters.";

/// Name and subject end up in mail header values.
fn single_line(value: &str) -> bool {
    !value.chars().any(char::is_control)
}

/// A validated, sanitized contact form submission.
///
/// Every text field has been trimmed and markup-escaped; `email` is in
/// canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPayload {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl ContactPayload {
    /// The contact form rules, in field order.
    pub fn rules() -> &'static RuleSet {
        static RULES: OnceLock<RuleSet> = OnceLock::new();
        RULES.get_or_init(|| {
            RuleSet::new()
                .field(
                    FieldSpec::new("name")
                        .length(2, 100, "Name must be between 2 and 100 characters.")
                        .rule(Predicate::Custom(single_line), CONTROL_CHARACTER_ERROR)
                        .escape(),
                )
                .field(
                    FieldSpec::new("email")
                        .email("Please enter a valid email address.")
                        .normalize_email(),
                )
                .field(
                    FieldSpec::new("subject")
                        .length(
                            1,
                            150,
                            "Subject is required and must be less than 150 characters.",
                        )
                        .rule(Predicate::Custom(single_line), CONTROL_CHARACTER_ERROR)
                        .escape(),
                )
                .field(
                    FieldSpec::new("message")
                        .length(10, 500, MESSAGE_LENGTH_ERROR)
                        .escape(),
                )
        })
    }

    /// Validate a raw form into a contact payload.
    pub fn validate(raw: &RawForm) -> Result<Self, ValidationErrorMap> {
        Self::rules().validate(raw).map(Self::from_clean)
    }

    fn from_clean(mut clean: CleanFields) -> Self {
        let mut take = |field: &str| clean.remove(field).unwrap_or_default();
        Self {
            name: take("name"),
            email: take("email"),
            subject: take("subject"),
            message: take("message"),
        }
    }
}

/// Message shown when a comment is blank.
pub const COMMENT_EMPTY_ERROR: &str = "Message cannot be empty";

/// A validated comment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPayload {
    pub message: String,
}

impl CommentPayload {
    /// The comment box rules.
    pub fn rules() -> &'static RuleSet {
        static RULES: OnceLock<RuleSet> = OnceLock::new();
        RULES.get_or_init(|| {
            RuleSet::new().field(
                FieldSpec::new("message")
                    .rule(Predicate::NotEmpty, COMMENT_EMPTY_ERROR)
                    .length(1, 500, "Message must be at most 500 characters.")
                    .escape(),
            )
        })
    }

    /// Validate a raw form into a comment payload.
    pub fn validate(raw: &RawForm) -> Result<Self, ValidationErrorMap> {
        Self::rules().validate(raw).map(|mut clean| Self {
            message: clean.remove("message").unwrap_or_default(),
        })
    }
}

/// An outbound notification.
///
/// Built from a validated payload, handed to the dispatcher, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    pub recipient: String,
    pub reply_to: String,
    pub subject: String,
    pub body: String,
}

impl DispatchJob {
    /// Build the operator notification for a contact submission.
    pub fn for_contact(recipient: &str, payload: &ContactPayload) -> Self {
        Self {
            recipient: recipient.to_string(),
            reply_to: format!("\"{}\" <{}>", payload.name, payload.email),
            subject: format!("Contact Form Submission: {}", payload.subject),
            body: format!(
                "You have a new contact form submission.\n\n\
                 Name: {}\n\
                 Email: {}\n\
                 Subject: {}\n\
                 Message:\n{}\n",
                payload.name, payload.email, payload.subject, payload.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_form() -> RawForm {
        RawForm::new()
            .with("name", "Ann Lee")
            .with("email", "ann@example.com")
            .with("subject", "Hi")
            .with("message", "This is a sufficiently long message.")
    }

    #[test]
    fn test_valid_contact() {
        let payload = ContactPayload::validate(&valid_form()).unwrap();
        assert_eq!(payload.name, "Ann Lee");
        assert_eq!(payload.subject, "Hi");
    }

    #[test]
    fn test_message_bounds() {
        for (len, ok) in [(9, false), (10, true), (500, true), (501, false)] {
            let form = valid_form().with("message", "m".repeat(len));
            let result = ContactPayload::validate(&form);
            assert_eq!(result.is_ok(), ok, "length {len}");
            if let Err(errors) = result {
                assert_eq!(errors.get("message"), Some(MESSAGE_LENGTH_ERROR));
                assert_eq!(errors.len(), 1);
            }
        }
    }

    #[test]
    fn test_name_and_subject_bounds() {
        let form = valid_form().with("name", "A").with("subject", "s".repeat(151));
        let errors = ContactPayload::validate(&form).unwrap_err();
        assert_eq!(
            errors.get("name"),
            Some("Name must be between 2 and 100 characters.")
        );
        assert!(errors.get("subject").is_some());
    }

    #[test]
    fn test_line_breaks_rejected_in_header_fields() {
        let form = valid_form()
            .with("name", "Ann\r\nBcc: victim@example.com")
            .with("subject", "Hi\nthere");
        let errors = ContactPayload::validate(&form).unwrap_err();
        assert_eq!(errors.get("name"), Some(CONTROL_CHARACTER_ERROR));
        assert_eq!(errors.get("subject"), Some(CONTROL_CHARACTER_ERROR));

        // The message body is free text
        let form = valid_form().with("message", "Line one\nline two is here.");
        assert!(ContactPayload::validate(&form).is_ok());
    }

    #[test]
    fn test_markup_is_escaped() {
        let form = valid_form().with("message", "<script>alert(1)</script>");
        let payload = ContactPayload::validate(&form).unwrap();
        assert!(!payload.message.contains('<'));
        assert!(payload.message.starts_with("&lt;script&gt;"));
    }

    #[test]
    fn test_blank_comment() {
        let errors = CommentPayload::validate(&RawForm::new().with("message", "   ")).unwrap_err();
        assert_eq!(errors.get("message"), Some(COMMENT_EMPTY_ERROR));
    }

    #[test]
    fn test_contact_job_contents() {
        let payload = ContactPayload::validate(&valid_form()).unwrap();
        let job = DispatchJob::for_contact("owner@example.com", &payload);

        assert_eq!(job.recipient, "owner@example.com");
        assert_eq!(job.subject, "Contact Form Submission: Hi");
        assert_eq!(job.reply_to, "\"Ann Lee\" <ann@example.com>");
        assert!(job.body.contains("Message:\nThis is a sufficiently long message."));
    }
}
