//! One-shot messages carried across a redirect.

use serde::Serialize;
use std::fmt;

/// Flash message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashCategory {
    Success,
    Error,
}

impl fmt::Display for FlashCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashCategory::Success => write!(f, "success"),
            FlashCategory::Error => write!(f, "error"),
        }
    }
}

/// A message written by one request and read by the next render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub category: FlashCategory,
    pub text: String,
}

impl FlashMessage {
    /// Create a success message.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            category: FlashCategory::Success,
            text: text.into(),
        }
    }

    /// Create an error message.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            category: FlashCategory::Error,
            text: text.into(),
        }
    }
}

/// Success flash after a contact message was delivered.
pub const CONTACT_SENT: &str = "Thank you for your message! We will get back to you soon.";

/// Error flash after delivery failed for good.
pub const CONTACT_FAILED: &str =
    "There was an error sending your message. Please try again later.";
