//! Verified identity produced by a successful OAuth exchange

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::error::AuthError;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("static regex")
});

/// Well-known placeholder addresses that never identify a real person
const PLACEHOLDER_EMAILS: &[&str] = &["test@test.com", "fake@fake.com", "example@example.com"];

/// Identity asserted by the provider after a successful exchange
///
/// Immutable once built; the fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityAssertion {
    subject_email: String,
    display_name: String,
    avatar_ref: Option<Url>,
}

impl IdentityAssertion {
    /// Build an assertion, validating the email
    ///
    /// An empty display name falls back to the local part of the email.
    /// An avatar that is not an absolute URL is dropped.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::ExchangeFailed` when the email is malformed or a
    /// placeholder address.
    pub fn new(
        subject_email: &str,
        display_name: Option<&str>,
        avatar_ref: Option<&str>,
    ) -> Result<Self, AuthError> {
        let email = subject_email.trim().to_lowercase();
        validate_email(&email).map_err(|reason| {
            AuthError::ExchangeFailed(format!("provider returned {reason}"))
        })?;

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(
                || email.split('@').next().unwrap_or_default().to_string(),
                str::to_string,
            );

        let avatar_ref = avatar_ref.and_then(|a| Url::parse(a).ok());

        Ok(Self {
            subject_email: email,
            display_name,
            avatar_ref,
        })
    }

    /// Normalized (lowercase) email; the persistence key
    #[must_use]
    pub fn subject_email(&self) -> &str {
        &self.subject_email
    }

    /// Name to greet the person with
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Avatar picture, if the provider supplied a usable one
    #[must_use]
    pub fn avatar_ref(&self) -> Option<&Url> {
        self.avatar_ref.as_ref()
    }
}

/// Check an email for format and placeholder addresses
///
/// # Errors
///
/// Returns a short human-readable reason.
pub fn validate_email(email: &str) -> Result<(), &'static str> {
    if !EMAIL_PATTERN.is_match(email) {
        return Err("an invalid email format");
    }
    if PLACEHOLDER_EMAILS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(email))
    {
        return Err("a placeholder email address");
    }
    Ok(())
}
