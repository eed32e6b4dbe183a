//! Validation rules for outbound messages.
//!
//! Every check is a pure function of the value being validated. A message
//! that passes [`Message::validate`] serializes to a payload the API accepts
//! structurally.

use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

use crate::{
    error::ValidationError,
    models::{Address, Attachment, Message},
};

/// Maximum length of the local part (before `@`).
pub const MAX_LOCAL_PART_LEN: usize = 64;

/// Maximum length of the domain part (after `@`).
pub const MAX_DOMAIN_LEN: usize = 253;

/// Maximum length of a complete address.
pub const MAX_ADDRESS_LEN: usize = 254;

static LOCAL_PART: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*$").ok()
});

static DOMAIN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").ok()
});

fn is_match(pattern: &LazyLock<Option<Regex>>, text: &str) -> bool {
    Option::as_ref(pattern).is_some_and(|regex| regex.is_match(text))
}

/// Checks a bare email string against the address invariants.
///
/// # Errors
///
/// Returns a human-readable reason when the address is rejected.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("address is empty".to_string());
    }
    if email.len() > MAX_ADDRESS_LEN {
        return Err(format!("address exceeds {MAX_ADDRESS_LEN} characters"));
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err("address must contain exactly one '@'".to_string());
    };

    if local.is_empty() || local.len() > MAX_LOCAL_PART_LEN {
        return Err(format!("local part must be 1 to {MAX_LOCAL_PART_LEN} characters"));
    }
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return Err(format!("domain must be 1 to {MAX_DOMAIN_LEN} characters"));
    }
    if !is_match(&LOCAL_PART, local) {
        return Err("local part contains invalid characters".to_string());
    }
    if !is_match(&DOMAIN, domain) {
        return Err("domain is not a valid host name".to_string());
    }

    Ok(())
}

impl Address {
    /// Validates the address; `field` names the message field it came from.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAddress`] when the email or the
    /// display name is malformed.
    pub fn validate(&self, field: &'static str) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidAddress {
            field,
            email: self.email.clone(),
            reason,
        };

        validate_email(&self.email).map_err(invalid)?;

        if let Some(name) = &self.name {
            if name.contains(['\r', '\n']) {
                return Err(invalid("display name contains a line break".to_string()));
            }
        }

        Ok(())
    }
}

impl Attachment {
    /// Validates the attachment at `position` in its message.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidAttachment`] when the content type is
    /// malformed, neither a file name nor a content id is present, or the
    /// content is not valid base64.
    pub fn validate(&self, position: usize) -> Result<(), ValidationError> {
        let invalid =
            |reason: &str| ValidationError::InvalidAttachment { position, reason: reason.to_string() };

        match self.content_type.split_once('/') {
            Some((kind, subtype))
                if !kind.is_empty()
                    && !subtype.is_empty()
                    && !self.content_type.contains(char::is_whitespace) => {},
            _ => return Err(invalid("content type must be of the form type/subtype")),
        }

        let has_filename = self.filename.as_deref().is_some_and(|name| !name.trim().is_empty());
        let has_content_id = self.content_id.as_deref().is_some_and(|id| !id.trim().is_empty());
        if !has_filename && !has_content_id {
            return Err(invalid("either filename or content_id is required"));
        }

        if let Some(content) = &self.content {
            if STANDARD.decode(content).is_err() {
                return Err(invalid("content is not valid base64"));
            }
        }

        Ok(())
    }
}

impl Message {
    /// Validates the message without modifying it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, checking addresses,
    /// recipients, content, attachments, headers and tags in that order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.from.validate("from")?;
        for address in &self.to {
            address.validate("to")?;
        }
        for address in &self.cc {
            address.validate("cc")?;
        }
        for address in &self.bcc {
            address.validate("bcc")?;
        }
        if let Some(reply_to) = &self.reply_to {
            reply_to.validate("reply_to")?;
        }

        if self.recipient_count() == 0 {
            return Err(ValidationError::MissingRecipients);
        }

        let present = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());
        if !present(&self.text) && !present(&self.html) && !present(&self.template_id) {
            return Err(ValidationError::MissingContent);
        }

        for (position, attachment) in self.attachments.iter().enumerate() {
            attachment.validate(position)?;
        }

        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }

        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ValidationError::EmptyTag);
        }

        Ok(())
    }
}

fn validate_header(name: &str, value: &str) -> Result<(), ValidationError> {
    let invalid =
        |reason: &str| ValidationError::InvalidHeader { name: name.to_string(), reason: reason.to_string() };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if !name.bytes().all(|b| b.is_ascii_graphic() && b != b':') {
        return Err(invalid("name must be printable ASCII without ':'"));
    }
    if value.contains(['\r', '\n']) {
        return Err(invalid("value contains a line break"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TrackingSettings;

    fn valid_message() -> Message {
        Message::builder()
            .from("sender@example.com")
            .to("rcpt@example.com")
            .subject("Hello")
            .text("Hi there")
            .build()
    }

    #[test]
    fn accepts_common_addresses() {
        for email in [
            "user@example.com",
            "first.last+tag@sub.example.co.uk",
            "o'brien@example.ie",
            "x@a.io",
        ] {
            assert!(validate_email(email).is_ok(), "{email} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for email in [
            "",
            "no-at-sign",
            "two@@example.com",
            "a@b@example.com",
            "@example.com",
            "user@",
            "user@localhost",
            "user name@example.com",
            ".user@example.com",
            "user.@example.com",
            "user@-example.com",
            "user@example..com",
        ] {
            assert!(validate_email(email).is_err(), "{email} should be rejected");
        }
    }

    #[test]
    fn enforces_length_bounds() {
        let local_64 = "a".repeat(64);
        assert!(validate_email(&format!("{local_64}@example.com")).is_ok());

        let local_65 = "a".repeat(65);
        let err = validate_email(&format!("{local_65}@example.com")).unwrap_err();
        assert!(err.contains("local part"));

        let label = "b".repeat(63);
        let long_domain = format!("{label}.{label}.{label}.{label}.com");
        assert!(long_domain.len() > 253);
        assert!(validate_email(&format!("a@{long_domain}")).is_err());

        let domain_250 = format!("{label}.{label}.{label}.{}.io", "c".repeat(55));
        let total = format!("{}@{domain_250}", "d".repeat(10));
        assert!(total.len() > MAX_ADDRESS_LEN);
        assert!(validate_email(&total).unwrap_err().contains("254"));
    }

    #[test]
    fn display_name_must_not_break_lines() {
        let address = Address::with_name("a@example.com", "Evil\r\nBcc: x@example.com");
        assert!(matches!(
            address.validate("from"),
            Err(ValidationError::InvalidAddress { field: "from", .. })
        ));
    }

    #[test]
    fn valid_message_passes() {
        assert!(valid_message().validate().is_ok());
    }

    #[test]
    fn recipients_required_across_to_cc_bcc() {
        let mut message = valid_message();
        message.to.clear();
        assert_eq!(message.validate(), Err(ValidationError::MissingRecipients));

        message.bcc.push(Address::new("hidden@example.com"));
        assert!(message.validate().is_ok());
    }

    #[test]
    fn content_or_template_required() {
        let mut message = valid_message();
        message.text = None;
        assert_eq!(message.validate(), Err(ValidationError::MissingContent));

        message.text = Some(String::new());
        assert_eq!(message.validate(), Err(ValidationError::MissingContent));

        message.template_id = Some("welcome".to_string());
        assert!(message.validate().is_ok());

        message.template_id = None;
        message.html = Some("<p>hi</p>".to_string());
        assert!(message.validate().is_ok());
    }

    #[test]
    fn invalid_recipient_reports_field() {
        let mut message = valid_message();
        message.cc.push(Address::new("broken"));

        match message.validate() {
            Err(ValidationError::InvalidAddress { field, email, .. }) => {
                assert_eq!(field, "cc");
                assert_eq!(email, "broken");
            },
            other => panic!("expected invalid address, got {other:?}"),
        }
    }

    #[test]
    fn attachment_rules() {
        let ok = Attachment::from_bytes("report.pdf", "application/pdf", b"%PDF");
        assert!(ok.validate(0).is_ok());

        let inline = Attachment::inline("logo", "image/png", b"\x89PNG");
        assert!(inline.validate(0).is_ok());

        let reference_only = Attachment {
            content_type: "image/png".to_string(),
            filename: None,
            content_id: Some("banner".to_string()),
            content: None,
        };
        assert!(reference_only.validate(0).is_ok());

        let mut anonymous = ok.clone();
        anonymous.filename = None;
        assert!(anonymous.validate(1).is_err());

        let mut bad_type = ok.clone();
        bad_type.content_type = "pdf".to_string();
        assert!(bad_type.validate(0).is_err());

        let mut bad_content = ok;
        bad_content.content = Some("not base64!!".to_string());
        assert!(matches!(
            bad_content.validate(4),
            Err(ValidationError::InvalidAttachment { position: 4, .. })
        ));
    }

    #[test]
    fn header_rules() {
        let message = Message::builder()
            .from("s@example.com")
            .to("r@example.com")
            .text("x")
            .header("X-Bad:Name", "v")
            .build();
        assert!(matches!(message.validate(), Err(ValidationError::InvalidHeader { .. })));

        let message = Message::builder()
            .from("s@example.com")
            .to("r@example.com")
            .text("x")
            .header("X-Ok", "line\r\nInjected: yes")
            .build();
        assert!(matches!(message.validate(), Err(ValidationError::InvalidHeader { .. })));
    }

    #[test]
    fn empty_tag_rejected() {
        let message = Message::builder()
            .from("s@example.com")
            .to("r@example.com")
            .text("x")
            .tag(" ")
            .tracking(TrackingSettings::default())
            .build();
        assert_eq!(message.validate(), Err(ValidationError::EmptyTag));
    }
}
