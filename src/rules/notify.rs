use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::RuleError;

pub const MAX_EMAILS: usize = 5;
pub const MAX_PHONES: usize = 5;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w.-]+@[\w.-]+\.\w{2,}$").expect("email pattern compiles")
});

// (62)99999-9999, (62)3333-4444, 6299999-9999, 623333-4444, 6299999999, 62999999999
static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\(\d{2}\)\d{4,5}-\d{4}|\d{2}\d{4,5}-\d{4}|\d{10,11})$")
        .expect("phone pattern compiles")
});

/// Who hears about a rule that fires, and how.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationTargets {
    #[serde(default)]
    pub emails: Vec<String>,
    /// WhatsApp numbers.
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub send_email: bool,
    #[serde(default)]
    pub send_whatsapp: bool,
    #[serde(default)]
    pub create_work_order: bool,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email.trim())
}

pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE.is_match(&compact)
}

impl NotificationTargets {
    /// Drops blank entries and trims the rest.
    pub fn normalized(mut self) -> Self {
        let clean = |list: Vec<String>| -> Vec<String> {
            list.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        self.emails = clean(self.emails);
        self.phones = clean(self.phones);
        self
    }

    /// Checks list sizes and address formats. Expects normalized input.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.emails.len() > MAX_EMAILS {
            return Err(RuleError::TooManyEmails(self.emails.len()));
        }
        if self.phones.len() > MAX_PHONES {
            return Err(RuleError::TooManyPhones(self.phones.len()));
        }
        if let Some(bad) = self.emails.iter().find(|e| !is_valid_email(e)) {
            return Err(RuleError::InvalidEmail(bad.clone()));
        }
        if let Some(bad) = self.phones.iter().find(|p| !is_valid_phone(p)) {
            return Err(RuleError::InvalidPhone(bad.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("frota@empresa.com.br"));
        assert!(is_valid_email("joao.silva-2@x.io"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("a@b.c"));
    }

    #[test]
    fn test_phone_formats() {
        for ok in [
            "(62) 99999-9999",
            "(62)3333-4444",
            "62 99999-9999",
            "623333-4444",
            "6299999999",
            "62999999999",
        ] {
            assert!(is_valid_phone(ok), "{ok}");
        }
        for bad in ["999-9999", "(6)99999-9999", "+55 62 99999-9999", "abc"] {
            assert!(!is_valid_phone(bad), "{bad}");
        }
    }

    #[test]
    fn test_limits_and_blanks() {
        let targets = NotificationTargets {
            emails: vec![" a@b.com ".into(), "".into(), "  ".into()],
            ..Default::default()
        }
        .normalized();
        assert_eq!(targets.emails, vec!["a@b.com".to_string()]);
        assert!(targets.validate().is_ok());

        let too_many = NotificationTargets {
            phones: vec!["6299999999".to_string(); 6],
            ..Default::default()
        };
        assert!(matches!(too_many.validate(), Err(RuleError::TooManyPhones(6))));

        let bad = NotificationTargets {
            emails: vec!["nope".into()],
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(RuleError::InvalidEmail(e)) if e == "nope"));
    }
}
