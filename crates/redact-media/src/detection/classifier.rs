//! Pattern classification of recognised on-screen text.

use regex::Regex;
use std::sync::LazyLock;

/// Label for text that matched no pattern but is redacted anyway.
pub const ON_SCREEN_TEXT: &str = "on_screen_text";

/// Ordered pattern table. The first match wins, so specific formats come
/// before the catch-all phone, numeric and alphanumeric ones.
static PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        (
            "email",
            Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
        ),
        (
            "credit_card_number",
            Regex::new(r"\b(?:\d{4}[-\s]?){3}\d{4}\b").unwrap(),
        ),
        ("ssn", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
        (
            "iban",
            Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{4}\d{7}[A-Z0-9]{0,16}\b").unwrap(),
        ),
        (
            "ip_address",
            Regex::new(r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d?\d)\b")
                .unwrap(),
        ),
        (
            "ipv6",
            Regex::new(r"(?i)\b(?:[0-9A-F]{1,4}:){7}[0-9A-F]{1,4}\b").unwrap(),
        ),
        (
            "mac_address",
            Regex::new(r"(?i)\b(?:[0-9A-F]{2}[:-]){5}[0-9A-F]{2}\b").unwrap(),
        ),
        (
            "uuid",
            Regex::new(r"\b[0-9a-fA-F]{8}-(?:[0-9a-fA-F]{4}-){3}[0-9a-fA-F]{12}\b").unwrap(),
        ),
        ("date", Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-]\d{2,4}\b").unwrap()),
        (
            "street_address",
            Regex::new(
                r"\b\d+\s+[A-Za-z\s]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr)\b",
            )
            .unwrap(),
        ),
        // Singapore identity card / foreign identification number
        ("nric_fin", Regex::new(r"(?i)\b[STFG]\d{7}[A-Z]\b").unwrap()),
        // Singapore business registration number
        ("uen", Regex::new(r"(?i)\b(?:\d{9}|\d{8}[A-Z])\b").unwrap()),
        (
            "sg_phone",
            Regex::new(r"\b(?:\+65[-.\s]?)?[3689]\d{3}[-.\s]?\d{4}\b").unwrap(),
        ),
        ("sg_postal", Regex::new(r"\b\d{6}\b").unwrap()),
        (
            "swift",
            Regex::new(r"\b[A-Z]{6}[A-Z0-9]{2}(?:[A-Z0-9]{3})?\b").unwrap(),
        ),
        (
            "passport_number",
            Regex::new(r"(?i)\b[A-Z]{1,2}\d{5,7}\b").unwrap(),
        ),
        (
            "phone_number",
            Regex::new(r"(?:\+?\d{1,3}[-.\s]?)?(?:\(?\d{1,4}\)?[-.\s]?){1,4}\d{1,4}").unwrap(),
        ),
        ("vin", Regex::new(r"\b[A-HJ-NPR-Z0-9]{17}\b").unwrap()),
        ("numeric_id", Regex::new(r"\b\d{4,}\b").unwrap()),
        ("alphanumeric_id", Regex::new(r"\b[A-Za-z0-9]{3,}\b").unwrap()),
    ]
});

/// Digits a phone-number match must contain to count.
const MIN_PHONE_DIGITS: usize = 7;

/// Maps recognised text to a PII class label.
#[derive(Debug, Clone, Default)]
pub struct TextClassifier {
    disabled: Vec<&'static str>,
}

impl TextClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip a pattern, e.g. `"alphanumeric_id"` on text-heavy footage.
    pub fn without(mut self, label: &str) -> Self {
        if let Some((name, _)) = PATTERNS.iter().find(|(name, _)| *name == label) {
            self.disabled.push(*name);
        }
        self
    }

    /// Every label this classifier can emit.
    pub fn labels(&self) -> Vec<&'static str> {
        PATTERNS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !self.disabled.contains(name))
            .collect()
    }

    /// Label of the first pattern that matches `text`.
    pub fn classify(&self, text: &str) -> Option<&'static str> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        PATTERNS
            .iter()
            .filter(|(name, _)| !self.disabled.contains(name))
            .find(|(name, re)| re.find_iter(text).any(|m| accept(name, m.as_str())))
            .map(|(name, _)| *name)
    }
}

/// Extra constraints the regex engine cannot express.
fn accept(label: &str, matched: &str) -> bool {
    match label {
        "phone_number" => matched.chars().filter(|c| c.is_ascii_digit()).count() >= MIN_PHONE_DIGITS,
        // Needs both a letter and a digit to look like an identifier.
        "alphanumeric_id" => {
            matched.chars().any(|c| c.is_ascii_digit()) && matched.chars().any(|c| c.is_ascii_alphabetic())
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_formats() {
        let c = TextClassifier::new();
        assert_eq!(c.classify("jane.doe@example.com"), Some("email"));
        assert_eq!(c.classify("4111 1111 1111 1111"), Some("credit_card_number"));
        assert_eq!(c.classify("SSN 123-45-6789"), Some("ssn"));
        assert_eq!(c.classify("GB82WEST12345698765432"), Some("iban"));
        assert_eq!(c.classify("host 192.168.10.4"), Some("ip_address"));
        assert_eq!(c.classify("12/05/1990"), Some("date"));
        assert_eq!(c.classify("221 Baker Street"), Some("street_address"));
        assert_eq!(c.classify("+1 (555) 123-4567"), Some("phone_number"));
        assert_eq!(c.classify("fe80:0000:0000:0000:0202:b3ff:fe1e:8329"), Some("ipv6"));
    }

    #[test]
    fn test_classify_singapore_formats() {
        let c = TextClassifier::new();
        assert_eq!(c.classify("NRIC S1234567D"), Some("nric_fin"));
        assert_eq!(c.classify("UEN 53312345D"), Some("uen"));
        assert_eq!(c.classify("+65 9123 4567"), Some("sg_phone"));
        assert_eq!(c.classify("Singapore 238859"), Some("sg_postal"));
        assert_eq!(c.classify("SWIFT DBSSSGSG"), Some("swift"));
    }

    #[test]
    fn test_passport_before_phone() {
        let c = TextClassifier::new();
        assert_eq!(c.classify("AB1234567"), Some("passport_number"));
        assert_eq!(c.classify("passport no. K7654321"), Some("passport_number"));
    }

    #[test]
    fn test_plain_words_not_sensitive() {
        let c = TextClassifier::new();
        assert_eq!(c.classify("Welcome back"), None);
        assert_eq!(c.classify("page 12"), None);
        assert_eq!(c.classify(""), None);
    }

    #[test]
    fn test_alphanumeric_needs_letter_and_digit() {
        let c = TextClassifier::new();
        assert_eq!(c.classify("ref A7B9X"), Some("alphanumeric_id"));
        assert_eq!(c.without("alphanumeric_id").classify("ref A7B9X"), None);
    }
}
