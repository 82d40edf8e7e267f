use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// E.164 phone number, the business key of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value: String = value.into();
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();

        let digits = normalized
            .strip_prefix('+')
            .ok_or(DomainError::InvalidPhoneNumber)?;
        // E.164: up to 15 digits, no leading zero in the country code
        if !(8..=15).contains(&digits.len())
            || !digits.chars().all(|c| c.is_ascii_digit())
            || digits.starts_with('0')
        {
            return Err(DomainError::InvalidPhoneNumber);
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("+15551234567", "+15551234567")]
    #[case(" +1 555-123-4567 ", "+15551234567")]
    #[case("+44 (20) 7946 0958", "+442079460958")]
    fn accepts_and_normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(PhoneNumber::new(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("15551234567")]
    #[case("+0551234567")]
    #[case("+1555")]
    #[case("+1555123456789012")]
    #[case("+1555abc4567")]
    #[case("")]
    fn rejects_malformed(#[case] input: &str) {
        assert!(matches!(
            PhoneNumber::new(input),
            Err(DomainError::InvalidPhoneNumber)
        ));
    }
}
