use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, TryRngCore};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::domain::{
    error::DomainError,
    models::phone_number::PhoneNumber,
    services::otp_service::{OtpGate, OtpSender},
};

struct IssuedCode {
    code: String,
    expires_at: DateTime<Utc>,
    failed_attempts: u32,
}

/// Development OTP gate: keeps issued codes in process memory.
///
/// A code expires after `ttl` and is burned once `max_attempts` wrong
/// guesses have been made against it. Expired codes are pruned whenever a
/// new one is issued.
pub struct InMemoryOtpGate<S: OtpSender> {
    sender: S,
    ttl: Duration,
    max_attempts: u32,
    codes: Mutex<HashMap<PhoneNumber, IssuedCode>>,
}

impl<S: OtpSender> InMemoryOtpGate<S> {
    pub fn new(sender: S) -> Self {
        Self::with_policy(sender, Duration::minutes(5), 5)
    }

    pub fn with_policy(sender: S, ttl: Duration, max_attempts: u32) -> Self {
        Self {
            sender,
            ttl,
            max_attempts: max_attempts.max(1),
            codes: Mutex::new(HashMap::new()),
        }
    }

    fn generate_code() -> Result<String, DomainError> {
        let value = OsRng
            .try_next_u32()
            .map_err(|e| DomainError::OtpUnavailable(e.to_string()))?;
        Ok(format!("{:06}", value % 1_000_000))
    }
}

#[async_trait]
impl<S: OtpSender> OtpGate for InMemoryOtpGate<S> {
    async fn issue(&self, phone_number: &PhoneNumber) -> Result<(), DomainError> {
        let code = Self::generate_code()?;
        let now = Utc::now();
        {
            let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
            codes.retain(|_, issued| issued.expires_at > now);
            codes.insert(
                phone_number.clone(),
                IssuedCode {
                    code: code.clone(),
                    expires_at: now + self.ttl,
                    failed_attempts: 0,
                },
            );
        }
        self.sender.send(phone_number, &code).await?;
        debug!(phone = %phone_number, "verification code issued");
        Ok(())
    }

    async fn verify(&self, phone_number: &PhoneNumber, code: &str) -> Result<bool, DomainError> {
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(issued) = codes.get_mut(phone_number) else {
            return Ok(false);
        };

        if Utc::now() >= issued.expires_at {
            codes.remove(phone_number);
            return Ok(false);
        }

        if bool::from(issued.code.as_bytes().ct_eq(code.as_bytes())) {
            return Ok(true);
        }

        issued.failed_attempts += 1;
        if issued.failed_attempts >= self.max_attempts {
            warn!(phone = %phone_number, "too many wrong codes; code burned");
            codes.remove(phone_number);
        }
        Ok(false)
    }

    async fn revoke(&self, phone_number: &PhoneNumber) -> Result<(), DomainError> {
        self.codes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(phone_number);
        Ok(())
    }
}

/// Sender that writes codes to the log instead of sending an SMS.
#[derive(Clone, Default)]
pub struct LogOtpSender;

#[async_trait]
impl OtpSender for LogOtpSender {
    async fn send(&self, phone_number: &PhoneNumber, code: &str) -> Result<(), DomainError> {
        info!(phone = %phone_number, code, "verification code (not delivered)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<(PhoneNumber, String)>>>,
    }

    impl RecordingSender {
        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl OtpSender for RecordingSender {
        async fn send(&self, phone_number: &PhoneNumber, code: &str) -> Result<(), DomainError> {
            self.sent
                .lock()
                .unwrap()
                .push((phone_number.clone(), code.to_string()));
            Ok(())
        }
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::new("+15551234567").unwrap()
    }

    #[tokio::test]
    async fn issued_code_stays_valid_until_revoked() {
        let sender = RecordingSender::default();
        let gate = InMemoryOtpGate::new(sender.clone());

        gate.issue(&phone()).await.unwrap();
        let code = sender.last_code();
        assert_eq!(code.len(), 6);

        assert!(gate.verify(&phone(), &code).await.unwrap());
        assert!(gate.verify(&phone(), &code).await.unwrap());
        gate.revoke(&phone()).await.unwrap();
        assert!(!gate.verify(&phone(), &code).await.unwrap());
    }

    #[tokio::test]
    async fn issuing_prunes_expired_codes() {
        let gate = InMemoryOtpGate::with_policy(RecordingSender::default(), Duration::zero(), 5);
        for number in ["+15550000001", "+15550000002", "+15550000003"] {
            gate.issue(&PhoneNumber::new(number).unwrap()).await.unwrap();
        }
        // only the code issued last is left; it expired the moment it was issued
        assert_eq!(gate.codes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn codes_of_a_different_length_never_match() {
        let sender = RecordingSender::default();
        let gate = InMemoryOtpGate::new(sender.clone());

        gate.issue(&phone()).await.unwrap();
        let code = sender.last_code();
        assert!(!gate.verify(&phone(), &code[..5]).await.unwrap());
        assert!(!gate.verify(&phone(), &format!("{code}0")).await.unwrap());
        assert!(gate.verify(&phone(), &code).await.unwrap());
    }

    #[tokio::test]
    async fn expired_codes_are_rejected() {
        let sender = RecordingSender::default();
        let gate = InMemoryOtpGate::with_policy(sender.clone(), Duration::zero(), 5);

        gate.issue(&phone()).await.unwrap();
        assert!(!gate.verify(&phone(), &sender.last_code()).await.unwrap());
    }

    #[tokio::test]
    async fn code_is_burned_after_too_many_wrong_guesses() {
        let sender = RecordingSender::default();
        let gate = InMemoryOtpGate::with_policy(sender.clone(), Duration::minutes(5), 2);

        gate.issue(&phone()).await.unwrap();
        let code = sender.last_code();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert!(!gate.verify(&phone(), wrong).await.unwrap());
        assert!(!gate.verify(&phone(), wrong).await.unwrap());
        assert!(!gate.verify(&phone(), &code).await.unwrap());
    }

    #[tokio::test]
    async fn verifying_without_a_code_fails() {
        let gate = InMemoryOtpGate::new(RecordingSender::default());
        assert!(!gate.verify(&phone(), "123456").await.unwrap());
    }
}
