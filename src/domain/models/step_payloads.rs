use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::domain::models::registration_session::WizardStep;

/// Data collected by one wizard step.
///
/// Every payload is persisted inside an [`Envelope`] carrying its kind and
/// schema version, so a row can never be decoded as the wrong step.
pub trait StepPayload: Serialize + DeserializeOwned {
    const STEP: WizardStep;
    const SCHEMA_VERSION: u16;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub full_name: String,
    pub national_id: String,
    pub national_id_front_url: String,
    pub national_id_back_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantInfo {
    pub store_name: String,
    pub store_category: String,
    pub store_address: String,
    pub store_photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverInfo {
    pub license_number: String,
    pub license_expiry: NaiveDate,
    pub license_photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub plate_number: String,
    pub make: String,
    pub model: String,
    pub color: String,
    pub year: i32,
    pub vehicle_photo_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidenceInfo {
    pub city: String,
    pub district: String,
    pub street_address: String,
    pub postal_code: Option<String>,
}

impl StepPayload for BasicInfo {
    const STEP: WizardStep = WizardStep::BasicInfo;
    const SCHEMA_VERSION: u16 = 1;
}

impl StepPayload for MerchantInfo {
    const STEP: WizardStep = WizardStep::MerchantInfo;
    const SCHEMA_VERSION: u16 = 1;
}

impl StepPayload for DriverInfo {
    const STEP: WizardStep = WizardStep::DriverInfo;
    const SCHEMA_VERSION: u16 = 1;
}

impl StepPayload for VehicleInfo {
    const STEP: WizardStep = WizardStep::VehicleInfo;
    const SCHEMA_VERSION: u16 = 1;
}

impl StepPayload for ResidenceInfo {
    const STEP: WizardStep = WizardStep::ResidenceInfo;
    const SCHEMA_VERSION: u16 = 1;
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected {expected} payload, found {found}")]
    KindMismatch {
        expected: WizardStep,
        found: WizardStep,
    },

    #[error("unsupported {kind} payload version {version}")]
    UnsupportedVersion { kind: WizardStep, version: u16 },
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    kind: WizardStep,
    version: u16,
    data: T,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    kind: WizardStep,
    version: u16,
}

pub fn encode<T: StepPayload>(payload: &T) -> Result<String, PayloadError> {
    let envelope = Envelope {
        kind: T::STEP,
        version: T::SCHEMA_VERSION,
        data: payload,
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn decode<T: StepPayload>(raw: &str) -> Result<T, PayloadError> {
    let header: EnvelopeHeader = serde_json::from_str(raw)?;
    if header.kind != T::STEP {
        return Err(PayloadError::KindMismatch {
            expected: T::STEP,
            found: header.kind,
        });
    }
    if header.version != T::SCHEMA_VERSION {
        return Err(PayloadError::UnsupportedVersion {
            kind: header.kind,
            version: header.version,
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(raw)?;
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residence() -> ResidenceInfo {
        ResidenceInfo {
            city: "Springfield".to_string(),
            district: "Downtown".to_string(),
            street_address: "742 Evergreen Terrace".to_string(),
            postal_code: None,
        }
    }

    #[test]
    fn envelope_records_kind_and_version() {
        let raw = encode(&residence()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["kind"], "residence_info");
        assert_eq!(value["version"], 1);
        assert_eq!(value["data"]["city"], "Springfield");

        assert_eq!(decode::<ResidenceInfo>(&raw).unwrap(), residence());
    }

    #[test]
    fn decoding_as_another_step_is_rejected() {
        let raw = encode(&residence()).unwrap();
        let err = decode::<VehicleInfo>(&raw).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::KindMismatch {
                expected: WizardStep::VehicleInfo,
                found: WizardStep::ResidenceInfo,
            }
        ));
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let raw = r#"{"kind":"residence_info","version":7,"data":{}}"#;
        assert!(matches!(
            decode::<ResidenceInfo>(raw),
            Err(PayloadError::UnsupportedVersion { version: 7, .. })
        ));
    }
}
