use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    models::{
        credential::HashedPassword,
        phone_number::PhoneNumber,
        step_payloads::{BasicInfo, DriverInfo, MerchantInfo, ResidenceInfo, VehicleInfo},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Merchant,
    Driver,
}

impl Role {
    /// Wizard steps this role must complete, in order.
    pub fn steps(self) -> &'static [WizardStep] {
        match self {
            Role::Merchant => &[WizardStep::BasicInfo, WizardStep::MerchantInfo],
            Role::Driver => &[
                WizardStep::BasicInfo,
                WizardStep::DriverInfo,
                WizardStep::VehicleInfo,
                WizardStep::ResidenceInfo,
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Merchant => "merchant",
            Role::Driver => "driver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merchant" => Ok(Role::Merchant),
            "driver" => Ok(Role::Driver),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A data-collecting step of the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    BasicInfo,
    MerchantInfo,
    DriverInfo,
    VehicleInfo,
    ResidenceInfo,
}

impl WizardStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WizardStep::BasicInfo => "basic_info",
            WizardStep::MerchantInfo => "merchant_info",
            WizardStep::DriverInfo => "driver_info",
            WizardStep::VehicleInfo => "vehicle_info",
            WizardStep::ResidenceInfo => "residence_info",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker for the furthest completed step.
///
/// Completing the last step of a role's sequence moves the marker straight
/// to `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    Started,
    BasicInfoSet,
    DriverInfoSet,
    VehicleInfoSet,
    Completed,
}

impl RegistrationStep {
    pub fn as_str(self) -> &'static str {
        match self {
            RegistrationStep::Started => "started",
            RegistrationStep::BasicInfoSet => "basic_info_set",
            RegistrationStep::DriverInfoSet => "driver_info_set",
            RegistrationStep::VehicleInfoSet => "vehicle_info_set",
            RegistrationStep::Completed => "completed",
        }
    }

    /// Marker reached after `completed` steps of `role` are done.
    fn after(role: Role, completed: usize) -> Self {
        let steps = role.steps();
        if completed == 0 {
            return RegistrationStep::Started;
        }
        if completed >= steps.len() {
            return RegistrationStep::Completed;
        }
        match steps[completed - 1] {
            WizardStep::BasicInfo => RegistrationStep::BasicInfoSet,
            WizardStep::DriverInfo => RegistrationStep::DriverInfoSet,
            WizardStep::VehicleInfo => RegistrationStep::VehicleInfoSet,
            // last step of their role, handled above
            WizardStep::MerchantInfo | WizardStep::ResidenceInfo => RegistrationStep::Completed,
        }
    }

    /// Number of `role` steps this marker stands for, or `None` when the
    /// marker cannot occur for that role.
    fn completed_steps(self, role: Role) -> Option<usize> {
        let steps = role.steps();
        let position = |step| steps.iter().position(|s| *s == step).map(|i| i + 1);
        match self {
            RegistrationStep::Started => Some(0),
            RegistrationStep::Completed => Some(steps.len()),
            RegistrationStep::BasicInfoSet => position(WizardStep::BasicInfo),
            RegistrationStep::DriverInfoSet => position(WizardStep::DriverInfo),
            RegistrationStep::VehicleInfoSet => position(WizardStep::VehicleInfo),
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(RegistrationStep::Started),
            "basic_info_set" => Ok(RegistrationStep::BasicInfoSet),
            "driver_info_set" => Ok(RegistrationStep::DriverInfoSet),
            "vehicle_info_set" => Ok(RegistrationStep::VehicleInfoSet),
            "completed" => Ok(RegistrationStep::Completed),
            other => Err(format!("unknown registration step '{other}'")),
        }
    }
}

/// Part of a session written by a mutation since it was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    PhoneVerified,
    Payload(WizardStep),
}

/// Staged registration, one per phone number until finalization.
///
/// `revision` counts committed writes; a save only lands if the row is still
/// at the revision the session was loaded with.
#[derive(Debug, Clone)]
pub struct RegistrationSession {
    id: Uuid,
    phone_number: PhoneNumber,
    is_phone_verified: bool,
    role: Role,
    basic_info: Option<BasicInfo>,
    merchant_info: Option<MerchantInfo>,
    driver_info: Option<DriverInfo>,
    vehicle_info: Option<VehicleInfo>,
    residence_info: Option<ResidenceInfo>,
    password_hash: Option<HashedPassword>,
    step: RegistrationStep,
    revision: i32,
    changes: Vec<SessionChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Persisted state of a session, used to rebuild it from storage.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub phone_number: PhoneNumber,
    pub is_phone_verified: bool,
    pub role: Role,
    pub basic_info: Option<BasicInfo>,
    pub merchant_info: Option<MerchantInfo>,
    pub driver_info: Option<DriverInfo>,
    pub vehicle_info: Option<VehicleInfo>,
    pub residence_info: Option<ResidenceInfo>,
    pub password_hash: Option<HashedPassword>,
    pub step: RegistrationStep,
    pub revision: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationSession {
    pub fn start(phone_number: PhoneNumber, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_number,
            is_phone_verified: false,
            role,
            basic_info: None,
            merchant_info: None,
            driver_info: None,
            vehicle_info: None,
            residence_info: None,
            password_hash: None,
            step: RegistrationStep::Started,
            revision: 0,
            changes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a session from storage, rejecting a step marker that is
    /// impossible for the stored role.
    pub fn reconstruct(record: SessionRecord) -> Result<Self, String> {
        if record.step.completed_steps(record.role).is_none() {
            return Err(format!(
                "step '{}' is not reachable for role '{}'",
                record.step, record.role
            ));
        }
        Ok(Self {
            id: record.id,
            phone_number: record.phone_number,
            is_phone_verified: record.is_phone_verified,
            role: record.role,
            basic_info: record.basic_info,
            merchant_info: record.merchant_info,
            driver_info: record.driver_info,
            vehicle_info: record.vehicle_info,
            residence_info: record.residence_info,
            password_hash: record.password_hash,
            step: record.step,
            revision: record.revision,
            changes: Vec::new(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn mark_phone_verified(&mut self) {
        self.is_phone_verified = true;
        self.record_change(SessionChange::PhoneVerified);
        self.touch();
    }

    /// Acknowledge a committed save: the row moved one revision on and
    /// holds every pending change.
    pub fn mark_saved(&mut self) {
        self.revision += 1;
        self.changes.clear();
    }

    /// Check that `step` may be submitted now.
    pub fn ensure_can_submit(&self, step: WizardStep) -> Result<(), DomainError> {
        let steps = self.role.steps();
        let index = steps
            .iter()
            .position(|s| *s == step)
            .ok_or(DomainError::RoleMismatch {
                step,
                role: self.role,
            })?;

        let completed = self.completed_steps();
        if index > completed {
            return Err(DomainError::StepOutOfOrder {
                step,
                missing: steps[completed],
            });
        }

        if !self.is_phone_verified {
            return Err(DomainError::PhoneNotVerified);
        }

        Ok(())
    }

    pub fn set_basic_info(
        &mut self,
        info: BasicInfo,
        password_hash: HashedPassword,
    ) -> Result<(), DomainError> {
        self.ensure_can_submit(WizardStep::BasicInfo)?;
        self.basic_info = Some(info);
        self.password_hash = Some(password_hash);
        self.advance(WizardStep::BasicInfo);
        Ok(())
    }

    pub fn set_merchant_info(&mut self, info: MerchantInfo) -> Result<(), DomainError> {
        self.ensure_can_submit(WizardStep::MerchantInfo)?;
        self.merchant_info = Some(info);
        self.advance(WizardStep::MerchantInfo);
        Ok(())
    }

    pub fn set_driver_info(&mut self, info: DriverInfo) -> Result<(), DomainError> {
        self.ensure_can_submit(WizardStep::DriverInfo)?;
        self.driver_info = Some(info);
        self.advance(WizardStep::DriverInfo);
        Ok(())
    }

    pub fn set_vehicle_info(&mut self, info: VehicleInfo) -> Result<(), DomainError> {
        self.ensure_can_submit(WizardStep::VehicleInfo)?;
        self.vehicle_info = Some(info);
        self.advance(WizardStep::VehicleInfo);
        Ok(())
    }

    pub fn set_residence_info(&mut self, info: ResidenceInfo) -> Result<(), DomainError> {
        self.ensure_can_submit(WizardStep::ResidenceInfo)?;
        self.residence_info = Some(info);
        self.advance(WizardStep::ResidenceInfo);
        Ok(())
    }

    pub fn has_payload(&self, step: WizardStep) -> bool {
        match step {
            WizardStep::BasicInfo => self.basic_info.is_some() && self.password_hash.is_some(),
            WizardStep::MerchantInfo => self.merchant_info.is_some(),
            WizardStep::DriverInfo => self.driver_info.is_some(),
            WizardStep::VehicleInfo => self.vehicle_info.is_some(),
            WizardStep::ResidenceInfo => self.residence_info.is_some(),
        }
    }

    /// True iff the phone is verified and every payload the role needs is
    /// present.
    pub fn is_ready_to_finalize(&self) -> bool {
        self.is_phone_verified
            && self
                .role
                .steps()
                .iter()
                .all(|step| self.has_payload(*step))
    }

    fn completed_steps(&self) -> usize {
        // reconstruct() guarantees the marker is valid for the role
        self.step.completed_steps(self.role).unwrap_or(0)
    }

    fn advance(&mut self, step: WizardStep) {
        self.record_change(SessionChange::Payload(step));
        if let Some(index) = self.role.steps().iter().position(|s| *s == step) {
            let reached = index + 1;
            if reached > self.completed_steps() {
                self.step = RegistrationStep::after(self.role, reached);
            }
        }
        self.touch();
    }

    fn record_change(&mut self, change: SessionChange) {
        if !self.changes.contains(&change) {
            self.changes.push(change);
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }
    pub fn is_phone_verified(&self) -> bool {
        self.is_phone_verified
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn basic_info(&self) -> Option<&BasicInfo> {
        self.basic_info.as_ref()
    }
    pub fn merchant_info(&self) -> Option<&MerchantInfo> {
        self.merchant_info.as_ref()
    }
    pub fn driver_info(&self) -> Option<&DriverInfo> {
        self.driver_info.as_ref()
    }
    pub fn vehicle_info(&self) -> Option<&VehicleInfo> {
        self.vehicle_info.as_ref()
    }
    pub fn residence_info(&self) -> Option<&ResidenceInfo> {
        self.residence_info.as_ref()
    }
    pub fn password_hash(&self) -> Option<&HashedPassword> {
        self.password_hash.as_ref()
    }
    pub fn step(&self) -> RegistrationStep {
        self.step
    }
    pub fn revision(&self) -> i32 {
        self.revision
    }
    /// Changes made since the session was loaded or last saved.
    pub fn changes(&self) -> &[SessionChange] {
        &self.changes
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
