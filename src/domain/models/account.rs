use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{phone_number::PhoneNumber, registration_session::Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);
impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

/// Permanent account produced by finalizing a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    phone_number: PhoneNumber,
    full_name: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        id: AccountId,
        phone_number: PhoneNumber,
        full_name: String,
        role: Role,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            phone_number,
            full_name,
            role,
            created_at,
        }
    }

    // getters only
    pub fn id(&self) -> &AccountId {
        &self.id
    }
    pub fn phone_number(&self) -> &PhoneNumber {
        &self.phone_number
    }
    pub fn full_name(&self) -> &str {
        &self.full_name
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
