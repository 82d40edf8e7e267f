use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Staging row for a registration wizard in progress.
///
/// Step payloads are versioned JSON envelopes stored as text; they are
/// decoded by the service, never by SQL.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registration_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub phone_number: String,
    pub is_phone_verified: bool,
    pub role: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub basic_info: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub merchant_info: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub driver_info: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub vehicle_info: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub residence_info: Option<String>,
    pub password_hash: Option<String>,
    pub step: String,
    /// Bumped by every committed write; guards against lost updates.
    pub revision: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
