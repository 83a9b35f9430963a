use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Marketplace integration credentials, one row per (tenant, platform).
/// Token columns hold vault ciphertext; plaintext exists only transiently
/// in memory after decryption and is never serialized.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// Platform name, e.g. "mercadolibre"
    pub platform: String,
    /// The platform's own id for this seller account
    pub external_user_id: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Vec<u8>,
    #[serde(skip_serializing)]
    pub refresh_token: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
