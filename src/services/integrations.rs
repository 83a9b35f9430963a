use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::crypto::{self, KEY_LEN};
use crate::db::DbPool;
use crate::entities::integration::{self, Entity as IntegrationEntity};
use crate::errors::ServiceError;

/// An integration with its tokens decrypted. Exists only transiently in
/// memory; never serialized.
#[derive(Debug, Clone)]
pub struct DecryptedIntegration {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub platform: String,
    pub external_user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertIntegrationInput {
    pub external_user_id: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Credential store for marketplace integrations. Tokens are encrypted
/// with the vault before they touch the database and decrypted on every
/// read; rows are keyed on (tenant, platform).
#[derive(Clone)]
pub struct IntegrationService {
    db_pool: Arc<DbPool>,
    encryption_key: [u8; KEY_LEN],
}

impl IntegrationService {
    pub fn new(db_pool: Arc<DbPool>, encryption_key: [u8; KEY_LEN]) -> Self {
        Self {
            db_pool,
            encryption_key,
        }
    }

    /// Creates or updates the integration for (tenant, platform).
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, platform = %platform))]
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        platform: &str,
        input: UpsertIntegrationInput,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let now = Utc::now();

        let access_token = crypto::encrypt(input.access_token.as_bytes(), &self.encryption_key)?;
        let refresh_token = match &input.refresh_token {
            Some(token) if !token.is_empty() => {
                crypto::encrypt(token.as_bytes(), &self.encryption_key)?
            }
            _ => Vec::new(),
        };

        let model = integration::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            platform: Set(platform.to_string()),
            external_user_id: Set(input.external_user_id),
            access_token: Set(access_token),
            refresh_token: Set(refresh_token),
            expires_at: Set(input.expires_at),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        IntegrationEntity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    integration::Column::TenantId,
                    integration::Column::Platform,
                ])
                .update_columns([
                    integration::Column::ExternalUserId,
                    integration::Column::AccessToken,
                    integration::Column::RefreshToken,
                    integration::Column::ExpiresAt,
                    integration::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(db)
            .await?;

        info!(tenant_id = %tenant_id, platform = %platform, "integration upserted");
        Ok(())
    }

    /// Fetches the tenant's integration for a platform, decrypting its
    /// tokens.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, platform = %platform))]
    pub async fn get_for_tenant(
        &self,
        tenant_id: Uuid,
        platform: &str,
    ) -> Result<DecryptedIntegration, ServiceError> {
        let db = &*self.db_pool;

        let row = IntegrationEntity::find()
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::Platform.eq(platform))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "integration for platform {platform} not found"
                ))
            })?;

        self.decrypt_row(row)
    }

    /// Resolves the owning tenant from the marketplace's own user id.
    /// Used by the reconciler before it knows which tenant a notification
    /// belongs to; does not decrypt anything.
    #[instrument(skip(self), fields(platform = %platform))]
    pub async fn resolve_tenant(
        &self,
        external_user_id: &str,
        platform: &str,
    ) -> Result<Uuid, ServiceError> {
        let db = &*self.db_pool;

        let row = IntegrationEntity::find()
            .filter(integration::Column::ExternalUserId.eq(external_user_id))
            .filter(integration::Column::Platform.eq(platform))
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no integration maps external user {external_user_id} on {platform}"
                ))
            })?;

        Ok(row.tenant_id)
    }

    /// Removes the integration for (tenant, platform).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, platform = %platform))]
    pub async fn delete(&self, tenant_id: Uuid, platform: &str) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let result = IntegrationEntity::delete_many()
            .filter(integration::Column::TenantId.eq(tenant_id))
            .filter(integration::Column::Platform.eq(platform))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "integration for platform {platform} not found"
            )));
        }

        info!(tenant_id = %tenant_id, platform = %platform, "integration deleted");
        Ok(())
    }

    fn decrypt_row(&self, row: integration::Model) -> Result<DecryptedIntegration, ServiceError> {
        let access_token = crypto::decrypt(&row.access_token, &self.encryption_key)?;
        let access_token = String::from_utf8(access_token)
            .map_err(|_| ServiceError::InternalError("stored token is not UTF-8".to_string()))?;

        let refresh_token = if row.refresh_token.is_empty() {
            None
        } else {
            let plaintext = crypto::decrypt(&row.refresh_token, &self.encryption_key)?;
            Some(String::from_utf8(plaintext).map_err(|_| {
                ServiceError::InternalError("stored token is not UTF-8".to_string())
            })?)
        };

        Ok(DecryptedIntegration {
            id: row.id,
            tenant_id: row.tenant_id,
            platform: row.platform,
            external_user_id: row.external_user_id,
            access_token,
            refresh_token,
            expires_at: row.expires_at,
        })
    }
}
