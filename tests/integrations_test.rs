mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use sea_orm::EntityTrait;
use uuid::Uuid;

use common::TestApp;
use stockflow_api::entities::integration;
use stockflow_api::errors::ServiceError;
use stockflow_api::services::integrations::UpsertIntegrationInput;

fn upsert_input(external_user_id: &str, access_token: &str) -> UpsertIntegrationInput {
    UpsertIntegrationInput {
        external_user_id: Some(external_user_id.to_string()),
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-secret".to_string()),
        expires_at: Utc::now() + Duration::hours(6),
    }
}

#[tokio::test]
async fn tokens_are_stored_encrypted_and_decrypted_on_read() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();

    app.integrations
        .upsert(tenant, "mercadolibre", upsert_input("42", "access-secret"))
        .await
        .unwrap();

    // Raw row never contains the plaintext token bytes.
    let row = integration::Entity::find()
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(row.access_token, b"access-secret".to_vec());
    assert!(!row
        .access_token
        .windows(b"access-secret".len())
        .any(|w| w == b"access-secret"));

    let decrypted = app
        .integrations
        .get_for_tenant(tenant, "mercadolibre")
        .await
        .unwrap();
    assert_eq!(decrypted.access_token, "access-secret");
    assert_eq!(decrypted.refresh_token.as_deref(), Some("refresh-secret"));
    assert_eq!(decrypted.external_user_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn upsert_replaces_credentials_in_place() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();

    app.integrations
        .upsert(tenant, "mercadolibre", upsert_input("42", "old-token"))
        .await
        .unwrap();
    app.integrations
        .upsert(tenant, "mercadolibre", upsert_input("42", "new-token"))
        .await
        .unwrap();

    // Still one row per (tenant, platform).
    let rows = integration::Entity::find().all(&*app.db).await.unwrap();
    assert_eq!(rows.len(), 1);

    let decrypted = app
        .integrations
        .get_for_tenant(tenant, "mercadolibre")
        .await
        .unwrap();
    assert_eq!(decrypted.access_token, "new-token");
}

#[tokio::test]
async fn missing_refresh_token_reads_back_as_none() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();

    app.integrations
        .upsert(
            tenant,
            "mercadolibre",
            UpsertIntegrationInput {
                external_user_id: None,
                access_token: "access-secret".to_string(),
                refresh_token: None,
                expires_at: Utc::now() + Duration::hours(1),
            },
        )
        .await
        .unwrap();

    let decrypted = app
        .integrations
        .get_for_tenant(tenant, "mercadolibre")
        .await
        .unwrap();
    assert_eq!(decrypted.refresh_token, None);
}

#[tokio::test]
async fn lookups_are_tenant_and_platform_scoped() {
    let app = TestApp::new().await;
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    app.integrations
        .upsert(tenant_a, "mercadolibre", upsert_input("100", "token-a"))
        .await
        .unwrap();

    let err = app
        .integrations
        .get_for_tenant(tenant_b, "mercadolibre")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .integrations
        .get_for_tenant(tenant_a, "shopify")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let resolved = app
        .integrations
        .resolve_tenant("100", "mercadolibre")
        .await
        .unwrap();
    assert_eq!(resolved, tenant_a);

    let err = app
        .integrations
        .resolve_tenant("100", "shopify")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn delete_removes_the_row() {
    let app = TestApp::new().await;
    let tenant = Uuid::new_v4();

    app.integrations
        .upsert(tenant, "mercadolibre", upsert_input("42", "token"))
        .await
        .unwrap();
    app.integrations
        .delete(tenant, "mercadolibre")
        .await
        .unwrap();

    let err = app
        .integrations
        .get_for_tenant(tenant, "mercadolibre")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Deleting again reports the absence.
    let err = app.integrations.delete(tenant, "mercadolibre").await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
