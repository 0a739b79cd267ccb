//! Connector Lambda - Manages a customer's SQL connector settings.
//!
//! Endpoints:
//! - GET /v1/connector - Current settings, secrets masked
//! - PUT /v1/connector - Create or replace settings
//! - POST /v1/connector/test - Run a probe query through the connector

use chrono::Utc;
use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::Deserialize;
use shared::http::{parse_json, path_segments, route_path};
use shared::models::{ConnectorSettings, ConnectorSettingsResponse, SECRET_MASK};
use shared::store;
use shared::{finish, resolve_caller, success_response, Caller, Config, ReportExecutor};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

const DEFAULT_PORT: u16 = 1433;

/// Connector settings request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ConnectorSettingsRequest {
    #[validate(length(min = 1, message = "clientId zorunludur"))]
    client_id: String,
    /// Send the masked value back to keep the stored secret.
    #[validate(length(min = 1, message = "clientPass zorunludur"))]
    client_pass: String,
    #[validate(length(min = 1, max = 255, message = "Sunucu adresi zorunludur"))]
    server: String,
    #[validate(length(min = 1, max = 128, message = "Veritabanı adı zorunludur"))]
    database: String,
    #[validate(length(min = 1, max = 128, message = "Kullanıcı adı zorunludur"))]
    user: String,
    #[validate(length(min = 1, message = "Şifre zorunludur"))]
    password: String,
    #[validate(range(min = 1, message = "Geçersiz port"))]
    port: Option<u16>,
    #[serde(default)]
    encrypt: bool,
    #[serde(default = "default_trust")]
    trust_server_certificate: bool,
}

fn default_trust() -> bool {
    true
}

/// Replace a masked secret with the stored one.
fn keep_secret(submitted: String, stored: Option<&str>) -> shared::Result<String> {
    if submitted != SECRET_MASK {
        return Ok(submitted);
    }
    stored
        .map(str::to_string)
        .ok_or_else(|| shared::Error::Validation("Şifre alanları doldurulmalı".to_string()))
}

impl ConnectorSettingsRequest {
    fn into_settings(
        self,
        caller: &Caller,
        existing: Option<&ConnectorSettings>,
    ) -> shared::Result<ConnectorSettings> {
        self.validate()?;

        Ok(ConnectorSettings {
            customer_id: caller.customer_id,
            client_id: self.client_id.trim().to_string(),
            client_pass: keep_secret(self.client_pass, existing.map(|s| s.client_pass.as_str()))?,
            server: self.server.trim().to_string(),
            database: self.database.trim().to_string(),
            user: self.user.trim().to_string(),
            password: keep_secret(self.password, existing.map(|s| s.password.as_str()))?,
            port: self.port.unwrap_or(DEFAULT_PORT),
            encrypt: self.encrypt,
            trust_server_certificate: self.trust_server_certificate,
            updated_at: Utc::now(),
        })
    }
}

/// Application state
struct AppState {
    db_pool: PgPool,
    config: Config,
    executor: ReportExecutor,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let db_pool = shared::db::connect_from_config(&config).await?;
        let executor = ReportExecutor::from_config(&config)?;

        Ok(Self {
            db_pool,
            config,
            executor,
        })
    }
}

fn not_configured() -> shared::Error {
    shared::Error::NotFound("Veritabanı bağlantı ayarları tanımlanmamış".to_string())
}

async fn route(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let path = route_path(event.uri().path());
    let method = event.method().as_str();

    let segments = path_segments(path, "/v1/connector")
        .ok_or_else(|| shared::Error::NotFound("Not found".to_string()))?;

    let caller = resolve_caller(&state.db_pool, event, state.config.jwt_secret.as_deref()).await?;

    match (method, segments.as_slice()) {
        ("GET", []) => {
            let settings = store::find_connector(&state.db_pool, caller.customer_id)
                .await?
                .ok_or_else(not_configured)?;

            success_response(200, ConnectorSettingsResponse::from(&settings))
        }

        ("PUT", []) => {
            let request: ConnectorSettingsRequest = parse_json(event.body())?;
            let existing = store::find_connector(&state.db_pool, caller.customer_id).await?;
            let settings = request.into_settings(&caller, existing.as_ref())?;

            let saved = store::upsert_connector(&state.db_pool, &settings).await?;
            info!(
                "Saved connector settings for {} ({}/{})",
                caller.customer_id, saved.server, saved.database
            );

            let detail = serde_json::json!({ "server": saved.server, "database": saved.database });
            if let Err(e) =
                store::record_activity(&state.db_pool, caller.customer_id, None, "connector.update", detail)
                    .await
            {
                warn!("Failed to record connector update for {}: {}", caller.customer_id, e);
            }

            success_response(200, ConnectorSettingsResponse::from(&saved))
        }

        ("POST", ["test"]) => {
            let settings = store::find_connector(&state.db_pool, caller.customer_id)
                .await?
                .ok_or_else(not_configured)?;

            let rows = state.executor.probe(&settings).await?;
            info!("Connector probe succeeded for {}", caller.customer_id);

            success_response(200, serde_json::json!({ "ok": true, "rows": rows }))
        }

        _ => Err(shared::Error::NotFound("Not found".to_string())),
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    info!(
        "Received request: method={}, path={}",
        event.method(),
        event.uri().path()
    );

    finish(route(&state, &event).await)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    shared::init_tracing();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}
