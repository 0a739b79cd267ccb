//! User Signup Lambda - Cognito Post-Confirmation Trigger
//!
//! Creates (or links) the customer account behind a confirmed Cognito user.
//! The event is always echoed back so a database failure never blocks sign-in.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use shared::{store, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

/// Fields we need from the trigger's user attributes.
#[derive(Debug, PartialEq)]
struct SignupProfile {
    sub: String,
    email: String,
    name: String,
}

/// The event's `triggerSource`, or "unknown" when it has none.
fn trigger_source(event: &Value) -> &str {
    event
        .get("triggerSource")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
}

/// Read the profile from a PostConfirmation event, or `None` for other triggers.
fn signup_profile(event: &Value) -> Option<SignupProfile> {
    let trigger_source = event.get("triggerSource")?.as_str()?;
    if !trigger_source.starts_with("PostConfirmation") {
        return None;
    }

    let attributes = event.get("request")?.get("userAttributes")?;
    let attribute = |key: &str| {
        attributes
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let sub = attribute("sub")?.to_string();
    let email = attribute("email")?.to_lowercase();
    let name = attribute("name")
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Some(SignupProfile { sub, email, name })
}

/// Application state
struct AppState {
    db_pool: PgPool,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let db_pool = shared::db::connect_from_config(&config).await?;

        Ok(Self { db_pool })
    }
}

async fn handler(state: Arc<AppState>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let payload = event.payload;

    let Some(profile) = signup_profile(&payload) else {
        info!("Skipping trigger {}", trigger_source(&payload));
        return Ok(payload);
    };

    match store::upsert_customer_from_signup(&state.db_pool, &profile.sub, &profile.email, &profile.name)
        .await
    {
        Ok(customer) => info!("Linked Cognito user {} to customer {}", profile.sub, customer.id),
        // The account can be repaired by an admin; sign-in must still succeed.
        Err(e) => error!("Failed to create customer for {}: {}", profile.email, e),
    }

    // Cognito expects the event back unchanged.
    Ok(payload)
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
