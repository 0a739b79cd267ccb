//! Customers Lambda - Admin management of customer accounts.
//!
//! Endpoints (admin only):
//! - GET /v1/admin/customers - List customers
//! - POST /v1/admin/customers - Create a customer
//! - PUT /v1/admin/customers/{id} - Update name, company, plan, role or active flag
//! - GET /v1/admin/customers/{id}/activity - Recent activity (`limit`, default 50)

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::Deserialize;
use shared::http::{parse_id, parse_json, path_segments, route_path};
use shared::models::{CustomerResponse, Role};
use shared::store::{self, CustomerChanges, NewCustomer};
use shared::{finish, resolve_caller, success_response, Caller, Config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
const MAX_ACTIVITY_LIMIT: i64 = 200;

/// Create customer request
#[derive(Debug, Deserialize, Validate)]
struct CreateCustomerRequest {
    #[validate(email(message = "Geçersiz e-posta adresi"))]
    email: String,
    #[validate(length(min = 1, max = 200, message = "Ad 1-200 karakter olmalı"))]
    name: String,
    company: Option<String>,
    role: Option<Role>,
    #[validate(length(min = 1, max = 50, message = "Geçersiz plan"))]
    plan: Option<String>,
}

/// Update customer request
#[derive(Debug, Default, Deserialize, Validate)]
struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 200, message = "Ad 1-200 karakter olmalı"))]
    name: Option<String>,
    company: Option<String>,
    #[validate(length(min = 1, max = 50, message = "Geçersiz plan"))]
    plan: Option<String>,
    role: Option<Role>,
    active: Option<bool>,
}

impl CreateCustomerRequest {
    fn into_new_customer(self) -> shared::Result<NewCustomer> {
        let request = Self {
            email: self.email.trim().to_lowercase(),
            ..self
        };
        request.validate()?;

        Ok(NewCustomer {
            email: request.email,
            name: request.name.trim().to_string(),
            company: request.company.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            role: request.role.unwrap_or(Role::Customer),
            plan: request.plan.unwrap_or_else(|| "trial".to_string()),
        })
    }
}

impl UpdateCustomerRequest {
    fn into_changes(self, caller: &Caller, customer_id: Uuid) -> shared::Result<CustomerChanges> {
        self.validate()?;

        // An admin cannot lock themselves out.
        let demotes_self = customer_id == caller.customer_id
            && (self.active == Some(false) || self.role == Some(Role::Customer));
        if demotes_self {
            return Err(shared::Error::Validation(
                "Kendi yönetici hesabınızı pasifleştiremez veya yetkisini düşüremezsiniz".to_string(),
            ));
        }

        Ok(CustomerChanges {
            name: self.name.map(|n| n.trim().to_string()),
            company: self.company.map(|c| c.trim().to_string()),
            plan: self.plan,
            role: self.role,
            active: self.active,
        })
    }
}

fn activity_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|l| l.parse::<i64>().ok())
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT)
}

/// Map a duplicate-email insert to a client error.
fn duplicate_email(err: shared::Error) -> shared::Error {
    match err {
        shared::Error::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            shared::Error::Validation("Bu e-posta ile kayıtlı bir müşteri zaten var".to_string())
        }
        other => other,
    }
}

/// Application state
struct AppState {
    db_pool: PgPool,
    config: Config,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = Config::from_env()?;
        let db_pool = shared::db::connect_from_config(&config).await?;

        Ok(Self { db_pool, config })
    }
}

async fn route(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let path = route_path(event.uri().path());
    let method = event.method().as_str();

    let segments = path_segments(path, "/v1/admin/customers")
        .ok_or_else(|| shared::Error::NotFound("Not found".to_string()))?;

    let caller = resolve_caller(&state.db_pool, event, state.config.jwt_secret.as_deref()).await?;
    caller.ensure_admin()?;

    match (method, segments.as_slice()) {
        ("GET", []) => {
            let customers = store::list_customers(&state.db_pool).await?;
            let body: Vec<CustomerResponse> = customers.iter().map(CustomerResponse::from).collect();
            success_response(200, body)
        }

        ("POST", []) => {
            let request: CreateCustomerRequest = parse_json(event.body())?;
            let new_customer = request.into_new_customer()?;
            let customer = store::insert_customer(&state.db_pool, new_customer)
                .await
                .map_err(duplicate_email)?;

            info!("Admin {} created customer {}", caller.customer_id, customer.id);
            success_response(201, CustomerResponse::from(&customer))
        }

        ("PUT", [id]) => {
            let customer_id = parse_id(id, "müşteri")?;
            let request: UpdateCustomerRequest = parse_json(event.body())?;
            let changes = request.into_changes(&caller, customer_id)?;

            let customer = store::update_customer(&state.db_pool, customer_id, changes)
                .await?
                .ok_or_else(|| shared::Error::NotFound("Müşteri bulunamadı".to_string()))?;

            info!("Admin {} updated customer {}", caller.customer_id, customer.id);
            success_response(200, CustomerResponse::from(&customer))
        }

        ("GET", [id, "activity"]) => {
            let customer_id = parse_id(id, "müşteri")?;
            if store::find_customer(&state.db_pool, customer_id).await?.is_none() {
                return Err(shared::Error::NotFound("Müşteri bulunamadı".to_string()));
            }

            let params = event.query_string_parameters();
            let limit = activity_limit(params.first("limit"));
            let entries = store::list_activity(&state.db_pool, customer_id, limit).await?;

            success_response(200, entries)
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn admin() -> Caller {
        Caller {
            customer_id: Uuid::new_v4(),
            role: Role::Admin,
            email: "admin@example.com".to_string(),
        }
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateCustomerRequest = serde_json::from_value(serde_json::json!({
            "email": " Muhasebe@Example.com ",
            "name": "Muhasebe",
            "company": "  "
        }))
        .unwrap();

        let customer = request.into_new_customer().unwrap();
        assert_eq!(customer.email, "muhasebe@example.com");
        assert_eq!(customer.role, Role::Customer);
        assert_eq!(customer.plan, "trial");
        assert_eq!(customer.company, None);
    }

    #[test]
    fn test_create_request_rejects_bad_email_and_role() {
        let bad_email: CreateCustomerRequest =
            serde_json::from_value(serde_json::json!({ "email": "not-an-email", "name": "X" }))
                .unwrap();
        assert!(matches!(
            bad_email.into_new_customer(),
            Err(shared::Error::Validation(_))
        ));

        let bad_role = serde_json::from_value::<CreateCustomerRequest>(serde_json::json!({
            "email": "a@example.com", "name": "X", "role": "superuser"
        }));
        assert!(bad_role.is_err());
    }

    #[test]
    fn test_admin_cannot_deactivate_self() {
        let admin = admin();
        let request = UpdateCustomerRequest {
            active: Some(false),
            ..Default::default()
        };
        assert!(request.into_changes(&admin, admin.customer_id).is_err());

        let demote = UpdateCustomerRequest {
            role: Some(Role::Customer),
            ..Default::default()
        };
        assert!(demote.into_changes(&admin, admin.customer_id).is_err());

        let other = UpdateCustomerRequest {
            active: Some(false),
            ..Default::default()
        };
        let changes = other.into_changes(&admin, Uuid::new_v4()).unwrap();
        assert_eq!(changes.active, Some(false));
    }

    #[test]
    fn test_activity_limit() {
        assert_eq!(activity_limit(None), DEFAULT_ACTIVITY_LIMIT);
        assert_eq!(activity_limit(Some("10")), 10);
        assert_eq!(activity_limit(Some("0")), 1);
        assert_eq!(activity_limit(Some("5000")), MAX_ACTIVITY_LIMIT);
        assert_eq!(activity_limit(Some("abc")), DEFAULT_ACTIVITY_LIMIT);
    }
}
