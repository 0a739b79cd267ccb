//! Reports Lambda - Handles the report catalog.
//!
//! Endpoints:
//! - POST /v1/reports - Create a report
//! - GET /v1/reports - List reports (`includeInactive=true`, admins may pass `ownerId`)
//! - GET /v1/reports/{id} - Get report details
//! - PUT /v1/reports/{id} - Update report
//! - DELETE /v1/reports/{id} - Delete report
//! - POST /v1/reports/{id}/deactivate - Hide report from chat matching
//! - POST /v1/reports/{id}/execute - Run report with explicit parameters

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::Deserialize;
use shared::http::{parse_id, parse_json, path_segments, route_path};
use shared::models::{clean_keywords, DisplayType, Report, ReportCategory, ReportResponse};
use shared::store::{self, NewReport, ReportChanges};
use shared::{
    finish, resolve_caller, success_response, Caller, Config, ExtractedParameters, ReportExecutor,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Create report request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateReportRequest {
    #[validate(length(min = 1, max = 200, message = "Rapor adı 1-200 karakter olmalı"))]
    name: String,
    #[serde(default)]
    #[validate(length(max = 2000, message = "Açıklama en fazla 2000 karakter olabilir"))]
    description: String,
    #[validate(length(min = 1, message = "SQL şablonu boş olamaz"))]
    sql_template: String,
    #[serde(default)]
    #[validate(length(max = 50, message = "En fazla 50 anahtar kelime girilebilir"))]
    keywords: Vec<String>,
    category: Option<String>,
    display_type: Option<String>,
    #[serde(default)]
    #[validate(length(max = 20, message = "En fazla 20 örnek soru girilebilir"))]
    example_questions: Vec<String>,
    /// Admins may create reports on behalf of a customer.
    owner_id: Option<Uuid>,
}

/// Update report request
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateReportRequest {
    #[validate(length(min = 1, max = 200, message = "Rapor adı 1-200 karakter olmalı"))]
    name: Option<String>,
    #[validate(length(max = 2000, message = "Açıklama en fazla 2000 karakter olabilir"))]
    description: Option<String>,
    #[validate(length(min = 1, message = "SQL şablonu boş olamaz"))]
    sql_template: Option<String>,
    #[validate(length(max = 50, message = "En fazla 50 anahtar kelime girilebilir"))]
    keywords: Option<Vec<String>>,
    /// The empty string clears the category.
    category: Option<String>,
    display_type: Option<String>,
    #[validate(length(max = 20, message = "En fazla 20 örnek soru girilebilir"))]
    example_questions: Option<Vec<String>>,
    active: Option<bool>,
}

fn parse_display_type(raw: Option<&str>) -> shared::Result<Option<DisplayType>> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .transpose()
}

fn clean_questions(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect()
}

impl CreateReportRequest {
    fn into_new_report(self, caller: &Caller) -> shared::Result<NewReport> {
        self.validate()?;

        let owner_id = match self.owner_id {
            Some(owner_id) if owner_id != caller.customer_id => {
                caller.ensure_admin()?;
                owner_id
            }
            _ => caller.customer_id,
        };

        let category = match self.category.as_deref() {
            Some(raw) => ReportCategory::parse_optional(raw)?,
            None => None,
        };

        Ok(NewReport {
            owner_id,
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            sql_template: self.sql_template,
            keywords: clean_keywords(&self.keywords),
            category,
            display_type: parse_display_type(self.display_type.as_deref())?.unwrap_or_default(),
            example_questions: clean_questions(self.example_questions),
        })
    }
}

impl UpdateReportRequest {
    fn into_changes(self) -> shared::Result<ReportChanges> {
        self.validate()?;

        Ok(ReportChanges {
            name: self.name.map(|n| n.trim().to_string()),
            description: self.description.map(|d| d.trim().to_string()),
            sql_template: self.sql_template,
            keywords: self.keywords.map(clean_keywords),
            category: self
                .category
                .as_deref()
                .map(ReportCategory::parse_optional)
                .transpose()?,
            display_type: parse_display_type(self.display_type.as_deref())?,
            example_questions: self.example_questions.map(clean_questions),
            active: self.active,
        })
    }
}

/// Reject a reversed date range before it reaches the connector.
fn check_range(params: &ExtractedParameters) -> shared::Result<()> {
    match (params.date1, params.date2) {
        (Some(start), Some(end)) if start > end => Err(shared::Error::Validation(
            "Başlangıç tarihi bitiş tarihinden sonra olamaz".to_string(),
        )),
        _ => Ok(()),
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

/// Load a report the caller may touch: 404 if missing, 403 if foreign.
async fn load_report(state: &AppState, caller: &Caller, segment: &str) -> shared::Result<Report> {
    let id = parse_id(segment, "rapor")?;
    let report = store::find_report(&state.db_pool, id)
        .await?
        .ok_or_else(|| shared::Error::NotFound("Rapor bulunamadı".to_string()))?;
    caller.ensure_access(&report)?;
    Ok(report)
}

async fn audit(state: &AppState, caller: &Caller, report: &Report, action: &str) {
    let detail = serde_json::json!({ "reportName": report.name });
    if let Err(e) =
        store::record_activity(&state.db_pool, caller.customer_id, Some(report.id), action, detail)
            .await
    {
        warn!("Failed to record {} for report {}: {}", action, report.id, e);
    }
}

async fn route(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let path = route_path(event.uri().path());
    let method = event.method().as_str();

    let segments = path_segments(path, "/v1/reports")
        .ok_or_else(|| shared::Error::NotFound("Not found".to_string()))?;

    let caller = resolve_caller(&state.db_pool, event, state.config.jwt_secret.as_deref()).await?;

    match (method, segments.as_slice()) {
        // Create report
        ("POST", []) => {
            let request: CreateReportRequest = parse_json(event.body())?;
            let new_report = request.into_new_report(&caller)?;
            let report = store::insert_report(&state.db_pool, new_report).await?;

            info!("Created report {} ({}) for {}", report.id, report.name, report.owner_id);
            audit(state, &caller, &report, "report.create").await;

            success_response(201, ReportResponse::from(&report))
        }

        // List reports
        ("GET", []) => {
            let params = event.query_string_parameters();
            let include_inactive = params.first("includeInactive").is_some_and(|v| v == "true");

            let owner_id = match params.first("ownerId") {
                Some(raw) => {
                    let owner_id = parse_id(raw, "müşteri")?;
                    if owner_id != caller.customer_id {
                        caller.ensure_admin()?;
                    }
                    owner_id
                }
                None => caller.customer_id,
            };

            let reports = store::list_reports(&state.db_pool, owner_id, include_inactive).await?;
            let body: Vec<ReportResponse> = reports.iter().map(ReportResponse::from).collect();

            success_response(200, body)
        }

        // Get report
        ("GET", [id]) => {
            let report = load_report(state, &caller, id).await?;
            success_response(200, ReportResponse::from(&report))
        }

        // Update report
        ("PUT", [id]) => {
            let report = load_report(state, &caller, id).await?;
            let request: UpdateReportRequest = parse_json(event.body())?;
            let changes = request.into_changes()?;

            let updated = store::update_report(&state.db_pool, report.id, changes)
                .await?
                .ok_or_else(|| shared::Error::NotFound("Rapor bulunamadı".to_string()))?;

            info!("Updated report {}", updated.id);
            audit(state, &caller, &updated, "report.update").await;

            success_response(200, ReportResponse::from(&updated))
        }

        // Delete report
        ("DELETE", [id]) => {
            let report = load_report(state, &caller, id).await?;
            if !store::delete_report(&state.db_pool, report.id).await? {
                return Err(shared::Error::NotFound("Rapor bulunamadı".to_string()));
            }

            info!("Deleted report {}", report.id);
            audit(state, &caller, &report, "report.delete").await;

            success_response(200, serde_json::json!({ "deleted": report.id.to_string() }))
        }

        // Deactivate report
        ("POST", [id, "deactivate"]) => {
            let report = load_report(state, &caller, id).await?;
            let changes = ReportChanges {
                active: Some(false),
                ..Default::default()
            };

            let updated = store::update_report(&state.db_pool, report.id, changes)
                .await?
                .ok_or_else(|| shared::Error::NotFound("Rapor bulunamadı".to_string()))?;

            info!("Deactivated report {}", updated.id);
            audit(state, &caller, &updated, "report.deactivate").await;

            success_response(200, ReportResponse::from(&updated))
        }

        // Execute report
        ("POST", [id, "execute"]) => {
            let report = load_report(state, &caller, id).await?;
            if !report.active {
                return Err(shared::Error::Validation("Rapor pasif durumda".to_string()));
            }

            let params: ExtractedParameters = if event.body().is_empty() {
                ExtractedParameters::default()
            } else {
                parse_json(event.body())?
            };
            check_range(&params)?;

            let execution = state
                .executor
                .execute(&state.db_pool, &caller, &report, params)
                .await?;

            success_response(200, execution)
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
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use shared::Role;

    fn caller(role: Role) -> Caller {
        Caller {
            customer_id: Uuid::new_v4(),
            role,
            email: "owner@example.com".to_string(),
        }
    }

    fn create_request(json: serde_json::Value) -> CreateReportRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_create_request_normalizes_fields() {
        let customer = caller(Role::Customer);
        let request = create_request(serde_json::json!({
            "name": "  Günlük Satışlar ",
            "sqlTemplate": "SELECT * FROM satis WHERE tarih BETWEEN @date1 AND @date2",
            "keywords": ["Satış", "ciro", "satış", " "],
            "category": "sales",
            "displayType": "bar",
            "exampleQuestions": ["bugünkü satışlar", ""]
        }));

        let new_report = request.into_new_report(&customer).unwrap();
        assert_eq!(new_report.owner_id, customer.customer_id);
        assert_eq!(new_report.name, "Günlük Satışlar");
        assert_eq!(new_report.keywords, vec!["satış", "ciro"]);
        assert_eq!(new_report.category, Some(ReportCategory::Sales));
        assert_eq!(new_report.display_type, DisplayType::Bar);
        assert_eq!(new_report.example_questions, vec!["bugünkü satışlar"]);
    }

    #[test]
    fn test_create_request_defaults() {
        let request = create_request(serde_json::json!({
            "name": "Kasa",
            "sqlTemplate": "SELECT 1"
        }));
        let new_report = request.into_new_report(&caller(Role::Customer)).unwrap();
        assert_eq!(new_report.category, None);
        assert_eq!(new_report.display_type, DisplayType::Table);
        assert!(new_report.keywords.is_empty());
    }

    #[test]
    fn test_create_request_rejects_invalid_input() {
        let customer = caller(Role::Customer);

        let empty_name = create_request(serde_json::json!({ "name": "", "sqlTemplate": "SELECT 1" }));
        assert!(matches!(
            empty_name.into_new_report(&customer),
            Err(shared::Error::Validation(_))
        ));

        let bad_category = create_request(serde_json::json!({
            "name": "Kasa", "sqlTemplate": "SELECT 1", "category": "marketing"
        }));
        assert!(bad_category.into_new_report(&customer).is_err());

        let bad_display = create_request(serde_json::json!({
            "name": "Kasa", "sqlTemplate": "SELECT 1", "displayType": "radar"
        }));
        assert!(bad_display.into_new_report(&customer).is_err());
    }

    #[test]
    fn test_only_admins_create_for_other_owners() {
        let other = Uuid::new_v4();
        let json = serde_json::json!({
            "name": "Kasa", "sqlTemplate": "SELECT 1", "ownerId": other.to_string()
        });

        let denied = create_request(json.clone()).into_new_report(&caller(Role::Customer));
        assert!(matches!(denied, Err(shared::Error::Unauthorized(_))));

        let allowed = create_request(json).into_new_report(&caller(Role::Admin)).unwrap();
        assert_eq!(allowed.owner_id, other);
    }

    #[test]
    fn test_update_request_category_semantics() {
        let untouched = UpdateReportRequest::default().into_changes().unwrap();
        assert_eq!(untouched.category, None);

        let cleared = UpdateReportRequest {
            category: Some(String::new()),
            ..Default::default()
        }
        .into_changes()
        .unwrap();
        assert_eq!(cleared.category, Some(None));

        let set = UpdateReportRequest {
            category: Some("stock".to_string()),
            keywords: Some(vec!["Stok".to_string(), "stok".to_string()]),
            ..Default::default()
        }
        .into_changes()
        .unwrap();
        assert_eq!(set.category, Some(Some(ReportCategory::Stock)));
        assert_eq!(set.keywords, Some(vec!["stok".to_string()]));
    }

    #[test]
    fn test_check_range() {
        let ordered = ExtractedParameters {
            date1: NaiveDate::from_ymd_opt(2026, 10, 1),
            date2: NaiveDate::from_ymd_opt(2026, 10, 14),
            search: None,
        };
        assert!(check_range(&ordered).is_ok());

        let reversed = ExtractedParameters {
            date1: ordered.date2,
            date2: ordered.date1,
            search: None,
        };
        assert!(check_range(&reversed).is_err());
        assert!(check_range(&ExtractedParameters::default()).is_ok());
    }

    #[test]
    fn test_execute_body_parses_dates() {
        let params: ExtractedParameters =
            serde_json::from_str(r#"{"date1":"2026-10-01","date2":"2026-10-14","search":"Ay"}"#)
                .unwrap();
        assert_eq!(params.date1, NaiveDate::from_ymd_opt(2026, 10, 1));
        assert_eq!(params.search.as_deref(), Some("Ay"));
    }
}
