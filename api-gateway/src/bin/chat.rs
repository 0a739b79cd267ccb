//! Chat Lambda - Handles the /v1/chat endpoint.
//!
//! Resolves a free-text question to one of the caller's saved reports, fills
//! the report's parameters from the question, and runs it through the SQL
//! connector. When the question does not clearly identify a report the caller
//! gets suggestions instead of an error.

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use serde::{Deserialize, Serialize};
use shared::http::{parse_id, parse_json, route_path};
use shared::matcher::{MatchCandidate, MatchOutcome};
use shared::models::{DisplayType, Report};
use shared::{
    body_response, error_response, finish, resolve_caller, store, Caller, Config,
    ExtractedParameters, ReportExecutor,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

const NO_MATCH_MESSAGE: &str =
    "Sorunuzla eşleşen bir rapor bulunamadı. Aşağıdaki raporlardan birini deneyebilirsiniz.";
const EMPTY_CATALOG_MESSAGE: &str = "Henüz tanımlı aktif bir raporunuz yok.";
const AMBIGUOUS_MESSAGE: &str =
    "Sorunuz birden fazla raporla eşleşiyor. Hangisini çalıştırmak istediğinizi seçin.";

/// Chat request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    #[serde(default)]
    #[validate(length(max = 1000, message = "Mesaj en fazla 1000 karakter olabilir"))]
    message: String,
    report_id: Option<String>,
}

/// Report summary returned with a result or a suggestion
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportSummary {
    id: String,
    name: String,
    description: String,
    category: String,
    display_type: DisplayType,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.to_string(),
            name: report.name.clone(),
            description: report.description.clone(),
            category: report
                .category
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
            display_type: report.display_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Suggestion {
    id: String,
    name: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<u32>,
}

impl Suggestion {
    fn scored(candidate: &MatchCandidate<'_>) -> Self {
        Self {
            id: candidate.report.id.to_string(),
            name: candidate.report.name.clone(),
            description: candidate.report.description.clone(),
            score: Some(candidate.score),
        }
    }

    fn unscored(report: &Report) -> Self {
        Self {
            id: report.id.to_string(),
            name: report.name.clone(),
            description: report.description.clone(),
            score: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatMetadata {
    row_count: usize,
    parameters: ExtractedParameters,
    executed_at: String,
    duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<u32>,
}

/// Successful chat response
#[derive(Debug, Serialize)]
struct ChatSuccess {
    success: bool,
    report: ReportSummary,
    data: Vec<serde_json::Value>,
    metadata: ChatMetadata,
}

/// No-match or ambiguous chat response
#[derive(Debug, Serialize)]
struct ChatFallback {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ambiguous: Option<bool>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestions: Option<Vec<Suggestion>>,
}

/// What to do with a match outcome.
enum Resolution<'a> {
    Run { report: &'a Report, score: u32 },
    Fallback(ChatFallback),
}

fn decide(outcome: MatchOutcome<'_>) -> Resolution<'_> {
    match outcome {
        MatchOutcome::Matched(candidate) => Resolution::Run {
            report: candidate.report,
            score: candidate.score,
        },
        MatchOutcome::Ambiguous(candidates) => Resolution::Fallback(ChatFallback {
            success: false,
            ambiguous: Some(true),
            message: AMBIGUOUS_MESSAGE.to_string(),
            suggestions: Some(candidates.iter().map(Suggestion::scored).collect()),
        }),
        MatchOutcome::NoMatch(reports) => Resolution::Fallback(ChatFallback {
            success: false,
            ambiguous: None,
            message: if reports.is_empty() {
                EMPTY_CATALOG_MESSAGE.to_string()
            } else {
                NO_MATCH_MESSAGE.to_string()
            },
            suggestions: Some(reports.into_iter().map(Suggestion::unscored).collect()),
        }),
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

async fn run_report(
    state: &AppState,
    caller: &Caller,
    report: &Report,
    params: ExtractedParameters,
    score: Option<u32>,
) -> shared::Result<Response<Body>> {
    let execution = state
        .executor
        .execute(&state.db_pool, caller, report, params)
        .await?;

    let body = ChatSuccess {
        success: true,
        report: ReportSummary::from(report),
        metadata: ChatMetadata {
            row_count: execution.row_count,
            parameters: execution.parameters,
            executed_at: execution.executed_at.to_rfc3339(),
            duration_ms: execution.duration_ms,
            score,
        },
        data: execution.rows,
    };

    body_response(200, &body)
}

async fn chat(state: &AppState, caller: &Caller, request: ChatRequest) -> shared::Result<Response<Body>> {
    request.validate()?;

    let message = request.message.trim();
    let report_id = request.report_id.as_deref().map(str::trim).filter(|s| !s.is_empty());

    if message.is_empty() && report_id.is_none() {
        return Err(shared::Error::Validation("Mesaj boş olamaz".to_string()));
    }

    let params = shared::extract(message, state.config.today());

    // An explicit report id skips matching entirely.
    if let Some(raw_id) = report_id {
        let id = parse_id(raw_id, "rapor")?;
        let report = store::find_report(&state.db_pool, id)
            .await?
            .ok_or_else(|| shared::Error::NotFound("Rapor bulunamadı".to_string()))?;
        caller.ensure_access(&report)?;
        if !report.active {
            return Err(shared::Error::Validation("Rapor pasif durumda".to_string()));
        }

        info!("Running report {} selected by id for {}", id, caller.customer_id);
        return run_report(state, caller, &report, params, None).await;
    }

    let catalog = store::active_reports(&state.db_pool, caller.catalog_scope()).await?;
    info!(
        "Matching chat message against {} reports for {}",
        catalog.len(),
        caller.customer_id
    );

    match decide(shared::resolve(message, &catalog)) {
        Resolution::Run { report, score } => {
            info!("Matched report {} with score {}", report.id, score);
            run_report(state, caller, report, params, Some(score)).await
        }
        Resolution::Fallback(fallback) => {
            info!(
                "No confident match (ambiguous={})",
                fallback.ambiguous.unwrap_or(false)
            );
            body_response(200, &fallback)
        }
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let path = route_path(event.uri().path());
    let method = event.method().as_str();

    info!("Received request: method={}, path={}", method, path);

    if path != "/v1/chat" {
        return error_response(404, "Not found");
    }
    if method != "POST" {
        return error_response(405, "Method not allowed");
    }

    finish(process(&state, &event).await)
}

async fn process(state: &AppState, event: &Request) -> shared::Result<Response<Body>> {
    let caller = resolve_caller(&state.db_pool, event, state.config.jwt_secret.as_deref()).await?;
    let request: ChatRequest = parse_json(event.body())?;
    chat(state, &caller, request).await
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
