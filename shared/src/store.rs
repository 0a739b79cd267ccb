//! Postgres finders for reports, customers, connectors and the activity log.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    ActivityEntry, ConnectorSettings, Customer, DisplayType, Report, ReportCategory, Role,
};
use crate::Result;

const REPORT_COLUMNS: &str = r#"
    id, owner_id, name, description, sql_template, active, keywords, category,
    display_type, example_questions, usage_count, last_used_at, created_at, updated_at
"#;

const CUSTOMER_COLUMNS: &str =
    "id, cognito_sub, email, name, company, role, plan, active, created_at";

/// Report row from database
#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: String,
    sql_template: String,
    active: bool,
    keywords: Vec<String>,
    category: String,
    display_type: String,
    example_questions: Vec<String>,
    usage_count: i64,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        // Stored values were validated on write; anything unrecognised is
        // treated as uncategorised rather than failing the whole catalog.
        let category = ReportCategory::parse_optional(&row.category).unwrap_or_else(|_| {
            warn!("Report {} has unknown category {:?}", row.id, row.category);
            None
        });
        let display_type = row.display_type.parse().unwrap_or_default();

        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            sql_template: row.sql_template,
            active: row.active,
            keywords: row.keywords,
            category,
            display_type,
            example_questions: row.example_questions,
            usage_count: row.usage_count,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Whose reports a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogScope {
    Owner(Uuid),
    All,
}

/// Values for a new report.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub sql_template: String,
    pub keywords: Vec<String>,
    pub category: Option<ReportCategory>,
    pub display_type: DisplayType,
    pub example_questions: Vec<String>,
}

/// Partial report update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ReportChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub sql_template: Option<String>,
    pub keywords: Option<Vec<String>>,
    /// `Some(None)` clears the category.
    pub category: Option<Option<ReportCategory>>,
    pub display_type: Option<DisplayType>,
    pub example_questions: Option<Vec<String>>,
    pub active: Option<bool>,
}

fn category_value(category: Option<ReportCategory>) -> String {
    category.map(|c| c.as_str().to_string()).unwrap_or_default()
}

pub async fn find_report(pool: &PgPool, report_id: Uuid) -> Result<Option<Report>> {
    let row: Option<ReportRow> =
        sqlx::query_as(&format!("SELECT {} FROM reports WHERE id = $1", REPORT_COLUMNS))
            .bind(report_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(Report::from))
}

/// Active reports visible in `scope`, in catalog order.
pub async fn active_reports(pool: &PgPool, scope: CatalogScope) -> Result<Vec<Report>> {
    let rows: Vec<ReportRow> = match scope {
        CatalogScope::Owner(owner_id) => {
            sqlx::query_as(&format!(
                "SELECT {} FROM reports WHERE active AND owner_id = $1 ORDER BY created_at, id",
                REPORT_COLUMNS
            ))
            .bind(owner_id)
            .fetch_all(pool)
            .await?
        }
        CatalogScope::All => {
            sqlx::query_as(&format!(
                "SELECT {} FROM reports WHERE active ORDER BY created_at, id",
                REPORT_COLUMNS
            ))
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(Report::from).collect())
}

pub async fn list_reports(
    pool: &PgPool,
    owner_id: Uuid,
    include_inactive: bool,
) -> Result<Vec<Report>> {
    let rows: Vec<ReportRow> = sqlx::query_as(&format!(
        r#"
        SELECT {} FROM reports
        WHERE owner_id = $1 AND (active OR $2)
        ORDER BY created_at, id
        "#,
        REPORT_COLUMNS
    ))
    .bind(owner_id)
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Report::from).collect())
}

pub async fn insert_report(pool: &PgPool, report: NewReport) -> Result<Report> {
    let row: ReportRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO reports (id, owner_id, name, description, sql_template, active,
                             keywords, category, display_type, example_questions)
        VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9)
        RETURNING {}
        "#,
        REPORT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(report.owner_id)
    .bind(&report.name)
    .bind(&report.description)
    .bind(&report.sql_template)
    .bind(&report.keywords)
    .bind(category_value(report.category))
    .bind(report.display_type.as_str())
    .bind(&report.example_questions)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

pub async fn update_report(
    pool: &PgPool,
    report_id: Uuid,
    changes: ReportChanges,
) -> Result<Option<Report>> {
    let row: Option<ReportRow> = sqlx::query_as(&format!(
        r#"
        UPDATE reports SET
            name = COALESCE($2, name),
            description = COALESCE($3, description),
            sql_template = COALESCE($4, sql_template),
            keywords = COALESCE($5, keywords),
            category = COALESCE($6, category),
            display_type = COALESCE($7, display_type),
            example_questions = COALESCE($8, example_questions),
            active = COALESCE($9, active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        REPORT_COLUMNS
    ))
    .bind(report_id)
    .bind(changes.name)
    .bind(changes.description)
    .bind(changes.sql_template)
    .bind(changes.keywords)
    .bind(changes.category.map(category_value))
    .bind(changes.display_type.map(|d| d.as_str()))
    .bind(changes.example_questions)
    .bind(changes.active)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Report::from))
}

/// Hard delete. Returns whether a row was removed.
pub async fn delete_report(pool: &PgPool, report_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM reports WHERE id = $1")
        .bind(report_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Bump the usage counter. Concurrent executions may race; that is accepted.
pub async fn record_usage(pool: &PgPool, report_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE reports SET usage_count = usage_count + 1, last_used_at = NOW() WHERE id = $1",
    )
    .bind(report_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Connector settings row from database
#[derive(Debug, sqlx::FromRow)]
struct ConnectorRow {
    customer_id: Uuid,
    client_id: String,
    client_pass: String,
    server: String,
    database_name: String,
    db_user: String,
    db_password: String,
    port: i32,
    encrypt: bool,
    trust_server_certificate: bool,
    updated_at: DateTime<Utc>,
}

impl From<ConnectorRow> for ConnectorSettings {
    fn from(row: ConnectorRow) -> Self {
        Self {
            customer_id: row.customer_id,
            client_id: row.client_id,
            client_pass: row.client_pass,
            server: row.server,
            database: row.database_name,
            user: row.db_user,
            password: row.db_password,
            port: u16::try_from(row.port).unwrap_or(1433),
            encrypt: row.encrypt,
            trust_server_certificate: row.trust_server_certificate,
            updated_at: row.updated_at,
        }
    }
}

pub async fn find_connector(pool: &PgPool, customer_id: Uuid) -> Result<Option<ConnectorSettings>> {
    let row: Option<ConnectorRow> = sqlx::query_as(
        r#"
        SELECT customer_id, client_id, client_pass, server, database_name, db_user,
               db_password, port, encrypt, trust_server_certificate, updated_at
        FROM connectors
        WHERE customer_id = $1
        "#,
    )
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(ConnectorSettings::from))
}

pub async fn upsert_connector(pool: &PgPool, settings: &ConnectorSettings) -> Result<ConnectorSettings> {
    let row: ConnectorRow = sqlx::query_as(
        r#"
        INSERT INTO connectors (customer_id, client_id, client_pass, server, database_name,
                                db_user, db_password, port, encrypt, trust_server_certificate)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (customer_id) DO UPDATE SET
            client_id = EXCLUDED.client_id,
            client_pass = EXCLUDED.client_pass,
            server = EXCLUDED.server,
            database_name = EXCLUDED.database_name,
            db_user = EXCLUDED.db_user,
            db_password = EXCLUDED.db_password,
            port = EXCLUDED.port,
            encrypt = EXCLUDED.encrypt,
            trust_server_certificate = EXCLUDED.trust_server_certificate,
            updated_at = NOW()
        RETURNING customer_id, client_id, client_pass, server, database_name, db_user,
                  db_password, port, encrypt, trust_server_certificate, updated_at
        "#,
    )
    .bind(settings.customer_id)
    .bind(&settings.client_id)
    .bind(&settings.client_pass)
    .bind(&settings.server)
    .bind(&settings.database)
    .bind(&settings.user)
    .bind(&settings.password)
    .bind(i32::from(settings.port))
    .bind(settings.encrypt)
    .bind(settings.trust_server_certificate)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Customer row from database
#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    cognito_sub: Option<String>,
    email: String,
    name: String,
    company: Option<String>,
    role: String,
    plan: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: row.id,
            cognito_sub: row.cognito_sub,
            email: row.email,
            name: row.name,
            company: row.company,
            // Unknown roles never grant admin rights.
            role: row.role.parse().unwrap_or(Role::Customer),
            plan: row.plan,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

pub async fn find_customer(pool: &PgPool, customer_id: Uuid) -> Result<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as(&format!(
        "SELECT {} FROM customers WHERE id = $1",
        CUSTOMER_COLUMNS
    ))
    .bind(customer_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Customer::from))
}

pub async fn find_customer_by_sub(pool: &PgPool, cognito_sub: &str) -> Result<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as(&format!(
        "SELECT {} FROM customers WHERE cognito_sub = $1",
        CUSTOMER_COLUMNS
    ))
    .bind(cognito_sub)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Customer::from))
}

pub async fn list_customers(pool: &PgPool) -> Result<Vec<Customer>> {
    let rows: Vec<CustomerRow> = sqlx::query_as(&format!(
        "SELECT {} FROM customers ORDER BY created_at DESC",
        CUSTOMER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Customer::from).collect())
}

/// Values for an admin-created customer.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Role,
    pub plan: String,
}

pub async fn insert_customer(pool: &PgPool, customer: NewCustomer) -> Result<Customer> {
    let row: CustomerRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO customers (id, email, name, company, role, plan, active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        RETURNING {}
        "#,
        CUSTOMER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&customer.email)
    .bind(&customer.name)
    .bind(&customer.company)
    .bind(customer.role.as_str())
    .bind(&customer.plan)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Partial customer update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CustomerChanges {
    pub name: Option<String>,
    pub company: Option<String>,
    pub plan: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
}

pub async fn update_customer(
    pool: &PgPool,
    customer_id: Uuid,
    changes: CustomerChanges,
) -> Result<Option<Customer>> {
    let row: Option<CustomerRow> = sqlx::query_as(&format!(
        r#"
        UPDATE customers SET
            name = COALESCE($2, name),
            company = COALESCE($3, company),
            plan = COALESCE($4, plan),
            role = COALESCE($5, role),
            active = COALESCE($6, active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        CUSTOMER_COLUMNS
    ))
    .bind(customer_id)
    .bind(changes.name)
    .bind(changes.company)
    .bind(changes.plan)
    .bind(changes.role.map(|r| r.as_str()))
    .bind(changes.active)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Customer::from))
}

/// Create or refresh the customer behind a confirmed Cognito user.
///
/// An admin may have pre-created the account by email; the sub is attached
/// to that row instead of creating a second one.
pub async fn upsert_customer_from_signup(
    pool: &PgPool,
    cognito_sub: &str,
    email: &str,
    name: &str,
) -> Result<Customer> {
    let row: CustomerRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO customers (id, cognito_sub, email, name, role, plan, active)
        VALUES ($1, $2, $3, $4, 'customer', 'trial', TRUE)
        ON CONFLICT (email) DO UPDATE SET
            cognito_sub = EXCLUDED.cognito_sub,
            name = COALESCE(NULLIF(customers.name, ''), EXCLUDED.name),
            updated_at = NOW()
        RETURNING {}
        "#,
        CUSTOMER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(cognito_sub)
    .bind(email)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

pub async fn record_activity(
    pool: &PgPool,
    customer_id: Uuid,
    report_id: Option<Uuid>,
    action: &str,
    detail: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO activity_logs (id, customer_id, report_id, action, detail)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(report_id)
    .bind(action)
    .bind(detail)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_activity(pool: &PgPool, customer_id: Uuid, limit: i64) -> Result<Vec<ActivityEntry>> {
    let rows: Vec<(Uuid, Uuid, Option<Uuid>, String, serde_json::Value, DateTime<Utc>)> =
        sqlx::query_as(
            r#"
            SELECT id, customer_id, report_id, action, detail, created_at
            FROM activity_logs
            WHERE customer_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(id, customer_id, report_id, action, detail, created_at)| ActivityEntry {
            id: id.to_string(),
            customer_id: customer_id.to_string(),
            report_id: report_id.map(|u| u.to_string()),
            action,
            detail,
            created_at: created_at.to_rfc3339(),
        })
        .collect())
}
