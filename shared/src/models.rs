//! Shared data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::Error;

/// Report category. The Turkish label is what the matcher scores against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Sales,
    Stock,
    Finance,
    Customer,
    Purchasing,
    Personnel,
    Other,
}

impl ReportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Sales => "sales",
            ReportCategory::Stock => "stock",
            ReportCategory::Finance => "finance",
            ReportCategory::Customer => "customer",
            ReportCategory::Purchasing => "purchasing",
            ReportCategory::Personnel => "personnel",
            ReportCategory::Other => "other",
        }
    }

    /// Display label shown in the client.
    pub fn label(&self) -> &'static str {
        match self {
            ReportCategory::Sales => "Satış",
            ReportCategory::Stock => "Stok",
            ReportCategory::Finance => "Finans",
            ReportCategory::Customer => "Müşteri",
            ReportCategory::Purchasing => "Satın Alma",
            ReportCategory::Personnel => "Personel",
            ReportCategory::Other => "Diğer",
        }
    }

    /// Parse a stored category. The empty string means "no category".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some)
    }
}

impl FromStr for ReportCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sales" => Ok(ReportCategory::Sales),
            "stock" => Ok(ReportCategory::Stock),
            "finance" => Ok(ReportCategory::Finance),
            "customer" => Ok(ReportCategory::Customer),
            "purchasing" => Ok(ReportCategory::Purchasing),
            "personnel" => Ok(ReportCategory::Personnel),
            "other" => Ok(ReportCategory::Other),
            _ => Err(Error::Validation(format!("Geçersiz kategori: {}", s))),
        }
    }
}

/// How the client renders a report's result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    #[default]
    Table,
    Card,
    Pie,
    Bar,
}

impl DisplayType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayType::Table => "table",
            DisplayType::Card => "card",
            DisplayType::Pie => "pie",
            DisplayType::Bar => "bar",
        }
    }
}

impl FromStr for DisplayType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(DisplayType::Table),
            "card" => Ok(DisplayType::Card),
            "pie" => Ok(DisplayType::Pie),
            "bar" => Ok(DisplayType::Bar),
            _ => Err(Error::Validation(format!("Geçersiz görünüm tipi: {}", s))),
        }
    }
}

/// A saved, parameterized SQL query owned by one customer.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    /// Opaque SQL text with `@date1`, `@date2`, `@search` placeholders.
    pub sql_template: String,
    pub active: bool,
    pub keywords: Vec<String>,
    pub category: Option<ReportCategory>,
    pub display_type: DisplayType,
    pub example_questions: Vec<String>,
    pub usage_count: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lowercase, trim and de-duplicate keywords, keeping first-seen order.
pub fn clean_keywords<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw {
        let keyword = keyword.as_ref().trim().to_lowercase();
        if !keyword.is_empty() && !keywords.contains(&keyword) {
            keywords.push(keyword);
        }
    }
    keywords
}

/// Report as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: String,
    pub sql_template: String,
    pub active: bool,
    pub keywords: Vec<String>,
    /// Category key, or the empty string when uncategorised.
    pub category: String,
    pub display_type: DisplayType,
    pub example_questions: Vec<String>,
    pub usage_count: i64,
    pub last_used_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Report> for ReportResponse {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id.to_string(),
            owner_id: report.owner_id.to_string(),
            name: report.name.clone(),
            description: report.description.clone(),
            sql_template: report.sql_template.clone(),
            active: report.active,
            keywords: report.keywords.clone(),
            category: report
                .category
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
            display_type: report.display_type,
            example_questions: report.example_questions.clone(),
            usage_count: report.usage_count,
            last_used_at: report.last_used_at.map(|dt| dt.to_rfc3339()),
            created_at: report.created_at.to_rfc3339(),
            updated_at: report.updated_at.to_rfc3339(),
        }
    }
}

/// Caller role within the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "customer" => Ok(Role::Customer),
            _ => Err(Error::Validation(format!("Invalid role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer account (tenant).
#[derive(Debug, Clone)]
pub struct Customer {
    pub id: Uuid,
    pub cognito_sub: Option<String>,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Role,
    pub plan: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Customer as returned by the admin API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Role,
    pub plan: String,
    pub active: bool,
    pub created_at: String,
}

impl From<&Customer> for CustomerResponse {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id.to_string(),
            email: customer.email.clone(),
            name: customer.name.clone(),
            company: customer.company.clone(),
            role: customer.role,
            plan: customer.plan.clone(),
            active: customer.active,
            created_at: customer.created_at.to_rfc3339(),
        }
    }
}

/// A customer's stored connector credentials and SQL Server location.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub customer_id: Uuid,
    pub client_id: String,
    pub client_pass: String,
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub updated_at: DateTime<Utc>,
}

/// Connector settings as returned by the API, secrets masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSettingsResponse {
    pub client_id: String,
    pub client_pass: String,
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub updated_at: String,
}

/// Placeholder returned instead of stored secrets.
pub const SECRET_MASK: &str = "********";

impl From<&ConnectorSettings> for ConnectorSettingsResponse {
    fn from(settings: &ConnectorSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_pass: SECRET_MASK.to_string(),
            server: settings.server.clone(),
            database: settings.database.clone(),
            user: settings.user.clone(),
            password: SECRET_MASK.to_string(),
            port: settings.port,
            encrypt: settings.encrypt,
            trust_server_certificate: settings.trust_server_certificate,
            updated_at: settings.updated_at.to_rfc3339(),
        }
    }
}

/// Audit trail entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub customer_id: String,
    pub report_id: Option<String>,
    pub action: String,
    pub detail: serde_json::Value,
    pub created_at: String,
}
