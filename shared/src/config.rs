//! Configuration management for Lambda functions.

use chrono::{FixedOffset, NaiveDate, Utc};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::template::ParameterMode;
use crate::{Error, Result};

const DEFAULT_CONNECTOR_URL: &str = "https://kernel.connectorabi.com";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database host
    pub db_host: String,
    /// Database name
    pub db_name: String,
    /// Database port
    pub db_port: u16,
    /// ARN of the secret containing database credentials
    pub db_secret_arn: String,
    /// AWS region
    pub aws_region: String,
    /// Base URL of the SQL connector proxy
    pub connector_url: String,
    /// Hard timeout for a single connector call
    pub connector_timeout: Duration,
    /// How report parameters reach the connector
    pub parameter_mode: ParameterMode,
    /// Offset used to decide what "today" means for relative dates
    pub report_utc_offset: FixedOffset,
    /// Shared secret for verifying bearer tokens outside the Cognito authorizer
    pub jwt_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let db_host = required("DATABASE_HOST")?;
        let db_secret_arn = required("DB_SECRET_ARN")?;

        let db_port = parse_or("DATABASE_PORT", 5432u16)?;
        let timeout_secs = parse_or("CONNECTOR_TIMEOUT_SECS", 30u64)?;
        let offset_hours = parse_or("REPORT_UTC_OFFSET_HOURS", 3i32)?;
        let parameter_mode = parse_or("CONNECTOR_PARAMETER_MODE", ParameterMode::Bound)?;

        let report_utc_offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            Error::Config(format!("REPORT_UTC_OFFSET_HOURS out of range: {}", offset_hours))
        })?;

        Ok(Self {
            db_host,
            db_name: env::var("DATABASE_NAME").unwrap_or_else(|_| "report_chat".to_string()),
            db_port,
            db_secret_arn,
            aws_region: env::var("AWS_REGION").unwrap_or_else(|_| "eu-central-1".to_string()),
            connector_url: env::var("CONNECTOR_URL")
                .unwrap_or_else(|_| DEFAULT_CONNECTOR_URL.to_string()),
            connector_timeout: Duration::from_secs(timeout_secs),
            parameter_mode,
            report_utc_offset,
            jwt_secret: env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Today's date in the reporting time zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.report_utc_offset).date_naive()
    }
}

fn required(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("{} not set", name)))
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid value for {}: {}", name, raw))),
        _ => Ok(default),
    }
}
