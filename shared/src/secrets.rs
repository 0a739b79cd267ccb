//! Database credentials held in AWS Secrets Manager.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tokio::sync::Mutex;
use tracing::info;

use crate::models::SECRET_MASK;
use crate::{Error, Result};

/// Parsed credentials by secret ARN, kept for the life of the execution environment.
static CREDENTIALS: LazyLock<Mutex<HashMap<String, Arc<DatabaseCredentials>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The JSON document RDS stores for a database user.
///
/// `host`, `port` and `dbname` are optional; when present they override the
/// `DB_*` environment settings.
#[derive(Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

impl fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("username", &self.username)
            .field("password", &SECRET_MASK)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

impl DatabaseCredentials {
    pub fn from_secret(secret: &str) -> Result<Self> {
        let creds: Self = serde_json::from_str(secret)
            .map_err(|e| Error::Aws(format!("Failed to parse database credentials: {}", e)))?;

        if creds.username.trim().is_empty() || creds.password.is_empty() {
            return Err(Error::Aws(
                "Database secret has an empty username or password".to_string(),
            ));
        }
        Ok(creds)
    }
}

/// Credentials stored under `secret_arn`.
///
/// The lock is held across the lookup so concurrent cold-start calls make a
/// single Secrets Manager request.
pub async fn database_credentials(
    client: &SecretsClient,
    secret_arn: &str,
) -> Result<Arc<DatabaseCredentials>> {
    let mut cache = CREDENTIALS.lock().await;
    if let Some(creds) = cache.get(secret_arn) {
        return Ok(Arc::clone(creds));
    }

    let secret = fetch_secret_string(client, secret_arn).await?;
    let creds = Arc::new(DatabaseCredentials::from_secret(&secret)?);
    info!("Loaded database credentials for user {}", creds.username);

    cache.insert(secret_arn.to_string(), Arc::clone(&creds));
    Ok(creds)
}

async fn fetch_secret_string(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Aws(format!("Failed to get secret {}: {}", secret_arn, e)))?;

    response
        .secret_string()
        .map(str::to_string)
        .ok_or_else(|| Error::Aws(format!("Secret {} has no string value", secret_arn)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_credentials_from_rds_secret() {
        let json = r#"{"engine":"postgres","username":"report_app","password":"secret123","host":"db.example.com","port":5432,"dbname":"report_chat"}"#;
        let creds = DatabaseCredentials::from_secret(json).unwrap();
        assert_eq!(creds.username, "report_app");
        assert_eq!(creds.password, "secret123");
        assert_eq!(creds.host.as_deref(), Some("db.example.com"));
        assert_eq!(creds.port, Some(5432));
        assert_eq!(creds.dbname.as_deref(), Some("report_chat"));
    }

    #[test]
    fn test_credentials_reject_missing_or_empty_fields() {
        assert!(matches!(
            DatabaseCredentials::from_secret(r#"{"username":"report_app"}"#),
            Err(Error::Aws(_))
        ));
        assert!(matches!(
            DatabaseCredentials::from_secret(r#"{"username":" ","password":"x"}"#),
            Err(Error::Aws(_))
        ));
        assert!(DatabaseCredentials::from_secret("not json").is_err());
    }

    #[test]
    fn test_debug_masks_password() {
        let creds =
            DatabaseCredentials::from_secret(r#"{"username":"report_app","password":"secret123"}"#)
                .unwrap();
        let debug = format!("{:?}", creds);
        assert!(debug.contains("report_app"));
        assert!(!debug.contains("secret123"));
    }
}
