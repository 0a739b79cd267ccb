//! Authentication and the per-request caller context.
//!
//! API Gateway's Cognito authorizer validates tokens and hands us the claims
//! in the request context. Requests that bypass the authorizer (local runs,
//! service-to-service calls) may send an HS256 bearer token instead, which we
//! verify against `JWT_SECRET`.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use lambda_http::{Request, RequestExt};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::{Report, Role};
use crate::store::{self, CatalogScope};
use crate::{Error, Result};

/// JWT claims we rely on.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (Cognito user id)
    pub sub: String,
    /// Email
    pub email: Option<String>,
    /// Cognito username
    #[serde(rename = "cognito:username", default)]
    pub cognito_username: Option<String>,
    /// Expiration
    pub exp: i64,
}

/// Identity established from a token, before tenant lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub email: Option<String>,
}

impl From<TokenClaims> for AuthenticatedUser {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.sub,
            email: claims.email.or(claims.cognito_username),
        }
    }
}

/// Verify an HS256 bearer token.
pub fn validate_token(token: &str, secret: &str) -> Result<AuthenticatedUser> {
    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());

    let token_data = decode::<TokenClaims>(token, &key, &validation)
        .map_err(|e| Error::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims.into())
}

/// Extract user from API Gateway authorizer claims.
pub fn extract_user_from_context(claims: &serde_json::Value) -> Result<AuthenticatedUser> {
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Auth("Missing sub claim".to_string()))?;

    let email = claims
        .get("email")
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(AuthenticatedUser {
        subject: sub.to_string(),
        email,
    })
}

/// Authenticate a request from the authorizer context or a bearer token.
pub fn authenticate(event: &Request, jwt_secret: Option<&str>) -> Result<AuthenticatedUser> {
    let claims = event
        .request_context_ref()
        .and_then(|ctx| ctx.authorizer().and_then(|a| a.fields.get("claims").cloned()));

    if let Some(claims) = claims {
        return extract_user_from_context(&claims);
    }

    let header = event
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Auth("Oturum açmanız gerekiyor".to_string()))?;

    let secret = jwt_secret.ok_or_else(|| {
        warn!("Bearer token received but JWT_SECRET is not configured");
        Error::Auth("Oturum açmanız gerekiyor".to_string())
    })?;

    validate_token(header, secret)
}

/// The tenant a request acts for. Passed explicitly to every handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub customer_id: Uuid,
    pub role: Role,
    pub email: String,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Reports this caller may match against.
    ///
    /// Admins see every tenant's catalog.
    pub fn catalog_scope(&self) -> CatalogScope {
        if self.is_admin() {
            CatalogScope::All
        } else {
            CatalogScope::Owner(self.customer_id)
        }
    }

    pub fn can_access(&self, report: &Report) -> bool {
        self.is_admin() || report.owner_id == self.customer_id
    }

    /// Fail with 403 unless the caller owns the report or is an admin.
    pub fn ensure_access(&self, report: &Report) -> Result<()> {
        if self.can_access(report) {
            Ok(())
        } else {
            Err(Error::Unauthorized("Bu rapora erişim yetkiniz yok".to_string()))
        }
    }

    pub fn ensure_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::Unauthorized("Bu işlem için yönetici yetkisi gerekiyor".to_string()))
        }
    }
}

/// Authenticate the request and load the customer it belongs to.
pub async fn resolve_caller(
    pool: &PgPool,
    event: &Request,
    jwt_secret: Option<&str>,
) -> Result<Caller> {
    let user = authenticate(event, jwt_secret)?;

    let customer = store::find_customer_by_sub(pool, &user.subject)
        .await?
        .ok_or_else(|| Error::Auth("Kullanıcı kayıtlı değil".to_string()))?;

    if !customer.active {
        return Err(Error::Unauthorized("Hesabınız pasif durumda".to_string()));
    }

    Ok(Caller {
        customer_id: customer.id,
        role: customer.role,
        email: customer.email,
    })
}
