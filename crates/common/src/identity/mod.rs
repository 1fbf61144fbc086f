//! Identity provider adapter
//!
//! Provides:
//! - The typed identity record handed back by the external provider
//! - Stable key resolution (subject id only)
//! - ID token verification and the login redirect URL
//! - Admin allow-list checks

use crate::config::IdentityConfig;
use crate::errors::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Authenticated user's profile as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: Option<String>,
    pub email: Option<String>,
    pub display_name: String,
    pub picture_url: Option<String>,
}

/// Outcome of resolving an identity to a persistence key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKey {
    Resolved(String),
    Unresolvable,
}

impl Identity {
    /// Resolve the stable key for this identity.
    ///
    /// Only the provider's subject id qualifies. Emails can be reassigned by
    /// the provider, so an identity without `sub` is unresolvable even when
    /// an email is present.
    pub fn resolve_key(&self) -> IdentityKey {
        match self.subject_id.as_deref().map(str::trim) {
            Some(sub) if !sub.is_empty() => IdentityKey::Resolved(sub.to_string()),
            _ => IdentityKey::Unresolvable,
        }
    }
}

/// Boundary to the external sign-in service
pub trait IdentityProvider: Send + Sync {
    /// URL to redirect the browser to, carrying `state` back on return
    fn login_url(&self, state: &str) -> Option<String>;

    /// Verify a credential returned by the provider and extract the identity
    fn verify(&self, credential: &str) -> Result<Identity>;
}

/// OIDC-style ID token claims
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl From<IdClaims> for Identity {
    fn from(claims: IdClaims) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let email = non_empty(claims.email);
        let display_name = non_empty(claims.name)
            .or_else(|| email.clone())
            .unwrap_or_else(|| "N/A".to_string());

        Identity {
            subject_id: non_empty(claims.sub),
            email,
            display_name,
            picture_url: non_empty(claims.picture),
        }
    }
}

/// Verifies HS256 ID tokens issued by the configured provider
pub struct JwtIdentityProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    authorize_url: Option<String>,
    client_id: Option<String>,
    redirect_uri: Option<String>,
}

impl JwtIdentityProvider {
    /// Create a provider with the given secret
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            authorize_url: None,
            client_id: None,
            redirect_uri: None,
        }
    }

    /// Build from configuration; `None` when no token secret is set
    pub fn from_config(config: &IdentityConfig) -> Option<Self> {
        let secret = config.token_secret.as_deref().filter(|s| !s.is_empty())?;
        let mut provider = Self::new(secret);

        if let Some(ref issuer) = config.issuer {
            provider.validation.set_issuer(&[issuer]);
        }
        if let Some(ref audience) = config.audience {
            provider.validation.set_audience(&[audience]);
            provider.validation.validate_aud = true;
        }

        provider.authorize_url = config.authorize_url.clone();
        provider.client_id = config.client_id.clone();
        provider.redirect_uri = config.redirect_uri.clone();
        Some(provider)
    }

    /// Sign a token for the given claims, filling `iat`/`exp`.
    ///
    /// Used for local development without a live provider and in tests.
    pub fn issue_token(&self, mut claims: IdClaims, ttl_secs: i64) -> Result<String> {
        let now = Utc::now();
        claims.iat = now.timestamp();
        claims.exp = (now + Duration::seconds(ttl_secs)).timestamp();

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AppError::Internal {
                message: format!("Failed to sign identity token: {}", e),
            }
        })
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn login_url(&self, state: &str) -> Option<String> {
        let base = self.authorize_url.as_deref()?;
        let client_id = self.client_id.as_deref()?;

        let mut params = vec![
            ("client_id", client_id),
            ("response_type", "id_token"),
            ("scope", "openid email profile"),
            ("state", state),
        ];
        if let Some(ref redirect) = self.redirect_uri {
            params.push(("redirect_uri", redirect.as_str()));
        }

        match reqwest::Url::parse_with_params(base, &params) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "Invalid identity authorize_url");
                None
            }
        }
    }

    fn verify(&self, credential: &str) -> Result<Identity> {
        decode::<IdClaims>(credential, &self.decoding_key, &self.validation)
            .map(|data| Identity::from(data.claims))
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredCredential,
                _ => AppError::InvalidCredential,
            })
    }
}

/// Allow-list deciding who may open the admin dashboard
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    emails: Vec<String>,
    subjects: Vec<String>,
}

impl AdminPolicy {
    pub fn new(emails: Vec<String>, subjects: Vec<String>) -> Self {
        Self {
            emails: emails.into_iter().map(|e| e.trim().to_lowercase()).collect(),
            subjects: subjects.into_iter().map(|s| s.trim().to_string()).collect(),
        }
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        Self::new(config.admin_emails.clone(), config.admin_subjects.clone())
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        let by_subject = identity
            .subject_id
            .as_ref()
            .is_some_and(|sub| self.subjects.iter().any(|s| s == sub));
        let by_email = identity
            .email
            .as_ref()
            .is_some_and(|email| self.emails.contains(&email.trim().to_lowercase()));

        by_subject || by_email
    }
}
