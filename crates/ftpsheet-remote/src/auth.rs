//! Service-account OAuth for the Sheets API (JWT bearer grant).

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retry::{send_json, BackoffPolicy};
use crate::SheetError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const TOKEN_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account key file that token exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(blob: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(blob)
    }

    /// RS256-signed assertion for the JWT bearer grant, issued at `now`.
    pub fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, SheetError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: TOKEN_SCOPES,
            aud: &self.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &key)?)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Clone)]
pub enum Credentials {
    ServiceAccount(ServiceAccountKey),
    /// Pre-issued bearer token, used as-is.
    StaticToken(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ServiceAccount(key) => f.debug_tuple("ServiceAccount").field(key).finish(),
            Credentials::StaticToken(_) => f.write_str("StaticToken(<redacted>)"),
        }
    }
}

/// Holds the current access token and refreshes it shortly before expiry.
#[derive(Debug)]
pub(crate) struct TokenCache {
    credentials: Credentials,
    cached: Option<(String, DateTime<Utc>)>,
}

impl TokenCache {
    pub(crate) fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            cached: None,
        }
    }

    pub(crate) fn bearer(&mut self, http: &Client, backoff: &BackoffPolicy) -> Result<String, SheetError> {
        let key = match &self.credentials {
            Credentials::StaticToken(token) => return Ok(token.clone()),
            Credentials::ServiceAccount(key) => key.clone(),
        };

        let now = Utc::now();
        if let Some((token, expires_at)) = &self.cached {
            if *expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.clone());
            }
        }

        let assertion = key.signed_assertion(now)?;
        debug!(client_email = %key.client_email, "exchanging service-account assertion");
        let body = send_json(backoff, || {
            http.post(&key.token_uri)
                .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        })
        .map_err(|err| SheetError::Auth(err.to_string()))?;

        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|err| SheetError::Auth(format!("token response: {err}")))?;
        let expires_at = now + Duration::seconds(token.expires_in);
        self.cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}
