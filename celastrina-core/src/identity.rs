use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::CelastrinaError;
use crate::resources::{Token, TokenResolver};

/// API version spoken to the host identity endpoint.
pub const IDENTITY_API_VERSION: &str = "2019-08-01";

/// Header carrying the host-issued identity secret.
pub const IDENTITY_HEADER_NAME: &str = "x-identity-header";

/// Default timeout for every outbound token/property HTTP call.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, CelastrinaError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            CelastrinaError::configuration("failed to build the HTTP client").with_cause(e)
        })
}

fn map_transport(err: reqwest::Error) -> CelastrinaError {
    if err.is_timeout() {
        CelastrinaError::transient("token request timed out").with_cause(err)
    } else {
        CelastrinaError::auth("token endpoint unreachable").with_cause(err)
    }
}

/// Parse an `expires_on` wire value: UNIX seconds (number or numeric
/// string) or an ISO-8601 timestamp.
pub(crate) fn parse_expires_on(value: &serde_json::Value) -> Result<DateTime<Utc>, CelastrinaError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .ok_or_else(|| {
                CelastrinaError::auth(format!("expires_on out of range: {n}"))
            }),
        serde_json::Value::String(s) => {
            if let Ok(ts) = s.trim().parse::<i64>() {
                return Utc.timestamp_opt(ts, 0).single().ok_or_else(|| {
                    CelastrinaError::auth(format!("expires_on out of range: {s}"))
                });
            }
            DateTime::parse_from_rfc3339(s.trim())
                .map(|d| d.with_timezone(&Utc))
                .map_err(|e| {
                    CelastrinaError::auth(format!("unparseable expires_on: '{s}'")).with_cause(e)
                })
        }
        other => Err(CelastrinaError::auth(format!(
            "unparseable expires_on: {other}"
        ))),
    }
}

/// Append the `/.default` suffix expected by the v2 token endpoint.
fn ensure_default_scope(resource: &str) -> String {
    if resource.ends_with("/.default") {
        resource.to_string()
    } else {
        format!("{resource}/.default")
    }
}

#[derive(Deserialize)]
struct IdentityTokenResponse {
    access_token: String,
    expires_on: serde_json::Value,
}

/// Token resolver backed by the host-provided managed-identity endpoint.
///
/// Issues `GET {endpoint}?api-version=2019-08-01&resource={r}` with the
/// `x-identity-header` secret. A trailing `/.default` on the resource is
/// stripped before the call (the endpoint expects a bare resource URI).
pub struct ManagedIdentityResolver {
    endpoint: String,
    header: String,
    principal_id: Option<String>,
    client: reqwest::Client,
}

impl ManagedIdentityResolver {
    pub fn new(
        endpoint: impl Into<String>,
        header: impl Into<String>,
    ) -> Result<Self, CelastrinaError> {
        Self::with_timeout(endpoint, header, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        header: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CelastrinaError> {
        Ok(Self {
            endpoint: endpoint.into(),
            header: header.into(),
            principal_id: None,
            client: build_client(timeout)?,
        })
    }

    /// Request tokens for a specific user-assigned identity.
    pub fn with_principal_id(mut self, principal_id: impl Into<String>) -> Self {
        self.principal_id = Some(principal_id.into());
        self
    }
}

impl TokenResolver for ManagedIdentityResolver {
    fn resolve<'a>(
        &'a self,
        resource: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Token, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            let bare = resource.strip_suffix("/.default").unwrap_or(resource);
            let mut request = self
                .client
                .get(&self.endpoint)
                .query(&[("api-version", IDENTITY_API_VERSION), ("resource", bare)])
                .header(IDENTITY_HEADER_NAME, &self.header);
            if let Some(principal_id) = &self.principal_id {
                request = request.query(&[("principal_id", principal_id.as_str())]);
            }

            let response = request.send().await.map_err(map_transport)?;
            let status = response.status();
            if !status.is_success() {
                return Err(CelastrinaError::auth(format!(
                    "identity endpoint returned {status} for '{bare}'"
                ))
                .with_code(status.as_u16()));
            }

            let payload: IdentityTokenResponse = response.json().await.map_err(|e| {
                CelastrinaError::auth("identity endpoint returned an invalid payload")
                    .with_cause(e)
            })?;
            let expires = parse_expires_on(&payload.expires_on)?;
            Ok(Token::new(resource, payload.access_token, expires))
        })
    }
}

#[derive(Deserialize)]
struct AppRegistrationTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// Token resolver using the OAuth2 client-credentials flow of an app
/// registration: `POST {authority}/{tenant}/oauth2/v2.0/token`.
pub struct AppRegistrationResolver {
    authority: String,
    tenant: String,
    client_id: String,
    secret: String,
    client: reqwest::Client,
}

impl AppRegistrationResolver {
    pub fn new(
        authority: impl Into<String>,
        tenant: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self, CelastrinaError> {
        Self::with_timeout(authority, tenant, client_id, secret, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(
        authority: impl Into<String>,
        tenant: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CelastrinaError> {
        Ok(Self {
            authority: authority.into().trim_end_matches('/').to_string(),
            tenant: tenant.into(),
            client_id: client_id.into(),
            secret: secret.into(),
            client: build_client(timeout)?,
        })
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant)
    }
}

impl TokenResolver for AppRegistrationResolver {
    fn resolve<'a>(
        &'a self,
        resource: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Token, CelastrinaError>> + Send + 'a>> {
        Box::pin(async move {
            let scope = ensure_default_scope(resource);
            let form = [
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.secret.as_str()),
                ("scope", scope.as_str()),
            ];

            let response = self
                .client
                .post(self.token_url())
                .form(&form)
                .send()
                .await
                .map_err(map_transport)?;
            if !response.status().is_success() {
                return Err(CelastrinaError::auth(format!(
                    "token endpoint rejected client credentials for '{}'",
                    self.client_id
                )));
            }

            let payload: AppRegistrationTokenResponse =
                response.json().await.map_err(|e| {
                    CelastrinaError::auth("token endpoint returned an invalid payload")
                        .with_cause(e)
                })?;
            let expires = match (&payload.expires_on, &payload.expires_in) {
                (Some(on), _) => parse_expires_on(on)?,
                (None, Some(relative)) => {
                    let secs = match relative {
                        serde_json::Value::Number(n) => n.as_i64(),
                        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
                        _ => None,
                    }
                    .ok_or_else(|| {
                        CelastrinaError::auth(format!("unparseable expires_in: {relative}"))
                    })?;
                    Utc::now() + chrono::Duration::seconds(secs)
                }
                (None, None) => {
                    return Err(CelastrinaError::auth(
                        "token endpoint response carried no expiry",
                    ))
                }
            };
            Ok(Token::new(resource, payload.access_token, expires))
        })
    }
}
