//! Shared HTTP plumbing for the REST gateways.

use std::sync::Arc;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use medsearch_common::SandboxClient;

use crate::error::ApiError;
use crate::identity::{self, IdentityProvider};

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Base URLs of the deployed gateways.
#[derive(Debug, Clone)]
pub struct ApiEndpoints {
    pub search_url: String,
    pub threads_url: String,
    pub library_url: String,
    pub chat_url: String,
}

/// One `x-api-key` per gateway.
#[derive(Debug)]
pub struct ApiKeys {
    pub search: SecretString,
    pub threads: SecretString,
    pub library: SecretString,
    pub chat: SecretString,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Gateway {
    Search,
    Threads,
    Library,
    Chat,
}

/// Client for all gateways, sharing one sandboxed connection pool.
pub struct HttpApi {
    pub(crate) client: SandboxClient,
    pub(crate) endpoints: ApiEndpoints,
    keys: ApiKeys,
    pub(crate) identity: Arc<dyn IdentityProvider>,
}

impl HttpApi {
    pub fn new(
        endpoints: ApiEndpoints,
        keys: ApiKeys,
        identity: Arc<dyn IdentityProvider>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let mut client = SandboxClient::with_timeout(timeout)?;
        for url in [
            &endpoints.search_url,
            &endpoints.threads_url,
            &endpoints.library_url,
            &endpoints.chat_url,
        ] {
            client.allow_url(url)?;
        }
        Ok(Self { client, endpoints, keys, identity })
    }

    /// Mutable access to the sandbox, e.g. to allow extra upload hosts.
    pub fn sandbox_mut(&mut self) -> &mut SandboxClient {
        &mut self.client
    }

    pub(crate) fn url(&self, gateway: Gateway, path: &str) -> String {
        let base = match gateway {
            Gateway::Search  => &self.endpoints.search_url,
            Gateway::Threads => &self.endpoints.threads_url,
            Gateway::Library => &self.endpoints.library_url,
            Gateway::Chat    => &self.endpoints.chat_url,
        };
        format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Attach the gateway API key and, when the session has one, the bearer token.
    pub(crate) async fn authorize(&self, gateway: Gateway, builder: RequestBuilder) -> RequestBuilder {
        let key = match gateway {
            Gateway::Search  => &self.keys.search,
            Gateway::Threads => &self.keys.threads,
            Gateway::Library => &self.keys.library,
            Gateway::Chat    => &self.keys.chat,
        };
        let builder = builder.header("x-api-key", key.expose_secret());
        match self.identity.bearer_token().await {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    pub(crate) async fn current_user(&self) -> Result<String, ApiError> {
        identity::require_user(self.identity.as_ref()).await
    }
}

/// Percent-encode a single path segment.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

/// Map non-2xx responses onto [`ApiError`], keeping the backend's detail message.
pub(crate) async fn check_status(resp: Response, context: &str) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = error_detail(&body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown API error").to_string());

    tracing::debug!(status = code, %context, %message, "Gateway returned an error status");

    Err(match code {
        404 => ApiError::NotFound(format!("{context}: {message}")),
        409 => ApiError::Conflict(message),
        _ => ApiError::Status { status: code, message: format!("{context}: {message}") },
    })
}

/// Pull a human-readable message out of an error body.
/// Checks `detail`, then `message`, then `error`; falls back to the raw text.
pub(crate) fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for field in ["detail", "message", "error"] {
            if let Some(text) = json[field].as_str() {
                return Some(text.to_string());
            }
        }
    }
    Some(trimmed.chars().take(300).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;

    fn api() -> HttpApi {
        HttpApi::new(
            ApiEndpoints {
                search_url: "https://search.execute-api.eu-north-1.amazonaws.com/prod".into(),
                threads_url: "https://threads.execute-api.eu-north-1.amazonaws.com/prod/".into(),
                library_url: "https://library.example.org/prod".into(),
                chat_url: "http://localhost:9000".into(),
            },
            ApiKeys {
                search: SecretString::from("s".to_string()),
                threads: SecretString::from("t".to_string()),
                library: SecretString::from("l".to_string()),
                chat: SecretString::from("c".to_string()),
            },
            Arc::new(StaticIdentity::new("u", None)),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let api = api();
        assert_eq!(
            api.url(Gateway::Threads, "/thread/abc/status"),
            "https://threads.execute-api.eu-north-1.amazonaws.com/prod/thread/abc/status"
        );
        assert_eq!(api.url(Gateway::Chat, "chat"), "http://localhost:9000/chat");
    }

    #[test]
    fn test_configured_hosts_are_allowlisted() {
        let api = api();
        assert!(api.client.is_allowed("https://library.example.org/prod/user_storage/u/sources"));
        assert!(!api.client.is_allowed("https://other.example.org/"));
    }

    #[test]
    fn test_encode_component_matches_browser_encoding() {
        assert_eq!(encode_component("/papers/KRAS notes/"), "%2Fpapers%2FKRAS%20notes%2F");
        assert_eq!(encode_component("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[test]
    fn test_error_detail_prefers_detail_field() {
        assert_eq!(error_detail(r#"{"detail": "Source already exists"}"#).unwrap(), "Source already exists");
        assert_eq!(error_detail(r#"{"message": "Forbidden"}"#).unwrap(), "Forbidden");
        assert_eq!(error_detail(r#"{"error": "bad"}"#).unwrap(), "bad");
        assert_eq!(error_detail("plain text").unwrap(), "plain text");
        assert_eq!(error_detail("  "), None);
    }
}
