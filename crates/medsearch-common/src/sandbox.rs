use reqwest::{Client, ClientBuilder, Method, RequestBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;
use crate::error::MedsearchError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An HTTP client that only talks to approved hosts.
///
/// The allowlist starts with the AWS endpoints that front the search, thread
/// and library gateways (and the S3 buckets behind presigned upload URLs),
/// plus loopback for local stacks. Configured API base URLs are added with
/// [`SandboxClient::allow_url`].
#[derive(Debug, Clone)]
pub struct SandboxClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl SandboxClient {
    /// Creates a new SandboxClient with the default allowlist and a 30s timeout.
    pub fn new() -> Result<Self, MedsearchError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, MedsearchError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "amazonaws.com", // API Gateway, S3 presigned uploads
            "localhost",
            "127.0.0.1",
        ];

        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| MedsearchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Appends the host of `url` to the allowlist.
    pub fn allow_url(&mut self, url: &str) -> Result<(), MedsearchError> {
        let parsed = Url::parse(url)
            .map_err(|e| MedsearchError::Config(format!("Invalid URL {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| MedsearchError::Config(format!("URL has no host: {}", url)))?;
        self.allow_domain(host);
        Ok(())
    }

    /// Validates if a URL is permitted under the current sandbox policy.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                // Exact match or a subdomain of an allowed domain
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{}", allowed)) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, url: &str) -> Result<RequestBuilder, MedsearchError> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> Result<RequestBuilder, MedsearchError> {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> Result<RequestBuilder, MedsearchError> {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> Result<RequestBuilder, MedsearchError> {
        self.request(Method::DELETE, url)
    }

    /// Exposes the inner `reqwest::Client` builder for an allowed URL.
    pub fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, MedsearchError> {
        if !self.is_allowed(url) {
            tracing::warn!(%url, "Blocked request to host outside the allowlist");
            return Err(MedsearchError::Security(format!(
                "domain not in allowlist for URL {}",
                url
            )));
        }

        Ok(self.client.request(method, url))
    }
}
