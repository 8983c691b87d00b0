use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::redirect::{Attempt, Policy};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use crate::hooks::url_policy::{is_internal, UrlPolicyError};

const MAX_REDIRECTS: usize = 3;

/// A fully prepared POST to an endpoint.
#[derive(Clone)]
pub struct OutboundRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub verify_tls: bool,
    pub timeout: Duration,
    /// Response bytes beyond this are not read.
    pub max_response_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// At most `max_response_bytes + 1` bytes, so callers can tell a body
    /// that hit the limit from one that fits exactly.
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Network(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// Production transport.
///
/// Redirects are followed only while they stay on the original scheme, host
/// and port. Unless local requests are allowed, hostnames are resolved by
/// [`PublicResolver`], so the addresses dialled are the ones that were checked.
#[derive(Clone)]
pub struct ReqwestTransport {
    verified: Client,
    unverified: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, allow_local_requests: bool) -> Result<Self, reqwest::Error> {
        Ok(Self {
            verified: build_client(user_agent, true, allow_local_requests)?,
            unverified: build_client(user_agent, false, allow_local_requests)?,
        })
    }
}

fn build_client(
    user_agent: &str,
    verify_tls: bool,
    allow_local_requests: bool,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .redirect(Policy::custom(same_origin_redirects))
        .danger_accept_invalid_certs(!verify_tls);
    if !allow_local_requests {
        builder = builder.dns_resolver(Arc::new(PublicResolver));
    }
    builder.build()
}

fn same_origin_redirects(attempt: Attempt<'_>) -> reqwest::redirect::Action {
    if attempt.previous().len() > MAX_REDIRECTS {
        return attempt.error("too many redirects");
    }
    let stays = attempt
        .previous()
        .first()
        .is_some_and(|origin| same_origin(origin, attempt.url()));
    if stays {
        attempt.follow()
    } else {
        attempt.stop()
    }
}

fn same_origin(origin: &Url, next: &Url) -> bool {
    origin.scheme() == next.scheme()
        && origin.host_str() == next.host_str()
        && origin.port_or_known_default() == next.port_or_known_default()
}

/// DNS resolver that never hands out internal addresses.
pub struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            match resolve_public(&host).await {
                Ok(addrs) => {
                    let addrs: Addrs = Box::new(addrs.into_iter());
                    Ok(addrs)
                }
                Err(err) => Err(Box::new(err) as Box<dyn std::error::Error + Send + Sync>),
            }
        })
    }
}

/// Resolves `host`, keeping only public addresses. Fails when none are left.
pub async fn resolve_public(host: &str) -> Result<Vec<SocketAddr>, UrlPolicyError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|_| UrlPolicyError::Unresolved(host.to_string()))?
        .filter(|addr| !is_internal(addr.ip()))
        .collect();

    if addrs.is_empty() {
        return Err(UrlPolicyError::LocalNetwork(host.to_string()));
    }
    Ok(addrs)
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let client = if request.verify_tls {
            &self.verified
        } else {
            &self.unverified
        };

        let mut builder = client
            .post(request.url)
            .timeout(request.timeout)
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send().await.map_err(map_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let cap = request.max_response_bytes.saturating_add(1);
        let mut body = Vec::new();
        while body.len() < cap {
            match response.chunk().await.map_err(map_error)? {
                Some(chunk) => body.extend_from_slice(&chunk),
                None => break,
            }
        }
        body.truncate(cap);

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn map_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        // The URL may carry interpolated secrets.
        TransportError::Network(err.without_url().to_string())
    }
}
