//! Outbound URL safety: which targets a hook may reach, and how credentials
//! embedded in a URL are handled.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlPolicyError {
    #[error("URL is invalid: {0}")]
    Invalid(String),
    #[error("Only allowed schemes are http, https (got {0})")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Requests to the local network are not allowed ({0})")]
    LocalNetwork(String),
    #[error("Host {0} could not be resolved")]
    Unresolved(String),
}

/// Credentials taken out of a URL's userinfo.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

pub fn parse_hook_url(raw: &str) -> Result<Url, UrlPolicyError> {
    let url = Url::parse(raw).map_err(|err| UrlPolicyError::Invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlPolicyError::UnsupportedScheme(other.to_string())),
    }
    if url.host().is_none() {
        return Err(UrlPolicyError::MissingHost);
    }
    Ok(url)
}

/// Rejects hosts that name the local machine or a private network.
///
/// Only literal addresses and well-known local names are checked here;
/// [`check_resolved`] covers hostnames that resolve inward.
pub fn check_public(url: &Url, allow_local: bool) -> Result<(), UrlPolicyError> {
    if allow_local {
        return Ok(());
    }

    match url.host() {
        None => Err(UrlPolicyError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                Err(UrlPolicyError::LocalNetwork(domain))
            } else {
                Ok(())
            }
        }
        Some(Host::Ipv4(ip)) => reject_internal(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => reject_internal(IpAddr::V6(ip)),
    }
}

/// Resolves the URL's host and rejects it if any address is internal.
pub async fn check_resolved(url: &Url, allow_local: bool) -> Result<(), UrlPolicyError> {
    check_public(url, allow_local)?;
    if allow_local {
        return Ok(());
    }

    let Some(Host::Domain(domain)) = url.host() else {
        return Ok(());
    };
    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((domain, port))
        .await
        .map_err(|_| UrlPolicyError::Unresolved(domain.to_string()))?;

    for addr in addrs {
        reject_internal(addr.ip())?;
    }
    Ok(())
}

fn reject_internal(ip: IpAddr) -> Result<(), UrlPolicyError> {
    if is_internal(ip) {
        Err(UrlPolicyError::LocalNetwork(ip.to_string()))
    } else {
        Ok(())
    }
}

pub fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => is_internal_v6(v6),
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || a == 0
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (64..128).contains(&b))
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_internal_v4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
}

/// Removes `user:password@` from a URL or URL template for display and logging.
///
/// Works textually so templates with `{placeholder}` hosts are handled too.
pub fn strip_credentials(raw: &str) -> String {
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &raw[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];

    match authority.rfind('@') {
        Some(at) => format!(
            "{}{}{}",
            &raw[..authority_start],
            &authority[at + 1..],
            &rest[authority_len..]
        ),
        None => raw.to_string(),
    }
}

/// Splits userinfo credentials off `url`, returning the bare URL and the
/// decoded credentials if there were any.
pub fn split_userinfo(mut url: Url) -> (Url, Option<BasicAuth>) {
    let username = percent_decode(url.username());
    let password = url.password().map(percent_decode);

    if username.is_empty() && password.is_none() {
        return (url, None);
    }

    // Both setters only fail for cannot-be-a-base URLs, which http(s) never are.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    (url, Some(BasicAuth { username, password }))
}

fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}
