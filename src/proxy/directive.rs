//! Parsing of `/proxy/{host}/{rest...}` request paths.

use std::fmt;
use std::str::FromStr;

use axum::http::uri::{Authority, Scheme};
use axum::http::Uri;

use crate::error::ErrorCode;

pub const PROXY_PREFIX: &str = "/proxy/";

/// Where to send a proxied request and what path to ask for there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDirective {
    target: Authority,
    /// Remaining path (always starting with `/`) plus the original query.
    remaining: String,
}

impl ProxyDirective {
    /// Parse a raw path-and-query. Only the first segment after `/proxy/`
    /// is consumed; the rest, including further `/proxy/` segments, is
    /// passed on untouched.
    pub fn parse(path_and_query: &str) -> Result<Self, ErrorCode> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let rest = path
            .strip_prefix(PROXY_PREFIX)
            .ok_or(ErrorCode::InvalidProxyTarget)?;
        let (host, tail) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, ""),
        };

        let target = parse_target(host)?;
        let mut remaining = if tail.is_empty() { "/".to_string() } else { tail.to_string() };
        if let Some(query) = query {
            remaining.push('?');
            remaining.push_str(query);
        }
        Ok(Self { target, remaining })
    }

    pub fn target(&self) -> &Authority {
        &self.target
    }

    pub fn remaining(&self) -> &str {
        &self.remaining
    }

    /// Absolute URI of the next hop.
    pub fn uri(&self) -> Result<Uri, ErrorCode> {
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.target.clone())
            .path_and_query(self.remaining.as_str())
            .build()
            .map_err(|_| ErrorCode::InvalidProxyTarget)
    }
}

impl fmt::Display for ProxyDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}{}", self.target, self.remaining)
    }
}

fn parse_target(host: &str) -> Result<Authority, ErrorCode> {
    if host.is_empty() || host.contains('@') {
        return Err(ErrorCode::InvalidProxyTarget);
    }
    let authority = Authority::from_str(host).map_err(|_| ErrorCode::InvalidProxyTarget)?;
    if authority.host().is_empty() {
        return Err(ErrorCode::InvalidProxyTarget);
    }
    // bracketed IPv6 literals carry their own colons
    if !host.ends_with(']') {
        if let Some((_, port)) = host.rsplit_once(':') {
            port.parse::<u16>().map_err(|_| ErrorCode::InvalidProxyTarget)?;
        }
    }
    Ok(authority)
}
