use std::{net::IpAddr, str::FromStr};

use actix_web::{dev::ServiceRequest, HttpRequest};
use log::{debug, trace};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
    remote_ip(req.headers(), peer_addr, use_x_forwarded_for, use_forwarded)
}

/// [`get_remote_ip`] for middleware, which sees the request before it becomes an `HttpRequest`.
pub fn get_service_remote_ip(req: &ServiceRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
    remote_ip(req.headers(), peer_addr, use_x_forwarded_for, use_forwarded)
}

fn remote_ip(
    headers: &actix_web::http::header::HeaderMap,
    peer_addr: Option<String>,
    use_x_forwarded_for: bool,
    use_forwarded: bool,
) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // The left-most address is the original client
        result = headers
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = Regex::new(r#"for="?(?P<ip>[^;,"]+)"#).ok().and_then(|re| {
            headers
                .get("Forwarded")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| re.captures(v))
                .and_then(|caps| caps.name("ip"))
                .and_then(|m| IpAddr::from_str(m.as_str()).ok())
        });
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}
