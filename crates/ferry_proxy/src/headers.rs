use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};

/// =======================================================
/// HEADER REWRITE (proxy semantics)
/// =======================================================

pub(crate) const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub(crate) const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub(crate) const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers scoped to a single connection hop; never forwarded in either
/// direction.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Copy all entries of `src` into `dst`, replacing any same-name entries
/// already present.
pub(crate) fn copy_headers(dst: &mut HeaderMap, src: &HeaderMap) {
    for name in src.keys() {
        dst.remove(name);
        for value in src.get_all(name) {
            dst.append(name.clone(), value.clone());
        }
    }
}

/// Remove hop-by-hop headers: every name listed in the `Connection` header's
/// token list, then the fixed set.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let mut listed: Vec<HeaderName> = Vec::new();
    for value in headers.get_all(CONNECTION) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for token in value.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if let Ok(name) = HeaderName::from_bytes(token.as_bytes()) {
                listed.push(name);
            }
        }
    }
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append the client IP to an existing X-Forwarded-For chain, or start one.
pub(crate) fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {client_ip}"),
        _ => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

pub(crate) fn set_forwarded_proto(headers: &mut HeaderMap, is_tls: bool) {
    let proto = if is_tls { "https" } else { "http" };
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));
}

pub(crate) fn set_forwarded_host(headers: &mut HeaderMap, host: Option<HeaderValue>) {
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST, host);
    }
}
