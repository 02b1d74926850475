//! `htu` handling: normalization for comparison and reconstruction of the
//! absolute request target on the server side.

use axum::http::{HeaderMap, Uri, header};

/// Normalize a target URI to scheme + authority + path.
///
/// - lower-cases scheme and host
/// - drops default ports
/// - drops query and fragment
/// - an empty path becomes `/`
///
/// Returns `None` for relative or otherwise unparsable URIs.
pub fn normalize_htu(htu: &str) -> Option<String> {
    let url = url::Url::parse(htu).ok()?;
    let host = url.host_str()?;

    let scheme = url.scheme().to_ascii_lowercase();
    let mut out = format!("{}://{}", scheme, host.to_ascii_lowercase());

    // `Url::port` already hides the scheme's default port.
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path();
    if path.is_empty() {
        out.push('/');
    } else {
        out.push_str(path);
    }

    Some(out)
}

/// Rebuild the absolute URI the client must have targeted.
///
/// A configured public base URL wins. Otherwise we trust proxy headers, then
/// `Host`.
pub fn expected_htu(headers: &HeaderMap, uri: &Uri, public_base_url: Option<&str>) -> String {
    if let Some(base) = public_base_url {
        if let Ok(url) = htu_from_base(base, uri) {
            return url;
        }
        tracing::warn!(base = %base, "PUBLIC_BASE_URL is not a valid absolute URL; falling back to request headers");
    }
    htu_from_forwarded(headers, uri)
}

fn htu_from_base(base: &str, uri: &Uri) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(base)?;
    url.set_path(uri.path());
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

fn htu_from_forwarded(headers: &HeaderMap, uri: &Uri) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");

    format!("{}://{}{}", scheme, host, uri.path())
}
