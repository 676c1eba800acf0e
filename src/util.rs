use http::{HeaderName, HeaderValue, Uri};

use crate::error::Error;
use crate::location::UrlParts;

const MAX_ERROR_BODY_LEN: usize = 2048;

pub(crate) fn redact_uri_for_logs(uri_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(uri_text) else {
        return uri_text
            .split(['?', '#'])
            .next()
            .unwrap_or(uri_text)
            .to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

/// Checks that `url` is an absolute http(s) URL with a host, and returns the
/// parsed form.
pub(crate) fn validate_request_url(url: &str) -> Result<url::Url, Error> {
    if url.is_empty() {
        return Err(Error::invalid_url(url, "url is empty"));
    }
    if url.trim().len() != url.len() {
        return Err(Error::invalid_url(url, "url has surrounding whitespace"));
    }

    let parsed = url::Url::parse(url).map_err(|_| Error::invalid_url(url, "url is malformed"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::invalid_url(url, "scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) || UrlParts::parse(url).host.is_none() {
        return Err(Error::invalid_url(url, "url has no host"));
    }
    if url.parse::<Uri>().is_err() {
        return Err(Error::invalid_url(url, "url is not a valid request target"));
    }
    Ok(parsed)
}

pub(crate) fn validate_base_url(base_url: &str) -> Result<(), Error> {
    let invalid = || Error::invalid_config(format!("invalid base uri {base_url:?}"));
    let parsed = validate_request_url(base_url).map_err(|_| invalid())?;
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid());
    }
    Ok(())
}

pub(crate) fn looks_absolute(url: &str) -> bool {
    let lowered = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://")
}

pub(crate) fn join_base_path(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Accepts RFC 1123 host names and IP literals (IPv6 optionally bracketed).
pub(crate) fn is_valid_host_name(host: &str) -> bool {
    if crate::guard::parse_ip_literal(host).is_some() {
        return true;
    }
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .bytes()
                .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-')
    })
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, Error> {
    HeaderName::from_bytes(name.trim().as_bytes()).map_err(|source| Error::InvalidHeaderName {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|source| Error::InvalidHeaderValue {
        name: name.to_owned(),
        source,
    })
}

pub(crate) fn append_query_pairs(url: &str, query_pairs: &[(String, String)]) -> String {
    if query_pairs.is_empty() {
        return url.to_owned();
    }

    let (without_fragment, fragment) = match url.split_once('#') {
        Some((left, right)) => (left, Some(right)),
        None => (url, None),
    };
    let (base, existing_query) = match without_fragment.split_once('?') {
        Some((left, right)) => (left, Some(right)),
        None => (without_fragment, None),
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(query_pairs);
    let appended = serializer.finish();

    let mut rebuilt = base.to_owned();
    rebuilt.push('?');
    if let Some(existing) = existing_query.filter(|query| !query.is_empty()) {
        rebuilt.push_str(existing);
        rebuilt.push('&');
    }
    rebuilt.push_str(&appended);
    if let Some(fragment) = fragment {
        rebuilt.push('#');
        rebuilt.push_str(fragment);
    }
    rebuilt
}

pub(crate) fn encode_form(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish()
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}
