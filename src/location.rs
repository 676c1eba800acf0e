//! Relative reference resolution (RFC 2396 section 5.2) and component-preserving
//! URL reconstruction.
//!
//! Both operations work on the URL text itself instead of a normalized
//! `url::Url`, so a rewritten target keeps every byte of the caller's port,
//! path, query and fragment.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl UrlParts {
    pub fn parse(input: &str) -> Self {
        let mut parts = Self::default();

        let (rest, fragment) = match input.split_once('#') {
            Some((left, right)) => (left, Some(right)),
            None => (input, None),
        };
        parts.fragment = fragment.map(ToOwned::to_owned);

        let (rest, query) = match rest.split_once('?') {
            Some((left, right)) => (left, Some(right)),
            None => (rest, None),
        };
        parts.query = query.map(ToOwned::to_owned);

        let rest = match rest.find("://") {
            Some(index) if is_scheme(&rest[..index]) => {
                parts.scheme = Some(rest[..index].to_owned());
                &rest[index + 1..]
            }
            _ => rest,
        };

        let path = match rest.strip_prefix("//") {
            Some(after_slashes) => {
                let (authority, path) = match after_slashes.find('/') {
                    Some(index) => (&after_slashes[..index], &after_slashes[index..]),
                    None => (after_slashes, ""),
                };
                parts.set_authority(authority);
                path
            }
            None => rest,
        };
        if !path.is_empty() {
            parts.path = Some(path.to_owned());
        }

        parts
    }

    fn set_authority(&mut self, authority: &str) {
        let (userinfo, host_port) = match authority.rfind('@') {
            Some(index) => (Some(&authority[..index]), &authority[index + 1..]),
            None => (None, authority),
        };
        if let Some(userinfo) = userinfo {
            match userinfo.split_once(':') {
                Some((user, pass)) => {
                    self.user = Some(user.to_owned());
                    self.pass = Some(pass.to_owned());
                }
                None => self.user = Some(userinfo.to_owned()),
            }
        }

        let (host, port) = if host_port.starts_with('[') {
            match host_port.find(']') {
                Some(end) => (&host_port[..=end], host_port[end + 1..].strip_prefix(':')),
                None => (host_port, None),
            }
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) if port.bytes().all(|byte| byte.is_ascii_digit()) => {
                    (host, Some(port))
                }
                _ => (host_port, None),
            }
        };
        if !host.is_empty() {
            self.host = Some(host.to_owned());
        }
        self.port = port.filter(|port| !port.is_empty()).map(ToOwned::to_owned);
    }

    /// Rebuilds `scheme://[user[:pass]@]host[:port]path[?query][#fragment]`,
    /// omitting absent components.
    pub fn build(&self) -> String {
        self.build_with_host(self.host.as_deref().unwrap_or_default())
    }

    /// Same as [`UrlParts::build`] with `host` standing in for the parsed host.
    pub fn build_with_host(&self, host: &str) -> String {
        let mut built = String::new();
        if let Some(scheme) = &self.scheme {
            built.push_str(scheme);
            built.push_str("://");
        }
        let user = self.user.as_deref().unwrap_or_default();
        built.push_str(user);
        if let Some(pass) = &self.pass {
            built.push(':');
            built.push_str(pass);
        }
        if !user.is_empty() || self.pass.is_some() {
            built.push('@');
        }
        built.push_str(host);
        if let Some(port) = &self.port {
            built.push(':');
            built.push_str(port);
        }
        if let Some(path) = &self.path {
            built.push_str(path);
        }
        if let Some(query) = &self.query {
            built.push('?');
            built.push_str(query);
        }
        if let Some(fragment) = &self.fragment {
            built.push('#');
            built.push_str(fragment);
        }
        built
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut bytes = candidate.bytes();
    bytes.next().is_some_and(|first| first.is_ascii_alphabetic())
        && bytes.all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'-' | b'.'))
}

fn has_scheme_prefix(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, _)) => {
            !scheme.is_empty() && scheme.bytes().all(|byte| byte.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Replaces the host of `url` with `host`, leaving every other component untouched.
pub fn replace_host(url: &str, host: &str) -> String {
    UrlParts::parse(url).build_with_host(host)
}

/// Resolves `reference` against `base` following RFC 2396 section 5.2.
pub fn resolve_location(reference: &str, base: &str) -> String {
    if base.is_empty() {
        return reference.to_owned();
    }
    if reference.is_empty() {
        return base.to_owned();
    }
    if has_scheme_prefix(reference) {
        return reference.to_owned();
    }

    let mut parts = UrlParts::parse(base);
    if let Some(fragment) = reference.strip_prefix('#') {
        parts.fragment = Some(fragment.to_owned());
        parts.query = None;
        return parts.build();
    }
    parts.fragment = None;
    parts.query = None;

    if let Some(network_path) = reference.strip_prefix("//") {
        return UrlParts {
            scheme: parts.scheme,
            path: Some(network_path.to_owned()),
            ..UrlParts::default()
        }
        .build();
    }

    let path = if reference.starts_with('/') {
        reference.to_owned()
    } else {
        let has_authority = parts.host.is_some();
        let base_path = match parts.path.as_deref() {
            Some(path) => path,
            None if has_authority => "/",
            None => "",
        };
        let merged = merge_relative_path(base_path, reference);
        // A relative reference never rewrites the authority.
        if has_authority && !merged.starts_with('/') {
            format!("/{merged}")
        } else {
            merged
        }
    };
    parts.path = Some(path);
    parts.build()
}

fn merge_relative_path(base_path: &str, reference: &str) -> String {
    let mut path: Vec<&str> = base_path.split('/').collect();
    path.pop();

    let mut segments: Vec<&str> = reference.split('/').collect();
    let end = segments.pop().unwrap_or_default();

    for segment in segments {
        if segment == "." {
            continue;
        }
        if segment == ".." && path.last().is_some_and(|last| *last != "..") {
            path.pop();
        } else {
            path.push(segment);
        }
    }

    match end {
        "." => path.push(""),
        ".." if path.last().is_some_and(|last| *last != "..") => {
            if let Some(last) = path.last_mut() {
                *last = "";
            }
        }
        _ => path.push(end),
    }

    path.join("/")
}
