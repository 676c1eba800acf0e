use http::StatusCode;
use tracing::debug;

use crate::config::ClientConfig;
use crate::location::resolve_location;
use crate::request::{Method, RequestSpec};
use crate::response::Response;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RedirectPolicy {
    max_redirects: usize,
    strict: bool,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::limited(crate::config::DEFAULT_MAX_REDIRECTS)
    }
}

impl RedirectPolicy {
    pub const fn none() -> Self {
        Self {
            max_redirects: 0,
            strict: false,
        }
    }

    pub const fn limited(max_redirects: usize) -> Self {
        Self {
            max_redirects,
            strict: false,
        }
    }

    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::limited(config.max_redirects()).strict(config.strict_redirects())
    }

    pub const fn max_redirects(self) -> usize {
        self.max_redirects
    }

    pub const fn is_strict(self) -> bool {
        self.strict
    }

    pub const fn allows_follow(self, redirects_followed: usize) -> bool {
        self.max_redirects > 0 && redirects_followed < self.max_redirects
    }
}

/// Outcome of inspecting a sent hop's response.
#[derive(Debug)]
pub enum RedirectStep {
    Follow(RequestSpec),
    Terminate(Response),
}

/// Decides whether `response` to `spec` is followed.
///
/// A `location` header triggers a redirect on any status while budget
/// remains; otherwise the response is final, `location` included.
pub fn next_redirect_step(
    policy: RedirectPolicy,
    redirects_followed: usize,
    spec: &RequestSpec,
    response: Response,
) -> RedirectStep {
    if !policy.allows_follow(redirects_followed) {
        return RedirectStep::Terminate(response);
    }
    let Some(location) = response.location() else {
        return RedirectStep::Terminate(response);
    };

    let next_url = resolve_location(location, spec.url());
    let (method, keep_body) = redirect_method(spec.method(), response.status(), policy.is_strict());
    debug!(
        status = response.status_code(),
        location,
        method = %method,
        "following redirect"
    );
    RedirectStep::Follow(spec.redirected(method, next_url, keep_body))
}

/// Method and body handling for a redirect answered with `status`.
///
/// 303, and anything up to 302 unless `strict`, turns an unsafe method into
/// a bodiless GET. Everything else keeps method and body.
pub fn redirect_method(method: Method, status: StatusCode, strict: bool) -> (Method, bool) {
    let code = status.as_u16();
    let downgrade = code == 303 || (code <= 302 && !strict);
    if downgrade && !method.is_safe() {
        (Method::Get, false)
    } else {
        (method, true)
    }
}
