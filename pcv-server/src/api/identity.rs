//! Caller identity
//!
//! Authentication happens in front of this service. The auth proxy forwards
//! the signed-in user as two headers; a request without them is sent to the
//! login page with its own path as the `continue` target.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::LOCATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use url::{ParseError, Position, Url};

use pcv_common::db::UserIdentity;

use crate::AppState;

pub const USER_ID_HEADER: &str = "x-pcv-user-id";
pub const USER_EMAIL_HEADER: &str = "x-pcv-user-email";

/// Base that relative login URLs are resolved against; never emitted
const RELATIVE_BASE: &str = "http://pcv.invalid/";

/// Identity of the signed-in caller
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserIdentity);

/// Rejection for requests without an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRedirect {
    pub location: String,
}

impl LoginRedirect {
    /// Redirect to `login_url`, falling back to it unchanged if it cannot be parsed
    pub fn new(login_url: &str, continue_to: &str) -> Self {
        let location = login_location(login_url, continue_to).unwrap_or_else(|e| {
            warn!(login_url, "Login URL is not a valid URL ({}), redirecting without continue", e);
            login_url.to_string()
        });
        Self { location }
    }
}

/// `login_url` with a `continue` query parameter naming `continue_to`.
///
/// Relative login URLs (`/login`) stay relative.
pub fn login_location(login_url: &str, continue_to: &str) -> Result<String, ParseError> {
    match Url::parse(login_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("continue", continue_to);
            Ok(url.to_string())
        }
        Err(ParseError::RelativeUrlWithoutBase) => {
            let mut url = Url::parse(RELATIVE_BASE)?.join(login_url)?;
            url.query_pairs_mut().append_pair("continue", continue_to);
            Ok(url[Position::BeforePath..].to_string())
        }
        Err(e) => Err(e),
    }
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(LOCATION, self.location)]).into_response()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = LoginRedirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match identity_from_headers(&parts.headers) {
            Some(user) => Ok(AuthenticatedUser(user)),
            None => {
                let continue_to = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                debug!(path = continue_to, "No identity on request, redirecting to login");
                Err(LoginRedirect::new(&state.config.login_url, continue_to))
            }
        }
    }
}

/// Read the proxy-supplied identity; both headers must be present and non-empty
pub fn identity_from_headers(headers: &HeaderMap) -> Option<UserIdentity> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    Some(UserIdentity {
        id: header(USER_ID_HEADER)?,
        email: header(USER_EMAIL_HEADER)?,
    })
}
