use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::PrivateCookieJar;

use crate::error::LaasError;
use crate::router::LaasState;

pub const EMAIL_COOKIE: &str = "email";
pub const TOKEN_COOKIE: &str = "token";

/// An authenticated caller.
/// Requires the `email` and `token` cookies to name a live session in the session cache.
#[derive(Debug, Clone)]
pub struct RequireSession {
    pub email: String,
}

impl FromRequestParts<LaasState> for RequireSession {
    type Rejection = LaasError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &LaasState,
    ) -> Result<Self, Self::Rejection> {
        let jar: PrivateCookieJar = match PrivateCookieJar::from_request_parts(parts, state).await {
            Ok(jar) => jar,
            Err(never) => match never {},
        };

        let email = jar
            .get(EMAIL_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or(LaasError::Unauthorized)?;
        let token = jar
            .get(TOKEN_COOKIE)
            .map(|c| c.value().to_owned())
            .ok_or(LaasError::Unauthorized)?;

        if !state.sessions.validate(&email, &token) {
            return Err(LaasError::Unauthorized);
        }
        Ok(Self { email })
    }
}
