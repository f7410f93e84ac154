use crate::db::normalize_email;
use crate::middleware::auth::{EMAIL_COOKIE, RequireSession, TOKEN_COOKIE};
use crate::middleware::validate;
use crate::service::StagedAccount;
use crate::service::password::{hash_password, verify_password};
use crate::types::requests::{CreateUserRequest, LoginRequest, VerifyRequest};
use crate::{LaasError, router::LaasState};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use serde_json::json;
use tracing::{info, warn};

/// POST /api/user/create -> stages the account and emails a verification code.
pub async fn create(
    State(state): State<LaasState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, LaasError> {
    let email = normalize_email(&req.email);
    validate::email(&email, &state.settings.email_domains)?;
    validate::name(&req.first_name)?;
    validate::name(&req.last_name)?;
    validate::password(&req.password)?;

    if state.users.get(&email).await?.is_some() {
        return Err(LaasError::DuplicateKey(format!("user {email}")));
    }

    state
        .pending
        .register(StagedAccount {
            email: email.clone(),
            first_name: req.first_name,
            last_name: req.last_name,
            password_hash: hash_password(&state.settings.db_salt, &req.password),
        })
        .await?;

    info!(email = %email, "registration pending verification");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "verification_sent" })),
    ))
}

/// POST /api/user/verify -> promotes a pending account into a real user and logs it in.
pub async fn verify(
    State(state): State<LaasState>,
    jar: PrivateCookieJar,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, LaasError> {
    let verified = state.pending.complete(&req.email, &req.code).await?;
    let staged = &verified.account;
    let created = state
        .users
        .create(
            &staged.email,
            &staged.first_name,
            &staged.last_name,
            &staged.password_hash,
        )
        .await;
    let user = match created {
        Ok(user) => user,
        Err(e @ LaasError::DuplicateKey(_)) => return Err(e),
        Err(e) => {
            // The code was good; keep it usable for a retry.
            let email = staged.email.clone();
            if let Err(restore_err) = state.pending.restore(verified).await {
                warn!(email = %email, error = %restore_err, "pending registration not restored");
            }
            return Err(e);
        }
    };

    let token = state.sessions.token_for(&user.email);
    let jar = store_session_cookies(jar, &user.email, token, state.settings.insecure_cookie);

    info!(email = %user.email, "user created");
    Ok((StatusCode::CREATED, jar, Json(user)))
}

/// POST /api/user/login
pub async fn login(
    State(state): State<LaasState>,
    jar: PrivateCookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, LaasError> {
    let email = normalize_email(&req.email);
    let user = state
        .users
        .get(&email)
        .await?
        .ok_or(LaasError::Unauthorized)?;
    if !verify_password(&state.settings.db_salt, &req.password, &user.password_hash) {
        return Err(LaasError::Unauthorized);
    }

    state.sessions.purge_expired();
    let token = state.sessions.token_for(&email);
    let jar = store_session_cookies(jar, &email, token, state.settings.insecure_cookie);

    info!(email = %email, "user logged in");
    Ok((jar, Json(user)))
}

/// GET /api/user/me
pub async fn me(
    State(state): State<LaasState>,
    session: RequireSession,
) -> Result<impl IntoResponse, LaasError> {
    let user = state
        .users
        .get(&session.email)
        .await?
        .ok_or_else(|| LaasError::NotFound(format!("user {}", session.email)))?;
    Ok(Json(user))
}

/// POST /api/user/logout
pub async fn logout(jar: PrivateCookieJar) -> impl IntoResponse {
    match jar.get(EMAIL_COOKIE) {
        Some(email) => info!(email = %email.value(), "user logged out"),
        None => info!("unknown user logged out"),
    }
    (clear_session_cookies(jar), StatusCode::OK)
}

/// DELETE /api/user/delete -> removes the caller's own account.
pub async fn delete_self(
    State(state): State<LaasState>,
    session: RequireSession,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, LaasError> {
    if !state.users.delete(&session.email).await? {
        return Err(LaasError::NotFound(format!("user {}", session.email)));
    }
    state.sessions.forget(&session.email);
    info!(email = %session.email, "user deleted");
    Ok((clear_session_cookies(jar), StatusCode::OK))
}

fn store_session_cookies(
    jar: PrivateCookieJar,
    email: &str,
    token: String,
    insecure: bool,
) -> PrivateCookieJar {
    jar.add(build_cookie(EMAIL_COOKIE, email.to_string(), insecure))
        .add(build_cookie(TOKEN_COOKIE, token, insecure))
}

fn clear_session_cookies(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_cookie(EMAIL_COOKIE))
        .remove(clear_cookie(TOKEN_COOKIE))
}

fn build_cookie(name: &str, value: String, insecure: bool) -> Cookie<'static> {
    let builder = Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true);
    if insecure {
        builder.same_site(SameSite::Lax).build()
    } else {
        builder.same_site(SameSite::None).secure(true).build()
    }
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .build()
}
