//! Session middleware, route guards and the login/logout handlers.
//!
//! Local users log in with a password checked against the user directory.
//! SAML users are sent to the IdP and come back through `/login/callback`.
//! Either way only `{id, username}` is kept in the session and the full user
//! is resolved again on every request.

use std::sync::Arc;

use askama::Template;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use serde::Deserialize;
use tessera_core::error::TesseraError;
use tessera_core::models::user::AuthType;
use tessera_core::notify::Notifier;
use tessera_sp::session::SessionUser;
use tracing::{info, warn};

use crate::sessions::{session_cookie, SESSION_COOKIE_NAME};
use crate::{take_flash, AppState, FlashView};

/// The browser session a request belongs to.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
}

/// Extract session token from cookie header.
fn extract_session_token(req: &Request<Body>) -> Option<String> {
    let cookie_header = req.headers().get(header::COOKIE)?;
    let cookie_str = cookie_header.to_str().ok()?;
    for cookie in cookie_str.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix(&format!("{SESSION_COOKIE_NAME}=")) {
            return Some(value.to_string());
        }
    }
    None
}

/// Attach a [`Session`] to every request, starting one when the cookie is
/// missing, unknown or expired.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let existing = extract_session_token(&req).filter(|token| state.sessions.touch(token));
    let (token, fresh) = match existing {
        Some(token) => (token, false),
        None => (state.sessions.create(), true),
    };
    req.extensions_mut().insert(Session {
        token: token.clone(),
    });

    let mut response = next.run(req).await;

    // Handlers that rotate the session set their own cookie.
    if fresh && !response.headers().contains_key(header::SET_COOKIE) {
        if let Ok(value) = session_cookie(&token, state.sessions.max_age_secs()).parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// `ensureLoggedIn`: resolve the session's user or redirect to `/login`.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let identity = req
        .extensions()
        .get::<Session>()
        .and_then(|session| state.sessions.identity(&session.token));
    let Some((payload, origin)) = identity else {
        return Redirect::to("/login").into_response();
    };

    let user = state.auth.resolve(&payload, origin).await;
    req.extensions_mut().insert(user);
    next.run(req).await
}

/// `ensureAdmin`: must run inside [`require_login`]. Session fallback users
/// are never admins.
pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    let user = req
        .extensions()
        .get::<SessionUser>()
        .map(|user| (user.is_admin(), user.username().to_string()));
    match user {
        Some((true, _)) => next.run(req).await,
        Some((false, username)) => {
            warn!(username = %username, path = %req.uri().path(), "admin access denied");
            (StatusCode::FORBIDDEN, "Forbidden - Admins only").into_response()
        }
        None => Redirect::to("/login").into_response(),
    }
}

/// Redirect to `location`, replacing the session cookie with `token`.
fn redirect_with_session(state: &AppState, token: &str, location: &str) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (
                header::SET_COOKIE,
                session_cookie(token, state.sessions.max_age_secs()),
            ),
            (header::LOCATION, location.to_string()),
        ],
    )
        .into_response()
}

// -- Templates --

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub instance_name: String,
    pub saml_enabled: bool,
    pub messages: Vec<FlashView>,
}

// -- Handlers --

/// GET /login - Show login form, or go to the profile when already logged in.
pub async fn login_page(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    if state.sessions.payload(&session.token).is_some() {
        return Redirect::to("/profile").into_response();
    }
    let tmpl = LoginTemplate {
        instance_name: state.config.tessera.instance_name.clone(),
        saml_enabled: state.registry.is_enabled(),
        messages: take_flash(&state, &session),
    };
    Html(tmpl.render().unwrap_or_default()).into_response()
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// POST /login - Check local credentials.
pub async fn login_submit(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Form(form): Form<LoginForm>,
) -> Response {
    match state
        .auth
        .validate_credentials(form.username.trim(), &form.password)
        .await
    {
        Ok(user) => {
            let token = state
                .sessions
                .login(&session.token, user.session_payload(), AuthType::Local);
            redirect_with_session(&state, &token, "/profile")
        }
        Err(e) => {
            if !matches!(e, TesseraError::AuthenticationRejected) {
                warn!(error = %e, "local login failed");
            }
            // One message for every failure.
            state
                .sessions
                .notifier(&session.token)
                .error(&TesseraError::AuthenticationRejected.to_string());
            Redirect::to("/login").into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct SamlLoginQuery {
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// GET /login/saml - Send the browser to the IdP.
pub async fn saml_redirect(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Query(query): Query<SamlLoginQuery>,
) -> Response {
    match state.auth.begin_saml_login(query.relay_state.as_deref()) {
        Ok(login) => Redirect::to(&login.redirect.url).into_response(),
        Err(e) => {
            warn!(error = %e, "SAML login requested while unavailable");
            state
                .sessions
                .notifier(&session.token)
                .error("SAML login is not available.");
            Redirect::to("/login").into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct SamlCallbackForm {
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// POST /login/callback - Assertion consumer service.
pub async fn saml_callback(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Form(form): Form<SamlCallbackForm>,
) -> Response {
    match state.auth.complete_saml_login(&form.saml_response) {
        Ok(user) => {
            let token = state
                .sessions
                .login(&session.token, user.session_payload(), AuthType::Saml);
            let location = relay_target(form.relay_state.as_deref()).unwrap_or("/profile");
            redirect_with_session(&state, &token, location)
        }
        Err(e) => {
            let message = match e {
                TesseraError::SamlDisabled => "SAML login is not available.".to_string(),
                other => other.to_string(),
            };
            state.sessions.notifier(&session.token).error(&message);
            Redirect::to("/login").into_response()
        }
    }
}

/// Only local absolute paths are honoured as post-login targets.
fn relay_target(relay_state: Option<&str>) -> Option<&str> {
    relay_state.filter(|target| target.starts_with('/') && !target.starts_with("//"))
}

/// GET|POST /logout - Drop the logged-in user and return to the login page.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    if let Some(payload) = state.sessions.logout(&session.token) {
        info!(username = %payload.username, "logged out");
        state
            .sessions
            .notifier(&session.token)
            .success("You have been logged out.");
    }
    Redirect::to("/login").into_response()
}
