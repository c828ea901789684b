//! Tessera Console — the web surface of the service provider.
//!
//! Serves local and SAML login, the public SP metadata endpoint, the user
//! profile page and the admin editor for the SP trust document.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use tessera_core::config::TesseraConfig;
use tessera_core::directory::InMemoryUserDirectory;
use tessera_core::models::user::AuthType;
use tessera_core::notify::{LogNotifier, Notice, NoticeLevel};
use tessera_core::store::ConfigStore;
use tessera_sp::certs::CertificateAuthority;
use tessera_sp::metadata::{MetadataGenerator, MetadataOptions};
use tessera_sp::registry::{StrategyRegistry, StrategyState};
use tessera_sp::session::{AuthSessionManager, SessionUser};
use tracing::warn;

pub mod admin;
pub mod auth;
pub mod sessions;

use auth::Session;
use sessions::SessionStore;

/// Shared application state for all console routes.
pub struct AppState {
    pub config: TesseraConfig,
    pub store: ConfigStore,
    pub registry: Arc<StrategyRegistry>,
    pub metadata: MetadataGenerator,
    pub auth: AuthSessionManager,
    pub authority: CertificateAuthority,
    pub sessions: SessionStore,
}

impl AppState {
    /// Wire up the SP components for `config` and load the SP document.
    pub fn from_config(config: TesseraConfig) -> Self {
        let store = ConfigStore::new(config.saml_config_path());
        let registry = Arc::new(StrategyRegistry::new());
        let directory = Arc::new(InMemoryUserDirectory::from_config(&config.users));
        let auth = AuthSessionManager::new(directory, registry.clone());
        let authority = CertificateAuthority::new(
            store.clone(),
            registry.clone(),
            config.cert_path(),
            config.key_path(),
        )
        .with_defaults(
            config.saml.default_common_name.clone(),
            config.saml.default_validity_days,
        )
        .with_seed(config.sp_seed());
        let sessions = SessionStore::new(config.tessera.session_timeout_minutes);

        registry.reload_from(&store, &LogNotifier);

        Self {
            config,
            store,
            registry,
            metadata: MetadataGenerator::new(),
            auth,
            authority,
            sessions,
        }
    }

    /// Options for the public metadata endpoint.
    pub fn metadata_options(&self) -> MetadataOptions {
        MetadataOptions {
            include_encryption_key: self.config.saml.include_encryption_key,
            single_logout_url: None,
        }
    }
}

/// Build the console router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route(
            "/admin/saml-config",
            get(admin::config_page).post(admin::config_save),
        )
        .route(
            "/admin/saml-config/attributes",
            post(admin::attributes_save),
        )
        .route("/admin/saml-config/cleanup", post(admin::cleanup))
        .route(
            "/admin/saml-config/generate-cert",
            post(admin::generate_cert),
        )
        .route("/admin/saml-metadata", get(admin::extended_metadata))
        .route_layer(middleware::from_fn(auth::require_admin));

    let protected = Router::new()
        .route("/profile", get(profile))
        .merge(admin)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_login,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/", get(home))
        .route("/login", get(auth::login_page).post(auth::login_submit))
        .route("/login/saml", get(auth::saml_redirect))
        .route("/login/callback", post(auth::saml_callback))
        .route("/logout", get(auth::logout).post(auth::logout))
        .route("/saml/metadata", get(saml_metadata))
        .merge(protected)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_middleware,
        ))
        .with_state(state)
}

// -- Health --

async fn health() -> &'static str {
    "ok"
}

// -- View models --

pub(crate) struct FlashView {
    pub(crate) class: &'static str,
    pub(crate) message: String,
}

impl From<Notice> for FlashView {
    fn from(notice: Notice) -> Self {
        let class = match notice.level {
            NoticeLevel::Success => "success",
            NoticeLevel::Error => "error",
        };
        Self {
            class,
            message: notice.message,
        }
    }
}

pub(crate) fn take_flash(state: &AppState, session: &Session) -> Vec<FlashView> {
    state
        .sessions
        .take_flash(&session.token)
        .into_iter()
        .map(FlashView::from)
        .collect()
}

struct ProfileView {
    label: String,
    id: String,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    display_name: String,
    manager: String,
    title: String,
    auth_type: &'static str,
    is_admin: bool,
    saml_assertion: String,
}

impl ProfileView {
    fn from_session_user(user: &SessionUser) -> Self {
        match user {
            SessionUser::Resolved(user) => Self {
                label: user.label(),
                id: user.id.clone(),
                username: user.username.clone(),
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                display_name: user.display_name.clone(),
                manager: user.manager.clone(),
                title: user.title.clone(),
                auth_type: match user.auth_type {
                    AuthType::Local => "local",
                    AuthType::Saml => "saml",
                },
                is_admin: user.is_admin,
                saml_assertion: user.saml_assertion.clone().unwrap_or_default(),
            },
            // Users without a directory record only have what the session kept.
            SessionUser::Fallback(payload) => Self {
                label: payload.username.clone(),
                id: payload.id.clone(),
                username: payload.username.clone(),
                email: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                display_name: String::new(),
                manager: String::new(),
                title: String::new(),
                auth_type: "saml",
                is_admin: false,
                saml_assertion: String::new(),
            },
        }
    }
}

// -- Templates --

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    instance_name: String,
    user_label: Option<String>,
    is_admin: bool,
    saml_enabled: bool,
    messages: Vec<FlashView>,
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    instance_name: String,
    profile: ProfileView,
    messages: Vec<FlashView>,
}

// -- Handlers --

async fn home(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Html<String> {
    let user = match state.sessions.identity(&session.token) {
        Some((payload, origin)) => Some(state.auth.resolve(&payload, origin).await),
        None => None,
    };
    let tmpl = HomeTemplate {
        instance_name: state.config.tessera.instance_name.clone(),
        user_label: user.as_ref().map(|u| match u {
            SessionUser::Resolved(user) => user.label(),
            SessionUser::Fallback(payload) => payload.username.clone(),
        }),
        is_admin: user.as_ref().is_some_and(SessionUser::is_admin),
        saml_enabled: state.registry.is_enabled(),
        messages: take_flash(&state, &session),
    };
    Html(tmpl.render().unwrap_or_default())
}

async fn profile(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Extension(user): Extension<SessionUser>,
) -> Html<String> {
    let tmpl = ProfileTemplate {
        instance_name: state.config.tessera.instance_name.clone(),
        profile: ProfileView::from_session_user(&user),
        messages: take_flash(&state, &session),
    };
    Html(tmpl.render().unwrap_or_default())
}

/// GET /saml/metadata - SP metadata for the IdP.
///
/// Reads the document on every request so the output tracks edits, and works
/// while SAML login is disabled as long as `cert` and `callbackUrl` are set.
async fn saml_metadata(State(state): State<Arc<AppState>>) -> Response {
    let cfg = match state.store.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, "SP metadata requested without a usable configuration");
            return (StatusCode::INTERNAL_SERVER_ERROR, "SAML not configured").into_response();
        }
    };
    match state.metadata.generate_with(&cfg, state.metadata_options()) {
        Ok(xml) => xml_response(xml),
        Err(e) => {
            warn!(error = %e, "SP metadata unavailable");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub(crate) fn xml_response(xml: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

/// Human-readable SAML status for templates.
pub(crate) fn saml_status(state: &AppState) -> String {
    match state.registry.current() {
        StrategyState::Active(strategy) => format!(
            "Enabled (issuer {}, IdP {})",
            strategy.issuer(),
            strategy.entry_point()
        ),
        StrategyState::Disabled(reason) => format!("Disabled: {reason}"),
    }
}
