//! Login orchestration for local and SAML users, and per-request user resolution.

use std::sync::Arc;

use tessera_core::directory::UserDirectory;
use tessera_core::error::{Result, TesseraError};
use tessera_core::models::user::{AuthType, SessionPayload, User};
use tracing::{info, warn};

use crate::registry::StrategyRegistry;
use crate::strategy::{ActiveStrategy, AuthnRedirect};

/// The user behind a session, as resolved for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUser {
    /// Found in the user directory.
    Resolved(User),
    /// Not in the directory; only the stored payload is known.
    Fallback(SessionPayload),
}

impl SessionUser {
    pub fn id(&self) -> &str {
        match self {
            SessionUser::Resolved(user) => &user.id,
            SessionUser::Fallback(payload) => &payload.id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            SessionUser::Resolved(user) => &user.username,
            SessionUser::Fallback(payload) => &payload.username,
        }
    }

    /// Fallback users never hold privileges.
    pub fn is_admin(&self) -> bool {
        match self {
            SessionUser::Resolved(user) => user.is_admin,
            SessionUser::Fallback(_) => false,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionUser::Resolved(user) => Some(user),
            SessionUser::Fallback(_) => None,
        }
    }
}

/// An SP-initiated login in progress, bound to the strategy it started with.
#[derive(Debug, Clone)]
pub struct SamlLogin {
    pub strategy: Arc<ActiveStrategy>,
    pub redirect: AuthnRedirect,
}

pub struct AuthSessionManager {
    directory: Arc<dyn UserDirectory>,
    registry: Arc<StrategyRegistry>,
}

impl AuthSessionManager {
    pub fn new(directory: Arc<dyn UserDirectory>, registry: Arc<StrategyRegistry>) -> Self {
        Self {
            directory,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// Check a local username and password.
    ///
    /// Unknown users and wrong passwords both fail with
    /// [`TesseraError::AuthenticationRejected`].
    pub async fn validate_credentials(&self, username: &str, password: &str) -> Result<User> {
        let valid = self.directory.validate_password(username, password).await?;
        if !valid {
            warn!(username, "local login rejected");
            return Err(TesseraError::AuthenticationRejected);
        }
        match self.directory.find_by_username(username).await? {
            Some(user) => {
                info!(username = %user.username, "local login succeeded");
                Ok(user)
            }
            None => {
                warn!(username, "user vanished between password check and lookup");
                Err(TesseraError::AuthenticationRejected)
            }
        }
    }

    /// Start an SP-initiated login against the current strategy.
    pub fn begin_saml_login(&self, relay_state: Option<&str>) -> Result<SamlLogin> {
        let strategy = self.registry.active()?;
        let redirect = strategy.authorize_url(relay_state)?;
        info!(request_id = %redirect.request_id, "redirecting to IdP");
        Ok(SamlLogin { strategy, redirect })
    }

    /// Consume the IdP's POSTed response and build the transient SAML user.
    ///
    /// The strategy is captured once on entry; a reload during the call does
    /// not affect it. Malformed or unsuccessful responses are rejected with
    /// the generic authentication error.
    pub fn complete_saml_login(&self, saml_response: &str) -> Result<User> {
        let strategy = self.registry.active()?;
        Self::complete_with(&strategy, saml_response)
    }

    pub fn complete_with(strategy: &ActiveStrategy, saml_response: &str) -> Result<User> {
        let profile = strategy.consume_response(saml_response).map_err(|e| {
            warn!(error = %e, "SAML response rejected");
            TesseraError::AuthenticationRejected
        })?;
        let user = strategy.map_profile(&profile);
        info!(username = %user.username, generation = strategy.generation(), "SAML login succeeded");
        Ok(user)
    }

    /// Re-resolve the session's user: by id, then by username, then the
    /// payload itself.
    ///
    /// A SAML session that matches a local record gets that record's profile
    /// but never its admin flag.
    pub async fn resolve(&self, payload: &SessionPayload, origin: AuthType) -> SessionUser {
        match self.lookup(payload).await {
            Some(mut user) => {
                if origin == AuthType::Saml {
                    if user.is_admin {
                        warn!(username = %payload.username, "SAML session matched a local admin, privileges dropped");
                    }
                    user.is_admin = false;
                    user.auth_type = AuthType::Saml;
                }
                SessionUser::Resolved(user)
            }
            None => SessionUser::Fallback(payload.clone()),
        }
    }

    async fn lookup(&self, payload: &SessionPayload) -> Option<User> {
        match self.directory.find_by_id(&payload.id).await {
            Ok(Some(user)) => return Some(user),
            Ok(None) => {}
            Err(e) => warn!(id = %payload.id, error = %e, "user lookup by id failed"),
        }
        match self.directory.find_by_username(&payload.username).await {
            Ok(found) => found,
            Err(e) => {
                warn!(username = %payload.username, error = %e, "user lookup by username failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::tests::sample_response;
    use crate::saml::STATUS_SUCCESS;
    use crate::strategy::tests::{enabled_config, test_cert};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use tessera_core::config::UserConfig;
    use tessera_core::directory::InMemoryUserDirectory;
    use tessera_core::models::trust::SpTrustConfig;
    use tessera_core::passwords::hash_password;

    fn manager() -> AuthSessionManager {
        let users = vec![UserConfig {
            id: "1".into(),
            username: "admin".into(),
            password_hash: hash_password("adminpass").unwrap(),
            email: "admin@example.com".into(),
            first_name: "Admin".into(),
            last_name: "User".into(),
            display_name: String::new(),
            manager: String::new(),
            title: String::new(),
            is_admin: true,
        }];
        AuthSessionManager::new(
            Arc::new(InMemoryUserDirectory::from_config(&users)),
            Arc::new(StrategyRegistry::new()),
        )
    }

    #[tokio::test]
    async fn valid_local_credentials_return_user() {
        let user = manager()
            .validate_credentials("admin", "adminpass")
            .await
            .unwrap();
        assert_eq!(user.id, "1");
        assert_eq!(user.auth_type, AuthType::Local);
        assert!(user.is_admin);
    }

    #[tokio::test]
    async fn rejections_are_indistinguishable() {
        let manager = manager();
        let unknown = manager.validate_credentials("nouser", "x").await.unwrap_err();
        let wrong = manager
            .validate_credentials("admin", "wrongpass")
            .await
            .unwrap_err();
        assert!(matches!(unknown, TesseraError::AuthenticationRejected));
        assert!(matches!(wrong, TesseraError::AuthenticationRejected));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[test]
    fn saml_login_requires_enabled_registry() {
        let manager = manager();
        assert!(matches!(
            manager.begin_saml_login(None),
            Err(TesseraError::SamlDisabled)
        ));
        assert!(matches!(
            manager.complete_saml_login("anything"),
            Err(TesseraError::SamlDisabled)
        ));
    }

    #[test]
    fn saml_round_trip_yields_non_admin_user() {
        let manager = manager();
        manager.registry().reload(&enabled_config(&test_cert()));

        let login = manager.begin_saml_login(Some("/profile")).unwrap();
        assert!(login.redirect.url.contains("RelayState=%2Fprofile"));

        let encoded = BASE64.encode(sample_response("admin", STATUS_SUCCESS));
        let user = manager.complete_saml_login(&encoded).unwrap();
        // Same name as a local admin, but SAML users never inherit privileges.
        assert_eq!(user.username, "admin");
        assert!(!user.is_admin);
        assert_eq!(user.auth_type, AuthType::Saml);
    }

    #[test]
    fn bad_saml_response_is_generic_rejection() {
        let manager = manager();
        manager.registry().reload(&enabled_config(&test_cert()));
        let encoded = BASE64.encode(sample_response(
            "jdoe",
            "urn:oasis:names:tc:SAML:2.0:status:Responder",
        ));
        assert!(matches!(
            manager.complete_saml_login(&encoded),
            Err(TesseraError::AuthenticationRejected)
        ));
        assert!(matches!(
            manager.complete_saml_login("!!!"),
            Err(TesseraError::AuthenticationRejected)
        ));
    }

    #[test]
    fn in_flight_login_uses_captured_strategy() {
        let manager = manager();
        manager.registry().reload(&enabled_config(&test_cert()));
        let login = manager.begin_saml_login(None).unwrap();

        manager.registry().reload(&SpTrustConfig::default());
        let encoded = BASE64.encode(sample_response("jdoe", STATUS_SUCCESS));
        let user = AuthSessionManager::complete_with(&login.strategy, &encoded).unwrap();
        assert_eq!(user.username, "jdoe");
        assert!(manager.complete_saml_login(&encoded).is_err());
    }

    #[tokio::test]
    async fn resolve_by_id_then_username_then_fallback() {
        let manager = manager();

        let by_id = manager
            .resolve(
                &SessionPayload {
                    id: "1".into(),
                    username: "ignored".into(),
                },
                AuthType::Local,
            )
            .await;
        assert!(by_id.is_admin());
        assert_eq!(by_id.username(), "admin");

        let by_name = manager
            .resolve(
                &SessionPayload {
                    id: "stale".into(),
                    username: "admin".into(),
                },
                AuthType::Local,
            )
            .await;
        assert_eq!(by_name.id(), "1");

        let fallback = manager
            .resolve(
                &SessionPayload {
                    id: "jdoe@example.com".into(),
                    username: "jdoe@example.com".into(),
                },
                AuthType::Saml,
            )
            .await;
        assert!(matches!(fallback, SessionUser::Fallback(_)));
        assert!(!fallback.is_admin());
        assert!(fallback.user().is_none());
        assert_eq!(fallback.username(), "jdoe@example.com");
    }

    #[tokio::test]
    async fn saml_session_never_resolves_to_admin() {
        let manager = manager();
        manager.registry().reload(&enabled_config(&test_cert()));

        for name_id in ["admin", "ADMIN"] {
            let encoded = BASE64.encode(sample_response(name_id, STATUS_SUCCESS));
            let user = manager.complete_saml_login(&encoded).unwrap();
            let resolved = manager
                .resolve(&user.session_payload(), AuthType::Saml)
                .await;
            // Matches the local record by username, without its privileges.
            assert_eq!(resolved.id(), "1", "{name_id}");
            assert!(!resolved.is_admin(), "{name_id}");
            assert_eq!(resolved.user().unwrap().auth_type, AuthType::Saml);
        }

        let local = manager
            .resolve(
                &SessionPayload {
                    id: "1".into(),
                    username: "admin".into(),
                },
                AuthType::Local,
            )
            .await;
        assert!(local.is_admin());
    }
}
