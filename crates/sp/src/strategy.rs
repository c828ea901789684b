//! The trusted SAML relationship built from one configuration snapshot.

use tessera_core::error::{Result, TesseraError};
use tessera_core::models::trust::{AttributeMapping, ProfileField, SpTrustConfig};
use tessera_core::models::user::{AuthType, User};
use tessera_core::pem::{normalize_cert, parse_certificate, CertificateInfo};
use url::Url;

use crate::saml::{decode_post_response, parse_response, AuthnRequest, SamlProfile};

/// Name under which the registry publishes the strategy.
pub const STRATEGY_NAME: &str = "saml";

/// Immutable view of an enabled SP trust configuration.
///
/// Never modified after construction; a reload builds a new one.
#[derive(Debug, Clone)]
pub struct ActiveStrategy {
    generation: u64,
    entry_point: Url,
    issuer: String,
    callback_url: Url,
    certificate: CertificateInfo,
    attributes: AttributeMapping,
}

/// A prepared SP-initiated login.
#[derive(Debug, Clone)]
pub struct AuthnRedirect {
    pub request_id: String,
    pub url: String,
}

impl ActiveStrategy {
    /// Build a strategy from a normalized configuration.
    pub fn from_config(cfg: &SpTrustConfig, generation: u64) -> Result<Self> {
        let missing = cfg.missing_fields();
        if !missing.is_empty() {
            return Err(TesseraError::ConfigIncomplete { missing });
        }

        let entry_point = parse_url("entryPoint", &cfg.entry_point)?;
        let callback_url = parse_url("callbackUrl", &cfg.callback_url)?;
        let certificate = parse_certificate(&cfg.cert)?;

        Ok(Self {
            generation,
            entry_point,
            issuer: cfg.issuer.trim().to_string(),
            callback_url,
            certificate,
            attributes: cfg.attributes.clone(),
        })
    }

    pub fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    /// Registry generation that produced this strategy.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entry_point(&self) -> &Url {
        &self.entry_point
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    pub fn certificate(&self) -> &CertificateInfo {
        &self.certificate
    }

    pub fn attributes(&self) -> &AttributeMapping {
        &self.attributes
    }

    /// IdP redirect for a new login, HTTP-Redirect binding.
    pub fn authorize_url(&self, relay_state: Option<&str>) -> Result<AuthnRedirect> {
        let request = AuthnRequest::new(
            self.entry_point.as_str(),
            self.callback_url.as_str(),
            &self.issuer,
        );
        let url = request.redirect_url(relay_state)?;
        Ok(AuthnRedirect {
            request_id: request.id,
            url,
        })
    }

    /// Decode and parse the `SAMLResponse` posted to the ACS endpoint.
    pub fn consume_response(&self, encoded: &str) -> Result<SamlProfile> {
        let xml = decode_post_response(encoded)?;
        parse_response(&xml)
    }

    /// Turn an IdP profile into a transient user.
    ///
    /// Claims missing from the profile map to empty strings. SAML users are
    /// never admins.
    pub fn map_profile(&self, profile: &SamlProfile) -> User {
        let claim = |field: ProfileField| {
            self.attributes
                .claim_for(field)
                .and_then(|name| profile.attribute(name))
                .unwrap_or_default()
                .to_string()
        };

        User {
            id: profile.name_id.clone(),
            username: profile.name_id.clone(),
            email: claim(ProfileField::Email),
            first_name: claim(ProfileField::FirstName),
            last_name: claim(ProfileField::LastName),
            display_name: claim(ProfileField::DisplayName),
            manager: claim(ProfileField::Manager),
            title: claim(ProfileField::Title),
            is_admin: false,
            auth_type: AuthType::Saml,
            saml_assertion: Some(profile.raw_xml.clone()),
        }
    }

    /// Whether this strategy was built from the trust-relevant fields of `cfg`.
    pub fn matches(&self, cfg: &SpTrustConfig) -> bool {
        let same_url = |url: &Url, raw: &str| Url::parse(raw.trim()).map_or(false, |u| &u == url);
        same_url(&self.entry_point, &cfg.entry_point)
            && same_url(&self.callback_url, &cfg.callback_url)
            && self.issuer == cfg.issuer.trim()
            && self.certificate.pem == normalize_cert(&cfg.cert)
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value.trim())
        .map_err(|e| TesseraError::ConfigMalformed(format!("{field} is not a valid URL: {e}")))
}
