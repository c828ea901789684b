//! The SP trust document: IdP endpoint, SP identity, trusted certificate and
//! claim mapping, as persisted in `saml-config.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::pem::{is_pem_certificate, normalize_cert};

/// Fields that must be non-empty for SAML login to be enabled.
pub const REQUIRED_FIELDS: [&str; 4] = ["entryPoint", "issuer", "callbackUrl", "cert"];

/// Persisted SAML service-provider configuration.
///
/// Keys this type does not know about are kept in `extra` so a
/// load/modify/save cycle never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpTrustConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entry_point: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub issuer: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub callback_url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cert: String,
    #[serde(default)]
    pub attributes: AttributeMapping,
    /// Legacy location of the certificate, written by older tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// Legacy pre-stripped copy of the certificate body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_for_metadata: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl SpTrustConfig {
    /// Required fields that are absent or blank, in document order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let values = [
            &self.entry_point,
            &self.issuer,
            &self.callback_url,
            &self.cert,
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(values)
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect()
    }

    /// SAML is enabled only with every required field present and a PEM `cert`.
    pub fn is_enabled(&self) -> bool {
        self.missing_fields().is_empty() && is_pem_certificate(&self.cert)
    }

    /// Apply certificate normalization, falling back to the legacy
    /// `certificate` field when `cert` is blank.
    pub fn normalized(mut self) -> Self {
        if self.cert.trim().is_empty() {
            if let Some(legacy) = self.certificate.as_deref() {
                if !legacy.trim().is_empty() {
                    self.cert = legacy.to_string();
                }
            }
        }
        self.cert = normalize_cert(&self.cert);
        self
    }

    /// Drop the duplicate certificate fields left behind by older tooling.
    pub fn strip_legacy_certificates(&mut self) {
        self.certificate = None;
        self.certificate_for_metadata = None;
    }

    /// Copy identity fields from `seed` into the ones that are blank here.
    pub fn fill_blank_from(&mut self, seed: &SpTrustConfig) {
        let pairs = [
            (&mut self.entry_point, &seed.entry_point),
            (&mut self.issuer, &seed.issuer),
            (&mut self.callback_url, &seed.callback_url),
        ];
        for (field, value) in pairs {
            if field.trim().is_empty() && !value.trim().is_empty() {
                field.clone_from(value);
            }
        }
    }

    /// SP entity ID used in metadata; the ACS URL stands in when no issuer is set.
    pub fn entity_id(&self) -> &str {
        if self.issuer.trim().is_empty() {
            &self.callback_url
        } else {
            &self.issuer
        }
    }
}

/// Logical profile fields that can be populated from IdP claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Email,
    FirstName,
    LastName,
    DisplayName,
    Manager,
    Title,
}

impl ProfileField {
    pub const ALL: [ProfileField; 6] = [
        ProfileField::Email,
        ProfileField::FirstName,
        ProfileField::LastName,
        ProfileField::DisplayName,
        ProfileField::Manager,
        ProfileField::Title,
    ];

    /// Key used in the `attributes` mapping.
    pub fn key(&self) -> &'static str {
        match self {
            ProfileField::Email => "email",
            ProfileField::FirstName => "firstName",
            ProfileField::LastName => "lastName",
            ProfileField::DisplayName => "displayName",
            ProfileField::Manager => "manager",
            ProfileField::Title => "title",
        }
    }
}

/// Mapping from logical profile field to the IdP's claim name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AttributeMapping {
    pub fn claim_for(&self, field: ProfileField) -> Option<&str> {
        let claim = match field {
            ProfileField::Email => &self.email,
            ProfileField::FirstName => &self.first_name,
            ProfileField::LastName => &self.last_name,
            ProfileField::DisplayName => &self.display_name,
            ProfileField::Manager => &self.manager,
            ProfileField::Title => &self.title,
        };
        claim.as_deref().filter(|c| !c.is_empty())
    }

    pub fn set_claim(&mut self, field: ProfileField, claim: Option<String>) {
        let claim = claim.filter(|c| !c.trim().is_empty());
        match field {
            ProfileField::Email => self.email = claim,
            ProfileField::FirstName => self.first_name = claim,
            ProfileField::LastName => self.last_name = claim,
            ProfileField::DisplayName => self.display_name = claim,
            ProfileField::Manager => self.manager = claim,
            ProfileField::Title => self.title = claim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEM: &str = "-----BEGIN CERTIFICATE-----\nQUJD\n-----END CERTIFICATE-----\n";

    fn complete() -> SpTrustConfig {
        SpTrustConfig {
            entry_point: "https://idp.example.com/sso".into(),
            issuer: "tessera-sp".into(),
            callback_url: "https://sp.example.com/login/callback".into(),
            cert: PEM.into(),
            ..Default::default()
        }
    }

    #[test]
    fn complete_config_is_enabled() {
        let cfg = complete();
        assert!(cfg.missing_fields().is_empty());
        assert!(cfg.is_enabled());
    }

    #[test]
    fn any_missing_required_field_disables() {
        let blankers: [fn(&mut SpTrustConfig); 4] = [
            |c| c.entry_point.clear(),
            |c| c.issuer = "   ".into(),
            |c| c.callback_url.clear(),
            |c| c.cert.clear(),
        ];
        for (blank, name) in blankers.iter().zip(REQUIRED_FIELDS) {
            let mut cfg = complete();
            blank(&mut cfg);
            assert!(!cfg.is_enabled(), "{name} should be required");
            assert_eq!(cfg.missing_fields(), vec![name]);
        }
    }

    #[test]
    fn bare_cert_is_not_enabled_until_normalized() {
        let mut cfg = complete();
        cfg.cert = "QUJD".into();
        assert!(!cfg.is_enabled());
        assert!(cfg.normalized().is_enabled());
    }

    #[test]
    fn legacy_certificate_field_fills_blank_cert() {
        let mut cfg = complete();
        cfg.cert.clear();
        cfg.certificate = Some("QUJD".into());
        let cfg = cfg.normalized();
        assert!(cfg.cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(cfg.is_enabled());
    }

    #[test]
    fn cert_field_wins_over_legacy_field() {
        let mut cfg = complete();
        cfg.certificate = Some("REVG".into());
        let cfg = cfg.normalized();
        assert_eq!(cfg.cert, PEM);
    }

    #[test]
    fn deserializes_camel_case_document() {
        let json = r#"{
            "entryPoint": "https://idp.example.com/sso",
            "issuer": "tessera-sp",
            "callbackUrl": "https://sp.example.com/login/callback",
            "cert": "QUJD",
            "attributes": {
                "email": "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress",
                "firstName": "givenName"
            }
        }"#;
        let cfg: SpTrustConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.issuer, "tessera-sp");
        assert_eq!(
            cfg.attributes.claim_for(ProfileField::FirstName),
            Some("givenName")
        );
        assert_eq!(cfg.attributes.claim_for(ProfileField::Title), None);
    }

    #[test]
    fn null_fields_read_as_empty() {
        let cfg: SpTrustConfig =
            serde_json::from_str(r#"{"entryPoint": null, "cert": null}"#).unwrap();
        assert_eq!(cfg.entry_point, "");
        assert_eq!(cfg.missing_fields(), REQUIRED_FIELDS.to_vec());
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let json = r#"{
            "issuer": "tessera-sp",
            "signatureAlgorithm": "sha256",
            "attributes": {"email": "mail", "department": "dept"}
        }"#;
        let cfg: SpTrustConfig = serde_json::from_str(json).unwrap();
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["signatureAlgorithm"], "sha256");
        assert_eq!(value["attributes"]["department"], "dept");
        assert_eq!(value["attributes"]["email"], "mail");
    }

    #[test]
    fn legacy_fields_are_stripped_from_output() {
        let mut cfg = complete();
        cfg.certificate = Some("QUJD".into());
        cfg.certificate_for_metadata = Some("QUJD".into());
        cfg.strip_legacy_certificates();
        let value = serde_json::to_value(&cfg).unwrap();
        assert!(value.get("certificate").is_none());
        assert!(value.get("certificateForMetadata").is_none());
    }

    #[test]
    fn entity_id_falls_back_to_callback_url() {
        let mut cfg = complete();
        assert_eq!(cfg.entity_id(), "tessera-sp");
        cfg.issuer.clear();
        assert_eq!(cfg.entity_id(), "https://sp.example.com/login/callback");
    }

    #[test]
    fn fill_blank_from_keeps_existing_values() {
        let mut cfg = SpTrustConfig {
            issuer: "mine".into(),
            ..Default::default()
        };
        let seed = SpTrustConfig {
            entry_point: "https://idp.example.com/sso".into(),
            issuer: "seeded".into(),
            callback_url: String::new(),
            ..Default::default()
        };
        cfg.fill_blank_from(&seed);
        assert_eq!(cfg.entry_point, "https://idp.example.com/sso");
        assert_eq!(cfg.issuer, "mine");
        assert_eq!(cfg.callback_url, "");
    }

    #[test]
    fn set_claim_ignores_blank_values() {
        let mut mapping = AttributeMapping::default();
        mapping.set_claim(ProfileField::Manager, Some("manager".into()));
        mapping.set_claim(ProfileField::Title, Some("  ".into()));
        assert_eq!(mapping.claim_for(ProfileField::Manager), Some("manager"));
        assert_eq!(mapping.title, None);
    }
}
