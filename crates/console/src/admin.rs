//! Admin pages for the SP trust document: the raw JSON editor, the attribute
//! mapping form, cleanup, certificate generation and the extended metadata.
//!
//! Every change is written through [`ConfigStore`](tessera_core::store::ConfigStore)
//! and followed by a registry reload, so the login strategy always matches
//! the document on disk.

use std::collections::HashMap;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form,
};
use chrono::Utc;
use serde::Deserialize;
use tessera_core::models::trust::{ProfileField, SpTrustConfig};
use tessera_core::notify::{NoticeBuffer, Notifier};
use tessera_core::pem::parse_certificate;
use tessera_sp::certs::IssueRequest;
use tessera_sp::metadata::MetadataOptions;
use tracing::{error, info, warn};

use crate::auth::Session;
use crate::{saml_status, take_flash, xml_response, AppState, FlashView};

const CONFIG_PAGE: &str = "/admin/saml-config";

struct CertView {
    subject: String,
    issuer: String,
    serial: String,
    not_after: String,
    fingerprint: String,
    expired: bool,
}

struct AttributeRow {
    key: &'static str,
    claim: String,
}

#[derive(Template)]
#[template(path = "admin_saml_config.html")]
struct ConfigTemplate {
    instance_name: String,
    config_path: String,
    config_text: String,
    config_error: Option<String>,
    saml_enabled: bool,
    saml_status: String,
    cert: Option<CertView>,
    cert_error: Option<String>,
    attributes: Vec<AttributeRow>,
    default_common_name: String,
    default_validity_days: u32,
    messages: Vec<FlashView>,
}

/// Document text to show in the editor, the parsed document, and the parse
/// error if any. A missing document shows as `{}`; an unparsable one keeps
/// its raw text so the operator can repair it.
fn editor_text(state: &AppState) -> (String, SpTrustConfig, Option<String>) {
    let text = match state.store.read_text() {
        Ok(text) => text,
        Err(_) => return ("{}".to_string(), SpTrustConfig::default(), None),
    };
    match state.store.load() {
        Ok(cfg) => (text, cfg, None),
        Err(e) => (text, SpTrustConfig::default(), Some(e.to_string())),
    }
}

/// GET /admin/saml-config
pub async fn config_page(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Html<String> {
    let (config_text, cfg, config_error) = editor_text(&state);

    let (cert, cert_error) = if cfg.cert.trim().is_empty() {
        (None, None)
    } else {
        match parse_certificate(&cfg.cert) {
            Ok(info) => (
                Some(CertView {
                    expired: info.is_expired_at(Utc::now()),
                    subject: info.subject,
                    issuer: info.issuer,
                    serial: info.serial,
                    not_after: info.not_after.format("%Y-%m-%d %H:%M UTC").to_string(),
                    fingerprint: info.fingerprint_sha256,
                }),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        }
    };

    let attributes = ProfileField::ALL
        .iter()
        .map(|field| AttributeRow {
            key: field.key(),
            claim: cfg.attributes.claim_for(*field).unwrap_or_default().to_string(),
        })
        .collect();

    let tmpl = ConfigTemplate {
        instance_name: state.config.tessera.instance_name.clone(),
        config_path: state.store.path().display().to_string(),
        config_text,
        config_error,
        saml_enabled: state.registry.is_enabled(),
        saml_status: saml_status(&state),
        cert,
        cert_error,
        attributes,
        default_common_name: state.config.saml.default_common_name.clone(),
        default_validity_days: state.config.saml.default_validity_days,
        messages: take_flash(&state, &session),
    };
    Html(tmpl.render().unwrap_or_default())
}

#[derive(Deserialize)]
pub struct ConfigForm {
    #[serde(rename = "configText")]
    pub config_text: String,
}

/// POST /admin/saml-config - Replace the whole document.
pub async fn config_save(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Form(form): Form<ConfigForm>,
) -> Response {
    let notifier = state.sessions.notifier(&session.token);
    match state.store.save_text(&form.config_text) {
        Ok(_) => {
            info!("SAML configuration replaced from the admin editor");
            notifier.success("SAML configuration updated successfully.");
            state.registry.reload_from(&state.store, &notifier);
        }
        Err(e) => {
            warn!(error = %e, "rejected SAML configuration edit");
            notifier.error(&format!("Failed to save SAML configuration: {e}"));
        }
    }
    Redirect::to(CONFIG_PAGE).into_response()
}

/// POST /admin/saml-config/attributes - Update only the claim mapping.
///
/// Form keys are the mapping keys (`email`, `firstName`, ...); a blank value
/// removes the mapping for that field.
pub async fn attributes_save(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let notifier = state.sessions.notifier(&session.token);
    let result = state.store.load_or_default().and_then(|mut cfg| {
        for field in ProfileField::ALL {
            if let Some(claim) = form.get(field.key()) {
                cfg.attributes
                    .set_claim(field, Some(claim.trim().to_string()));
            }
        }
        state.store.save(&cfg)
    });
    match result {
        Ok(()) => {
            notifier.success("SAML attribute mapping updated.");
            state.registry.reload_from(&state.store, &notifier);
        }
        Err(e) => {
            warn!(error = %e, "attribute mapping update failed");
            notifier.error(&format!("Failed to update attribute mapping: {e}"));
        }
    }
    Redirect::to(CONFIG_PAGE).into_response()
}

/// POST /admin/saml-config/cleanup - Drop duplicate certificate fields.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Response {
    let notifier = state.sessions.notifier(&session.token);
    match state.store.cleanup() {
        Ok(_) => {
            notifier.success("SAML configuration cleaned up.");
            state.registry.reload_from(&state.store, &notifier);
        }
        Err(e) => {
            warn!(error = %e, "SAML configuration cleanup failed");
            notifier.error(&format!("Failed to clean up SAML configuration: {e}"));
        }
    }
    Redirect::to(CONFIG_PAGE).into_response()
}

#[derive(Deserialize)]
pub struct GenerateCertForm {
    #[serde(rename = "commonName", default)]
    pub common_name: String,
    #[serde(rename = "validityDays", default)]
    pub validity_days: String,
}

/// POST /admin/saml-config/generate-cert - Issue and install a new certificate.
pub async fn generate_cert(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    Form(form): Form<GenerateCertForm>,
) -> Response {
    let notifier = state.sessions.notifier(&session.token);

    let validity_days = match form.validity_days.trim() {
        "" => None,
        days => match days.parse::<u32>() {
            Ok(days) => Some(days),
            Err(_) => {
                notifier.error(&format!(
                    "Failed to generate certificate: invalid validity days {days:?}"
                ));
                return Redirect::to(CONFIG_PAGE).into_response();
            }
        },
    };
    let request = IssueRequest {
        common_name: Some(form.common_name).filter(|cn| !cn.trim().is_empty()),
        validity_days,
    };

    // RSA key generation is CPU bound.
    let worker = state.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let buffer = NoticeBuffer::new();
        let result = worker.authority.issue_and_install(&request, &buffer);
        (result, buffer.drain())
    })
    .await;

    match outcome {
        Ok((result, notices)) => {
            if let Ok(issued) = result {
                info!(
                    common_name = %issued.subject_cn,
                    serial = %issued.serial,
                    "certificate installed from the admin console"
                );
            }
            for notice in notices {
                notifier.notify(notice);
            }
        }
        Err(e) => {
            error!(error = %e, "certificate issuance task failed");
            notifier.error(&format!("Failed to generate certificate: {e}"));
        }
    }
    Redirect::to(CONFIG_PAGE).into_response()
}

/// GET /admin/saml-metadata - Metadata with the encryption key and SLO service.
pub async fn extended_metadata(State(state): State<Arc<AppState>>) -> Response {
    let generated = state.store.load().and_then(|cfg| {
        state
            .metadata
            .generate_with(&cfg, MetadataOptions::extended(&cfg))
    });
    match generated {
        Ok(xml) => xml_response(xml),
        Err(e) => {
            warn!(error = %e, "failed to generate extended SP metadata");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to generate SAML metadata",
            )
                .into_response()
        }
    }
}
