//! SAML 2.0 protocol messages exchanged with the IdP: the outgoing
//! AuthnRequest (HTTP-Redirect binding) and the incoming Response
//! (HTTP-POST binding).

use std::collections::BTreeMap;
use std::io::Write;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use tessera_core::error::{Result, TesseraError};
use uuid::Uuid;

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
pub const BINDING_HTTP_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
pub const BINDING_HTTP_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";
pub const NAMEID_UNSPECIFIED: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:unspecified";

/// Base64 SAMLResponse values larger than this are rejected before decoding.
const MAX_ENCODED_RESPONSE: usize = 512 * 1024;

/// An SP-initiated authentication request.
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    pub id: String,
    pub issue_instant: String,
    pub destination: String,
    pub acs_url: String,
    pub issuer: String,
}

impl AuthnRequest {
    pub fn new(destination: &str, acs_url: &str, issuer: &str) -> Self {
        Self {
            id: format!("_{}", Uuid::new_v4()),
            issue_instant: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            destination: destination.to_string(),
            acs_url: acs_url.to_string(),
            issuer: issuer.to_string(),
        }
    }

    pub fn to_xml(&self) -> String {
        format!(
            r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{instant}" Destination="{destination}" ProtocolBinding="{binding}" AssertionConsumerServiceURL="{acs}"><saml:Issuer>{issuer}</saml:Issuer><samlp:NameIDPolicy Format="{nameid}" AllowCreate="true"/></samlp:AuthnRequest>"#,
            id = escape(self.id.as_str()),
            instant = escape(self.issue_instant.as_str()),
            destination = escape(self.destination.as_str()),
            binding = BINDING_HTTP_POST,
            acs = escape(self.acs_url.as_str()),
            issuer = escape(self.issuer.as_str()),
            nameid = NAMEID_UNSPECIFIED,
        )
    }

    /// IdP URL carrying this request per the HTTP-Redirect binding:
    /// DEFLATE, then base64, then URL-encoded into `SAMLRequest`.
    pub fn redirect_url(&self, relay_state: Option<&str>) -> Result<String> {
        let encoded = BASE64.encode(deflate(self.to_xml().as_bytes())?);
        let separator = if self.destination.contains('?') { '&' } else { '?' };

        let mut url = format!(
            "{}{}SAMLRequest={}",
            self.destination,
            separator,
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state.filter(|rs| !rs.is_empty()) {
            url.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }
        Ok(url)
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| TesseraError::Saml(format!("deflate failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| TesseraError::Saml(format!("deflate failed: {e}")))
}

/// Identity asserted by the IdP in a successful Response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlProfile {
    pub name_id: String,
    pub name_id_format: Option<String>,
    pub issuer: Option<String>,
    pub session_index: Option<String>,
    /// Claim name to values, in document order per claim.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// The decoded Response document.
    pub raw_xml: String,
}

impl SamlProfile {
    /// First value of a claim.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Decode the base64 `SAMLResponse` form field of the HTTP-POST binding.
pub fn decode_post_response(encoded: &str) -> Result<String> {
    if encoded.len() > MAX_ENCODED_RESPONSE {
        return Err(TesseraError::Saml(format!(
            "SAMLResponse exceeds {MAX_ENCODED_RESPONSE} bytes"
        )));
    }
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| TesseraError::Saml(format!("SAMLResponse is not base64: {e}")))?;
    String::from_utf8(bytes).map_err(|e| TesseraError::Saml(format!("SAMLResponse is not UTF-8: {e}")))
}

/// Extract the asserted identity from a Response document.
///
/// The top-level status must be Success and a NameID must be present.
/// Signatures are not checked.
pub fn parse_response(xml: &str) -> Result<SamlProfile> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut saw_response = false;
    let mut status: Option<String> = None;
    let mut issuer: Option<String> = None;
    let mut name_id: Option<String> = None;
    let mut name_id_format: Option<String> = None;
    let mut session_index: Option<String> = None;
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let mut in_issuer = false;
    let mut in_name_id = false;
    let mut current_attribute: Option<String> = None;
    let mut in_value = false;
    let mut value_buf = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TesseraError::Saml(format!("Response is not well-formed XML: {e}")))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                // Self-closing elements have no text and no End event.
                let has_body = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"Response" => saw_response = true,
                    b"StatusCode" if status.is_none() => {
                        status = attribute_value(e, b"Value");
                    }
                    b"Issuer" if issuer.is_none() => in_issuer = has_body,
                    b"NameID" if name_id.is_none() => {
                        in_name_id = has_body;
                        name_id_format = attribute_value(e, b"Format");
                    }
                    b"AuthnStatement" if session_index.is_none() => {
                        session_index = attribute_value(e, b"SessionIndex");
                    }
                    b"Attribute" => {
                        let name = attribute_value(e, b"Name");
                        if let Some(name) = &name {
                            attributes.entry(name.clone()).or_default();
                        }
                        current_attribute = if has_body { name } else { None };
                    }
                    b"AttributeValue" if current_attribute.is_some() => {
                        in_value = has_body;
                        value_buf.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                let text = t
                    .unescape()
                    .map_err(|e| TesseraError::Saml(format!("bad text in Response: {e}")))?;
                if in_issuer {
                    issuer = Some(text.trim().to_string());
                } else if in_name_id {
                    name_id = Some(text.trim().to_string());
                } else if in_value {
                    value_buf.push_str(&text);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"Issuer" => in_issuer = false,
                b"NameID" => in_name_id = false,
                b"AttributeValue" => {
                    if in_value {
                        if let Some(name) = &current_attribute {
                            attributes
                                .entry(name.clone())
                                .or_default()
                                .push(value_buf.trim().to_string());
                        }
                    }
                    in_value = false;
                }
                b"Attribute" => current_attribute = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_response {
        return Err(TesseraError::Saml("document is not a SAML Response".into()));
    }
    match status.as_deref() {
        Some(STATUS_SUCCESS) => {}
        Some(other) => {
            return Err(TesseraError::Saml(format!("IdP returned status {other}")));
        }
        None => return Err(TesseraError::Saml("Response has no StatusCode".into())),
    }
    let name_id = name_id
        .filter(|n| !n.is_empty())
        .ok_or_else(|| TesseraError::Saml("Response has no NameID".into()))?;

    Ok(SamlProfile {
        name_id,
        name_id_format,
        issuer,
        session_index,
        attributes,
        raw_xml: xml.to_string(),
    })
}

fn attribute_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}
