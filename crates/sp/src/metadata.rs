//! SP metadata (`EntityDescriptor`) generation.
//!
//! [`XmlWriterBuilder`] is the primary builder; [`TemplateBuilder`] is a
//! hand-written template used when the primary one is absent or fails. Both
//! are deterministic, so unchanged input gives byte-identical output.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tessera_core::error::{Result, TesseraError};
use tessera_core::models::trust::SpTrustConfig;
use tessera_core::pem::certificate_body;
use tracing::warn;

use crate::saml::BINDING_HTTP_POST;

pub const NS_METADATA: &str = "urn:oasis:names:tc:SAML:2.0:metadata";
pub const NS_DSIG: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const PROTOCOL_SAML2: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// Optional parts of the descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOptions {
    /// Publish the certificate a second time with `use="encryption"`.
    pub include_encryption_key: bool,
    /// Location of an HTTP-POST `SingleLogoutService`.
    pub single_logout_url: Option<String>,
}

impl MetadataOptions {
    /// Options for the admin view: encryption key plus SLO at `<callbackUrl>/slo`.
    pub fn extended(cfg: &SpTrustConfig) -> Self {
        Self {
            include_encryption_key: true,
            single_logout_url: Some(format!("{}/slo", cfg.callback_url.trim_end_matches('/'))),
        }
    }
}

/// Everything a builder needs, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpDescriptor {
    pub entity_id: String,
    pub acs_url: String,
    /// Certificate base64 body without delimiters or line breaks.
    pub cert_body: String,
    pub options: MetadataOptions,
}

impl SpDescriptor {
    /// Fails with [`TesseraError::MetadataNotConfigured`] when `cert` or
    /// `callbackUrl` is blank.
    pub fn from_config(cfg: &SpTrustConfig, options: MetadataOptions) -> Result<Self> {
        let cert_body = certificate_body(&cfg.cert);
        let acs_url = cfg.callback_url.trim();
        if cert_body.is_empty() || acs_url.is_empty() {
            return Err(TesseraError::MetadataNotConfigured);
        }
        Ok(Self {
            entity_id: cfg.entity_id().trim().to_string(),
            acs_url: acs_url.to_string(),
            cert_body,
            options,
        })
    }
}

pub trait MetadataBuilder: Send + Sync {
    fn name(&self) -> &'static str;
    fn build(&self, sp: &SpDescriptor) -> Result<String>;
}

/// Streams the document through `quick_xml::Writer`, which escapes attribute
/// values and text itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlWriterBuilder;

impl XmlWriterBuilder {
    fn key_descriptor(writer: &mut Writer<Vec<u8>>, usage: &str, cert_body: &str) -> Result<()> {
        emit(writer, Event::Start(BytesStart::new("md:KeyDescriptor").with_attributes([("use", usage)])))?;
        emit(writer, Event::Start(BytesStart::new("ds:KeyInfo").with_attributes([("xmlns:ds", NS_DSIG)])))?;
        emit(writer, Event::Start(BytesStart::new("ds:X509Data")))?;
        emit(writer, Event::Start(BytesStart::new("ds:X509Certificate")))?;
        emit(writer, Event::Text(BytesText::new(cert_body)))?;
        emit(writer, Event::End(BytesEnd::new("ds:X509Certificate")))?;
        emit(writer, Event::End(BytesEnd::new("ds:X509Data")))?;
        emit(writer, Event::End(BytesEnd::new("ds:KeyInfo")))?;
        emit(writer, Event::End(BytesEnd::new("md:KeyDescriptor")))
    }
}

impl MetadataBuilder for XmlWriterBuilder {
    fn name(&self) -> &'static str {
        "quick-xml"
    }

    fn build(&self, sp: &SpDescriptor) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        emit(
            &mut writer,
            Event::Start(BytesStart::new("md:EntityDescriptor").with_attributes([
                ("xmlns:md", NS_METADATA),
                ("entityID", sp.entity_id.as_str()),
            ])),
        )?;
        emit(
            &mut writer,
            Event::Start(BytesStart::new("md:SPSSODescriptor").with_attributes([
                ("AuthnRequestsSigned", "false"),
                ("WantAssertionsSigned", "true"),
                ("protocolSupportEnumeration", PROTOCOL_SAML2),
            ])),
        )?;

        Self::key_descriptor(&mut writer, "signing", &sp.cert_body)?;
        if sp.options.include_encryption_key {
            Self::key_descriptor(&mut writer, "encryption", &sp.cert_body)?;
        }
        if let Some(slo) = &sp.options.single_logout_url {
            emit(
                &mut writer,
                Event::Empty(BytesStart::new("md:SingleLogoutService").with_attributes([
                    ("Binding", BINDING_HTTP_POST),
                    ("Location", slo.as_str()),
                ])),
            )?;
        }
        emit(
            &mut writer,
            Event::Empty(BytesStart::new("md:AssertionConsumerService").with_attributes([
                ("Binding", BINDING_HTTP_POST),
                ("Location", sp.acs_url.as_str()),
                ("index", "1"),
            ])),
        )?;

        emit(&mut writer, Event::End(BytesEnd::new("md:SPSSODescriptor")))?;
        emit(&mut writer, Event::End(BytesEnd::new("md:EntityDescriptor")))?;

        String::from_utf8(writer.into_inner())
            .map_err(|e| TesseraError::Serialization(format!("metadata is not UTF-8: {e}")))
    }
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| TesseraError::Serialization(format!("failed to write metadata: {e}")))
}

/// Hand-built metadata with no XML library involved.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateBuilder;

impl MetadataBuilder for TemplateBuilder {
    fn name(&self) -> &'static str {
        "template"
    }

    fn build(&self, sp: &SpDescriptor) -> Result<String> {
        let cert = escape_xml(&sp.cert_body);
        let mut keys = key_descriptor_template("signing", &cert);
        if sp.options.include_encryption_key {
            keys.push_str(&key_descriptor_template("encryption", &cert));
        }
        let slo = sp
            .options
            .single_logout_url
            .as_deref()
            .map(|url| {
                format!(
                    "    <md:SingleLogoutService Binding=\"{BINDING_HTTP_POST}\" Location=\"{}\"/>\n",
                    escape_xml(url)
                )
            })
            .unwrap_or_default();

        Ok(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="{NS_METADATA}" entityID="{entity_id}">
  <md:SPSSODescriptor AuthnRequestsSigned="false" WantAssertionsSigned="true" protocolSupportEnumeration="{PROTOCOL_SAML2}">
{keys}{slo}    <md:AssertionConsumerService Binding="{BINDING_HTTP_POST}" Location="{acs}" index="1"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
            entity_id = escape_xml(&sp.entity_id),
            acs = escape_xml(&sp.acs_url),
        ))
    }
}

fn key_descriptor_template(usage: &str, cert: &str) -> String {
    format!(
        r#"    <md:KeyDescriptor use="{usage}">
      <ds:KeyInfo xmlns:ds="{NS_DSIG}">
        <ds:X509Data>
          <ds:X509Certificate>{cert}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>
"#
    )
}

/// Escape the five XML special characters.
pub fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders SP metadata from a configuration snapshot.
pub struct MetadataGenerator {
    primary: Option<Box<dyn MetadataBuilder>>,
    fallback: TemplateBuilder,
}

impl Default for MetadataGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataGenerator {
    pub fn new() -> Self {
        Self::with_primary(Some(Box::new(XmlWriterBuilder)))
    }

    /// `None` leaves only the template builder.
    pub fn with_primary(primary: Option<Box<dyn MetadataBuilder>>) -> Self {
        Self {
            primary,
            fallback: TemplateBuilder,
        }
    }

    pub fn generate(&self, cfg: &SpTrustConfig) -> Result<String> {
        self.generate_with(cfg, MetadataOptions::default())
    }

    pub fn generate_with(&self, cfg: &SpTrustConfig, options: MetadataOptions) -> Result<String> {
        let sp = SpDescriptor::from_config(cfg, options)?;
        if let Some(primary) = &self.primary {
            match primary.build(&sp) {
                Ok(xml) => return Ok(xml),
                Err(e) => warn!(
                    builder = primary.name(),
                    error = %e,
                    "metadata builder failed, using template"
                ),
            }
        }
        self.fallback.build(&sp)
    }
}
