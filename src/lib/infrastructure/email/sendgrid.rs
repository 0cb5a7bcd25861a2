//! SendGrid backend, v2 Web API
//!
//! API docs: <https://sendgrid.com/docs/API_Reference/Web_API/mail.html>

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::form_urlencoded::byte_serialize;

use crate::domain::communication::{
    backend::{Backend, BackendError, ProviderError, TranslationError},
    email::Email,
    transport::{HttpTransport, FORM_CONTENT_TYPE},
};

use super::{deliver, merge_headers, read_attachment, ErrorBody};

const NAME: &str = "sendgrid";

/// The only template variable SendGrid accepts
const TEMPLATE_BODY_VARIABLE: &str = "body";

/// Headers SendGrid sets from dedicated fields
const RESERVED_HEADERS: &[&str] = &["subject", "from", "reply-to", "to", "cc", "bcc"];

/// SendGrid's public API root
pub const DEFAULT_API_URL: &str = "https://sendgrid.com";

/// SendGrid configuration
#[derive(Clone, Parser)]
pub struct SendGridConfig {
    /// The SendGrid API user
    #[clap(long = "sendgrid-username", env = "SENDGRID_USERNAME")]
    pub username: String,

    /// The SendGrid API key or password
    #[clap(long = "sendgrid-password", env = "SENDGRID_PASSWORD")]
    pub password: String,

    /// The SendGrid API root
    #[clap(long = "sendgrid-api-url", env = "SENDGRID_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl SendGridConfig {
    /// Configuration for the public API
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl fmt::Debug for SendGridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendGridConfig")
            .field("username", &self.username)
            .field("password", &"********")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// SendGrid backend
#[derive(Debug, Clone)]
pub struct SendGridBackend<T> {
    config: SendGridConfig,
    transport: Arc<T>,
}

impl<T: HttpTransport> SendGridBackend<T> {
    /// Create a new SendGrid backend
    pub fn new(config: SendGridConfig, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/mail.send.json",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn params_for_email(&self, email: &mut Email) -> Result<FormParams, BackendError> {
        let mut params = FormParams::default();

        params.set("api_user", self.config.username.as_str());
        params.set("api_key", self.config.password.as_str());

        params.set("subject", email.subject.as_str());
        params.set("text", email.text_body.as_str());
        params.set("html", email.html_body.as_str());
        params.set("from", email.from.address.as_str());
        params.set("fromname", email.from.name.as_str());

        if let Some(reply_to) = &email.reply_to {
            params.set("replyto", reply_to.address.as_str());
        }

        for to in &email.to {
            params.add("to[]", to.address.address.as_str());
            params.add("toname[]", to.address.name.as_str());
        }

        for cc in &email.cc {
            params.add("cc[]", cc.address.address.as_str());
        }

        for bcc in &email.bcc {
            params.add("bcc[]", bcc.address.address.as_str());
        }

        for attachment in email.attachments.iter_mut() {
            let data = read_attachment(attachment)?;
            let key = format!("files[{}]", attachment.name);

            if params.contains(&key) {
                warn!(
                    provider = NAME,
                    attachment = %attachment.name,
                    "duplicate attachment name, keeping the last one"
                );
            }

            params.set(key, data);
        }

        let mut headers = BTreeMap::new();
        merge_headers(&mut headers, &email.headers, RESERVED_HEADERS);

        if !headers.is_empty() {
            params.set("headers", serde_json::to_vec(&headers)?);
        }

        let mut smtp_api = XSmtpApi {
            category: email.tags.clone(),
            filters: None,
        };

        if let Some(template_id) = &email.template_id {
            let body = match email.template_context.get(TEMPLATE_BODY_VARIABLE) {
                Some(body) if email.template_context.len() == 1 => body,
                _ => {
                    return Err(TranslationError::TemplateContext {
                        provider: NAME,
                        reason: format!(
                            "template context can only contain one variable '{TEMPLATE_BODY_VARIABLE}'"
                        ),
                    }
                    .into())
                }
            };

            params.set(TEMPLATE_BODY_VARIABLE, body.as_str());
            smtp_api.filters = Some(Filters::template(template_id));
        }

        if email.delivery_time.is_some() {
            warn!(provider = NAME, "scheduled delivery is not supported, sending now");
        }

        params.set("x-smtpapi", serde_json::to_vec(&smtp_api)?);

        Ok(params)
    }
}

#[async_trait]
impl<T: HttpTransport> Backend for SendGridBackend<T> {
    async fn send(&self, email: &mut Email) -> Result<(), BackendError> {
        let params = self.params_for_email(email)?;

        debug!(
            provider = NAME,
            recipients = email.to.len(),
            template = ?email.template_id,
            "dispatching email"
        );

        deliver::<SendGridError, _>(
            self.transport.as_ref(),
            NAME,
            &self.endpoint(),
            FORM_CONTENT_TYPE,
            params.encode().into_bytes(),
        )
        .await
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// Ordered form fields, repeated keys allowed.
/// Values are raw bytes so attachment content survives untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct FormParams(Vec<(String, Vec<u8>)>);

impl FormParams {
    /// Replaces every value of `key`
    fn set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        let key = key.into();
        self.0.retain(|(k, _)| *k != key);
        self.0.push((key, value.into()));
    }

    fn add(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.0.push((key.into(), value.into()));
    }

    fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    #[cfg(test)]
    fn get(&self, key: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    #[cfg(test)]
    fn get_all(&self, key: &str) -> Vec<&[u8]> {
        self.0
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
            .collect()
    }

    fn encode(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    byte_serialize(k.as_bytes()).collect::<String>(),
                    byte_serialize(v).collect::<String>()
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// The `x-smtpapi` side channel, JSON encoded into a single form field
#[derive(Debug, Serialize)]
struct XSmtpApi {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    category: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<Filters>,
}

#[derive(Debug, Serialize)]
struct Filters {
    templates: TemplateFilter,
}

impl Filters {
    fn template(template_id: &str) -> Self {
        Self {
            templates: TemplateFilter {
                settings: TemplateSettings {
                    enabled: 1,
                    template_id: template_id.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct TemplateFilter {
    settings: TemplateSettings,
}

#[derive(Debug, Serialize)]
struct TemplateSettings {
    enabled: u8,
    template_id: String,
}

/// Error payload, e.g. `{"message":"error","errors":["Bad username / password"]}`
#[derive(Debug, Deserialize)]
struct SendGridError {
    #[serde(default)]
    status: Option<String>,
    message: String,
    #[serde(default)]
    errors: Vec<String>,
}

impl ErrorBody for SendGridError {
    fn into_provider_error(self, provider: &'static str, http_status: u16) -> ProviderError {
        let (status, message) = if self.errors.is_empty() {
            (
                self.status.unwrap_or_else(|| "error".to_string()),
                self.message,
            )
        } else {
            (self.message, self.errors.join("; "))
        };

        ProviderError {
            provider,
            http_status,
            status,
            code: None,
            name: None,
            message,
        }
    }
}
