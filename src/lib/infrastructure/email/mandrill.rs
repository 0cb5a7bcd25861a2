//! Mandrill backend
//!
//! API docs: <https://mailchimp.com/developer/transactional/api/messages/>

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::communication::{
    backend::{Backend, BackendError, ProviderError, TranslationError},
    email::{Email, Recipient, TemplateContext},
    transport::{HttpTransport, JSON_CONTENT_TYPE},
};

use super::{deliver, format_delivery_time, merge_headers, read_attachment, ErrorBody};

const NAME: &str = "mandrill";

const RESERVED_HEADERS: &[&str] = &["subject", "from", "reply-to", "to", "cc", "bcc"];

/// Mandrill's public API root
pub const DEFAULT_API_URL: &str = "https://mandrillapp.com/api/1.0";

/// Mandrill configuration
#[derive(Clone, Parser)]
pub struct MandrillConfig {
    /// The Mandrill API key
    #[clap(long = "mandrill-api-key", env = "MANDRILL_API_KEY")]
    pub api_key: String,

    /// The Mandrill API root
    #[clap(long = "mandrill-api-url", env = "MANDRILL_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl MandrillConfig {
    /// Configuration for the public API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl fmt::Debug for MandrillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MandrillConfig")
            .field("api_key", &"********")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Mandrill backend
#[derive(Debug, Clone)]
pub struct MandrillBackend<T> {
    config: MandrillConfig,
    transport: Arc<T>,
}

impl<T: HttpTransport> MandrillBackend<T> {
    /// Create a new Mandrill backend
    pub fn new(config: MandrillConfig, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    /// Mandrill serves templated sends from a separate endpoint
    fn endpoint(&self, email: &Email) -> String {
        let method = if email.template_id.is_some() {
            "send-template"
        } else {
            "send"
        };

        format!(
            "{}/messages/{}.json",
            self.config.api_url.trim_end_matches('/'),
            method
        )
    }

    fn request_for_email(&self, email: &mut Email) -> Result<MandrillRequest, TranslationError> {
        let mut attachments = Vec::with_capacity(email.attachments.len());

        for attachment in email.attachments.iter_mut() {
            let data = read_attachment(attachment)?;

            attachments.push(MandrillAttachment {
                kind: attachment.mimetype.clone(),
                name: attachment.name.clone(),
                content: STANDARD.encode(data),
            });
        }

        let mut headers = BTreeMap::new();

        if let Some(reply_to) = &email.reply_to {
            headers.insert("Reply-To".to_string(), reply_to.address.clone());
        }

        merge_headers(&mut headers, &email.headers, RESERVED_HEADERS);

        let to = recipients(&email.to, RecipientType::To)
            .chain(recipients(&email.cc, RecipientType::Cc))
            .chain(recipients(&email.bcc, RecipientType::Bcc))
            .collect();

        let (global_merge_vars, merge_vars) = match email.template_id {
            Some(_) => (
                Some(template_vars(&email.template_context)),
                Some(recipient_vars(&email.to)),
            ),
            None => (None, None),
        };

        let message = MandrillMessage {
            to,
            attachments,
            html: email.html_body.clone(),
            text: email.text_body.clone(),
            subject: email.subject.clone(),
            from_email: email.from.address.clone(),
            from_name: email.from.name.clone(),
            track_opens: email.track_opens,
            track_clicks: email.track_clicks,
            tags: email.tags.clone(),
            subaccount: email.sub_account.clone(),
            preserve_recipients: email.visible_recipients,
            headers,
            global_merge_vars,
            merge_vars,
        };

        Ok(MandrillRequest {
            key: self.config.api_key.clone(),
            message,
            template_name: email.template_id.clone(),
            // required by send-template, the template's editable regions are not used
            template_content: email.template_id.as_ref().map(|_| Vec::new()),
            send_at: email.delivery_time.as_ref().map(format_delivery_time),
        })
    }
}

#[async_trait]
impl<T: HttpTransport> Backend for MandrillBackend<T> {
    async fn send(&self, email: &mut Email) -> Result<(), BackendError> {
        let request = self.request_for_email(email)?;
        let body = serde_json::to_vec(&request)?;
        let url = self.endpoint(email);

        debug!(
            provider = NAME,
            recipients = request.message.to.len(),
            template = ?email.template_id,
            "dispatching email"
        );

        deliver::<MandrillError, _>(self.transport.as_ref(), NAME, &url, JSON_CONTENT_TYPE, body)
            .await
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

fn recipients(
    recipients: &[Recipient],
    kind: RecipientType,
) -> impl Iterator<Item = MandrillRecipient> + '_ {
    recipients.iter().map(move |recipient| MandrillRecipient {
        email: recipient.address.address.clone(),
        name: recipient.address.name.clone(),
        kind,
    })
}

fn template_vars(context: &TemplateContext) -> Vec<MandrillMergeVar> {
    context
        .iter()
        .map(|(name, content)| MandrillMergeVar {
            name: name.clone(),
            content: content.clone(),
        })
        .collect()
}

fn recipient_vars(recipients: &[Recipient]) -> Vec<MandrillRecipientVars> {
    recipients
        .iter()
        .filter(|recipient| !recipient.template_context.is_empty())
        .map(|recipient| MandrillRecipientVars {
            rcpt: recipient.address.address.clone(),
            vars: template_vars(&recipient.template_context),
        })
        .collect()
}

/// The body posted to Mandrill
#[derive(Debug, Serialize)]
struct MandrillRequest {
    key: String,
    message: MandrillMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template_content: Option<Vec<MandrillMergeVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    send_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct MandrillMessage {
    to: Vec<MandrillRecipient>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<MandrillAttachment>,
    #[serde(skip_serializing_if = "String::is_empty")]
    html: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    text: String,
    subject: String,
    from_email: String,
    from_name: String,
    track_opens: bool,
    track_clicks: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subaccount: Option<String>,
    preserve_recipients: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    global_merge_vars: Option<Vec<MandrillMergeVar>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    merge_vars: Option<Vec<MandrillRecipientVars>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum RecipientType {
    To,
    Cc,
    Bcc,
}

#[derive(Debug, Serialize)]
struct MandrillRecipient {
    email: String,
    name: String,
    #[serde(rename = "type")]
    kind: RecipientType,
}

#[derive(Debug, Serialize)]
struct MandrillAttachment {
    /// MIME type
    #[serde(rename = "type")]
    kind: String,
    name: String,
    /// Base64 encoded content
    content: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct MandrillMergeVar {
    name: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct MandrillRecipientVars {
    rcpt: String,
    vars: Vec<MandrillMergeVar>,
}

/// Error payload, e.g. `{"status":"error","code":-1,"name":"Invalid_Key","message":"Invalid API key"}`
#[derive(Debug, Deserialize)]
struct MandrillError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    message: String,
}

impl ErrorBody for MandrillError {
    fn into_provider_error(self, provider: &'static str, http_status: u16) -> ProviderError {
        ProviderError {
            provider,
            http_status,
            status: self.status,
            code: self.code.map(|code| code.to_string()),
            name: self.name,
            message: self.message,
        }
    }
}
