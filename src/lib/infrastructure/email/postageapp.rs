//! PostageApp backend
//!
//! API docs: <https://help.postageapp.com/kb/api/send_message>

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::communication::{
    backend::{Backend, BackendError, ProviderError, TranslationError},
    email::{Email, TemplateContext},
    transport::{HttpTransport, JSON_CONTENT_TYPE},
};

use super::{deliver, merge_headers, read_attachment, ErrorBody};

const NAME: &str = "postageapp";

/// PostageApp's public API root
pub const DEFAULT_API_URL: &str = "https://api.postageapp.com";

/// PostageApp configuration
#[derive(Clone, Parser)]
pub struct PostageAppConfig {
    /// The PostageApp project API key
    #[clap(long = "postageapp-api-key", env = "POSTAGEAPP_API_KEY")]
    pub api_key: String,

    /// The PostageApp API root
    #[clap(long = "postageapp-api-url", env = "POSTAGEAPP_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl PostageAppConfig {
    /// Configuration for the public API
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl fmt::Debug for PostageAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostageAppConfig")
            .field("api_key", &"********")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// PostageApp backend
#[derive(Debug, Clone)]
pub struct PostageAppBackend<T> {
    config: PostageAppConfig,
    transport: Arc<T>,
}

impl<T: HttpTransport> PostageAppBackend<T> {
    /// Create a new PostageApp backend
    pub fn new(config: PostageAppConfig, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v.1.0/send_message.json",
            self.config.api_url.trim_end_matches('/')
        )
    }

    fn wrapper_for_email(
        &self,
        email: &mut Email,
    ) -> Result<PostageAppWrapper, TranslationError> {
        let recipients = email
            .to
            .iter()
            .map(|to| (to.address.to_string(), to.template_context.clone()))
            .collect();

        let mut headers = BTreeMap::from([
            ("subject".to_string(), email.subject.clone()),
            ("from".to_string(), email.from.to_string()),
        ]);

        if let Some(reply_to) = &email.reply_to {
            headers.insert("reply-to".to_string(), reply_to.to_string());
        }

        merge_headers(&mut headers, &email.headers, &[]);

        let content = BTreeMap::from([
            ("text/plain", email.text_body.clone()),
            ("text/html", email.html_body.clone()),
        ]);

        let mut attachments = BTreeMap::new();

        for attachment in email.attachments.iter_mut() {
            let data = read_attachment(attachment)?;

            attachments.insert(
                attachment.name.clone(),
                PostageAppAttachment {
                    content_type: attachment.mimetype.clone(),
                    content: STANDARD.encode(data),
                },
            );
        }

        if !email.cc.is_empty() || !email.bcc.is_empty() {
            warn!(provider = NAME, "cc and bcc recipients are not supported, dropping them");
        }

        if email.delivery_time.is_some() {
            warn!(provider = NAME, "scheduled delivery is not supported, sending now");
        }

        let (template, variables) = match &email.template_id {
            Some(template_id) => (
                Some(template_id.clone()),
                Some(email.template_context.clone()),
            ),
            None => (None, None),
        };

        Ok(PostageAppWrapper {
            api_key: self.config.api_key.clone(),
            arguments: PostageAppArguments {
                recipients,
                headers,
                content,
                attachments,
                template,
                variables,
            },
        })
    }
}

#[async_trait]
impl<T: HttpTransport> Backend for PostageAppBackend<T> {
    async fn send(&self, email: &mut Email) -> Result<(), BackendError> {
        let wrapper = self.wrapper_for_email(email)?;
        let body = serde_json::to_vec(&wrapper)?;

        debug!(
            provider = NAME,
            recipients = wrapper.arguments.recipients.len(),
            template = ?email.template_id,
            "dispatching email"
        );

        deliver::<PostageAppErrorBody, _>(
            self.transport.as_ref(),
            NAME,
            &self.endpoint(),
            JSON_CONTENT_TYPE,
            body,
        )
        .await
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

#[derive(Debug, Serialize)]
struct PostageAppWrapper {
    api_key: String,
    arguments: PostageAppArguments,
}

#[derive(Debug, Serialize)]
struct PostageAppArguments {
    /// Recipient address to its template variables
    recipients: BTreeMap<String, TemplateContext>,
    headers: BTreeMap<String, String>,
    /// MIME type to body
    content: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attachments: BTreeMap<String, PostageAppAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<TemplateContext>,
}

#[derive(Debug, Serialize)]
struct PostageAppAttachment {
    content_type: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct PostageAppError {
    #[serde(default)]
    uid: Option<String>,
    status: String,
    #[serde(default)]
    message: String,
}

/// PostageApp nests its status under `response`; a bare object is accepted too
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PostageAppErrorBody {
    Wrapped { response: PostageAppError },
    Flat(PostageAppError),
}

impl ErrorBody for PostageAppErrorBody {
    fn into_provider_error(self, provider: &'static str, http_status: u16) -> ProviderError {
        let (Self::Wrapped { response: error } | Self::Flat(error)) = self;

        ProviderError {
            provider,
            http_status,
            status: error.status,
            code: error.uid,
            name: None,
            message: error.message,
        }
    }
}
