//! Backend that never talks to the network.
//!
//! Optionally reports what it would have sent to a [`DeliveryLog`], one line per field.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use crate::domain::communication::{
    backend::{Backend, BackendError},
    email::Email,
};

use super::format_delivery_time;

const NAME: &str = "dummy";

/// Receives one formatted line per logged field
pub trait DeliveryLog: Send + Sync {
    /// Records a single line
    fn log(&self, args: fmt::Arguments<'_>);
}

impl<F> DeliveryLog for F
where
    F: Fn(fmt::Arguments<'_>) + Send + Sync,
{
    fn log(&self, args: fmt::Arguments<'_>) {
        self(args)
    }
}

/// Forwards lines to `tracing` at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl DeliveryLog for TracingLog {
    fn log(&self, args: fmt::Arguments<'_>) {
        info!(provider = NAME, "{args}");
    }
}

/// No-op backend
#[derive(Clone, Default)]
pub struct DummyBackend {
    sink: Option<Arc<dyn DeliveryLog>>,
}

impl DummyBackend {
    /// A backend that accepts everything and logs nothing
    pub fn silent() -> Self {
        Self { sink: None }
    }

    /// A backend reporting every send to `sink`
    pub fn new(sink: impl DeliveryLog + 'static) -> Self {
        Self {
            sink: Some(Arc::new(sink)),
        }
    }

    /// A backend reporting every send through [`TracingLog`]
    pub fn with_tracing() -> Self {
        Self::new(TracingLog)
    }

    fn report(sink: &dyn DeliveryLog, email: &Email) {
        let join = |items: Vec<String>| items.join(", ");

        sink.log(format_args!(
            "To: {}",
            join(email.to.iter().map(ToString::to_string).collect())
        ));
        sink.log(format_args!("From: {}", email.from));
        sink.log(format_args!("Subject: {}", email.subject));
        sink.log(format_args!("TrackClicks: {}", email.track_clicks));
        sink.log(format_args!("TrackOpens: {}", email.track_opens));
        sink.log(format_args!("VisibleRecipients: {}", email.visible_recipients));

        if !email.tags.is_empty() {
            sink.log(format_args!("Tags: {}", email.tags.join(", ")));
        }

        if let Some(template_id) = &email.template_id {
            sink.log(format_args!("TemplateId: {template_id}"));
            sink.log(format_args!(
                "TemplateContext: {}",
                join(
                    email
                        .template_context
                        .iter()
                        .map(|(key, value)| format!("{key}={value}"))
                        .collect()
                )
            ));
        }

        if let Some(sub_account) = &email.sub_account {
            sink.log(format_args!("SubAccount: {sub_account}"));
        }

        if let Some(delivery_time) = &email.delivery_time {
            sink.log(format_args!(
                "DeliveryTime: {}",
                format_delivery_time(delivery_time)
            ));
        }

        if !email.attachments.is_empty() {
            sink.log(format_args!(
                "Attachments: {}",
                join(email.attachments.iter().map(|a| a.name.clone()).collect())
            ));
        }

        sink.log(format_args!("TextBody: {}", email.text_body));
        sink.log(format_args!("HtmlBody: {}", email.html_body));
    }
}

impl fmt::Debug for DummyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DummyBackend")
            .field("logging", &self.sink.is_some())
            .finish()
    }
}

#[async_trait]
impl Backend for DummyBackend {
    async fn send(&self, email: &mut Email) -> Result<(), BackendError> {
        if let Some(sink) = &self.sink {
            Self::report(sink.as_ref(), email);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        NAME
    }
}
