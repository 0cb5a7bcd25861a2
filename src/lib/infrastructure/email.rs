//! Email delivery backends
//!
//! | Backend | Wire format | Templates |
//! |---------|-------------|-----------|
//! | [`MandrillBackend`] | JSON | global and per-recipient merge variables |
//! | [`SendGridBackend`] | form-encoded | a single `body` variable |
//! | [`PostageAppBackend`] | JSON | template name and flat variables |
//! | [`DummyBackend`] | none | logged only |

use std::{collections::BTreeMap, io::Read};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::domain::communication::{
    backend::{BackendError, ProviderError, TranslationError},
    email::Attachment,
    transport::HttpTransport,
};

pub mod dummy;
pub mod mandrill;
pub mod postageapp;
pub mod sendgrid;

pub use dummy::{DeliveryLog, DummyBackend, TracingLog};
pub use mandrill::{MandrillBackend, MandrillConfig};
pub use postageapp::{PostageAppBackend, PostageAppConfig};
pub use sendgrid::{SendGridBackend, SendGridConfig};

/// Layout of scheduled delivery timestamps, always rendered in UTC
pub const DELIVERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(crate) fn format_delivery_time(time: &DateTime<Utc>) -> String {
    time.format(DELIVERY_TIME_FORMAT).to_string()
}

/// Drains an attachment's data source
pub(crate) fn read_attachment(attachment: &mut Attachment) -> Result<Vec<u8>, TranslationError> {
    let mut data = Vec::new();

    attachment
        .data
        .read_to_end(&mut data)
        .map_err(|source| TranslationError::AttachmentRead {
            name: attachment.name.clone(),
            source,
        })?;

    Ok(data)
}

/// Copies `custom` headers into `headers`.
///
/// Names already present in `headers` or listed in `reserved` are skipped,
/// comparing case-insensitively.
pub(crate) fn merge_headers(
    headers: &mut BTreeMap<String, String>,
    custom: &BTreeMap<String, String>,
    reserved: &[&str],
) {
    for (name, value) in custom {
        let taken = reserved.iter().any(|r| r.eq_ignore_ascii_case(name))
            || headers.keys().any(|existing| existing.eq_ignore_ascii_case(name));

        if taken {
            warn!(header = %name, "dropping custom header that would overwrite a reserved one");
            continue;
        }

        headers.insert(name.clone(), value.clone());
    }
}

/// A provider's JSON error payload
pub(crate) trait ErrorBody: DeserializeOwned {
    fn into_provider_error(self, provider: &'static str, http_status: u16) -> ProviderError;
}

/// Posts `body` and decodes the provider's answer.
///
/// A 200 is a success; anything else is decoded as `E`.
pub(crate) async fn deliver<E, T>(
    transport: &T,
    provider: &'static str,
    url: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Result<(), BackendError>
where
    E: ErrorBody,
    T: HttpTransport + ?Sized,
{
    let response = transport
        .post(url, content_type, body)
        .await
        .map_err(|source| BackendError::Transport { provider, source })?;

    if response.status == 200 {
        debug!(provider, "email accepted");
        return Ok(());
    }

    let error = serde_json::from_slice::<E>(&response.body)
        .map_err(|source| BackendError::UndecodableErrorBody {
            provider,
            status: response.status,
            source,
        })?
        .into_provider_error(provider, response.status);

    warn!(provider, status = response.status, %error, "email rejected");

    Err(BackendError::Rejected(error))
}

#[cfg(test)]
mod tests {
    use std::io;

    use chrono::TimeZone;
    use serde::Deserialize;
    use testresult::TestResult;

    use super::*;
    use crate::domain::communication::transport::{tests::MockHttpTransport, HttpResponse};

    #[derive(Deserialize)]
    struct TestErrorBody {
        status: String,
        message: String,
    }

    impl ErrorBody for TestErrorBody {
        fn into_provider_error(self, provider: &'static str, http_status: u16) -> ProviderError {
            ProviderError {
                provider,
                http_status,
                status: self.status,
                code: None,
                name: None,
                message: self.message,
            }
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    fn transport_returning(status: u16, body: &'static str) -> MockHttpTransport {
        let mut transport = MockHttpTransport::new();

        transport
            .expect_post()
            .times(1)
            .returning(move |_, _, _| Ok(HttpResponse::new(status, body)));

        transport
    }

    #[test]
    fn test_format_delivery_time() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();

        assert_eq!(format_delivery_time(&time), "2024-03-09T07:05:01");
    }

    #[test]
    fn test_read_attachment_drains_source() -> TestResult {
        let mut attachment = Attachment::from_bytes("a.bin", "application/octet-stream", [1, 2, 3]);

        assert_eq!(read_attachment(&mut attachment)?, vec![1, 2, 3]);
        assert!(read_attachment(&mut attachment)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_read_attachment_failure_names_the_file() {
        let mut attachment = Attachment::new("broken.pdf", "application/pdf", FailingReader);

        let err = read_attachment(&mut attachment).unwrap_err();

        assert!(matches!(
            err,
            TranslationError::AttachmentRead { ref name, .. } if name == "broken.pdf"
        ));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_merge_headers_keeps_reserved_keys() {
        let mut headers = BTreeMap::from([("Reply-To".to_string(), "a@b.co".to_string())]);
        let custom = BTreeMap::from([
            ("reply-to".to_string(), "evil@b.co".to_string()),
            ("Subject".to_string(), "nope".to_string()),
            ("X-Campaign".to_string(), "spring".to_string()),
        ]);

        merge_headers(&mut headers, &custom, &["subject"]);

        assert_eq!(
            headers,
            BTreeMap::from([
                ("Reply-To".to_string(), "a@b.co".to_string()),
                ("X-Campaign".to_string(), "spring".to_string()),
            ])
        );
    }

    #[tokio::test]
    async fn test_deliver_success() -> TestResult {
        let transport = transport_returning(200, "");

        deliver::<TestErrorBody, _>(&transport, "test", "http://test", "text/plain", Vec::new())
            .await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_deliver_rejected() {
        let transport = transport_returning(500, r#"{"status":"error","message":"boom"}"#);

        let result =
            deliver::<TestErrorBody, _>(&transport, "test", "http://test", "text/plain", Vec::new())
                .await;

        match result {
            Err(BackendError::Rejected(err)) => {
                assert_eq!(err.http_status, 500);
                assert_eq!(err.to_string(), "error - boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deliver_undecodable_body() {
        let transport = transport_returning(500, "<html>Internal Server Error</html>");

        let result =
            deliver::<TestErrorBody, _>(&transport, "test", "http://test", "text/plain", Vec::new())
                .await;

        assert!(matches!(
            result,
            Err(BackendError::UndecodableErrorBody { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_deliver_transport_failure() {
        let mut transport = MockHttpTransport::new();

        transport
            .expect_post()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("connection refused")));

        let result =
            deliver::<TestErrorBody, _>(&transport, "test", "http://test", "text/plain", Vec::new())
                .await;

        assert!(matches!(
            result,
            Err(BackendError::Transport { provider: "test", .. })
        ));
    }
}
