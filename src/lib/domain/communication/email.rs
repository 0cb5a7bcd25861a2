//! Provider-neutral email message

use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{self, Cursor, Read},
    path::Path,
};

use chrono::{DateTime, Utc};

mod address;

pub use address::{Address, AddressError};

/// Template substitution variables, keyed by variable name
pub type TemplateContext = BTreeMap<String, String>;

/// A single transactional email, ready to be handed to a
/// [`Backend`](crate::domain::communication::backend::Backend).
#[derive(Debug)]
pub struct Email {
    /// Primary recipients
    pub to: Vec<Recipient>,

    /// Carbon copy recipients
    pub cc: Vec<Recipient>,

    /// Blind carbon copy recipients
    pub bcc: Vec<Recipient>,

    /// The sender
    pub from: Address,

    /// Where replies should go, if not to the sender
    pub reply_to: Option<Address>,

    /// The subject line
    pub subject: String,

    /// The HTML body
    pub html_body: String,

    /// The plain text body
    pub text_body: String,

    /// Files attached to the email
    pub attachments: Vec<Attachment>,

    /// Free-form tags used by providers to group emails for analytics
    pub tags: Vec<String>,

    /// Identifier of a template hosted by the provider
    pub template_id: Option<String>,

    /// Variables shared by every recipient when rendering the template
    pub template_context: TemplateContext,

    /// Sender-side user identifier for per-user volume tracking
    pub sub_account: Option<String>,

    /// Ask the provider to rewrite links for click tracking
    pub track_clicks: bool,

    /// Ask the provider to embed an open tracking pixel
    pub track_opens: bool,

    /// Scheduled delivery time, `None` sends immediately
    pub delivery_time: Option<DateTime<Utc>>,

    /// Whether recipients can see each other. This should almost always be `false`.
    pub visible_recipients: bool,

    /// Custom headers, merged by backends alongside the headers they set themselves
    pub headers: BTreeMap<String, String>,
}

impl Email {
    /// Creates an empty email sent by `from`, with click and open tracking enabled
    pub fn new(from: Address) -> Self {
        Self {
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            from,
            reply_to: None,
            subject: String::new(),
            html_body: String::new(),
            text_body: String::new(),
            attachments: Vec::new(),
            tags: Vec::new(),
            template_id: None,
            template_context: TemplateContext::new(),
            sub_account: None,
            track_clicks: true,
            track_opens: true,
            delivery_time: None,
            visible_recipients: false,
            headers: BTreeMap::new(),
        }
    }

    /// Appends an attachment read from `data` when the email is sent
    pub fn add_attachment(
        &mut self,
        name: impl Into<String>,
        mimetype: impl Into<String>,
        data: impl Read + Send + 'static,
    ) {
        self.attachments.push(Attachment::new(name, mimetype, data));
    }

    /// Appends a primary recipient with its own template variables
    pub fn add_recipient(
        &mut self,
        name: impl Into<String>,
        address: impl Into<String>,
        template_context: TemplateContext,
    ) {
        self.to.push(Recipient {
            address: Address::new(name, address),
            template_context,
        });
    }

    /// Appends a carbon copy recipient
    pub fn add_cc(&mut self, name: impl Into<String>, address: impl Into<String>) {
        self.cc.push(Recipient::new(Address::new(name, address)));
    }

    /// Appends a blind carbon copy recipient
    pub fn add_bcc(&mut self, name: impl Into<String>, address: impl Into<String>) {
        self.bcc.push(Recipient::new(Address::new(name, address)));
    }

    /// Appends a tag
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    /// Sets a custom header, replacing any previous value for the same name
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }
}

/// A recipient and the template variables that only apply to them
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recipient {
    /// The recipient's address
    pub address: Address,

    /// Per-recipient template variables
    pub template_context: TemplateContext,
}

impl Recipient {
    /// Creates a recipient without template variables
    pub fn new(address: Address) -> Self {
        Self {
            address,
            template_context: TemplateContext::new(),
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.address.fmt(f)
    }
}

/// A file attached to an email.
///
/// `data` is consumed by the backend while the request is built and is
/// not rewound afterwards. To send the same email twice, supply a fresh
/// source for every attempt.
pub struct Attachment {
    /// File name shown to the recipient
    pub name: String,

    /// MIME type of the content
    pub mimetype: String,

    /// Content source, read to the end once per send
    pub data: Box<dyn Read + Send>,
}

impl Attachment {
    /// Creates an attachment backed by any reader
    pub fn new(
        name: impl Into<String>,
        mimetype: impl Into<String>,
        data: impl Read + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            mimetype: mimetype.into(),
            data: Box::new(data),
        }
    }

    /// Creates an attachment from in-memory content
    pub fn from_bytes(
        name: impl Into<String>,
        mimetype: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(name, mimetype, Cursor::new(bytes.into()))
    }

    /// Opens `path` and attaches it under its file name
    pub fn from_path(path: impl AsRef<Path>, mimetype: impl Into<String>) -> io::Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;

        Ok(Self::new(name, mimetype, File::open(path)?))
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("mimetype", &self.mimetype)
            .finish_non_exhaustive()
    }
}
