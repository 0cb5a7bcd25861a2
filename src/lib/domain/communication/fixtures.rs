//! Test data shared by the backend tests.
//! Names and addresses are random and hopefully don't belong to anyone.

use super::email::{Address, Attachment, Email, Recipient, TemplateContext};

pub(crate) const ATTACHMENT_CONTENT: &[u8] = b"# ego\n\nbinary safe: \x00\xff\xfe\n";

pub(crate) fn test_recipients() -> Vec<Recipient> {
    [
        ("Sandy Schulist", "zane@anastacio.co.uk", "Sandy"),
        ("Rocio Christiansen", "retta.ankunding@fletcher.biz", "Rocio"),
        ("Abigale Gleason", "freida@orpha.info", "Abigale"),
        ("Garland Spencer", "corrine@remington.io", "Garland"),
        ("Tad Will", "ludwig@paula.co.uk", "Tad"),
        ("Chad Ritchie", "kathryne_ankunding@uriel.biz", "Chad"),
        ("Junius Boehm", "baylee.fadel@ellis.info", "Junius"),
    ]
    .into_iter()
    .map(|(name, address, first_name)| Recipient {
        address: Address::new(name, address),
        template_context: TemplateContext::from([("name".to_string(), first_name.to_string())]),
    })
    .collect()
}

pub(crate) fn test_email() -> Email {
    let mut email = Email::new(Address::new("Nyasia Block", "jade@austen.name"));

    email.to = test_recipients();
    email.reply_to = Some(Address::new("Erin Dare", "otilia@hermina.io"));
    email.subject = "Test Subject".to_string();
    email.html_body = "<h1>Test Body</h1>".to_string();
    email.text_body = "Test Body".to_string();
    email.tags = vec![
        "really".to_string(),
        "important".to_string(),
        "message".to_string(),
    ];

    email
}

pub(crate) fn test_attachment() -> Attachment {
    Attachment::from_bytes("test-file.txt", "text/plain", ATTACHMENT_CONTENT)
}
