//! Integration tests for turning posts into mail messages with attachments.

use chrono::DateTime;
use discourse_mbox_archiver::config::{AttachmentFailure, Config};
use discourse_mbox_archiver::discourse::models::ActiveUser;
use discourse_mbox_archiver::discourse::{Post, UserDirectory};
use discourse_mbox_archiver::mail::{AttachmentResolver, MailAssembler};
use discourse_mbox_archiver::ArchiveError;
use mail_parser::{MessageParser, MimeHeaders};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake image data";
const PDF_BYTES: &[u8] = b"%PDF-1.4 fake report";

fn directory() -> UserDirectory {
    UserDirectory::from_users(vec![
        ActiveUser {
            id: 1,
            username: Some("alice".to_string()),
            email: Some("alice@example.org".to_string()),
        },
        ActiveUser {
            id: 2,
            username: Some("bob".to_string()),
            email: Some("bob@example.org".to_string()),
        },
    ])
}

fn post(user_id: i64, raw: &str, links: &[&str]) -> Post {
    Post {
        user_id,
        raw: raw.to_string(),
        cooked: String::new(),
        created_at: DateTime::parse_from_rfc3339("2024-02-10T08:30:00+00:00").unwrap(),
        links: links.iter().map(ToString::to_string).collect(),
    }
}

async fn mount_uploads(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/uploads/default/original/1X/photo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(PNG_BYTES),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/uploads/short-url/abc123"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "application/pdf")
                .insert_header("Content-Disposition", "attachment; filename=\"report.pdf\"")
                .set_body_bytes(PDF_BYTES),
        )
        .mount(server)
        .await;
}

fn parse(raw: &[u8]) -> mail_parser::Message<'_> {
    MessageParser::default()
        .parse(raw)
        .expect("assembled message parses")
}

/// Decoded text body with line endings normalized to LF.
fn body_text(parsed: &mail_parser::Message<'_>) -> String {
    parsed
        .body_text(0)
        .expect("text part")
        .replace("\r\n", "\n")
        .trim_end()
        .to_string()
}

#[tokio::test]
async fn test_headers_and_sanitized_body() {
    let server = MockServer::start().await;
    let config = Config::for_testing(&server.uri());
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();
    let assembler = MailAssembler::new(&directory, &resolver, &config).unwrap();

    let body = "Hello list\n\n![screenshot](upload://abc.png)\nSee [the doc](https://docs.example.org).";
    let message = assembler
        .assemble("Welcome thread", &post(1, body, &[]), None)
        .await
        .unwrap();

    assert!(message.message_id.starts_with('<'));
    assert!(message.message_id.ends_with("@forum.example.com>"));
    assert_eq!(message.attachments, 0);

    let headers = message.message.headers();
    assert!(headers.get_raw("In-Reply-To").is_none());
    assert!(headers.get_raw("References").is_none());

    let raw = message.formatted();
    let parsed = parse(&raw);
    assert_eq!(parsed.subject(), Some("Welcome thread"));
    assert_eq!(
        parsed.from().and_then(|a| a.first()).and_then(|a| a.address()),
        Some("alice@example.org")
    );
    assert_eq!(
        parsed.to().and_then(|a| a.first()).and_then(|a| a.address()),
        Some("archive@lists.example.com")
    );
    assert_eq!(
        parsed.date().map(mail_parser::DateTime::to_timestamp),
        Some(message.date.timestamp())
    );

    assert_eq!(
        body_text(&parsed),
        "Hello list\n\n\nSee [the doc](https://docs.example.org)."
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reply_headers_point_at_previous_message() {
    let server = MockServer::start().await;
    let config = Config::for_testing(&server.uri());
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();
    let assembler = MailAssembler::new(&directory, &resolver, &config).unwrap();

    let first = assembler
        .assemble("Thread", &post(1, "first", &[]), None)
        .await
        .unwrap();
    let second = assembler
        .assemble("Thread", &post(2, "second", &[]), Some(&first.message_id))
        .await
        .unwrap();

    assert_ne!(first.message_id, second.message_id);
    let headers = second.message.headers();
    assert_eq!(headers.get_raw("In-Reply-To"), Some(first.message_id.as_str()));
    assert_eq!(headers.get_raw("References"), Some(first.message_id.as_str()));

    let raw = second.formatted();
    let parsed = parse(&raw);
    let bare_id = first.message_id.trim_matches(|c| c == '<' || c == '>');
    assert_eq!(parsed.in_reply_to().as_text(), Some(bare_id));
}

#[tokio::test]
async fn test_attachments_follow_link_order() {
    let server = MockServer::start().await;
    mount_uploads(&server).await;

    let config = Config::for_testing(&server.uri());
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();
    let assembler = MailAssembler::new(&directory, &resolver, &config).unwrap();

    let links = [
        "/uploads/short-url/abc123",
        "/uploads/default/original/1X/photo.png",
    ];
    let message = assembler
        .assemble("Files", &post(2, "two files", &links), None)
        .await
        .unwrap();
    assert_eq!(message.attachments, 2);
    assert_eq!(message.skipped_attachments, 0);

    let raw = message.formatted();
    let parsed = parse(&raw);
    let attachments: Vec<_> = parsed.attachments().collect();
    assert_eq!(attachments.len(), 2);

    let report = attachments[0];
    assert_eq!(report.attachment_name(), Some("report.pdf"));
    let report_type = report.content_type().expect("content type");
    assert_eq!(report_type.ctype(), "application");
    assert_eq!(report_type.subtype(), Some("pdf"));
    assert_eq!(report.contents(), PDF_BYTES);

    let photo = attachments[1];
    assert_eq!(photo.attachment_name(), Some("photo.png"));
    let photo_type = photo.content_type().expect("content type");
    assert_eq!(photo_type.ctype(), "image");
    assert_eq!(photo_type.subtype(), Some("png"));
    assert_eq!(photo.contents(), PNG_BYTES);

    assert_eq!(body_text(&parsed), "two files");
}

#[tokio::test]
async fn test_unknown_user_fails_before_fetching() {
    let server = MockServer::start().await;
    mount_uploads(&server).await;

    let config = Config::for_testing(&server.uri());
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();
    let assembler = MailAssembler::new(&directory, &resolver, &config).unwrap();

    let result = assembler
        .assemble(
            "Thread",
            &post(99, "who am I", &["/uploads/default/original/1X/photo.png"]),
            None,
        )
        .await;

    assert!(matches!(result, Err(ArchiveError::UnknownUser(99))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_attachment_is_skipped_by_default() {
    let server = MockServer::start().await;
    mount_uploads(&server).await;
    Mock::given(method("GET"))
        .and(path("/uploads/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = Config::for_testing(&server.uri());
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();
    let assembler = MailAssembler::new(&directory, &resolver, &config).unwrap();

    let links = ["/uploads/gone.png", "/uploads/default/original/1X/photo.png"];
    let message = assembler
        .assemble("Thread", &post(1, "body", &links), None)
        .await
        .unwrap();

    assert_eq!(message.attachments, 1);
    assert_eq!(message.skipped_attachments, 1);
    let raw = message.formatted();
    let parsed = parse(&raw);
    let names: Vec<_> = parsed
        .attachments()
        .filter_map(|part| part.attachment_name().map(ToString::to_string))
        .collect();
    assert_eq!(names, vec!["photo.png"]);
}

#[tokio::test]
async fn test_missing_attachment_aborts_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/uploads/gone.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut config = Config::for_testing(&server.uri());
    config.attachment_failure = AttachmentFailure::Abort;
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();
    let assembler = MailAssembler::new(&directory, &resolver, &config).unwrap();

    let result = assembler
        .assemble("Thread", &post(1, "body", &["/uploads/gone.png"]), None)
        .await;

    assert!(matches!(result, Err(ArchiveError::AttachmentFetch { .. })));
}

#[tokio::test]
async fn test_invalid_list_address_is_rejected() {
    let mut config = Config::for_testing("https://forum.example.com");
    config.list_name = "not a mailbox".to_string();
    let directory = directory();
    let resolver = AttachmentResolver::new(&config).unwrap();

    let result = MailAssembler::new(&directory, &resolver, &config);
    assert!(matches!(result, Err(ArchiveError::InvalidAddress { .. })));
}
