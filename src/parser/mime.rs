//! MIME decoding: the HTML body and the inline images of one message.

use mail_parser::{MessageParser, MimeHeaders};
use tracing::debug;

use crate::parser::header::HeaderBlock;
use crate::parser::mbox::skip_from_line;

/// The parts of a message the normalizer cares about.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Decoded subject, `None` when the header is absent.
    pub subject: Option<String>,
    /// Raw `Date` header value.
    pub date: Option<String>,
    pub message_id: Option<String>,
    /// The HTML body, or an empty string when the message has none.
    pub html: String,
    /// Image parts found anywhere in the MIME tree, in tree order.
    pub images: Vec<InlineImage>,
}

/// A decoded `image/*` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub content_id: Option<String>,
    pub filename: Option<String>,
    /// Full MIME type, e.g. `image/png`.
    pub content_type: String,
}

/// Parse a raw message (with or without its `From ` line).
///
/// Never fails: a message `mail-parser` cannot make sense of still yields its
/// headers and whatever follows the first blank line as the body.
pub fn parse_message(raw_message: &[u8]) -> ParsedMessage {
    let message_bytes = skip_from_line(raw_message);
    let headers = HeaderBlock::parse(message_bytes);

    let mut parsed = ParsedMessage {
        subject: headers.subject(),
        date: headers.date(),
        message_id: headers.message_id(),
        ..Default::default()
    };

    match MessageParser::default().parse(message_bytes) {
        Some(msg) => {
            parsed.html = msg
                .body_html(0)
                .map(|s| s.into_owned())
                .unwrap_or_default();

            if msg.parts.len() > 1 {
                parsed.images = msg.parts.iter().filter_map(image_from_part).collect();
            }
        }
        None => {
            debug!("mail-parser rejected message, using raw body");
            parsed.html = extract_body_fallback(message_bytes);
        }
    }

    parsed
}

fn image_from_part(part: &mail_parser::MessagePart<'_>) -> Option<InlineImage> {
    let ct = part.content_type()?;
    if !ct.ctype().eq_ignore_ascii_case("image") {
        return None;
    }
    let bytes = part.contents();
    if bytes.is_empty() {
        return None;
    }

    let content_type = match ct.subtype() {
        Some(sub) => format!("image/{}", sub.to_ascii_lowercase()),
        None => "image/jpeg".to_string(),
    };

    Some(InlineImage {
        bytes: bytes.to_vec(),
        content_id: part.content_id().map(|id| id.trim_matches(['<', '>']).to_string()),
        filename: part.attachment_name().map(String::from),
        content_type,
    })
}

/// Everything after the first blank line.
fn extract_body_fallback(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    if let Some(pos) = text.find("\r\n\r\n") {
        text[pos + 4..].to_string()
    } else if let Some(pos) = text.find("\n\n") {
        text[pos + 2..].to_string()
    } else {
        String::new()
    }
}
