//! HTML fragment cleanup for normalized message bodies.
//!
//! Mail clients wrap bodies in full documents full of styling clutter. The
//! cleaner keeps only what renders inside a card of the final page and points
//! every image at the local image store.

use std::collections::HashMap;
use std::sync::LazyLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::{Captures, Regex};
use tracing::warn;

use crate::error::{BookError, Result};
use crate::store::images::{ImageSource, ImageStore};

/// Elements removed together with their content.
static BLOCK_TAGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["style", "script", "title", "head"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("block tag regex")
        })
        .collect()
});

static VOID_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<(?:meta|link)\b[^>]*>").expect("void tag regex"));

static DOCUMENT_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<!doctype[^>]*>|</?html\b[^>]*>").expect("document tag regex")
});

static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)(?:</body\s*>|\z)").expect("body regex"));

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\b(?:"[^"]*"|'[^']*'|[^"'>])*>"#).expect("img regex")
});

static ANCHOR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\s[^>]*>").expect("anchor regex"));

/// One attribute of a tag; quoted values are consumed whole so text inside
/// them never starts a match.
static TAG_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+([^\s"'=<>/]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#)
        .expect("attribute regex")
});

static HREF_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\shref\s*=").expect("href regex"));

static TARGET_REL_ATTRS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(?:target|rel)\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("target regex")
});

/// Attributes every link in a normalized fragment carries.
const LINK_ATTRS: &str = r#" target="_blank" rel="noopener noreferrer""#;

/// Maps `cid:` ids and attachment file names to stored image paths.
pub type ImageRefs = HashMap<String, String>;

/// A cleaned body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub html: String,
    /// Data-URI images this call added to the store.
    pub images_written: usize,
}

/// Clean a message body into a self-contained fragment.
///
/// Data-URI images are decoded and written to `store`; `cid:` and bare
/// file-name references are resolved through `refs`. Unknown references are
/// left untouched.
pub fn clean_fragment(html: &str, refs: &ImageRefs, store: &ImageStore) -> Result<Fragment> {
    if html.trim().is_empty() {
        return Ok(Fragment::default());
    }

    let mut text = html.to_string();
    for re in BLOCK_TAGS.iter() {
        text = re.replace_all(&text, "").into_owned();
    }
    text = VOID_TAGS.replace_all(&text, "").into_owned();

    if let Some(inner) = BODY.captures(&text).and_then(|c| c.get(1)) {
        text = inner.as_str().to_string();
    }
    text = DOCUMENT_TAGS.replace_all(&text, "").into_owned();

    let mut images_written = 0;
    let text = rewrite_images(&text, refs, store, &mut images_written)?;
    let text = rewrite_links(&text);
    Ok(Fragment {
        html: text.trim().to_string(),
        images_written,
    })
}

fn rewrite_images(
    html: &str,
    refs: &ImageRefs,
    store: &ImageStore,
    written: &mut usize,
) -> Result<String> {
    let mut failure: Option<BookError> = None;

    let rewritten = IMG_TAG.replace_all(html, |tag: &Captures<'_>| {
        let tag = &tag[0];
        match rewrite_img_src(tag, refs, store, written) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                failure.get_or_insert(e);
                tag.to_string()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(rewritten.into_owned()),
    }
}

/// Rewrite the `src` attribute of one `<img>` tag, scanning attributes in order.
fn rewrite_img_src(
    tag: &str,
    refs: &ImageRefs,
    store: &ImageStore,
    written: &mut usize,
) -> Result<String> {
    for attr in TAG_ATTR.captures_iter(tag) {
        if !attr[1].eq_ignore_ascii_case("src") {
            continue;
        }
        let (value, quoted) = match (attr.get(2).or_else(|| attr.get(3)), attr.get(4)) {
            (Some(value), _) => (value, true),
            (None, Some(value)) => (value, false),
            (None, None) => return Ok(tag.to_string()),
        };
        let Some((local, fresh)) = resolve_src(value.as_str(), refs, store)? else {
            return Ok(tag.to_string());
        };
        if fresh {
            *written += 1;
        }
        let (start, end) = if quoted {
            (value.start() - 1, value.end() + 1)
        } else {
            (value.start(), value.end())
        };
        return Ok(format!(r#"{}"{}"{}"#, &tag[..start], local, &tag[end..]));
    }
    Ok(tag.to_string())
}

/// New local path for an image source (and whether it was just written),
/// or `None` to keep it.
fn resolve_src(src: &str, refs: &ImageRefs, store: &ImageStore) -> Result<Option<(String, bool)>> {
    if let Some(cid) = src.strip_prefix("cid:") {
        let cid = cid.trim_matches(['<', '>']);
        return Ok(refs.get(cid).map(|path| (path.clone(), false)));
    }
    if src
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:image/"))
    {
        return store_data_uri(src, store);
    }
    Ok(refs.get(src).map(|path| (path.clone(), false)))
}

/// Decode a `data:image/<type>;base64,<payload>` URI into the store.
fn store_data_uri(src: &str, store: &ImageStore) -> Result<Option<(String, bool)>> {
    let Some((header, payload)) = src.split_once(',') else {
        warn!("Data URI without payload, leaving as-is");
        return Ok(None);
    };
    let content_type = header[5..].split(';').next().unwrap_or_default();
    if !header.to_ascii_lowercase().ends_with(";base64") {
        warn!(content_type, "Data URI is not base64-encoded, leaving as-is");
        return Ok(None);
    }

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = match STANDARD.decode(compact) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(content_type, error = %e, "Failed to decode data URI, leaving as-is");
            return Ok(None);
        }
    };

    let stored = store.store(&ImageSource {
        bytes: &bytes,
        content_type: Some(content_type),
        ..Default::default()
    })?;
    Ok(Some((stored.relative_path, stored.written)))
}

/// Make every `<a href>` open in a new tab.
fn rewrite_links(html: &str) -> String {
    ANCHOR_TAG
        .replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            if !HREF_ATTR.is_match(tag) {
                return tag.to_string();
            }
            let stripped = TARGET_REL_ATTRS.replace_all(tag, "");
            let body = stripped.trim_end_matches('>').trim_end_matches('/').trim_end();
            format!("{body}{LINK_ATTRS}>")
        })
        .into_owned()
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Strip tags and collapse whitespace, for short plain-text previews.
pub fn plain_text(html: &str) -> String {
    static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
    let text = TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
