//! HTML templates of the published document.
//!
//! Only titles, dates and attribute values are escaped. Bodies are already
//! cleaned fragments and are emitted verbatim.

use crate::config::PublishConfig;
use crate::model::content::{NormalizedMessage, Note};
use crate::normalize::html::escape_html;

const STYLE: &str = r#"        body { margin: 0; padding: 2rem 0; min-height: 100vh; font-family: Georgia, serif;
               background: linear-gradient(135deg, #1a1a2e 0%, #16213e 100%); }
        .container { max-width: 1000px; margin: 0 auto; padding: 0 1rem; }
        .hero { text-align: center; padding: 3rem 0 2rem; color: #fff; }
        .hero h1 { font-size: 3rem; text-shadow: 2px 2px 8px rgba(0,0,0,0.7); margin-bottom: 1rem; }
        .toc, .content-section { background: rgba(255,255,255,0.95); border-radius: 15px;
               padding: 2rem; margin-bottom: 2rem; box-shadow: 0 10px 40px rgba(0,0,0,0.3); }
        .toc ul { list-style: none; padding-left: 0; }
        .toc li { padding: 0.5rem 0; border-bottom: 1px solid rgba(0,0,0,0.1); }
        .toc a { color: #dc3545; text-decoration: none; }
        .section-title { color: #1a1a2e; border-bottom: 3px solid #dc3545; padding-bottom: 0.5rem; }
        .section-number { display: inline-block; background: #dc3545; color: #fff; padding: 0.2rem 0.6rem;
               border-radius: 4px; font-size: 0.85rem; font-weight: bold; margin-right: 0.5rem; }
        .card { border: 1px solid #6c757d; border-radius: 8px; margin-bottom: 1.5rem; overflow: hidden; }
        .card-header { display: flex; justify-content: space-between; padding: 0.5rem 1rem;
               background: #212529; color: #f8f9fa; }
        .card.note .card-header { background: #0dcaf0; color: #fff; }
        .card-body { padding: 1rem; background: #f8f9fa; }
        .missing-content { color: #842029; font-style: italic; }
        img { max-width: 100%; height: auto; border-radius: 8px; margin: 1rem 0; }
        .footer { text-align: center; color: #fff; opacity: 0.7; padding: 2rem; }
"#;

pub(crate) fn page_start(out: &mut String, publish: &PublishConfig) {
    let title = escape_html(&publish.title);
    let subtitle = escape_html(&publish.subtitle);
    out.push_str(&format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
{STYLE}    </style>
</head>
<body>
    <div class="container">
        <div class="hero">
            <h1>{title}</h1>
            <p>{subtitle}</p>
        </div>
"#
    ));
}

pub(crate) fn toc(out: &mut String, titles: &[(usize, &str)]) {
    out.push_str("        <div class=\"toc\">\n            <h2>Table of Contents</h2>\n            <ul>\n");
    for (number, title) in titles {
        out.push_str(&format!(
            "                <li><a href=\"#section-{number}\"><span class=\"section-number\">{number}</span>{}</a></li>\n",
            escape_html(title)
        ));
    }
    out.push_str("            </ul>\n        </div>\n\n");
}

pub(crate) fn section(out: &mut String, number: usize, title: &str, body: &str) {
    out.push_str(&format!(
        r#"        <section class="content-section" id="section-{number}">
            <h2 class="section-title"><span class="section-number">{number}</span>{}</h2>
{body}        </section>

"#,
        escape_html(title)
    ));
}

pub(crate) fn page_end(out: &mut String, publish: &PublishConfig) {
    out.push_str(&format!(
        "        <div class=\"footer\">\n            <p>{}</p>\n        </div>\n    </div>\n</body>\n</html>\n",
        escape_html(&publish.footer)
    ));
}

/// Exclusion toggle state for a message card in the curator preview.
pub(crate) struct Toggle<'a> {
    pub item_id: &'a str,
    pub excluded: bool,
}

pub(crate) fn message_card(out: &mut String, message: &NormalizedMessage, toggle: Option<Toggle<'_>>) {
    let date = escape_html(&message.date);
    let control = match toggle {
        Some(t) => format!(
            r#"<label class="exclude-toggle"><input type="checkbox" class="exclude-message" data-file="{}" data-date="{date}" data-key="{}"{}> Exclude</label>"#,
            escape_html(t.item_id),
            escape_html(&message.key),
            if t.excluded { " checked" } else { "" }
        ),
        None => String::new(),
    };
    out.push_str(&format!(
        r#"            <div class="card message" data-key="{key}">
                <div class="card-header"><span>Journal Entry</span>{control}<small>{date}</small></div>
                <div class="card-body">
{body}
                </div>
            </div>
"#,
        key = escape_html(&message.key),
        body = message.body,
    ));
}

pub(crate) fn note_card(out: &mut String, note: &Note) {
    out.push_str(&format!(
        r#"            <div class="card note" id="{id}">
                <div class="card-header"><h5>{title}</h5></div>
                <div class="card-body">
{body}
                </div>
            </div>
"#,
        id = escape_html(&note.id),
        title = escape_html(&note.title),
        body = note.body,
    ));
}

pub(crate) fn missing(out: &mut String, reference: &str) {
    out.push_str(&format!(
        "            <p class=\"missing-content\">Missing content: {}</p>\n",
        escape_html(reference)
    ));
}
