//! Post content rewriting: lenient HTML parse, image harvesting, and re-serialization.
//!
//! The fragment is parsed inside a UTF-8 document shell, every `<img src>` is resolved
//! through an [`ImageResolver`], and the body is written back out without the shell.
//! Parse errors are collected, never raised.

use crate::assets::ImageResolver;
use crate::model::RewrittenAsset;
use html5ever::driver::{self, ParseOpts};
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;

/// Appended to the original `src` of an image that could not be imported.
pub const BROKEN_IMAGE_MARKER: &str = "#fixme";

const SHELL_HEAD: &str =
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"></head><body>";
const SHELL_TAIL: &str = "</body></html>";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "noembed", "noframes", "xmp", "plaintext",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RewriteOutcome {
    pub html: String,
    /// One entry per image element, in document order.
    pub images: Vec<RewrittenAsset>,
    pub markup_errors: Vec<String>,
}

impl RewriteOutcome {
    pub fn broken_images(&self) -> impl Iterator<Item = &RewrittenAsset> {
        self.images.iter().filter(|i| !i.is_ok())
    }
}

/// Rewrite one post's HTML, importing its images through `resolver`.
pub fn rewrite_content(fragment: &str, resolver: &mut dyn ImageResolver) -> RewriteOutcome {
    let shell = format!("{}{}{}", SHELL_HEAD, fragment, SHELL_TAIL);
    let doc = parse_shell(&shell);

    let body = match body_of(&doc) {
        Some(b) => b,
        None => {
            return RewriteOutcome {
                html: String::new(),
                images: Vec::new(),
                markup_errors: doc.errors.iter().map(|e| e.to_string()).collect(),
            }
        }
    };

    let mut images = Vec::new();
    let mut new_src: HashMap<String, String> = HashMap::new();
    for img in body
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "img")
    {
        let src = img.value().attr("src").unwrap_or("").to_string();
        let asset = resolver.resolve(&src);
        let replacement = match &asset.local_reference {
            Some(reference) if asset.is_ok() => reference.clone(),
            _ => format!("{}{}", src, BROKEN_IMAGE_MARKER),
        };
        new_src.insert(src, replacement);
        images.push(asset);
    }

    let mut html = String::with_capacity(fragment.len());
    write_children(body, &new_src, &mut html);

    RewriteOutcome {
        html,
        images,
        markup_errors: doc.errors.iter().map(|e| e.to_string()).collect(),
    }
}

/// Plain text of an HTML snippet, for titles.
pub fn strip_tags(s: &str) -> String {
    let fragment = Html::parse_fragment(s);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

/// Parse with scripting off so `<noscript>` content is a tree, not one text node.
fn parse_shell(shell: &str) -> Html {
    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    driver::parse_document(Html::new_document(), opts).one(shell)
}

fn body_of(doc: &Html) -> Option<ElementRef<'_>> {
    doc.root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "body")
}

fn write_children(el: ElementRef<'_>, new_src: &HashMap<String, String>, out: &mut String) {
    let raw = RAW_TEXT_ELEMENTS.contains(&el.value().name());
    for child in el.children() {
        match child.value() {
            Node::Text(t) => {
                if raw {
                    out.push_str(t);
                } else {
                    escape_into(t, false, out);
                }
            }
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, new_src, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef<'_>, new_src: &HashMap<String, String>, out: &mut String) {
    let element = el.value();
    let name = element.name();
    let is_img = name == "img";

    out.push('<');
    out.push_str(name);
    let mut wrote_src = false;
    for (qname, value) in element.attrs.iter() {
        let local: &str = &qname.local;
        let value: &str = value;
        let key = match &qname.prefix {
            Some(prefix) => format!("{}:{}", prefix, local),
            None => local.to_string(),
        };
        let value = if is_img && key == "src" {
            wrote_src = true;
            new_src.get(value).map(String::as_str).unwrap_or(value)
        } else {
            value
        };
        write_attr(&key, value, out);
    }
    if is_img && !wrote_src {
        if let Some(src) = new_src.get("") {
            write_attr("src", src, out);
        }
    }

    if VOID_ELEMENTS.contains(&name) {
        out.push_str(" />");
        return;
    }
    out.push('>');
    write_children(el, new_src, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn write_attr(key: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    escape_into(value, true, out);
    out.push('"');
}

fn escape_into(s: &str, attr: bool, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&#160;"),
            _ => out.push(c),
        }
    }
}
