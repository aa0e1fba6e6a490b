//! WXR parser. Streams an export with quick-xml and collects posts and terms in file order.
//!
//! Unknown elements are skipped. Field values are matched by their parent element, so
//! `<wp:meta_key>` inside `<wp:commentmeta>` never leaks into post meta.

mod error;

pub use error::ParseError;

use crate::model::{MetaEntry, ParsedDocument, ParsedPost, ParsedTerm, PostType, TermRef};
use quick_xml::encoding::Decoder;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Parse the export at `path`.
pub fn parse_file(path: &Path) -> Result<ParsedDocument, ParseError> {
    let file = File::open(path).map_err(|e| ParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_reader(BufReader::new(file))
}

pub fn parse_str(xml: &str) -> Result<ParsedDocument, ParseError> {
    parse_reader(xml.as_bytes())
}

pub fn parse_reader<R: BufRead>(input: R) -> Result<ParsedDocument, ParseError> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);

    let mut state = DocumentBuilder::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.open(&e, reader.decoder())?,
            Ok(Event::Empty(e)) => {
                state.open(&e, reader.decoder())?;
                state.close()?;
            }
            Ok(Event::End(_)) => state.close()?,
            Ok(Event::Text(e)) => state.push_text(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::CData(e)) => state.push_text(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::GeneralRef(e)) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                match resolve_entity(&entity) {
                    Some(resolved) => state.push_text(&resolved),
                    // Left for the HTML stage (&nbsp; and friends).
                    None => state.push_text(&format!("&{};", entity)),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Xml {
                    position: reader.buffer_position() as u64,
                    source: e,
                })
            }
            _ => {}
        }
        buf.clear();
    }

    state.finish()
}

#[derive(Default)]
struct PostBuilder {
    id: Option<String>,
    post_type: String,
    title: String,
    content: String,
    excerpt: String,
    parent_id: Option<String>,
    order: i64,
    status: String,
    slug: String,
    meta: Vec<MetaEntry>,
    terms: Vec<TermRef>,
}

#[derive(Default)]
struct TermBuilder {
    name: String,
    taxonomy: String,
    description: String,
    slug: String,
}

#[derive(Default)]
struct DocumentBuilder {
    stack: Vec<Vec<u8>>,
    text: String,
    saw_channel: bool,
    wxr_version: Option<String>,
    doc: ParsedDocument,
    item_count: usize,
    item: Option<PostBuilder>,
    meta: Option<MetaEntry>,
    term: Option<TermBuilder>,
    category: Option<TermRef>,
}

impl DocumentBuilder {
    fn parent(&self) -> &[u8] {
        self.stack.last().map(Vec::as_slice).unwrap_or(b"")
    }

    fn push_text(&mut self, s: &str) {
        self.text.push_str(s);
    }

    fn open(&mut self, e: &BytesStart<'_>, decoder: Decoder) -> Result<(), ParseError> {
        let name = e.name().as_ref().to_vec();
        let parent = self.parent().to_vec();

        if self.stack.is_empty() && name != b"rss" {
            return Err(ParseError::NotWxr {
                reason: format!(
                    "root element is <{}>, expected <rss>",
                    String::from_utf8_lossy(&name)
                ),
            });
        }

        match (parent.as_slice(), name.as_slice()) {
            (b"rss", b"channel") => self.saw_channel = true,
            (b"channel", b"item") => {
                self.item_count += 1;
                self.item = Some(PostBuilder::default());
            }
            (b"channel", b"wp:term") | (b"channel", b"wp:category") | (b"channel", b"wp:tag") => {
                let taxonomy = match name.as_slice() {
                    b"wp:category" => "category",
                    b"wp:tag" => "post_tag",
                    _ => "",
                };
                self.term = Some(TermBuilder {
                    taxonomy: taxonomy.to_string(),
                    ..TermBuilder::default()
                });
            }
            (b"item", b"wp:postmeta") => {
                self.meta = Some(MetaEntry {
                    key: String::new(),
                    value: String::new(),
                })
            }
            (b"item", b"category") => {
                let mut domain = String::new();
                let mut slug = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"domain" => domain = attr_value(&attr, decoder),
                        b"nicename" => slug = attr_value(&attr, decoder),
                        _ => {}
                    }
                }
                self.category = Some(TermRef { slug, domain });
            }
            _ => {}
        }

        self.stack.push(name);
        self.text.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let name = match self.stack.pop() {
            Some(n) => n,
            None => return Ok(()),
        };
        let text = std::mem::take(&mut self.text);
        let parent = self.parent().to_vec();

        match (parent.as_slice(), name.as_slice()) {
            (b"channel", b"title") => self.doc.title = text.trim().to_string(),
            (b"channel", b"wp:base_site_url") => {
                self.doc.base_site_url = Some(text.trim().to_string()).filter(|s| !s.is_empty())
            }
            (b"channel", b"wp:wxr_version") => {
                self.wxr_version = Some(text.trim().to_string()).filter(|s| !s.is_empty())
            }
            (b"channel", b"item") => self.finish_item()?,
            (b"channel", b"wp:term") | (b"channel", b"wp:category") | (b"channel", b"wp:tag") => {
                if let Some(t) = self.term.take() {
                    if !t.name.is_empty() && !t.taxonomy.is_empty() {
                        self.doc.terms.push(ParsedTerm {
                            name: t.name,
                            taxonomy: t.taxonomy,
                            description: t.description,
                            slug: t.slug,
                        });
                    }
                }
            }
            (b"wp:term" | b"wp:category" | b"wp:tag", field) => {
                if let Some(t) = self.term.as_mut() {
                    let value = text.trim().to_string();
                    match field {
                        b"wp:term_name" | b"wp:cat_name" | b"wp:tag_name" => t.name = value,
                        b"wp:term_taxonomy" => t.taxonomy = value,
                        b"wp:term_slug" | b"wp:category_nicename" | b"wp:tag_slug" => {
                            t.slug = value
                        }
                        b"wp:term_description"
                        | b"wp:category_description"
                        | b"wp:tag_description" => t.description = value,
                        _ => {}
                    }
                }
            }
            (b"wp:postmeta", b"wp:meta_key") => {
                if let Some(m) = self.meta.as_mut() {
                    m.key = text.trim().to_string();
                }
            }
            (b"wp:postmeta", b"wp:meta_value") => {
                if let Some(m) = self.meta.as_mut() {
                    m.value = text;
                }
            }
            (b"item", b"wp:postmeta") => {
                if let (Some(m), Some(item)) = (self.meta.take(), self.item.as_mut()) {
                    if !m.key.is_empty() {
                        item.meta.push(m);
                    }
                }
            }
            (b"item", b"category") => {
                if let (Some(r), Some(item)) = (self.category.take(), self.item.as_mut()) {
                    if !r.slug.is_empty() && !r.domain.is_empty() {
                        item.terms.push(r);
                    }
                }
            }
            (b"item", field) => {
                if let Some(item) = self.item.as_mut() {
                    match field {
                        b"title" => item.title = text.trim().to_string(),
                        b"content:encoded" => item.content = text,
                        b"excerpt:encoded" => item.excerpt = text,
                        b"wp:post_id" => {
                            item.id = Some(text.trim().to_string()).filter(|s| !s.is_empty())
                        }
                        b"wp:post_parent" => {
                            let p = text.trim();
                            item.parent_id = if p.is_empty() || p == "0" {
                                None
                            } else {
                                Some(p.to_string())
                            };
                        }
                        b"wp:menu_order" => item.order = text.trim().parse().unwrap_or(0),
                        b"wp:post_type" => item.post_type = text.trim().to_string(),
                        b"wp:status" => item.status = text.trim().to_string(),
                        b"wp:post_name" => item.slug = text.trim().to_string(),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish_item(&mut self) -> Result<(), ParseError> {
        let item = match self.item.take() {
            Some(i) => i,
            None => return Ok(()),
        };
        let id = item.id.ok_or(ParseError::MissingPostId {
            index: self.item_count,
        })?;
        let post_type = if item.post_type.is_empty() {
            PostType::Other("post".to_string())
        } else {
            PostType::from(item.post_type)
        };
        self.doc.posts.push(ParsedPost {
            id,
            post_type,
            title: item.title,
            content: item.content,
            excerpt: item.excerpt,
            parent_id: item.parent_id,
            order: item.order,
            status: item.status,
            slug: item.slug,
            meta: item.meta,
            terms: item.terms,
        });
        Ok(())
    }

    fn finish(mut self) -> Result<ParsedDocument, ParseError> {
        if let Some(open) = self.stack.last() {
            return Err(ParseError::UnclosedElement {
                name: String::from_utf8_lossy(open).into_owned(),
            });
        }
        if !self.saw_channel {
            return Err(ParseError::NotWxr {
                reason: "no <channel> element".to_string(),
            });
        }
        self.doc.wxr_version = self.wxr_version.ok_or(ParseError::MissingWxrVersion)?;
        Ok(self.doc)
    }
}

/// Resolve the predefined XML entities and numeric character references.
fn attr_value(attr: &Attribute<'_>, decoder: Decoder) -> String {
    match attr.decode_and_unescape_value(decoder) {
        Ok(v) => v.into_owned(),
        // Unknown entity: keep the raw text.
        Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
    }
}

fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    const HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<rss version="2.0"
    xmlns:excerpt="http://wordpress.org/export/1.2/excerpt/"
    xmlns:content="http://purl.org/rss/1.0/modules/content/"
    xmlns:wp="http://wordpress.org/export/1.2/">
<channel>
    <title>My Book</title>
    <wp:wxr_version>1.2</wp:wxr_version>
    <wp:base_site_url>https://books.example.com</wp:base_site_url>
"#;
    const FOOTER: &str = "</channel>\n</rss>\n";

    fn wxr(body: &str) -> String {
        format!("{}{}{}", HEADER, body, FOOTER)
    }

    #[test]
    fn parses_items_in_file_order() -> Result<(), Box<dyn Error>> {
        let xml = wxr(r#"
    <item>
        <title>Second</title>
        <wp:post_id>12</wp:post_id>
        <wp:post_parent>11</wp:post_parent>
        <wp:menu_order>2</wp:menu_order>
        <wp:post_type>chapter</wp:post_type>
        <wp:status>publish</wp:status>
        <content:encoded><![CDATA[<p>Body & <b>bold</b></p>]]></content:encoded>
    </item>
    <item>
        <title>First</title>
        <wp:post_id>11</wp:post_id>
        <wp:post_parent>0</wp:post_parent>
        <wp:menu_order>1</wp:menu_order>
        <wp:post_type>part</wp:post_type>
        <wp:post_name>first</wp:post_name>
    </item>
"#);
        let doc = parse_str(&xml)?;
        assert_eq!(doc.title, "My Book");
        assert_eq!(doc.wxr_version, "1.2");
        assert_eq!(doc.base_site_url.as_deref(), Some("https://books.example.com"));
        assert_eq!(doc.posts.len(), 2);
        let ch = &doc.posts[0];
        assert_eq!(ch.id, "12");
        assert_eq!(ch.post_type, PostType::Chapter);
        assert_eq!(ch.parent_id.as_deref(), Some("11"));
        assert_eq!(ch.order, 2);
        assert_eq!(ch.status, "publish");
        assert_eq!(ch.content, "<p>Body & <b>bold</b></p>");
        let part = &doc.posts[1];
        assert_eq!(part.post_type, PostType::Part);
        assert_eq!(part.parent_id, None);
        assert_eq!(part.slug, "first");
        Ok(())
    }

    #[test]
    fn entity_encoded_content_is_decoded_once() -> Result<(), Box<dyn Error>> {
        let xml = wxr(r#"
    <item>
        <title>Fish &amp; Chips</title>
        <wp:post_id>1</wp:post_id>
        <content:encoded>&lt;p&gt;a &amp;lt; b&lt;/p&gt;&#8212;</content:encoded>
    </item>
"#);
        let doc = parse_str(&xml)?;
        assert_eq!(doc.posts[0].title, "Fish & Chips");
        assert_eq!(doc.posts[0].content, "<p>a &lt; b</p>\u{2014}");
        Ok(())
    }

    #[test]
    fn collects_meta_and_term_refs() -> Result<(), Box<dyn Error>> {
        let xml = wxr(r#"
    <item>
        <title>Intro</title>
        <wp:post_id>3</wp:post_id>
        <wp:post_type>front-matter</wp:post_type>
        <category domain="front-matter-type" nicename="introduction"><![CDATA[Introduction]]></category>
        <category>no domain</category>
        <wp:postmeta>
            <wp:meta_key>pb_subtitle</wp:meta_key>
            <wp:meta_value><![CDATA[A subtitle]]></wp:meta_value>
        </wp:postmeta>
        <wp:postmeta>
            <wp:meta_key>pb_subtitle</wp:meta_key>
            <wp:meta_value>Again</wp:meta_value>
        </wp:postmeta>
        <wp:comment>
            <wp:comment_id>9</wp:comment_id>
            <wp:commentmeta>
                <wp:meta_key>akismet</wp:meta_key>
                <wp:meta_value>spam</wp:meta_value>
            </wp:commentmeta>
        </wp:comment>
    </item>
"#);
        let doc = parse_str(&xml)?;
        let post = &doc.posts[0];
        assert_eq!(post.terms.len(), 1);
        assert_eq!(post.terms[0].domain, "front-matter-type");
        assert_eq!(post.terms[0].slug, "introduction");
        assert_eq!(post.meta.len(), 2);
        assert_eq!(post.meta[0].value, "A subtitle");
        assert_eq!(post.meta[1].value, "Again");
        Ok(())
    }

    #[test]
    fn category_attributes_are_unescaped() -> Result<(), Box<dyn Error>> {
        let xml = wxr(r#"
    <item>
        <wp:post_id>4</wp:post_id>
        <category domain="chapter-type" nicename="a&amp;b"/>
        <category domain="chapter&#45;type" nicename="odd&nbsp;one"/>
    </item>
"#);
        let doc = parse_str(&xml)?;
        let terms = &doc.posts[0].terms;
        assert_eq!(terms[0].slug, "a&b");
        assert_eq!(terms[1].domain, "chapter-type");
        assert_eq!(terms[1].slug, "odd&nbsp;one");
        Ok(())
    }

    #[test]
    fn collects_channel_terms_categories_and_tags() -> Result<(), Box<dyn Error>> {
        let xml = wxr(r#"
    <wp:term>
        <wp:term_id>5</wp:term_id>
        <wp:term_taxonomy>chapter-type</wp:term_taxonomy>
        <wp:term_slug>numberless</wp:term_slug>
        <wp:term_name><![CDATA[Numberless]]></wp:term_name>
        <wp:term_description>No number</wp:term_description>
    </wp:term>
    <wp:category>
        <wp:category_nicename>news</wp:category_nicename>
        <wp:cat_name><![CDATA[News]]></wp:cat_name>
    </wp:category>
    <wp:tag>
        <wp:tag_slug>rust</wp:tag_slug>
        <wp:tag_name>Rust</wp:tag_name>
    </wp:tag>
"#);
        let doc = parse_str(&xml)?;
        assert_eq!(doc.terms.len(), 3);
        assert_eq!(
            doc.terms[0],
            ParsedTerm {
                name: "Numberless".into(),
                taxonomy: "chapter-type".into(),
                description: "No number".into(),
                slug: "numberless".into(),
            }
        );
        assert_eq!(doc.terms[1].taxonomy, "category");
        assert_eq!(doc.terms[2].taxonomy, "post_tag");
        assert_eq!(doc.terms[2].slug, "rust");
        Ok(())
    }

    #[test]
    fn unknown_elements_and_missing_type_are_tolerated() -> Result<(), Box<dyn Error>> {
        let xml = wxr(r#"
    <generator>https://wordpress.org/?v=6.0</generator>
    <item>
        <title>Hello</title>
        <wp:post_id>7</wp:post_id>
        <wp:menu_order>oops</wp:menu_order>
        <wp:future_field><nested>x</nested></wp:future_field>
    </item>
"#);
        let doc = parse_str(&xml)?;
        assert_eq!(doc.posts[0].post_type, PostType::Other("post".into()));
        assert_eq!(doc.posts[0].order, 0);
        Ok(())
    }

    #[test]
    fn rejects_non_rss_root() {
        let result = parse_str("<html><body/></html>");
        assert!(matches!(result, Err(ParseError::NotWxr { .. })));
    }

    #[test]
    fn rejects_missing_channel() {
        let result = parse_str("<rss version=\"2.0\"></rss>");
        assert!(matches!(result, Err(ParseError::NotWxr { .. })));
    }

    #[test]
    fn rejects_missing_version() {
        let result = parse_str("<rss><channel><title>x</title></channel></rss>");
        assert!(matches!(result, Err(ParseError::MissingWxrVersion)));
    }

    #[test]
    fn rejects_item_without_id() {
        let result = parse_str(&wxr("<item><title>x</title></item>"));
        assert!(matches!(result, Err(ParseError::MissingPostId { index: 1 })));
    }

    #[test]
    fn rejects_mismatched_tags() {
        let result = parse_str(&wxr("<item><title>x</item>"));
        assert!(matches!(result, Err(ParseError::Xml { .. })));
    }

    #[test]
    fn rejects_truncated_document() {
        let xml = format!("{}<item><title>x</title>", HEADER);
        assert!(parse_str(&xml).is_err());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = parse_file(Path::new("/nonexistent/wxrbook/export.xml"));
        assert!(matches!(result, Err(ParseError::Io { .. })));
    }

    #[test]
    fn resolve_entity_handles_numeric_forms() {
        assert_eq!(resolve_entity("#65").as_deref(), Some("A"));
        assert_eq!(resolve_entity("#x41").as_deref(), Some("A"));
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("nbsp"), None);
    }
}
