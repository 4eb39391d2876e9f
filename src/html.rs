use std::borrow::Cow;

use log::{debug, warn};
use quick_xml::Reader;
use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::{BytesStart, Event};

/// Tags the block builder distinguishes. Everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    H(u8),
    P,
    Ul,
    Ol,
    Li,
    Strong,
    Em,
    Code,
    A,
    Br,
    Hr,
    Table,
    Thead,
    Tbody,
    Tr,
    Th,
    Td,
    Blockquote,
    Pre,
    Img,
    Other(String),
}

impl Tag {
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "h1" => Tag::H(1),
            "h2" => Tag::H(2),
            "h3" => Tag::H(3),
            "h4" => Tag::H(4),
            "h5" => Tag::H(5),
            "h6" => Tag::H(6),
            "p" => Tag::P,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "strong" | "b" => Tag::Strong,
            "em" | "i" => Tag::Em,
            "code" => Tag::Code,
            "a" => Tag::A,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tr" => Tag::Tr,
            "th" => Tag::Th,
            "td" => Tag::Td,
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "img" => Tag::Img,
            other => Tag::Other(other.to_string()),
        }
    }

    /// Elements that never have content or an end tag in HTML.
    fn is_void(&self) -> bool {
        matches!(self, Tag::Br | Tag::Hr | Tag::Img)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlEvent {
    Start {
        tag: Tag,
        attrs: Vec<(String, String)>,
    },
    End(Tag),
    /// Character data as written, entity references still encoded.
    Data(String),
}

impl HtmlEvent {
    pub fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
        attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Tokenize HTML into start/end/data events.
///
/// The reader is lenient: unmatched end tags, mismatched names and dangling
/// ampersands are accepted. A syntax error skips the offending token.
pub fn tokenize(html: &str) -> Vec<HtmlEvent> {
    let mut reader = Reader::from_str(html);
    let config = reader.config_mut();
    config.trim_text(false);
    config.allow_unmatched_ends = true;
    config.check_end_names = false;
    config.allow_dangling_amp = true;

    let mut events = Vec::new();
    loop {
        let before = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let (tag, attrs) = start_tag(&e);
                let void = tag.is_void();
                events.push(HtmlEvent::Start {
                    tag: tag.clone(),
                    attrs,
                });
                if void {
                    events.push(HtmlEvent::End(tag));
                }
            }
            Ok(Event::Empty(e)) => {
                let (tag, attrs) = start_tag(&e);
                events.push(HtmlEvent::Start {
                    tag: tag.clone(),
                    attrs,
                });
                events.push(HtmlEvent::End(tag));
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let tag = Tag::from_name(&name);
                // Void elements were closed at their start tag.
                if !tag.is_void() {
                    events.push(HtmlEvent::End(tag));
                }
            }
            Ok(Event::Text(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_data(&mut events, text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                push_data(&mut events, text);
            }
            Ok(Event::GeneralRef(r)) => {
                let name = String::from_utf8_lossy(&r).into_owned();
                push_data(&mut events, format!("&{name};"));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("skipping malformed HTML near byte {}: {e}", reader.error_position());
                if reader.buffer_position() == before {
                    break;
                }
            }
        }
    }
    debug!("tokenized {} HTML events", events.len());
    events
}

fn push_data(events: &mut Vec<HtmlEvent>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(HtmlEvent::Data(last)) = events.last_mut() {
        last.push_str(&text);
    } else {
        events.push(HtmlEvent::Data(text));
    }
}

fn start_tag(e: &BytesStart<'_>) -> (Tag, Vec<(String, String)>) {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let attrs = e
        .html_attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_ascii_lowercase();
            let value = decode_entities(&String::from_utf8_lossy(&attr.value)).into_owned();
            (key, value)
        })
        .collect();
    (Tag::from_name(&name), attrs)
}

/// Decode named and numeric character references. Unknown references are
/// left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail[1..].find(';').filter(|&end| end > 0 && end <= 32) {
            Some(end) => {
                let name = &tail[1..=end];
                match resolve_reference(name) {
                    Some(resolved) => out.push_str(&resolved),
                    None => out.push_str(&tail[..end + 2]),
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn resolve_reference(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_html5_entity(name).map(str::to_string)
}
