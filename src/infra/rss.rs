//! RSS parsing on top of the `quick-xml` event reader.
//!
//! Only the first `<channel>` is read. Within it the channel and item
//! `title`/`link`/`description` are collected; everything else, including
//! prefixed elements such as `atom:link`, is skipped.

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::domain::error::DocumentError;
use crate::domain::feed::{Channel, Item, ItemShape, RssDocument};

const BOM: char = '\u{feff}';

/// Parse an RSS 2.0 document.
pub fn parse_document(body: &str) -> Result<RssDocument, DocumentError> {
    let content = body.trim_start_matches(BOM).trim();
    if content.is_empty() {
        return Err(DocumentError::validation("Empty content"));
    }
    if !content.starts_with("<?xml") && !content.starts_with("<rss") {
        return Err(DocumentError::validation(
            "document must start with an XML declaration or an <rss> element",
        ));
    }

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    loop {
        let event = reader.read_event();
        let event = event.map_err(|err| {
            DocumentError::parse(format!("at byte {}: {err}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(start) => state.open(start.name().as_ref())?,
            Event::Empty(start) => {
                state.open(start.name().as_ref())?;
                state.close();
            }
            Event::End(_) => state.close(),
            Event::Text(text) => {
                let value = text.unescape().map_err(|err| {
                    let position = reader.buffer_position();
                    debug!(position, error = %err, "feed text carries an unresolvable entity");
                    DocumentError::parse(format!("at byte {position}: {err}"))
                })?;
                state.text(&value);
            }
            Event::CData(cdata) => state.text(&String::from_utf8_lossy(&cdata)),
            Event::Eof => break,
            _ => {}
        }
    }

    state.finish()
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Channel(Field),
    Item(Field),
}

#[derive(Default)]
struct ParseState {
    stack: Vec<Vec<u8>>,
    root_seen: bool,
    channel: Option<Channel>,
    in_channel: bool,
    items: Option<ItemShape>,
    item: Option<Item>,
    capture: Option<(Slot, String)>,
}

impl ParseState {
    fn open(&mut self, name: &[u8]) -> Result<(), DocumentError> {
        if self.stack.is_empty() {
            if self.root_seen {
                return Err(DocumentError::parse("multiple root elements"));
            }
            self.root_seen = true;
            if name != b"rss" {
                return Err(DocumentError::validation(format!(
                    "root element is <{}>, expected <rss>",
                    String::from_utf8_lossy(name)
                )));
            }
        }

        self.stack.push(name.to_vec());
        match self.stack.len() {
            2 if name == b"channel" && self.channel.is_none() => {
                self.channel = Some(Channel::default());
                self.in_channel = true;
            }
            3 if self.in_channel && name == b"item" => {
                self.item = Some(Item::default());
            }
            3 if self.in_channel => {
                if let Some(field) = Field::from_name(name) {
                    self.capture = Some((Slot::Channel(field), String::new()));
                }
            }
            4 if self.item.is_some() => {
                if let Some(field) = Field::from_name(name) {
                    self.capture = Some((Slot::Item(field), String::new()));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self) {
        let depth = self.stack.len();
        let Some(name) = self.stack.pop() else {
            return;
        };

        match depth {
            2 if self.in_channel && name == b"channel" => self.in_channel = false,
            3 if self.in_channel && name == b"item" => {
                if let Some(item) = self.item.take() {
                    self.items = Some(ItemShape::push(self.items.take(), item));
                }
            }
            3 | 4 => self.store_capture(depth),
            _ => {}
        }
    }

    fn text(&mut self, value: &str) {
        if let Some((_, buffer)) = self.capture.as_mut() {
            buffer.push_str(value);
        }
    }

    fn store_capture(&mut self, depth: usize) {
        let Some((slot, value)) = self.capture.take() else {
            return;
        };
        let target = match (slot, depth) {
            (Slot::Channel(field), 3) => self.channel.as_mut().map(|c| c.field_mut(field)),
            (Slot::Item(field), 4) => self.item.as_mut().map(|i| i.field_mut(field)),
            _ => {
                self.capture = Some((slot, value));
                return;
            }
        };
        // First non-empty value wins.
        if let Some(target) = target
            && target.as_deref().is_none_or(str::is_empty)
        {
            *target = Some(value);
        }
    }

    fn finish(self) -> Result<RssDocument, DocumentError> {
        if !self.root_seen {
            return Err(DocumentError::validation("document has no root element"));
        }
        if !self.stack.is_empty() {
            return Err(DocumentError::parse("unexpected end of document"));
        }
        let mut channel = self
            .channel
            .ok_or_else(|| DocumentError::validation("missing <channel> element"))?;
        channel.items = self.items.map(Vec::from).unwrap_or_default();
        Ok(RssDocument { channel })
    }
}

trait Fields {
    fn field_mut(&mut self, field: Field) -> &mut Option<String>;
}

impl Fields for Channel {
    fn field_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
        }
    }
}

impl Fields for Item {
    fn field_mut(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
        }
    }
}
