//! RSS 2.0 document model.

/// A parsed `<rss>` document. Only the fields the gateway rewrites or echoes are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RssDocument {
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Channel {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Item {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
}

impl Item {
    /// The item link, if present and non-empty.
    pub fn target(&self) -> Option<&str> {
        self.link.as_deref().filter(|link| !link.is_empty())
    }
}

/// Items as they come out of a channel: a lone `<item>` or a run of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemShape {
    One(Item),
    Many(Vec<Item>),
}

impl ItemShape {
    /// Accumulate one more parsed item.
    pub fn push(shape: Option<Self>, item: Item) -> Self {
        match shape {
            None => ItemShape::One(item),
            Some(ItemShape::One(first)) => ItemShape::Many(vec![first, item]),
            Some(ItemShape::Many(mut items)) => {
                items.push(item);
                ItemShape::Many(items)
            }
        }
    }
}

impl From<ItemShape> for Vec<Item> {
    fn from(shape: ItemShape) -> Self {
        match shape {
            ItemShape::One(item) => vec![item],
            ItemShape::Many(items) => items,
        }
    }
}

impl RssDocument {
    /// Serialize as an RSS 2.0 document. Absent fields become empty elements.
    pub fn to_xml(&self) -> String {
        let channel = &self.channel;
        let mut items = String::new();
        for item in &channel.items {
            items.push_str(&format!(
                "    <item>\n      <title>{}</title>\n      <link>{}</link>\n      <description>{}</description>\n    </item>\n",
                xml_escape(item.title.as_deref().unwrap_or_default()),
                xml_escape(item.link.as_deref().unwrap_or_default()),
                xml_escape(item.description.as_deref().unwrap_or_default()),
            ));
        }

        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n  <channel>\n    <title>{}</title>\n    <link>{}</link>\n    <description>{}</description>\n{}  </channel>\n</rss>\n",
            xml_escape(channel.title.as_deref().unwrap_or_default()),
            xml_escape(channel.link.as_deref().unwrap_or_default()),
            xml_escape(channel.description.as_deref().unwrap_or_default()),
            items
        )
    }
}

pub(crate) fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_shape_accumulates() {
        let first = Item {
            title: Some("a".into()),
            ..Default::default()
        };
        let second = Item {
            title: Some("b".into()),
            ..Default::default()
        };

        let one = ItemShape::push(None, first.clone());
        assert_eq!(one, ItemShape::One(first.clone()));
        let many = ItemShape::push(Some(one), second.clone());
        assert_eq!(Vec::<Item>::from(many), vec![first, second]);
    }

    #[test]
    fn empty_link_is_not_a_target() {
        let item = Item {
            link: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(item.target(), None);
        assert_eq!(Item::default().target(), None);
    }

    #[test]
    fn escapes_all_five_entities() {
        assert_eq!(
            xml_escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;"
        );
    }

    #[test]
    fn serializes_channel_and_items() {
        let doc = RssDocument {
            channel: Channel {
                title: Some("News & Notes".into()),
                link: Some("https://example.com/".into()),
                description: None,
                items: vec![
                    Item {
                        title: Some("First".into()),
                        link: Some("https://example.com/1?a=1&b=2".into()),
                        description: Some("<p>hi</p>".into()),
                    },
                    Item {
                        title: Some("No link".into()),
                        link: None,
                        description: None,
                    },
                ],
            },
        };

        insta::assert_snapshot!(doc.to_xml(), @r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
          <channel>
            <title>News &amp; Notes</title>
            <link>https://example.com/</link>
            <description></description>
            <item>
              <title>First</title>
              <link>https://example.com/1?a=1&amp;b=2</link>
              <description>&lt;p&gt;hi&lt;/p&gt;</description>
            </item>
            <item>
              <title>No link</title>
              <link></link>
              <description></description>
            </item>
          </channel>
        </rss>
        "#);
    }
}
