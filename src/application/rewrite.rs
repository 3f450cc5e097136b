//! Item link rewriting.
//!
//! Every item link is replaced by a gateway URL that carries the original as
//! its `contentURL` query parameter. The originals are returned so they can be
//! allowlisted for the content endpoint.

use std::collections::BTreeSet;

use crate::domain::feed::{Item, RssDocument};

const CONTENT_PATH: &str = "/content/?contentURL=";

/// Result of rewriting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub document: RssDocument,
    pub original_urls: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct LinkRewriter {
    base_url: String,
}

impl LinkRewriter {
    /// `base_url` is the public origin of this gateway; a trailing `/` is dropped.
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Gateway URL for an original article link.
    pub fn content_url(&self, original: &str) -> String {
        format!(
            "{}{CONTENT_PATH}{}",
            self.base_url,
            urlencoding::encode(original)
        )
    }

    pub fn rewrite(&self, document: &RssDocument) -> Rewritten {
        let mut original_urls = BTreeSet::new();
        let mut rewritten = document.clone();

        for item in &mut rewritten.channel.items {
            if let Some(original) = self.rewrite_item(item) {
                original_urls.insert(original);
            }
        }

        Rewritten {
            document: rewritten,
            original_urls,
        }
    }

    fn rewrite_item(&self, item: &mut Item) -> Option<String> {
        let original = item.target()?.to_string();
        item.link = Some(self.content_url(&original));
        Some(original)
    }
}
