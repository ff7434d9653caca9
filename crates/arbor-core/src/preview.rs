//! Link preview enrichment
//!
//! Anchor nodes carry a preview of the page they link to. Arbor never fetches
//! pages itself; an embedder plugs in a `LinkPreviewSource`. When the source
//! fails the anchor is still created, just without the enrichment.

use std::collections::HashMap;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::timestamp::Timestamp;

/// Preview image bytes as delivered by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Where the image came from
    pub url: Option<String>,
}

/// Metadata describing a linked page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPreview {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<PreviewImage>,
    /// When the page reports it last changed
    pub modified: Option<Timestamp>,
}

/// Supplies previews for urls
#[async_trait]
pub trait LinkPreviewSource: Send + Sync {
    async fn fetch_preview(&self, url: &str) -> Result<LinkPreview>;
}

/// A source that knows nothing; anchors stay bare
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreviews;

#[async_trait]
impl LinkPreviewSource for NoPreviews {
    async fn fetch_preview(&self, _url: &str) -> Result<LinkPreview> {
        Ok(LinkPreview::default())
    }
}

/// Previews registered up front, keyed by url
#[derive(Debug, Default, Clone)]
pub struct StaticPreviews {
    previews: HashMap<String, LinkPreview>,
}

impl StaticPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, preview: LinkPreview) -> Self {
        self.previews.insert(url.into(), preview);
        self
    }
}

#[async_trait]
impl LinkPreviewSource for StaticPreviews {
    async fn fetch_preview(&self, url: &str) -> Result<LinkPreview> {
        match self.previews.get(url) {
            Some(preview) => Ok(preview.clone()),
            None => bail!("No preview available for {url}"),
        }
    }
}
