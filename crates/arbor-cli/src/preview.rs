//! Anchor previews supplied on the command line
//!
//! The CLI never fetches pages; `--title` and `--description` stand in for a
//! fetched preview.

use anyhow::Result;
use async_trait::async_trait;

use arbor_core::{LinkPreview, LinkPreviewSource};

/// Preview built from command-line flags
#[derive(Debug, Clone, Default)]
pub struct FlagPreview {
    title: Option<String>,
    description: Option<String>,
}

impl FlagPreview {
    pub fn new(title: Option<String>, description: Option<String>) -> Self {
        Self { title, description }
    }
}

#[async_trait]
impl LinkPreviewSource for FlagPreview {
    async fn fetch_preview(&self, _url: &str) -> Result<LinkPreview> {
        Ok(LinkPreview {
            title: self.title.clone(),
            description: self.description.clone(),
            ..LinkPreview::default()
        })
    }
}
