//! Tag command handlers

use anyhow::Result;

use arbor_core::Store;

use super::{resolve_node, resolve_tag};
use crate::output::{Output, TagUsage};

/// List all tags with usage counts
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let tags = store.read(|lib| {
        lib.tags()
            .iter()
            .map(|tag| TagUsage {
                tag: tag.clone(),
                count: lib.nodes_with_tag(&tag.id).count(),
            })
            .collect::<Vec<_>>()
    })?;
    output.print_tags(&tags);
    Ok(())
}

/// Create a tag, optionally with a color
pub fn create(store: &Store, name: String, color: Option<String>, output: &Output) -> Result<()> {
    let id = store.create_tag(&name)?;
    if let Some(color) = color {
        store.set_tag_color(&id, &color)?;
    }
    output.success(&format!("Created tag {} ({})", name, id));
    Ok(())
}

/// Tag a node, creating the tag when it doesn't exist yet
pub fn add(store: &Store, id: String, tag: String, output: &Output) -> Result<()> {
    let node = resolve_node(store, &id)?;
    let tag_id = store.find_or_create_tag(&tag)?;
    if store.append_tag(&node, &tag_id)? {
        output.success(&format!("Tagged {} with {}", node, tag));
    } else {
        output.message(&format!("{} already has tag {}", node, tag));
    }
    Ok(())
}

pub fn remove(store: &Store, id: String, tag: String, output: &Output) -> Result<()> {
    let node = resolve_node(store, &id)?;
    let tag_id = resolve_tag(store, &tag)?;
    if store.remove_tag_from_node(&node, &tag_id)? {
        output.success(&format!("Removed tag {} from {}", tag, node));
    } else {
        output.message(&format!("{} does not have tag {}", node, tag));
    }
    Ok(())
}

/// Delete a tag and strip it from every node
pub fn delete(store: &Store, tag: String, output: &Output) -> Result<()> {
    let tag_id = resolve_tag(store, &tag)?;
    let count = store.delete_tag(&tag_id)?;
    output.success(&format!("Deleted tag {} from {} node(s)", tag, count));
    Ok(())
}
