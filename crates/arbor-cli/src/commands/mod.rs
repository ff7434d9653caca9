//! Command handlers

pub mod config;
pub mod files;
pub mod node;
pub mod tag;

use anyhow::{bail, Result};

use arbor_core::{NodeId, Store, TagId};

/// Resolve a node argument
///
/// Accepts `master`, `trash`, a directory path starting with `/`, a full id
/// or a unique id prefix.
pub fn resolve_node(store: &Store, input: &str) -> Result<NodeId> {
    let lowered = input.to_ascii_lowercase();
    if lowered == NodeId::MASTER {
        return Ok(NodeId::master());
    }
    if lowered == NodeId::TRASH {
        return Ok(NodeId::trash());
    }

    if input.starts_with('/') {
        return match store.read(|lib| lib.resolve_path(input))?? {
            Some(id) => Ok(id),
            None => bail!("No directory at path: {}", input),
        };
    }

    let mut matches: Vec<(NodeId, String)> = store.read(|lib| {
        lib.visit()
            .filter(|n| n.id().as_str().starts_with(input))
            .map(|n| {
                (
                    n.id().clone(),
                    crate::output::summarize(n.id(), n.content()),
                )
            })
            .collect()
    })?;

    // An exact id wins over longer ids sharing the prefix
    if let Some(pos) = matches.iter().position(|(id, _)| id.as_str() == input) {
        return Ok(matches.swap_remove(pos).0);
    }

    match matches.len() {
        0 => bail!("No node found matching: {}", input),
        1 => Ok(matches.remove(0).0),
        _ => {
            eprintln!("Multiple nodes match '{}':", input);
            for (id, summary) in &matches {
                eprintln!("  {} - {}", id, summary);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Resolve a tag argument by name (case-insensitive) or id
pub fn resolve_tag(store: &Store, input: &str) -> Result<TagId> {
    let found = store.read(|lib| {
        lib.find_tag(input)
            .or_else(|| lib.get_tag(&TagId::from(input)))
            .map(|t| t.id.clone())
    })?;
    match found {
        Some(id) => Ok(id),
        None => bail!("No tag named: {}", input),
    }
}
