//! File registry command handlers

use anyhow::Result;

use arbor_core::Store;

use crate::output::{FileUsage, Output};

/// List registered files and how many nodes use each
pub fn list(store: &Store, output: &Output) -> Result<()> {
    let files = store.read(|lib| {
        lib.files()
            .iter()
            .map(|file| FileUsage {
                file: file.clone(),
                references: lib.nodes_referencing_file(&file.id).len(),
            })
            .collect::<Vec<_>>()
    })?;
    output.print_files(&files);
    Ok(())
}
