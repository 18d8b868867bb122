//! Writing woven classes back out.
//!
//! Bytes depend only on the class contents: pretty JSON with a trailing
//! newline, archive entries in name order, default entry timestamps.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

use crate::class::CompiledClass;
use crate::source::{class_name_to_entry_path, is_archive_path};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenClass {
    pub class: String,
    pub entry: String,
    pub content_hash: String,
}

pub fn encode_class(class: &CompiledClass) -> Result<String> {
    let mut text = serde_json::to_string_pretty(class)
        .with_context(|| format!("failed to encode class {}", class.name))?;
    text.push('\n');
    Ok(text)
}

pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Writes to a `.jar`/`.zip` archive or, for any other path, a directory tree.
pub fn write_classes(out: &Path, classes: &[CompiledClass]) -> Result<Vec<WrittenClass>> {
    let mut encoded = Vec::with_capacity(classes.len());
    for class in classes {
        let text = encode_class(class)?;
        encoded.push((class_name_to_entry_path(&class.name), class.name.clone(), text));
    }
    encoded.sort_by(|a, b| a.0.cmp(&b.0));

    if is_archive_path(out) {
        write_archive(out, &encoded)?;
    } else {
        write_directory(out, &encoded)?;
    }

    let written = encoded
        .into_iter()
        .map(|(entry, class, text)| WrittenClass {
            class,
            entry,
            content_hash: hash_content(&text),
        })
        .collect::<Vec<_>>();
    tracing::info!(out = %out.display(), classes = written.len(), "wrote classes");
    Ok(written)
}

fn write_directory(root: &Path, encoded: &[(String, String, String)]) -> Result<()> {
    for (entry, _, text) in encoded {
        let path: PathBuf = root.join(entry);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn write_archive(path: &Path, encoded: &[(String, String, String)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (entry, _, text) in encoded {
        zip.start_file(entry.as_str(), options)
            .with_context(|| format!("failed to add {entry} to {}", path.display()))?;
        zip.write_all(text.as_bytes())?;
    }
    zip.finish()
        .with_context(|| format!("failed to finish archive {}", path.display()))?;
    Ok(())
}
