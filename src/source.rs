//! Where compiled classes come from.
//!
//! A source only indexes class names up front; class bodies are decoded when
//! the symbol pool first asks for them.

use ignore::WalkBuilder;
use memmap2::Mmap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use zip::ZipArchive;

use crate::class::CompiledClass;
use crate::error::{WeaveError, WeaveResult};

pub const CLASS_FILE_SUFFIX: &str = ".class.json";

pub trait ClassSource: Send + Sync {
    fn describe(&self) -> String;

    /// Every class this source can load, sorted.
    fn class_names(&self) -> Vec<String>;

    /// `Ok(None)` when the source does not know the class.
    fn load(&self, name: &str) -> WeaveResult<Option<CompiledClass>>;
}

pub fn open_source(path: &Path) -> WeaveResult<Box<dyn ClassSource>> {
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::open(path)?));
    }
    if is_archive_path(path) {
        return Ok(Box::new(ArchiveSource::open(path)?));
    }
    Err(WeaveError::malformed(
        path,
        "expected a directory of class files or a .jar/.zip archive",
    ))
}

pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("jar") || e.eq_ignore_ascii_case("zip"))
}

pub fn class_name_to_entry_path(class_name: &str) -> String {
    format!("{}{CLASS_FILE_SUFFIX}", class_name.replace('.', "/"))
}

pub fn entry_path_to_class_name(entry: &str) -> Option<String> {
    let stem = entry.strip_suffix(CLASS_FILE_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }
    Some(stem.replace(['/', '\\'], "."))
}

fn decode_class(path: &Path, expected: &str, raw: &str) -> WeaveResult<CompiledClass> {
    let class: CompiledClass =
        serde_json::from_str(raw).map_err(|e| WeaveError::malformed(path, e))?;
    if class.name != expected {
        return Err(WeaveError::malformed(
            path,
            format!("declares class {} but is stored as {expected}", class.name),
        ));
    }
    Ok(class)
}

pub struct DirectorySource {
    root: PathBuf,
    index: BTreeMap<String, PathBuf>,
}

impl DirectorySource {
    pub fn open(root: &Path) -> WeaveResult<Self> {
        if !root.is_dir() {
            return Err(WeaveError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let (tx, rx) = mpsc::channel();
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .build_parallel();

        walker.run(|| {
            let tx = tx.clone();
            Box::new(move |entry| {
                if let Ok(entry) = entry {
                    let path = entry.path();
                    if path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(CLASS_FILE_SUFFIX))
                    {
                        let _ = tx.send(path.to_path_buf());
                    }
                }
                ignore::WalkState::Continue
            })
        });
        drop(tx);

        let mut index = BTreeMap::new();
        for path in rx.iter() {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if let Some(name) = entry_path_to_class_name(&relative) {
                index.insert(name, path);
            }
        }

        tracing::debug!(root = %root.display(), classes = index.len(), "indexed class directory");
        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }
}

impl ClassSource for DirectorySource {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn class_names(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> WeaveResult<Option<CompiledClass>> {
        let Some(path) = self.index.get(name) else {
            return Ok(None);
        };
        let raw = std::fs::read_to_string(path).map_err(|e| WeaveError::io(path, e))?;
        decode_class(path, name, &raw).map(Some)
    }
}

/// The archive is mapped and its central directory read once; entries are
/// inflated on demand.
pub struct ArchiveSource {
    path: PathBuf,
    index: BTreeMap<String, String>,
    archive: Mutex<ZipArchive<Cursor<Mmap>>>,
}

impl ArchiveSource {
    pub fn open(path: &Path) -> WeaveResult<Self> {
        let mmap = map_archive(path)?;
        let mut archive =
            ZipArchive::new(Cursor::new(mmap)).map_err(|e| WeaveError::malformed(path, e))?;

        let mut index = BTreeMap::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| WeaveError::malformed(path, e))?;
            let entry_name = entry.name().to_string();
            if let Some(class_name) = entry_path_to_class_name(&entry_name) {
                index.insert(class_name, entry_name);
            }
        }

        tracing::debug!(archive = %path.display(), classes = index.len(), "indexed class archive");
        Ok(Self {
            path: path.to_path_buf(),
            index,
            archive: Mutex::new(archive),
        })
    }
}

impl ClassSource for ArchiveSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn class_names(&self) -> Vec<String> {
        self.index.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> WeaveResult<Option<CompiledClass>> {
        let Some(entry_name) = self.index.get(name) else {
            return Ok(None);
        };
        let mut raw = String::new();
        {
            let mut archive = self.archive.lock();
            let mut entry = archive
                .by_name(entry_name)
                .map_err(|e| WeaveError::malformed(&self.path, e))?;
            entry
                .read_to_string(&mut raw)
                .map_err(|e| WeaveError::io(&self.path, e))?;
        }
        let entry_path = self.path.join(entry_name);
        decode_class(&entry_path, name, &raw).map(Some)
    }
}

fn map_archive(path: &Path) -> WeaveResult<Mmap> {
    let file = File::open(path).map_err(|e| WeaveError::io(path, e))?;
    // SAFETY: The file is opened read-only and archives are not modified
    // while a pass runs.
    unsafe { Mmap::map(&file) }.map_err(|e| WeaveError::io(path, e))
}

/// Classes held in memory, e.g. the output of the Java front end.
#[derive(Debug, Default)]
pub struct MemorySource {
    classes: HashMap<String, CompiledClass>,
}

impl MemorySource {
    pub fn new(classes: impl IntoIterator<Item = CompiledClass>) -> Self {
        Self {
            classes: classes.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }
}

impl ClassSource for MemorySource {
    fn describe(&self) -> String {
        format!("<memory: {} classes>", self.classes.len())
    }

    fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    fn load(&self, name: &str) -> WeaveResult<Option<CompiledClass>> {
        Ok(self.classes.get(name).cloned())
    }
}
