//! Disk-backed editing model for an unpacked EPUB.
//!
//! A [`Project`] is bound to a working directory holding an OCF container.
//! The parsed [`Package`] is the in-memory tree; every mutation writes it
//! back to the package document and re-reads the file, so the
//! `items_by_id` / `items_by_href` caches are always rebuilt from what is
//! on disk rather than patched in place.

mod manifest;
mod scaffold;
mod spine;
mod validate;

use std::collections::HashMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use crate::epub::package::Package;
use crate::epub::paths::{dir_of, join, relative_href, resolve_href};
use crate::epub::{CONTAINER_PATH, ManifestItem, parse_container_xml};
use crate::error::{Error, Result};
use crate::util::{decode_markup, declare_utf8};

pub use manifest::RenameOutcome;
pub use scaffold::NewProject;
pub(crate) use scaffold::{modified_timestamp, xhtml_document};
pub use validate::{Issue, Severity};

/// An unpacked EPUB project on disk.
#[derive(Debug)]
pub struct Project {
    workdir: PathBuf,
    /// Container path of the package document, e.g. `OEBPS/content.opf`.
    opf_path: String,
    package: Package,
    items_by_id: HashMap<String, ManifestItem>,
    items_by_href: HashMap<String, ManifestItem>,
}

impl Project {
    /// Open an already unpacked EPUB directory.
    pub fn open_folder<P: AsRef<Path>>(workdir: P) -> Result<Self> {
        let workdir = workdir.as_ref().to_path_buf();

        let container_file = workdir.join(CONTAINER_PATH);
        let container = fs::read(&container_file).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::InvalidEpub(format!(
                "missing {CONTAINER_PATH} in {}",
                workdir.display()
            )),
            _ => Error::Io(e),
        })?;
        let opf_path = resolve_href("", &parse_container_xml(&container)?);

        let mut project = Self {
            workdir,
            opf_path,
            package: Package::default(),
            items_by_id: HashMap::new(),
            items_by_href: HashMap::new(),
        };
        project.reload()?;

        info!(
            workdir = %project.workdir.display(),
            opf = %project.opf_path,
            items = project.package.manifest.len(),
            "opened project"
        );
        Ok(project)
    }

    /// Unpack an `.epub` into `dest` and open the result.
    ///
    /// Archive entries whose names would escape `dest` are rejected.
    pub fn open_epub<P: AsRef<Path>, Q: AsRef<Path>>(epub: P, dest: Q) -> Result<Self> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;

        let mut archive = ZipArchive::new(File::open(epub.as_ref())?)?;
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let relative = entry.enclosed_name().ok_or_else(|| {
                Error::InvalidEpub(format!("unsafe entry name '{}'", entry.name()))
            })?;
            let target = dest.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
        }

        debug!(
            epub = %epub.as_ref().display(),
            dest = %dest.display(),
            entries = archive.len(),
            "unpacked archive"
        );
        Self::open_folder(dest)
    }

    /// Re-read the package document and rebuild the lookup caches.
    pub fn reload(&mut self) -> Result<()> {
        let path = self.container_to_path(&self.opf_path);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                Error::InvalidEpub(format!("missing package document {}", self.opf_path))
            }
            _ => Error::Io(e),
        })?;
        self.package = Package::parse(&decode_markup(&bytes))?;

        self.items_by_id.clear();
        self.items_by_href.clear();
        for item in &self.package.manifest {
            self.items_by_id
                .entry(item.id.clone())
                .or_insert_with(|| item.clone());
            self.items_by_href
                .entry(item.href.clone())
                .or_insert_with(|| item.clone());
        }
        Ok(())
    }

    /// Write the in-memory package to disk, then reload it.
    pub(crate) fn persist(&mut self) -> Result<()> {
        let path = self.container_to_path(&self.opf_path);
        fs::write(&path, self.package.to_xml())?;
        self.reload()?;
        debug!(opf = %self.opf_path, items = self.package.manifest.len(), "package persisted");
        Ok(())
    }

    /// Stamp `dcterms:modified` with the current time and persist.
    pub fn touch_modified(&mut self) -> Result<()> {
        self.package.set_modified(&modified_timestamp());
        self.persist()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Container path of the package document.
    pub fn opf_path(&self) -> &str {
        &self.opf_path
    }

    /// Container directory that manifest hrefs are relative to.
    pub fn opf_dir(&self) -> &str {
        dir_of(&self.opf_path)
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn manifest(&self) -> &[ManifestItem] {
        &self.package.manifest
    }

    pub fn spine_ids(&self) -> Vec<&str> {
        self.package
            .spine
            .items
            .iter()
            .map(|r| r.idref.as_str())
            .collect()
    }

    /// Spine entries resolved to manifest items; dangling idrefs are skipped.
    pub fn spine_items(&self) -> Vec<&ManifestItem> {
        self.package
            .spine
            .items
            .iter()
            .filter_map(|r| self.items_by_id.get(&r.idref))
            .collect()
    }

    pub fn item_by_id(&self, id: &str) -> Option<&ManifestItem> {
        self.items_by_id.get(id)
    }

    pub fn item_by_href(&self, href: &str) -> Option<&ManifestItem> {
        self.items_by_href.get(href)
    }

    /// Look up an item by id, then by href as written, then by resolved path.
    pub fn find_item(&self, id_or_href: &str) -> Option<&ManifestItem> {
        self.items_by_id
            .get(id_or_href)
            .or_else(|| self.items_by_href.get(id_or_href))
            .or_else(|| {
                let target = resolve_href(self.opf_dir(), id_or_href);
                self.package
                    .manifest
                    .iter()
                    .find(|item| self.container_path(item) == target)
            })
    }

    pub(crate) fn require_item(&self, id_or_href: &str) -> Result<ManifestItem> {
        self.find_item(id_or_href)
            .cloned()
            .ok_or_else(|| Error::ItemNotFound(id_or_href.to_string()))
    }

    /// Item whose backing file is the given container path.
    pub fn item_at(&self, container_path: &str) -> Option<&ManifestItem> {
        self.package
            .manifest
            .iter()
            .find(|item| self.container_path(item) == container_path)
    }

    /// Container path (relative to the workdir) of an item's backing file.
    pub fn container_path(&self, item: &ManifestItem) -> String {
        resolve_href(self.opf_dir(), &item.href)
    }

    /// Absolute path of an item's backing file.
    pub fn item_path(&self, item: &ManifestItem) -> PathBuf {
        self.container_to_path(&self.container_path(item))
    }

    pub(crate) fn container_to_path(&self, container_path: &str) -> PathBuf {
        container_path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.workdir.clone(), |path, segment| path.join(segment))
    }

    /// Manifest href for an absolute path inside the workdir.
    pub fn href_from_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.workdir).ok()?;
        let container: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(relative_href(&self.opf_path, &container.join("/")))
    }

    /// Href (relative to the package directory) for a container path.
    pub(crate) fn href_for(&self, container_path: &str) -> String {
        relative_href(&self.opf_path, container_path)
    }

    pub fn read_bytes(&self, item: &ManifestItem) -> Result<Vec<u8>> {
        let path = self.item_path(item);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::MissingFile(path),
            _ => Error::Io(e),
        })
    }

    /// Read a text item, decoding legacy encodings.
    pub fn read_text(&self, item: &ManifestItem) -> Result<String> {
        Ok(decode_markup(&self.read_bytes(item)?).into_owned())
    }

    /// Replace a text item's contents (always written as UTF-8).
    pub fn write_text(&self, item: &ManifestItem, text: &str) -> Result<()> {
        let path = self.item_path(item);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = declare_utf8(text);
        fs::write(&path, text.as_bytes())?;
        debug!(href = %item.href, bytes = text.len(), "wrote item");
        Ok(())
    }

    /// A manifest id derived from `base` that is not yet in use.
    pub fn unique_id(&self, base: &str) -> String {
        let mut id: String = base
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if !id.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
            id.insert_str(0, "id-");
        }

        if !self.items_by_id.contains_key(&id) {
            return id;
        }
        (1..)
            .map(|n| format!("{id}-{n}"))
            .find(|candidate| !self.items_by_id.contains_key(candidate))
            .unwrap_or(id)
    }

    /// A container path in `dir` named after `name` that is free both in the
    /// manifest and on disk.
    pub(crate) fn unique_container_path(&self, dir: &str, name: &str) -> String {
        let taken = |candidate: &str| {
            self.item_at(candidate).is_some() || self.container_to_path(candidate).exists()
        };

        let first = join(dir, name);
        if !taken(&first) {
            return first;
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        (1..)
            .map(|n| match ext {
                Some(ext) => join(dir, &format!("{stem}-{n}.{ext}")),
                None => join(dir, &format!("{stem}-{n}")),
            })
            .find(|candidate| !taken(candidate))
            .unwrap_or(first)
    }
}
