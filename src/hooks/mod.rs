//! Index of cross-reference anchors ("hooks") across content documents.
//!
//! The `id` attributes in the XHTML files are the source of truth; the
//! [`HookIndex`] is a per-file cache of them. Files are re-scanned when
//! marked dirty, when their modification time changes on disk, or when
//! they first appear in the manifest.

mod scan;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::time::SystemTime;

use tracing::{debug, info, warn};

pub use scan::{CONTEXT_CHARS, FileHooks, Hook, scan_hooks};

use crate::epub::paths::{relative_href, resolve_href};
use crate::error::{Error, Result};
use crate::project::Project;

#[derive(Debug)]
struct IndexedFile {
    hooks: FileHooks,
    mtime: Option<SystemTime>,
}

/// Hooks of every HTML document in a project, keyed by manifest href.
#[derive(Debug, Default)]
pub struct HookIndex {
    /// Package directory the hrefs are relative to.
    opf_dir: String,
    files: HashMap<String, IndexedFile>,
    dirty: HashSet<String>,
}

fn modified_time(project: &Project, href: &str) -> Option<SystemTime> {
    let item = project.find_item(href)?;
    fs::metadata(project.item_path(item))
        .and_then(|m| m.modified())
        .ok()
}

impl HookIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything and scan every HTML item of the project.
    ///
    /// Files that cannot be read or parsed are skipped with a warning and
    /// left dirty, so the next [`refresh`](Self::refresh) retries them.
    pub fn build_full_index(&mut self, project: &Project) -> Result<()> {
        self.files.clear();
        self.dirty.clear();
        self.opf_dir = project.opf_dir().to_string();

        for item in project.manifest().iter().filter(|i| i.is_html()) {
            if let Err(e) = self.index_file(project, &item.href) {
                warn!(href = %item.href, error = %e, "could not index file");
                self.dirty.insert(item.href.clone());
            }
        }

        info!(files = self.files.len(), hooks = self.len(), "built hook index");
        Ok(())
    }

    /// Scan one manifest item and replace its entry. Returns the number of
    /// hooks found.
    pub fn index_file(&mut self, project: &Project, href: &str) -> Result<usize> {
        let item = project.require_item(href)?;
        if !item.is_html() {
            return Err(Error::InvalidEpub(format!(
                "{} is not an HTML document ({})",
                item.href, item.media_type
            )));
        }
        self.opf_dir = project.opf_dir().to_string();

        let mtime = modified_time(project, &item.href);
        let text = project.read_text(&item)?;
        let hooks = scan_hooks(&item.href, &text)?;

        if !hooks.duplicates().is_empty() {
            warn!(href = %item.href, ids = ?hooks.duplicates(), "duplicate ids");
        }
        debug!(href = %item.href, hooks = hooks.len(), "indexed file");

        let count = hooks.len();
        self.dirty.remove(&item.href);
        self.files.insert(item.href, IndexedFile { hooks, mtime });
        Ok(count)
    }

    /// Forget a file. Returns whether it was indexed.
    pub fn remove_file(&mut self, href: &str) -> bool {
        self.dirty.remove(href);
        self.files.remove(href).is_some()
    }

    /// Move a file's hooks to its new href after a rename.
    pub fn rename_file(&mut self, old_href: &str, new_href: &str) {
        if self.dirty.remove(old_href) {
            self.dirty.insert(new_href.to_string());
        }
        if let Some(mut entry) = self.files.remove(old_href) {
            entry.hooks.set_href(new_href);
            self.files.insert(new_href.to_string(), entry);
        }
    }

    /// Flag a file for re-scanning on the next refresh.
    pub fn mark_dirty(&mut self, href: &str) {
        self.dirty.insert(href.to_string());
    }

    pub fn is_dirty(&self, href: &str) -> bool {
        self.dirty.contains(href)
    }

    /// Bring the index in line with the project.
    ///
    /// Re-scans dirty files, files changed on disk since they were indexed
    /// and HTML items not yet indexed; drops files no longer in the
    /// manifest. Returns the hrefs that were re-scanned.
    pub fn refresh(&mut self, project: &Project) -> Result<Vec<String>> {
        self.opf_dir = project.opf_dir().to_string();

        let live: HashSet<&str> = project
            .manifest()
            .iter()
            .filter(|i| i.is_html())
            .map(|i| i.href.as_str())
            .collect();
        self.files.retain(|href, _| live.contains(href.as_str()));
        self.dirty.retain(|href| live.contains(href.as_str()));

        let stale: Vec<String> = project
            .manifest()
            .iter()
            .filter(|i| i.is_html())
            .filter(|i| match self.files.get(&i.href) {
                None => true,
                Some(_) if self.dirty.contains(&i.href) => true,
                Some(entry) => entry.mtime != modified_time(project, &i.href),
            })
            .map(|i| i.href.clone())
            .collect();

        let mut refreshed = Vec::with_capacity(stale.len());
        for href in stale {
            match self.index_file(project, &href) {
                Ok(_) => refreshed.push(href),
                Err(e) => {
                    warn!(href = %href, error = %e, "could not re-index file");
                    self.files.remove(&href);
                    self.dirty.insert(href);
                }
            }
        }

        if !refreshed.is_empty() {
            debug!(files = ?refreshed, "refreshed hook index");
        }
        Ok(refreshed)
    }

    pub fn hook_exists(&self, file_href: &str, hook_id: &str) -> bool {
        self.files
            .get(file_href)
            .is_some_and(|f| f.hooks.contains(hook_id))
    }

    pub fn get_hook(&self, file_href: &str, hook_id: &str) -> Option<&Hook> {
        self.files.get(file_href)?.hooks.get(hook_id)
    }

    /// Look an id up in every file. When several files carry it, the one
    /// with the smallest href wins.
    pub fn find_hook(&self, hook_id: &str) -> Option<&Hook> {
        self.files
            .values()
            .filter_map(|f| f.hooks.get(hook_id))
            .min_by(|a, b| a.file_href.cmp(&b.file_href))
    }

    pub fn hooks_in(&self, file_href: &str) -> &[Hook] {
        self.files
            .get(file_href)
            .map(|f| f.hooks.hooks())
            .unwrap_or_default()
    }

    pub fn duplicates_in(&self, file_href: &str) -> &[String] {
        self.files
            .get(file_href)
            .map(|f| f.hooks.duplicates())
            .unwrap_or_default()
    }

    /// Indexed hrefs, sorted.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.files.keys().map(String::as_str).collect();
        files.sort_unstable();
        files
    }

    /// Total number of hooks across all files.
    pub fn len(&self) -> usize {
        self.files.values().map(|f| f.hooks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Href that links from the document `from_href` to `hook_id` in
    /// `to_href`. Both are manifest hrefs.
    pub fn link_to(&self, from_href: &str, to_href: &str, hook_id: &str) -> String {
        let from = resolve_href(&self.opf_dir, from_href);
        let to = resolve_href(&self.opf_dir, to_href);
        if from == to {
            format!("#{hook_id}")
        } else {
            format!("{}#{hook_id}", relative_href(&from, &to))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::project::NewProject;
    use tempfile::TempDir;

    fn indexed_project() -> (TempDir, Project, HookIndex) {
        let dir = TempDir::new().unwrap();
        let mut project = Project::new_project(dir.path(), &NewProject::default()).unwrap();
        project.create_document("chapter2", "Second").unwrap();

        let mut index = HookIndex::new();
        index.build_full_index(&project).unwrap();
        (dir, project, index)
    }

    fn rewrite(project: &Project, href: &str, body: &str) {
        let item = project.find_item(href).unwrap().clone();
        let doc =
            format!("<html xmlns=\"http://www.w3.org/1999/xhtml\"><body>{body}</body></html>");
        project.write_text(&item, &doc).unwrap();
    }

    #[test]
    fn test_build_full_index() {
        let (_dir, _project, index) = indexed_project();

        assert_eq!(
            index.files(),
            vec!["Text/chapter1.xhtml", "Text/chapter2.xhtml", "Text/nav.xhtml"]
        );
        assert!(index.hook_exists("Text/chapter1.xhtml", "toc-1"));
        assert!(index.hook_exists("Text/nav.xhtml", "toc"));
        assert!(!index.hook_exists("Text/chapter2.xhtml", "toc"));
        assert_eq!(index.get_hook("Text/chapter1.xhtml", "toc-1").unwrap().tag_name, "h1");
        assert!(index.hooks_in("Styles/style.css").is_empty());
    }

    #[test]
    fn test_refresh_only_dirty_and_changed() {
        let (_dir, project, mut index) = indexed_project();
        assert!(index.refresh(&project).unwrap().is_empty());

        rewrite(&project, "Text/chapter2.xhtml", r#"<p id="new">Fresh</p>"#);
        index.mark_dirty("Text/chapter2.xhtml");
        assert!(index.is_dirty("Text/chapter2.xhtml"));

        assert_eq!(index.refresh(&project).unwrap(), vec!["Text/chapter2.xhtml"]);
        assert!(!index.is_dirty("Text/chapter2.xhtml"));
        assert_eq!(
            index.get_hook("Text/chapter2.xhtml", "new").unwrap().context_text,
            "Fresh"
        );
    }

    #[test]
    fn test_refresh_sees_out_of_band_edits() {
        let (_dir, project, mut index) = indexed_project();

        let item = project.find_item("Text/chapter1.xhtml").unwrap().clone();
        rewrite(&project, "Text/chapter1.xhtml", r#"<p id="edited">Outside</p>"#);
        let file = fs::File::options()
            .write(true)
            .open(project.item_path(&item))
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();

        assert_eq!(index.refresh(&project).unwrap(), vec!["Text/chapter1.xhtml"]);
        assert!(index.hook_exists("Text/chapter1.xhtml", "edited"));
        assert!(!index.hook_exists("Text/chapter1.xhtml", "toc-1"));
    }

    #[test]
    fn test_refresh_tracks_manifest() {
        let (_dir, mut project, mut index) = indexed_project();

        project.remove_from_manifest("Text/chapter2.xhtml").unwrap();
        project.create_document("extra", "Extra").unwrap();

        let refreshed = index.refresh(&project).unwrap();
        assert_eq!(refreshed, vec!["Text/extra.xhtml"]);
        assert!(!index.files().contains(&"Text/chapter2.xhtml"));
    }

    #[test]
    fn test_rename_and_remove() {
        let (_dir, _project, mut index) = indexed_project();

        index.mark_dirty("Text/chapter1.xhtml");
        index.rename_file("Text/chapter1.xhtml", "Text/opening.xhtml");
        assert!(index.is_dirty("Text/opening.xhtml"));
        assert_eq!(
            index.get_hook("Text/opening.xhtml", "toc-1").unwrap().file_href,
            "Text/opening.xhtml"
        );
        assert!(index.hooks_in("Text/chapter1.xhtml").is_empty());

        assert!(index.remove_file("Text/opening.xhtml"));
        assert!(!index.remove_file("Text/opening.xhtml"));
        assert!(!index.is_dirty("Text/opening.xhtml"));
    }

    #[test]
    fn test_find_hook() {
        let (_dir, _project, index) = indexed_project();
        assert_eq!(
            index.find_hook("toc-1").unwrap().file_href,
            "Text/chapter1.xhtml"
        );
        assert!(index.find_hook("nowhere").is_none());
    }

    #[test]
    fn test_link_to() {
        let mut index = HookIndex::new();
        index.opf_dir = "OEBPS".to_string();

        assert_eq!(index.link_to("Text/a.xhtml", "Text/a.xhtml", "x"), "#x");
        assert_eq!(index.link_to("Text/a.xhtml", "Text/b.xhtml", "x"), "b.xhtml#x");
        assert_eq!(
            index.link_to("Text/a.xhtml", "Notes/n%201.xhtml", "n1"),
            "../Notes/n%201.xhtml#n1"
        );
    }
}
