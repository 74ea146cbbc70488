//! Spine (reading order) edits.

use tracing::debug;

use super::Project;
use crate::epub::SpineRef;
use crate::error::{Error, Result};

impl Project {
    /// Append an item to the reading order. Already-present items are left
    /// where they are.
    pub fn spine_append(&mut self, id_or_href: &str) -> Result<()> {
        let len = self.package.spine.items.len();
        self.spine_insert(len, id_or_href)
    }

    /// Insert an item at `index` (clamped to the spine length).
    pub fn spine_insert(&mut self, index: usize, id_or_href: &str) -> Result<()> {
        let item = self.require_item(id_or_href)?;
        if self.package.spine.items.iter().any(|r| r.idref == item.id) {
            debug!(id = %item.id, "item already in spine");
            return Ok(());
        }

        let index = index.min(self.package.spine.items.len());
        self.package.spine.items.insert(index, SpineRef::new(&item.id));
        self.persist()
    }

    /// Remove an item from the reading order. Returns whether it was present.
    pub fn spine_remove(&mut self, id_or_href: &str) -> Result<bool> {
        let item = self.require_item(id_or_href)?;
        let before = self.package.spine.items.len();
        self.package.spine.items.retain(|r| r.idref != item.id);
        if self.package.spine.items.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    /// Move the spine entry at `from` to position `to`.
    pub fn spine_move(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.package.spine.items.len();
        if from >= len || to >= len {
            return Err(Error::ItemNotFound(format!(
                "spine position {} (spine has {len} entries)",
                from.max(to)
            )));
        }
        if from == to {
            return Ok(());
        }

        let entry = self.package.spine.items.remove(from);
        self.package.spine.items.insert(to, entry);
        self.persist()
    }

    /// Replace the whole reading order. Every id must be in the manifest;
    /// `linear` flags of entries that stay are kept.
    pub fn set_spine(&mut self, ids: &[&str]) -> Result<()> {
        let mut items = Vec::with_capacity(ids.len());
        for id_or_href in ids {
            let item = self.require_item(id_or_href)?;
            if items.iter().any(|r: &SpineRef| r.idref == item.id) {
                continue;
            }
            let existing = self
                .package
                .spine
                .items
                .iter()
                .find(|r| r.idref == item.id)
                .cloned();
            items.push(existing.unwrap_or_else(|| SpineRef::new(&item.id)));
        }

        self.package.spine.items = items;
        self.persist()
    }

    /// Mark a spine entry as linear or auxiliary (`linear="no"`).
    pub fn set_linear(&mut self, id_or_href: &str, linear: bool) -> Result<()> {
        let item = self.require_item(id_or_href)?;
        let entry = self
            .package
            .spine
            .items
            .iter_mut()
            .find(|r| r.idref == item.id)
            .ok_or_else(|| Error::ItemNotFound(format!("{} in spine", item.id)))?;
        entry.linear = linear;
        self.persist()
    }
}
