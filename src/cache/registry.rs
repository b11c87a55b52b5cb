//! Bidirectional tag index.
//!
//! Tracks which entries carry which tags so that tag lookups and per-entry
//! deletes both stay cheap.

use std::collections::{BTreeSet, HashMap, HashSet};

/// Tracks tag → identifiers and identifier → tags mappings.
///
/// Not synchronised on its own; owners keep it behind the same lock as the
/// entries it describes so both views change together.
#[derive(Debug, Default)]
pub struct TagIndex {
    tag_to_entries: HashMap<String, HashSet<String>>,
    entry_to_tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tags of `identifier`, replacing any previous set.
    pub fn register(&mut self, identifier: &str, tags: &[String]) {
        self.unregister(identifier);
        if tags.is_empty() {
            return;
        }

        for tag in tags {
            self.tag_to_entries
                .entry(tag.clone())
                .or_default()
                .insert(identifier.to_string());
        }
        self.entry_to_tags
            .insert(identifier.to_string(), tags.iter().cloned().collect());
    }

    /// Identifiers carrying any of `tags`, sorted and without duplicates.
    pub fn identifiers_for_tags(&self, tags: &[String]) -> BTreeSet<String> {
        tags.iter()
            .filter_map(|tag| self.tag_to_entries.get(tag))
            .flatten()
            .cloned()
            .collect()
    }

    #[cfg(test)]
    pub fn tags_for_identifier(&self, identifier: &str) -> HashSet<String> {
        self.entry_to_tags
            .get(identifier)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop `identifier` from every tag it carried.
    pub fn unregister(&mut self, identifier: &str) {
        let Some(tags) = self.entry_to_tags.remove(identifier) else {
            return;
        };

        for tag in tags {
            if let Some(entries) = self.tag_to_entries.get_mut(&tag) {
                entries.remove(identifier);
                if entries.is_empty() {
                    self.tag_to_entries.remove(&tag);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.tag_to_entries.clear();
        self.entry_to_tags.clear();
    }

    #[cfg(test)]
    pub fn tag_count(&self) -> usize {
        self.tag_to_entries.len()
    }

    #[cfg(test)]
    pub fn entry_count(&self) -> usize {
        self.entry_to_tags.len()
    }
}
