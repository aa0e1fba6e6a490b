use super::{ContentStore, NewRecord, RecordId, StoreError, TermStore};
use crate::model::{MetaEntry, ParsedTerm, PostStatus, PostType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Title given to a metadata record created on demand.
pub const BOOK_INFO_TITLE: &str = "Book Info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub post_type: PostType,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordId>,
    pub status: PostStatus,
    pub menu_order: u32,
    pub meta: Vec<MetaEntry>,
    /// taxonomy -> slugs
    pub terms: BTreeMap<String, Vec<String>>,
}

impl Record {
    pub fn meta_values(&self, key: &str) -> Vec<&str> {
        self.meta
            .iter()
            .filter(|m| m.key == key)
            .map(|m| m.value.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTerm {
    pub name: String,
    pub taxonomy: String,
    pub description: String,
    pub slug: String,
}

/// In-memory book: records in creation order plus the term table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    pub records: Vec<Record>,
    pub terms: Vec<StoredTerm>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: RecordId) -> Result<&mut Record, StoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::UnknownRecord(id))
    }

    pub fn records_of_type(&self, t: &PostType) -> impl Iterator<Item = &Record> + '_ {
        let t = t.clone();
        self.records.iter().filter(move |r| r.post_type == t)
    }

    fn push(
        &mut self,
        post_type: PostType,
        title: &str,
        content: &str,
        parent: Option<RecordId>,
        status: PostStatus,
    ) -> RecordId {
        self.next_id += 1;
        let id = RecordId(self.next_id);
        self.records.push(Record {
            id,
            post_type,
            title: title.to_string(),
            content: content.to_string(),
            parent,
            status,
            menu_order: 0,
            meta: Vec::new(),
            terms: BTreeMap::new(),
        });
        id
    }
}

impl ContentStore for MemoryStore {
    fn create_record(&mut self, record: NewRecord<'_>) -> Result<RecordId, StoreError> {
        Ok(self.push(
            record.post_type.clone(),
            record.title,
            record.content.unwrap_or_default(),
            record.parent,
            record.status,
        ))
    }

    fn get_or_create_metadata_record(&mut self) -> Result<RecordId, StoreError> {
        if let Some(existing) = self.records_of_type(&PostType::Metadata).next() {
            return Ok(existing.id);
        }
        Ok(self.push(
            PostType::Metadata,
            BOOK_INFO_TITLE,
            "",
            None,
            PostStatus::Publish,
        ))
    }

    fn set_record_meta(
        &mut self,
        id: RecordId,
        key: &str,
        value: &str,
        multivalued: bool,
    ) -> Result<(), StoreError> {
        let record = self.get_mut(id)?;
        if !multivalued {
            record.meta.retain(|m| m.key != key);
        }
        record.meta.push(MetaEntry {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn clear_meta_by_prefix(&mut self, id: RecordId, prefix: &str) -> Result<(), StoreError> {
        self.get_mut(id)?.meta.retain(|m| !m.key.starts_with(prefix));
        Ok(())
    }

    fn associate_terms(
        &mut self,
        id: RecordId,
        slugs: &[&str],
        taxonomy: &str,
    ) -> Result<(), StoreError> {
        let assigned = self
            .get_mut(id)?
            .terms
            .entry(taxonomy.to_string())
            .or_default();
        for slug in slugs {
            if !assigned.iter().any(|s| s == slug) {
                assigned.push(slug.to_string());
            }
        }
        Ok(())
    }

    fn reorder_record(&mut self, id: RecordId) -> Result<(), StoreError> {
        let (post_type, parent) = {
            let r = self.get_mut(id)?;
            (r.post_type.clone(), r.parent)
        };
        let last = self
            .records
            .iter()
            .filter(|r| r.id != id && r.post_type == post_type && r.parent == parent)
            .map(|r| r.menu_order)
            .max()
            .unwrap_or(0);
        self.get_mut(id)?.menu_order = last + 1;
        Ok(())
    }

    fn default_chapter_parent(&self) -> Option<RecordId> {
        self.records_of_type(&PostType::Part).next().map(|r| r.id)
    }
}

impl TermStore for MemoryStore {
    fn term_exists(&self, name: &str, taxonomy: &str) -> bool {
        self.terms
            .iter()
            .any(|t| t.taxonomy == taxonomy && (t.name == name || t.slug == name))
    }

    fn create_term(&mut self, term: &ParsedTerm) -> Result<(), StoreError> {
        self.terms.push(StoredTerm {
            name: term.name.clone(),
            taxonomy: term.taxonomy.clone(),
            description: term.description.clone(),
            slug: term.slug.clone(),
        });
        Ok(())
    }
}
