//! Typed handles to containers
//!
//! A handle is a document handle plus a container id. Reads notify the document's read
//! trackers; writes join the open transaction or commit one of their own.

use crate::content::{Content, Value};
use crate::document::Document;
use crate::error::DocError;
use braid_core::ContainerId;

/// Handle to a sequence container
#[derive(Debug, Clone)]
pub struct SequenceRef {
    doc: Document,
    id: ContainerId,
}

impl SequenceRef {
    pub(crate) fn new(doc: Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    /// Container id
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Number of visible elements
    pub fn len(&self) -> Result<usize, DocError> {
        self.doc.read(&self.id, |store| store.seq_len(&self.id))
    }

    /// Whether the sequence has no visible elements
    pub fn is_empty(&self) -> Result<bool, DocError> {
        Ok(self.len()? == 0)
    }

    /// Element at a visible index
    pub fn get(&self, index: usize) -> Result<Option<Value>, DocError> {
        self.doc.read(&self.id, |store| store.seq_get(&self.id, index))
    }

    /// Nested map at a visible index, if that element is a map
    pub fn get_map(&self, index: usize) -> Result<Option<MapRef>, DocError> {
        match self.get(index)? {
            Some(Value::Container(id)) => self.doc.map_ref(&id).map(Some),
            _ => Ok(None),
        }
    }

    /// All visible elements in order
    pub fn to_vec(&self) -> Result<Vec<Value>, DocError> {
        self.doc.read(&self.id, |store| store.seq_values(&self.id))
    }

    /// Append an element
    pub fn push(&self, content: impl Into<Content>) -> Result<Value, DocError> {
        let content = content.into();
        self.doc.mutate(|store, buf| {
            let len = store.seq_len(&self.id)?;
            store.local_insert(&self.id, len, content, buf)
        })
    }

    /// Insert an element before the visible index (`index == len` appends)
    pub fn insert(&self, index: usize, content: impl Into<Content>) -> Result<Value, DocError> {
        let content = content.into();
        self.doc
            .mutate(|store, buf| store.local_insert(&self.id, index, content, buf))
    }

    /// Delete `len` visible elements starting at `index`
    pub fn delete(&self, index: usize, len: usize) -> Result<(), DocError> {
        self.doc
            .mutate(|store, buf| store.local_delete(&self.id, index, len, buf))
    }

    /// Append a new map populated with `entries`, in one transaction
    pub fn push_map<K, C, I>(&self, entries: I) -> Result<MapRef, DocError>
    where
        K: Into<String>,
        C: Into<Content>,
        I: IntoIterator<Item = (K, C)>,
    {
        match self.push(Content::map(entries))? {
            Value::Container(id) => Ok(MapRef::new(self.doc.clone(), id)),
            _ => Err(DocError::UnknownContainer {
                container: self.id.clone(),
            }),
        }
    }
}

/// Handle to a map container
#[derive(Debug, Clone)]
pub struct MapRef {
    doc: Document,
    id: ContainerId,
}

impl MapRef {
    pub(crate) fn new(doc: Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    /// Container id
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Value under `key`
    pub fn get(&self, key: &str) -> Result<Option<Value>, DocError> {
        self.doc.read(&self.id, |store| store.map_get(&self.id, key))
    }

    /// Present keys in sorted order
    pub fn keys(&self) -> Result<Vec<String>, DocError> {
        Ok(self.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    /// Number of present keys
    pub fn len(&self) -> Result<usize, DocError> {
        Ok(self.entries()?.len())
    }

    /// Whether no key is present
    pub fn is_empty(&self) -> Result<bool, DocError> {
        Ok(self.len()? == 0)
    }

    /// Present entries in key order
    pub fn entries(&self) -> Result<Vec<(String, Value)>, DocError> {
        self.doc.read(&self.id, |store| store.map_entries(&self.id))
    }

    /// Write `key`
    pub fn set(&self, key: &str, content: impl Into<Content>) -> Result<Value, DocError> {
        let content = content.into();
        self.doc
            .mutate(|store, buf| store.local_set(&self.id, key, content, buf))
    }

    /// Remove `key`; returns whether it was present
    pub fn remove(&self, key: &str) -> Result<bool, DocError> {
        self.doc
            .mutate(|store, buf| store.local_remove(&self.id, key, buf))
    }

    /// Write a new nested map under `key`, populated with `entries`
    pub fn set_map<K, C, I>(&self, key: &str, entries: I) -> Result<MapRef, DocError>
    where
        K: Into<String>,
        C: Into<Content>,
        I: IntoIterator<Item = (K, C)>,
    {
        match self.set(key, Content::map(entries))? {
            Value::Container(id) => Ok(MapRef::new(self.doc.clone(), id)),
            _ => Err(DocError::UnknownContainer {
                container: self.id.clone(),
            }),
        }
    }
}
