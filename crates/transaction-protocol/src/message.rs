//! Message payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One part of a message: an opaque byte blob plus string metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    data: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, String>,
}

impl Part {
    /// Create a part with no metadata.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Raw content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replace the content.
    pub fn set_data(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
    }

    /// Consume the part, returning its content.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Allocated size of the content, the unit the buffer accounts in.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Look up a metadata value.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Set a metadata value, replacing any previous one.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Remove a metadata value.
    pub fn remove_metadata(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    /// Iterate metadata in key order.
    pub fn metadata_iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.metadata.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builder-style metadata setter.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_metadata(key, value);
        self
    }
}

/// An ordered sequence of parts.
///
/// `Clone` is a deep copy: mutating a clone never affects the original.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    parts: Vec<Part>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a message with one metadata-free part per blob.
    pub fn from_bytes<I, B>(blobs: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        blobs.into_iter().map(Part::new).collect()
    }

    /// Create a message from existing parts.
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// Append a part.
    pub fn push(&mut self, part: Part) {
        self.parts.push(part);
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Part> {
        self.parts.get(index)
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut [Part] {
        &mut self.parts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Part> {
        self.parts.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Part> {
        self.parts.iter_mut()
    }

    /// Keep only the parts matching the predicate.
    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Part) -> bool,
    {
        self.parts.retain(f);
    }

    pub fn into_parts(self) -> Vec<Part> {
        self.parts
    }

    /// Sum of part capacities.
    pub fn byte_size(&self) -> usize {
        self.parts.iter().map(Part::capacity).sum()
    }
}

impl From<Part> for Message {
    fn from(part: Part) -> Self {
        Self { parts: vec![part] }
    }
}

impl FromIterator<Part> for Message {
    fn from_iter<T: IntoIterator<Item = Part>>(iter: T) -> Self {
        Self {
            parts: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Message {
    type Item = &'a Part;
    type IntoIter = std::slice::Iter<'a, Part>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}
