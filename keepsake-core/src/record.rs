/*!
Slot record data model.

A [`SlotRecord`] is everything persisted under one slot: an ordered list of
participant ids paired with the state each participant captured. States travel as
[`TaggedState`], the serializer's document model plus a type tag naming the concrete
shape, so a record can be decoded without knowing every participant type up front.
*/

use crate::{KeepsakeError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Captured state of one participant, tagged with its concrete type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedState {
    /// Stable name of the state's concrete type
    #[serde(rename = "$type")]
    pub type_tag: String,

    /// The state itself in serializer form
    pub value: serde_json::Value,
}

impl TaggedState {
    pub fn new(type_tag: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            value,
        }
    }

    /// Convert a typed state into its tagged form
    pub fn from_state<T: Serialize>(type_tag: &str, state: &T) -> Result<Self> {
        Ok(Self::new(type_tag, serde_json::to_value(state)?))
    }

    /// Convert back into a typed state, checking the tag first
    ///
    /// # Errors
    /// * `KeepsakeError::MalformedRecord` - If the tag differs or the value does not fit `T`
    pub fn into_state<T: DeserializeOwned>(self, expected_tag: &str) -> Result<T> {
        if self.type_tag != expected_tag {
            return Err(KeepsakeError::malformed(format!(
                "type tag mismatch: record holds '{}', participant expects '{}'",
                self.type_tag, expected_tag
            )));
        }
        serde_json::from_value(self.value).map_err(|e| {
            KeepsakeError::malformed(format!("state does not match '{expected_tag}': {e}"))
        })
    }

    /// Size of the value once serialized, for diagnostics
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.value).map(|v| v.len()).unwrap_or(0)
    }
}

/// One `(participant-id, state)` pair of a slot record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    #[serde(rename = "Key")]
    pub key: String,

    #[serde(rename = "Data")]
    pub data: TaggedState,
}

/// Ordered set of participant states persisted under one slot
///
/// Keys are unique within a record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotRecord {
    entries: Vec<SlotEntry>,
}

impl SlotRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from decoded entries, rejecting duplicate keys
    pub fn from_entries(entries: Vec<SlotEntry>) -> Result<Self> {
        let mut record = Self::new();
        for entry in entries {
            if record.contains(&entry.key) {
                return Err(KeepsakeError::malformed(format!(
                    "duplicate participant id '{}'",
                    entry.key
                )));
            }
            record.entries.push(entry);
        }
        Ok(record)
    }

    /// Append a state for `key`
    ///
    /// # Errors
    /// * `KeepsakeError::Validation` - If `key` is already present
    pub fn insert(&mut self, key: impl Into<String>, data: TaggedState) -> Result<()> {
        let key = key.into();
        if self.contains(&key) {
            return Err(KeepsakeError::validation(format!(
                "participant id '{key}' already present in record"
            )));
        }
        self.entries.push(SlotEntry { key, data });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&TaggedState> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.data)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SlotEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[SlotEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<SlotEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a SlotRecord {
    type Item = &'a SlotEntry;
    type IntoIter = std::slice::Iter<'a, SlotEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
