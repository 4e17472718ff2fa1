/*!
Record serializers.

A serializer turns a [`SlotRecord`] into bytes and back. The default JSON format is an
array of `{"Key": <participant id>, "Data": {"$type": <tag>, "value": <state>}}`
objects; zero bytes stand for an empty record so an erased slot loads cleanly.
*/

use crate::record::{SlotEntry, SlotRecord};
use crate::{KeepsakeError, Result};

/// Converts slot records to and from their persisted byte form
pub trait RecordSerializer: Send + Sync {
    /// Encode a record
    fn encode(&self, record: &SlotRecord) -> Result<Vec<u8>>;

    /// Decode bytes produced by [`encode`](Self::encode)
    ///
    /// # Errors
    /// * `KeepsakeError::MalformedRecord` - If the bytes are not a valid record
    fn decode(&self, data: &[u8]) -> Result<SlotRecord>;

    /// Name of the wire format
    fn format_name(&self) -> &str;
}

/// JSON record serializer backed by serde_json
#[derive(Debug, Clone, Default)]
pub struct JsonRecordSerializer {
    pretty: bool,
}

impl JsonRecordSerializer {
    /// Compact output
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented output, easier to read in a text editor
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl RecordSerializer for JsonRecordSerializer {
    fn encode(&self, record: &SlotRecord) -> Result<Vec<u8>> {
        let entries = record.entries();
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(entries)?
        } else {
            serde_json::to_vec(entries)?
        };
        Ok(bytes)
    }

    fn decode(&self, data: &[u8]) -> Result<SlotRecord> {
        if data.is_empty() {
            return Ok(SlotRecord::new());
        }

        let text = std::str::from_utf8(data)
            .map_err(|e| KeepsakeError::malformed(format!("record is not valid UTF-8: {e}")))?;

        let entries: Vec<SlotEntry> = serde_json::from_str(text)
            .map_err(|e| KeepsakeError::malformed(format!("record is not valid JSON: {e}")))?;

        SlotRecord::from_entries(entries)
    }

    fn format_name(&self) -> &str {
        "json"
    }
}
