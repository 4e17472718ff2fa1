/*!
# Keepsake Core Engine

Asynchronous save/load engine for live application objects.

Objects implement [`Saveable`] and register with a [`SaveEngine`]. The engine groups
them by slot (a named persisted unit, usually a file) and can:

- capture every participant of a slot and write the slot
- read a slot back and restore the participants that are still registered
- erase or delete slots

Each request names one or more slots and returns a [`RequestHandle`] future. Operations
on the same slot run one at a time in submission order; different slots run in parallel
on the worker pool.

## Architecture

- Storage is a port ([`StorageBackend`]) with local-file and in-memory adapters
- Records go through a [`RecordSerializer`] (JSON by default) and an optional cipher
- Participants are held type-erased; a type tag in every entry routes decoded state
  back to the right concrete type

## Usage

```rust,no_run
use keepsake_core::{CaptureError, EngineConfig, SaveEngine, Saveable};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Clone, Serialize, Deserialize)]
struct Inventory { items: Vec<String> }

struct Backpack { items: Mutex<Inventory> }

impl Saveable for Backpack {
    type State = Inventory;
    const TYPE_TAG: &'static str = "backpack.v1";

    fn id(&self) -> &str { "backpack" }
    fn slot(&self) -> &str { "save.dat" }
    fn capture(&self) -> Result<Inventory, CaptureError> {
        Ok(self.items.lock().map_err(|e| CaptureError::new(e.to_string()))?.clone())
    }
    fn restore(&self, state: Inventory) {
        if let Ok(mut items) = self.items.lock() { *items = state; }
    }
}

# #[tokio::main]
# async fn main() -> keepsake_core::Result<()> {
let engine = SaveEngine::from_config(&EngineConfig::local("./saves"))?;
engine.register(Arc::new(Backpack { items: Mutex::new(Inventory { items: vec![] }) }))?;

engine.save(["save.dat"]).await.into_result()?;
engine.load(["save.dat"]).await.into_result()?;
# Ok(())
# }
```
*/

pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod observability;
pub mod participant;
mod queue;
pub mod record;
pub mod registry;
pub mod serialization;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod error_tests;

pub use bytes::Bytes;
pub use uuid::Uuid;

pub use cipher::{Cipher, CipherAlgorithm, NoCipher, XorCipher};
pub use config::{EncryptionConfig, EngineConfig, StorageConfig};
pub use engine::{
    OperationKind, RequestHandle, RequestReport, SaveEngine, SaveEngineBuilder, SlotOutcome,
    SlotSummary,
};
pub use error::{CaptureError, KeepsakeError, Result, SlotFailure};
pub use identity::{ensure_guid, ensure_guid_bytes, ensure_id, new_guid};
#[cfg(feature = "metrics")]
pub use observability::EngineMetrics;
pub use observability::{init_tracing, init_tracing_with_level, LogFormat};
pub use participant::{Participant, Saveable};
pub use queue::SlotState;
pub use record::{SlotEntry, SlotRecord, TaggedState};
pub use registry::ParticipantRegistry;
pub use serialization::{JsonRecordSerializer, RecordSerializer};
pub use storage::{LocalFileStorage, MemoryStorage, SlotInfo, StorageBackend};
pub use worker::WorkerPool;
