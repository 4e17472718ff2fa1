/*!
The save/load engine.

[`SaveEngine`] owns the participant registry, the per-slot queues and the adapters
(storage, serializer, cipher). Every request names one or more slots; each slot is
processed as its own task on the worker pool, behind any earlier operation on the same
slot, and the request resolves once all of its slots have finished.
*/

use crate::cipher;
use crate::identity;
use crate::config::{EncryptionConfig, EngineConfig};
use crate::participant::{Participant, Saveable};
use crate::queue::{SlotQueue, SlotState, SlotTicket};
use crate::record::SlotRecord;
use crate::registry::ParticipantRegistry;
use crate::serialization::{JsonRecordSerializer, RecordSerializer};
use crate::storage::{LocalFileStorage, StorageBackend};
use crate::worker::WorkerPool;
use crate::{KeepsakeError, Result, SlotFailure};
use bytes::Bytes;
use futures::future::{self, BoxFuture, FutureExt};
use keepsake_retry::RetryPolicy;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// The four request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Save,
    Load,
    Erase,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Load => "load",
            Self::Erase => "erase",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful slot operation touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotSummary {
    /// Participants captured (save) or restored (load)
    pub participants: usize,
    /// Loaded entries with no live participant
    pub skipped: usize,
    /// Payload bytes written or read
    pub bytes: usize,
}

/// Result of one slot within a request
#[derive(Debug)]
pub struct SlotOutcome {
    pub slot: String,
    pub kind: OperationKind,
    pub result: Result<SlotSummary>,
}

impl SlotOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&KeepsakeError> {
        self.result.as_ref().err()
    }
}

/// Per-slot results of a finished request
#[derive(Debug)]
pub struct RequestReport {
    pub kind: OperationKind,
    pub outcomes: Vec<SlotOutcome>,
}

impl RequestReport {
    /// True if every slot succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(SlotOutcome::is_ok)
    }

    pub fn outcome(&self, slot: &str) -> Option<&SlotOutcome> {
        self.outcomes.iter().find(|o| o.slot == slot)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SlotOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    /// Collapse into `Ok` with per-slot summaries, or one aggregate error
    ///
    /// Successful slots stay persisted even when the aggregate is an error.
    pub fn into_result(self) -> Result<Vec<(String, SlotSummary)>> {
        let mut summaries = Vec::new();
        let mut failures = Vec::new();
        for outcome in self.outcomes {
            match outcome.result {
                Ok(summary) => summaries.push((outcome.slot, summary)),
                Err(error) => failures.push(SlotFailure {
                    slot: outcome.slot,
                    error,
                }),
            }
        }
        if failures.is_empty() {
            Ok(summaries)
        } else {
            Err(KeepsakeError::SlotFailures(failures))
        }
    }
}

/// Completion handle for a submitted request
///
/// Resolves once every named slot has finished. Dropping the handle does not cancel
/// the work; slot operations already submitted still run to completion.
#[must_use = "requests run regardless, but their outcome is only visible through the handle"]
pub struct RequestHandle {
    kind: OperationKind,
    slots: Vec<String>,
    inner: BoxFuture<'static, RequestReport>,
}

impl RequestHandle {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Slots covered by the request, duplicates removed
    pub fn slots(&self) -> &[String] {
        &self.slots
    }
}

impl Future for RequestHandle {
    type Output = RequestReport;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<RequestReport> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("kind", &self.kind)
            .field("slots", &self.slots)
            .finish()
    }
}

struct EngineInner {
    registry: ParticipantRegistry,
    storage: Arc<dyn StorageBackend>,
    serializer: Arc<dyn RecordSerializer>,
    encryption: EncryptionConfig,
    queue: Arc<SlotQueue>,
    pool: WorkerPool,
}

/// Asynchronous save/load engine
///
/// Cheap to clone; clones share the registry, queues and adapters.
///
/// # Example
/// ```rust
/// use keepsake_core::{MemoryStorage, SaveEngine};
///
/// # #[tokio::main]
/// # async fn main() -> keepsake_core::Result<()> {
/// let engine = SaveEngine::builder(MemoryStorage::new()).build()?;
/// // register participants with `engine.register(...)`, then:
/// let report = engine.save(["save.dat"]).await;
/// assert!(report.is_success());
/// engine.load(["save.dat"]).await.into_result()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SaveEngine {
    inner: Arc<EngineInner>,
}

/// Builder for [`SaveEngine`]
pub struct SaveEngineBuilder {
    storage: Arc<dyn StorageBackend>,
    serializer: Arc<dyn RecordSerializer>,
    encryption: EncryptionConfig,
    pool: Option<WorkerPool>,
}

impl SaveEngineBuilder {
    pub fn serializer<R: RecordSerializer + 'static>(mut self, serializer: R) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    pub fn encryption(mut self, encryption: EncryptionConfig) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn worker_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Finish the engine; without an explicit pool the current runtime is used
    ///
    /// # Errors
    /// * `KeepsakeError::Worker` - If no pool was given and no runtime is running
    pub fn build(self) -> Result<SaveEngine> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => WorkerPool::current()?,
        };
        Ok(SaveEngine {
            inner: Arc::new(EngineInner {
                registry: ParticipantRegistry::new(),
                storage: self.storage,
                serializer: self.serializer,
                encryption: self.encryption,
                queue: Arc::new(SlotQueue::new()),
                pool,
            }),
        })
    }
}

impl SaveEngine {
    /// Start building an engine on top of `storage`
    pub fn builder<S: StorageBackend + 'static>(storage: S) -> SaveEngineBuilder {
        SaveEngineBuilder {
            storage: Arc::new(storage),
            serializer: Arc::new(JsonRecordSerializer::new()),
            encryption: EncryptionConfig::default(),
            pool: None,
        }
    }

    /// Build a local-file engine from configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let storage = LocalFileStorage::new(&config.storage.base_path)
            .with_retry_policy(RetryPolicy::new(config.storage.retry_attempts));
        let serializer = if config.pretty_records {
            JsonRecordSerializer::pretty()
        } else {
            JsonRecordSerializer::new()
        };
        Self::builder(storage)
            .serializer(serializer)
            .encryption(config.encryption.clone())
            .worker_pool(WorkerPool::current_or_dedicated(config.worker_threads)?)
            .build()
    }

    /// Register a saveable so later requests on its slot include it
    ///
    /// Registering again with the same slot and id replaces the earlier registration.
    pub fn register<S: Saveable>(&self, saveable: Arc<S>) -> Result<()> {
        self.register_participant(Participant::new(saveable)?);
        Ok(())
    }

    pub fn register_participant(&self, participant: Participant) {
        self.inner.registry.register(participant);
    }

    /// Stop including a saveable; returns false if it was not registered
    pub fn unregister<S: Saveable>(&self, saveable: &S) -> bool {
        self.inner.registry.unregister(saveable.slot(), saveable.id())
    }

    pub fn unregister_id(&self, slot: &str, id: &str) -> bool {
        self.inner.registry.unregister(slot, id)
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.inner.registry
    }

    pub fn worker_pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Capture every participant of each slot and write the slots
    pub fn save<I, S>(&self, slots: I) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(OperationKind::Save, slots, None)
    }

    /// [`save`](Self::save) with a password overriding the configured one
    pub fn save_with_password<I, S>(&self, slots: I, password: &str) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(OperationKind::Save, slots, Some(password.to_string()))
    }

    /// Read each slot and restore every registered participant found in it
    pub fn load<I, S>(&self, slots: I) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(OperationKind::Load, slots, None)
    }

    /// [`load`](Self::load) with a password overriding the configured one
    pub fn load_with_password<I, S>(&self, slots: I, password: &str) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(OperationKind::Load, slots, Some(password.to_string()))
    }

    /// Blank each slot, keeping it present
    pub fn erase<I, S>(&self, slots: I) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(OperationKind::Erase, slots, None)
    }

    /// Remove each slot from storage
    pub fn delete<I, S>(&self, slots: I) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(OperationKind::Delete, slots, None)
    }

    /// Read and decode a slot without restoring anything
    ///
    /// This does not wait behind queued operations on the slot.
    pub async fn inspect(&self, slot: &str, password: Option<&str>) -> Result<SlotRecord> {
        match self.inner.read_record(slot, password).await? {
            Some((record, _)) => Ok(record),
            None => Ok(SlotRecord::new()),
        }
    }

    /// True while any slot operation is queued or running
    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    /// Number of slot operations queued or running
    pub fn in_flight(&self) -> usize {
        self.inner.queue.in_flight()
    }

    pub fn slot_state(&self, slot: &str) -> SlotState {
        self.inner.queue.state(slot)
    }

    /// Give a nil id a fresh v4 value; see [`identity::ensure_guid`]
    pub fn ensure_guid(id: &mut Uuid) -> Uuid {
        identity::ensure_guid(id)
    }

    fn submit<I, S>(&self, kind: OperationKind, slots: I, password: Option<String>) -> RequestHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for slot in slots {
            let slot = slot.into();
            if !names.contains(&slot) {
                names.push(slot);
            }
        }
        debug!(operation = %kind, slots = ?names, "request submitted");

        let tasks: Vec<BoxFuture<'static, SlotOutcome>> = names
            .iter()
            .map(|slot| self.submit_slot(kind, slot.clone(), password.clone()))
            .collect();

        RequestHandle {
            kind,
            slots: names,
            inner: future::join_all(tasks)
                .map(move |outcomes| RequestReport { kind, outcomes })
                .boxed(),
        }
    }

    fn submit_slot(
        &self,
        kind: OperationKind,
        slot: String,
        password: Option<String>,
    ) -> BoxFuture<'static, SlotOutcome> {
        if slot.trim().is_empty() {
            let outcome = SlotOutcome {
                slot,
                kind,
                result: Err(KeepsakeError::validation("slot name must not be empty")),
            };
            return future::ready(outcome).boxed();
        }

        #[cfg(feature = "metrics")]
        crate::observability::EngineMetrics::global().record_operation(kind.as_str());

        let ticket = self.inner.queue.enqueue(&slot);
        let inner = Arc::clone(&self.inner);
        let task = self
            .inner
            .pool
            .spawn(run_slot(inner, kind, slot.clone(), password, ticket));

        async move {
            task.await.unwrap_or_else(|e| SlotOutcome {
                slot,
                kind,
                result: Err(KeepsakeError::worker(format!("slot task did not finish: {e}"))),
            })
        }
        .boxed()
    }
}

impl fmt::Debug for SaveEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveEngine")
            .field("participants", &self.inner.registry.len())
            .field("in_flight", &self.in_flight())
            .field("cipher", &self.inner.encryption.algorithm)
            .field("format", &self.inner.serializer.format_name())
            .finish()
    }
}

#[instrument(name = "slot", skip(inner, kind, password, ticket), fields(operation = %kind))]
async fn run_slot(
    inner: Arc<EngineInner>,
    kind: OperationKind,
    slot: String,
    password: Option<String>,
    mut ticket: SlotTicket,
) -> SlotOutcome {
    ticket.wait_turn().await;
    debug!("slot operation started");

    let password = password.as_deref();
    let result = match kind {
        OperationKind::Save => inner.save_slot(&slot, password).await,
        OperationKind::Load => inner.load_slot(&slot, password).await,
        OperationKind::Erase => inner.erase_slot(&slot).await,
        OperationKind::Delete => inner.delete_slot(&slot).await,
    };

    match &result {
        Ok(summary) => info!(
            participants = summary.participants,
            skipped = summary.skipped,
            bytes = summary.bytes,
            "slot operation completed"
        ),
        Err(e) => {
            warn!(error = %e, "slot operation failed");
            #[cfg(feature = "metrics")]
            crate::observability::EngineMetrics::global().record_failure(kind.as_str());
        }
    }

    ticket.complete(result.is_ok());
    SlotOutcome { slot, kind, result }
}

impl EngineInner {
    fn worker_error(e: tokio::task::JoinError) -> KeepsakeError {
        KeepsakeError::worker(format!("blocking task failed: {e}"))
    }

    async fn save_slot(&self, slot: &str, password: Option<&str>) -> Result<SlotSummary> {
        let participants = self.registry.participants_for(slot);
        let mut record = SlotRecord::new();
        for participant in &participants {
            let state = participant.capture()?;
            record.insert(participant.id(), state)?;
        }
        debug!(participants = record.len(), "captured slot record");

        let serializer = Arc::clone(&self.serializer);
        let algorithm = self.encryption.algorithm;
        let key = self.encryption.resolve_password(password).map(str::to_owned);
        let payload = self
            .pool
            .spawn_blocking(move || -> Result<Vec<u8>> {
                let encoded = serializer.encode(&record)?;
                Ok(cipher::transform(&encoded, key.as_deref(), algorithm))
            })
            .await
            .map_err(Self::worker_error)??;

        let bytes = payload.len();
        self.storage
            .write(slot, Bytes::from(payload))
            .await
            .map_err(|e| KeepsakeError::backend(slot, e))?;

        #[cfg(feature = "metrics")]
        crate::observability::EngineMetrics::global().record_payload(bytes);

        Ok(SlotSummary {
            participants: participants.len(),
            skipped: 0,
            bytes,
        })
    }

    /// Read, decrypt and decode a slot; `None` if the slot does not exist
    async fn read_record(
        &self,
        slot: &str,
        password: Option<&str>,
    ) -> Result<Option<(SlotRecord, usize)>> {
        let raw = self
            .storage
            .read(slot)
            .await
            .map_err(|e| KeepsakeError::backend(slot, e))?;
        let Some(raw) = raw else {
            debug!("slot not found, treating it as empty");
            return Ok(None);
        };

        let bytes = raw.len();
        let serializer = Arc::clone(&self.serializer);
        let algorithm = self.encryption.algorithm;
        let key = self.encryption.resolve_password(password).map(str::to_owned);
        let record = self
            .pool
            .spawn_blocking(move || {
                let plain = cipher::transform(&raw, key.as_deref(), algorithm);
                serializer.decode(&plain)
            })
            .await
            .map_err(Self::worker_error)?
            .map_err(|e| KeepsakeError::load_failed(slot, e))?;
        Ok(Some((record, bytes)))
    }

    async fn load_slot(&self, slot: &str, password: Option<&str>) -> Result<SlotSummary> {
        let Some((record, bytes)) = self.read_record(slot, password).await? else {
            return Ok(SlotSummary::default());
        };

        let participants = self.registry.participants_for(slot);
        let by_id: HashMap<&str, &Participant> =
            participants.iter().map(|p| (p.id(), p)).collect();

        // decode every state before applying any of them
        let mut pending = Vec::new();
        let mut skipped = 0;
        for entry in record.into_entries() {
            match by_id.get(entry.key.as_str()) {
                Some(participant) => pending.push(
                    participant
                        .prepare_restore(entry.data)
                        .map_err(|e| KeepsakeError::load_failed(slot, e))?,
                ),
                None => {
                    debug!(participant = %entry.key, "no live participant, skipping entry");
                    skipped += 1;
                }
            }
        }

        let restored = pending.len();
        for restore in pending {
            restore();
        }

        #[cfg(feature = "metrics")]
        crate::observability::EngineMetrics::global().record_payload(bytes);

        Ok(SlotSummary {
            participants: restored,
            skipped,
            bytes,
        })
    }

    async fn erase_slot(&self, slot: &str) -> Result<SlotSummary> {
        self.storage
            .truncate(slot)
            .await
            .map_err(|e| KeepsakeError::backend(slot, e))?;
        Ok(SlotSummary::default())
    }

    async fn delete_slot(&self, slot: &str) -> Result<SlotSummary> {
        self.storage
            .delete(slot)
            .await
            .map_err(|e| KeepsakeError::backend(slot, e))?;
        Ok(SlotSummary::default())
    }
}
