/*!
The capture/restore contract between live objects and the engine.

Application types implement [`Saveable`], declaring the concrete shape of their state
and a stable tag for it. The engine only ever holds type-erased [`Participant`]
handles; the tag lets it hand a decoded state back to the right type.
*/

use crate::error::CaptureError;
use crate::record::TaggedState;
use crate::{KeepsakeError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A live object whose state can be saved to and restored from a slot
///
/// Methods take `&self` because the engine calls them from worker threads while the
/// application may still hold the object; use interior mutability for the state.
///
/// # Example
/// ```rust
/// use keepsake_core::{CaptureError, Saveable};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Mutex;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Score { points: u32 }
///
/// struct Scoreboard { id: String, score: Mutex<Score> }
///
/// impl Saveable for Scoreboard {
///     type State = Score;
///     const TYPE_TAG: &'static str = "scoreboard.v1";
///
///     fn id(&self) -> &str { &self.id }
///     fn slot(&self) -> &str { "progress.dat" }
///     fn capture(&self) -> Result<Score, CaptureError> {
///         Ok(self.score.lock().map_err(|e| CaptureError::new(e.to_string()))?.clone())
///     }
///     fn restore(&self, state: Score) {
///         if let Ok(mut score) = self.score.lock() { *score = state; }
///     }
/// }
/// ```
pub trait Saveable: Send + Sync + 'static {
    /// Concrete shape of the captured state
    type State: Serialize + DeserializeOwned + Send + 'static;

    /// Stable tag identifying `State` in persisted records
    const TYPE_TAG: &'static str;

    /// Stable, unique identifier (see [`crate::identity`])
    fn id(&self) -> &str;

    /// Name of the slot this participant's data belongs to
    fn slot(&self) -> &str;

    /// Produce the current state
    fn capture(&self) -> std::result::Result<Self::State, CaptureError>;

    /// Replace the current state with `state`
    fn restore(&self, state: Self::State);
}

/// A restore that has been fully decoded and only needs to be applied
pub(crate) type PendingRestore = Box<dyn FnOnce() + Send>;

trait ErasedSaveable: Send + Sync {
    fn type_tag(&self) -> &'static str;
    fn capture_tagged(&self) -> std::result::Result<TaggedState, CaptureError>;
    fn prepare_restore(&self, state: TaggedState) -> Result<PendingRestore>;
}

struct SaveableAdapter<S: Saveable>(Arc<S>);

impl<S: Saveable> ErasedSaveable for SaveableAdapter<S> {
    fn type_tag(&self) -> &'static str {
        S::TYPE_TAG
    }

    fn capture_tagged(&self) -> std::result::Result<TaggedState, CaptureError> {
        let state = self.0.capture()?;
        TaggedState::from_state(S::TYPE_TAG, &state)
            .map_err(|e| CaptureError::new(format!("state could not be serialized: {e}")))
    }

    fn prepare_restore(&self, state: TaggedState) -> Result<PendingRestore> {
        let typed: S::State = state.into_state(S::TYPE_TAG)?;
        let target = Arc::clone(&self.0);
        Ok(Box::new(move || target.restore(typed)))
    }
}

/// Type-erased handle to a registered [`Saveable`]
#[derive(Clone)]
pub struct Participant {
    id: String,
    slot: String,
    inner: Arc<dyn ErasedSaveable>,
}

impl Participant {
    /// Wrap a saveable, validating its id and slot
    ///
    /// # Errors
    /// * `KeepsakeError::InvalidParticipant` - If the id or slot name is blank
    pub fn new<S: Saveable>(saveable: Arc<S>) -> Result<Self> {
        let id = saveable.id().to_string();
        let slot = saveable.slot().to_string();
        if id.trim().is_empty() {
            return Err(KeepsakeError::invalid_participant(format!(
                "participant of type '{}' in slot '{slot}' has an empty id",
                S::TYPE_TAG
            )));
        }
        if slot.trim().is_empty() {
            return Err(KeepsakeError::invalid_participant(format!(
                "participant '{id}' has an empty slot name"
            )));
        }
        Ok(Self {
            id,
            slot,
            inner: Arc::new(SaveableAdapter(saveable)),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn type_tag(&self) -> &'static str {
        self.inner.type_tag()
    }

    /// Capture the participant's state, naming the participant on failure
    pub(crate) fn capture(&self) -> Result<TaggedState> {
        self.inner
            .capture_tagged()
            .map_err(|e| KeepsakeError::CaptureFailed {
                slot: self.slot.clone(),
                participant: self.id.clone(),
                reason: e.to_string(),
            })
    }

    /// Decode `state` for this participant without applying it yet
    pub(crate) fn prepare_restore(&self, state: TaggedState) -> Result<PendingRestore> {
        self.inner.prepare_restore(state)
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("type_tag", &self.type_tag())
            .finish()
    }
}
