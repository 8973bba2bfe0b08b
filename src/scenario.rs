//! Scenario: a named program plus its runtime state.
//!
//! Status follows
//! `NULL → LOADING → {LOADED | LOAD_FAILED} → PLAYING → {PAUSED ⇄ PLAYING}
//! → {PLAY_FAILED | PLAY_SUCCESS}`; [`ScenarioStatus::can_transition_to`] is
//! the single authority on which moves are legal, and terminal statuses are
//! never left.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::auth::AuthContext;
use crate::error::{Fault, PlayError};
use crate::item::{ItemUid, Pc};
use crate::program::Program;
use crate::timer::TimerKey;
use crate::transport::InboundMessage;
use crate::vars::VariableStore;

/// Maximum number of resumption events buffered while a scenario is held.
pub const HELD_QUEUE_MAX_SIZE: usize = 128;

/// Scenario lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioStatus {
    /// Created, nothing loaded.
    Null,
    /// Items being built.
    Loading,
    /// Ready to start.
    Loaded,
    /// Program could not be built; never runs.
    LoadFailed,
    /// Executing items.
    Playing,
    /// Suspended awaiting an external event, or held by `pause`.
    Paused,
    /// Stopped on a fault or nonzero exit.
    PlayFailed,
    /// Stopped on exit code 0 or end of program.
    PlaySuccess,
}

impl ScenarioStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::LoadFailed | Self::PlayFailed | Self::PlaySuccess)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ScenarioStatus::{
            LoadFailed, Loaded, Loading, Null, Paused, PlayFailed, PlaySuccess, Playing,
        };
        matches!(
            (self, next),
            (Null, Loading)
                | (Loading, Loaded | LoadFailed)
                | (Loaded, Playing)
                | (Playing, Paused | PlayFailed | PlaySuccess)
                | (Paused, Playing | PlayFailed | PlaySuccess)
        )
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "NULL",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::LoadFailed => "LOAD_FAILED",
            Self::Playing => "PLAYING",
            Self::Paused => "PAUSED",
            Self::PlayFailed => "PLAY_FAILED",
            Self::PlaySuccess => "PLAY_SUCCESS",
        };
        f.write_str(s)
    }
}

/// Index of a scenario within its player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScenarioId(pub u32);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scenario#{}", self.0)
    }
}

/// What a suspended item is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwaitReason {
    /// An expected message, bounded by a deadline.
    Message,
    /// A sleep to elapse.
    Sleep,
    /// The send time of a delayed tx message.
    DelayedSend,
}

/// The item the scenario is suspended on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    /// Position of the awaiting item.
    pub pc: Pc,
    /// Uid of the awaiting item.
    pub uid: ItemUid,
    /// Why it waits.
    pub reason: AwaitReason,
    /// When the wait started.
    pub armed_at: Duration,
    /// When the timer fires; `None` waits indefinitely.
    pub deadline: Option<Duration>,
    /// Timer armed for the deadline.
    pub timer: Option<TimerKey>,
}

/// An external event that resumes a suspended scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resumption {
    /// A message arrived from the transport.
    Arrival(InboundMessage),
    /// A timer fired.
    TimerExpired(TimerKey),
}

/// Observable event recorded while playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// Status changed.
    Status {
        /// Clock offset.
        at: Duration,
        /// Previous status.
        from: ScenarioStatus,
        /// New status.
        to: ScenarioStatus,
    },
    /// An item was dispatched.
    Dispatched {
        /// Clock offset.
        at: Duration,
        /// Position.
        pc: Pc,
        /// Item uid.
        uid: ItemUid,
        /// Item kind name.
        kind: String,
    },
    /// The instruction pointer was redirected by a jump.
    Jumped {
        /// Clock offset.
        at: Duration,
        /// Jump item position.
        from: Pc,
        /// Label position.
        to: Pc,
    },
    /// A tx message was handed to the transport.
    Sent {
        /// Clock offset.
        at: Duration,
        /// Item uid.
        uid: ItemUid,
        /// Message type name.
        identity: String,
        /// Sent payload.
        payload: Vec<u8>,
    },
    /// An expected message arrived.
    Received {
        /// Clock offset.
        at: Duration,
        /// Item uid.
        uid: ItemUid,
        /// Message type name.
        identity: String,
    },
    /// A timer was armed.
    TimerArmed {
        /// Clock offset.
        at: Duration,
        /// Item uid.
        uid: ItemUid,
        /// Deadline offset.
        deadline: Duration,
    },
    /// A timer fired for the awaited item.
    TimerExpired {
        /// Clock offset.
        at: Duration,
        /// Item uid.
        uid: ItemUid,
    },
    /// An arrival matched nothing being awaited.
    Ignored {
        /// Clock offset.
        at: Duration,
        /// Sending task.
        sender: String,
        /// Receiving task.
        receiver: String,
        /// Message type name.
        identity: String,
    },
}

/// A named program with its variables and runtime state.
#[derive(Debug)]
pub struct Scenario {
    pub(crate) id: ScenarioId,
    pub(crate) name: String,
    pub(crate) status: ScenarioStatus,
    pub(crate) program: Program,
    pub(crate) vars: VariableStore,
    pub(crate) auth: AuthContext,
    pub(crate) last_played: Option<Pc>,
    pub(crate) started: Option<Duration>,
    pub(crate) outstanding_timers: usize,
    pub(crate) timer_generation: u64,
    pub(crate) suspension: Option<Suspension>,
    pub(crate) held: bool,
    pub(crate) deferred: VecDeque<Resumption>,
    pub(crate) items_played: usize,
    pub(crate) trace: Vec<TraceEvent>,
    pub(crate) failure: Option<PlayError>,
    pub(crate) exit_code: Option<i32>,
}

impl Scenario {
    /// Create an empty scenario in status NULL.
    #[must_use]
    pub fn new(id: ScenarioId, name: impl Into<String>, auth: AuthContext) -> Self {
        Self {
            id,
            name: name.into(),
            status: ScenarioStatus::Null,
            program: Program::new(),
            vars: VariableStore::new(),
            auth,
            last_played: None,
            started: None,
            outstanding_timers: 0,
            timer_generation: 0,
            suspension: None,
            held: false,
            deferred: VecDeque::new(),
            items_played: 0,
            trace: Vec::new(),
            failure: None,
            exit_code: None,
        }
    }

    /// Player-local identifier.
    #[must_use]
    pub fn id(&self) -> ScenarioId {
        self.id
    }

    /// Scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ScenarioStatus {
        self.status
    }

    /// The program.
    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// The variable store.
    #[must_use]
    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    /// Authentication context.
    #[must_use]
    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Instruction pointer: the item most recently dispatched.
    #[must_use]
    pub fn last_played(&self) -> Option<Pc> {
        self.last_played
    }

    /// Clock offset at which play started.
    #[must_use]
    pub fn started_at(&self) -> Option<Duration> {
        self.started
    }

    /// Time since play started, given the current clock offset.
    #[must_use]
    pub fn elapsed_since_start(&self, now: Duration) -> Duration {
        self.started
            .map_or(Duration::ZERO, |start| now.saturating_sub(start))
    }

    /// Number of armed timers.
    #[must_use]
    pub fn outstanding_timers(&self) -> usize {
        self.outstanding_timers
    }

    /// The item being awaited, if suspended.
    #[must_use]
    pub fn suspension(&self) -> Option<&Suspension> {
        self.suspension.as_ref()
    }

    /// Whether `pause` is holding the scenario.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Number of items dispatched so far.
    #[must_use]
    pub fn items_played(&self) -> usize {
        self.items_played
    }

    /// Recorded trace.
    #[must_use]
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    /// Why the scenario failed, once PLAY_FAILED.
    #[must_use]
    pub fn failure(&self) -> Option<&PlayError> {
        self.failure.as_ref()
    }

    /// Exit code, once terminal.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Move to `next`, recording the change.
    ///
    /// # Errors
    ///
    /// [`Fault::InvalidTransition`] if the state machine forbids the move;
    /// the status is unchanged.
    pub(crate) fn set_status(&mut self, next: ScenarioStatus, at: Duration) -> Result<(), Fault> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(Fault::InvalidTransition { from, to: next });
        }
        self.status = next;
        self.trace.push(TraceEvent::Status { at, from, to: next });
        tracing::info!(scenario = %self.name, %from, to = %next, "status changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScenarioStatus::*;

    const ALL: [ScenarioStatus; 8] = [
        Null,
        Loading,
        Loaded,
        LoadFailed,
        Playing,
        Paused,
        PlayFailed,
        PlaySuccess,
    ];

    #[test]
    fn test_terminal_statuses_are_never_left() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_skipping_predecessors() {
        assert!(!Null.can_transition_to(Loaded));
        assert!(!Loading.can_transition_to(Playing));
        assert!(!Loaded.can_transition_to(PlaySuccess));
        assert!(!Loaded.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
    }

    #[test]
    fn test_set_status_records_trace() {
        let mut s = Scenario::new(ScenarioId(0), "s", AuthContext::default());
        s.set_status(Loading, Duration::ZERO).unwrap();
        assert_eq!(
            s.set_status(Playing, Duration::ZERO),
            Err(Fault::InvalidTransition {
                from: Loading,
                to: Playing
            })
        );
        assert_eq!(s.status(), Loading);
        assert_eq!(s.trace().len(), 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PlaySuccess.to_string(), "PLAY_SUCCESS");
        assert_eq!(LoadFailed.to_string(), "LOAD_FAILED");
    }
}
