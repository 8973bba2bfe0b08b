//! Error taxonomy.
//!
//! Load-time problems are [`LoadError`]s and keep a scenario from ever
//! running. Everything that goes wrong while playing is a [`Fault`], wrapped
//! in a [`PlayError`] that names the scenario and the failing item. Faults are
//! terminal for their scenario: nothing in the engine retries.

use std::time::Duration;

use thiserror::Error;

use crate::item::ItemUid;
use crate::scenario::ScenarioStatus;
use crate::value::VarType;

/// Errors raised while turning a scenario definition into a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A referenced variable is not declared.
    #[error("scenario {scenario}: unknown variable `{name}`")]
    UnknownVariable {
        /// Scenario name.
        scenario: String,
        /// Variable name.
        name: String,
    },
    /// A jump targets a label that does not exist.
    #[error("scenario {scenario}: unknown label `{name}`")]
    UnknownLabel {
        /// Scenario name.
        scenario: String,
        /// Label name.
        name: String,
    },
    /// A relative timeout names an item tag that does not exist.
    #[error("scenario {scenario}: unknown item tag `{tag}`")]
    UnknownItemRef {
        /// Scenario name.
        scenario: String,
        /// Item tag.
        tag: String,
    },
    /// A relative timeout names an item that cannot have been processed
    /// before the referring item runs.
    #[error("scenario {scenario}: item `{tag}` is not a message preceding its reference")]
    ForwardReference {
        /// Scenario name.
        scenario: String,
        /// Item tag.
        tag: String,
    },
    /// A label is declared twice.
    #[error("scenario {scenario}: duplicate label `{name}`")]
    DuplicateLabel {
        /// Scenario name.
        scenario: String,
        /// Label name.
        name: String,
    },
    /// A variable is declared twice.
    #[error("scenario {scenario}: duplicate variable `{name}`")]
    DuplicateVariable {
        /// Scenario name.
        scenario: String,
        /// Variable name.
        name: String,
    },
    /// Two items carry the same tag.
    #[error("scenario {scenario}: duplicate item tag `{tag}`")]
    DuplicateTag {
        /// Scenario name.
        scenario: String,
        /// Item tag.
        tag: String,
    },
    /// Two scenarios share a name.
    #[error("duplicate scenario `{0}`")]
    DuplicateScenario(String),
    /// A literal or operation does not fit the variable's declared type.
    #[error("scenario {scenario}: variable `{name}` is {expected}, got {found}")]
    TypeMismatch {
        /// Scenario name.
        scenario: String,
        /// Variable name.
        name: String,
        /// Declared type.
        expected: VarType,
        /// Offending type.
        found: VarType,
    },
    /// Structurally invalid item.
    #[error("scenario {scenario}: malformed item #{index}: {reason}")]
    MalformedItem {
        /// Scenario name.
        scenario: String,
        /// Position of the item in the definition.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
    /// The scenario was not in a status that allows loading.
    #[error("scenario {scenario}: cannot move from {from} to {to} while loading")]
    InvalidStatus {
        /// Scenario name.
        scenario: String,
        /// Status at the time.
        from: ScenarioStatus,
        /// Status the loader asked for.
        to: ScenarioStatus,
    },
    /// A payload template could not be parsed.
    #[error("invalid payload template: {0}")]
    InvalidTemplate(String),
    /// The scenario document could not be decoded.
    #[error("parse scenario document: {0}")]
    Parse(String),
}

/// Variable store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarError {
    /// A variable with that name already exists.
    #[error("variable `{0}` already declared")]
    Redeclared(String),
    /// No variable with that name.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),
    /// Operation not valid for the variable's type.
    #[error("variable `{name}` is {expected}, got {found}")]
    TypeMismatch {
        /// Variable name.
        name: String,
        /// Declared type.
        expected: VarType,
        /// Type of the attempted value or operation.
        found: VarType,
    },
}

/// Errors from the message transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport refused or failed to deliver the message.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// The underlying channel is closed.
    #[error("channel closed")]
    ChannelClosed,
    /// No route to the receiving task.
    #[error("not connected to `{0}`")]
    NotConnected(String),
}

/// Errors from the authentication bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Challenge or result material has the wrong size.
    #[error("`{name}` must be {expected} bytes, got {found}")]
    InvalidLength {
        /// Variable holding the material.
        name: String,
        /// Required length.
        expected: usize,
        /// Actual length.
        found: usize,
    },
    /// The network's sequence number is not fresh for this USIM.
    #[error("stale sequence number {received} (USIM at {current})")]
    StaleSequence {
        /// Sequence number carried by the challenge.
        received: u64,
        /// Highest sequence number already accepted.
        current: u64,
    },
    /// The external algorithm failed.
    #[error("authentication algorithm: {0}")]
    Algorithm(String),
}

/// Why a scenario stopped playing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// An expected message did not arrive before its deadline.
    #[error("expected message not received within {waited:?}")]
    Timeout {
        /// Time between arming and expiry.
        waited: Duration,
    },
    /// The transport rejected an outgoing message.
    #[error(transparent)]
    SendFailed(#[from] TransportError),
    /// A variable operation failed: unknown name (despite load-time
    /// validation) or a type mismatch such as arithmetic on bytes.
    #[error(transparent)]
    Variable(#[from] VarError),
    /// A label vanished despite load-time validation.
    #[error("unknown label `{0}`")]
    UnknownLabel(String),
    /// The authentication bridge failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The script exited with a nonzero code.
    #[error("exit code {0}")]
    ExitCode(i32),
    /// The scenario was aborted from outside.
    #[error("aborted with code {0}")]
    Aborted(i32),
    /// An arrived message lacks a field the item extracts.
    #[error("arrived message has no field `{0}`")]
    MissingField(String),
    /// A relative timeout refers to an item that has not been processed.
    #[error("timeout reference item {0} was never processed")]
    ReferenceUnprocessed(ItemUid),
    /// Too many items dispatched without awaiting.
    #[error("more than {0} items dispatched without awaiting")]
    StepBudgetExceeded(usize),
    /// A status transition the state machine forbids.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: ScenarioStatus,
        /// Requested status.
        to: ScenarioStatus,
    },
}

/// A runtime failure, attributed to its scenario and item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("scenario {scenario} failed at {}: {fault}", item.map_or_else(|| "<none>".to_string(), |u| u.to_string()))]
pub struct PlayError {
    /// Scenario name.
    pub scenario: String,
    /// Item being played when the fault happened.
    pub item: Option<ItemUid>,
    /// Cause.
    pub fault: Fault,
}

/// Errors surfaced by the player façade and the async runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// No scenario with that name.
    #[error("unknown scenario `{0}`")]
    UnknownScenario(String),
    /// The scenario cannot be started from its current status.
    #[error("scenario `{name}` is {status}, expected LOADED")]
    NotLoaded {
        /// Scenario name.
        name: String,
        /// Current status.
        status: ScenarioStatus,
    },
    /// Another scenario is already current.
    #[error("scenario `{0}` is already playing")]
    Busy(String),
    /// The executor task has stopped.
    #[error("player executor is gone")]
    ExecutorGone,
    /// Loading failed.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// Playing failed.
    #[error(transparent)]
    Play(#[from] PlayError),
}
