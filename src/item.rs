//! Scenario instruction items.
//!
//! A scenario is a program of [`Item`]s. Each item carries a process-unique
//! [`ItemUid`], an optional author-level tag, and an [`ItemKind`] payload.
//! Shapes are fixed after load; only the runtime fields of [`Message`]
//! (`payload`, `processed`, `stamp`) change while playing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::payload::PayloadTemplate;
use crate::value::VarValue;

/// Program counter: position of an item in its scenario's sequence.
pub type Pc = usize;

/// Process-unique item identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemUid(u64);

impl ItemUid {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value. Uniqueness is the caller's responsibility.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item#{}", self.0)
    }
}

/// Message direction as seen from the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Sent by the player to the element under test.
    Tx,
    /// Expected from the element under test.
    Rx,
}

/// What a timing offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBase {
    /// The moment the item is dispatched.
    Dispatch,
    /// The scenario's start.
    ScenarioStart,
    /// The recorded timestamp of a prior message item.
    Item(ItemUid),
}

/// Deadline (rx) or send delay (tx) of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Offset from the base.
    pub after: Duration,
    /// Reference point.
    pub base: TimeBase,
}

impl Timing {
    /// Offset from dispatch time.
    #[must_use]
    pub fn after_dispatch(after: Duration) -> Self {
        Self {
            after,
            base: TimeBase::Dispatch,
        }
    }
}

/// Copy a decoded field of an arrived message into a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// Field name in the arrived message.
    pub field: String,
    /// Variable receiving the value.
    pub var: String,
}

/// A message to send or expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Send or expect.
    pub direction: Direction,
    /// Sending task.
    pub sender: String,
    /// Receiving task.
    pub receiver: String,
    /// Message type name.
    pub identity: String,
    /// Deadline for rx, optional send delay for tx.
    pub timing: Option<Timing>,
    /// Payload template.
    pub template: PayloadTemplate,
    /// Fields copied into variables on receipt.
    pub extract: Vec<Extraction>,
    /// Variables whose change forces payload regeneration.
    pub depends_on: Vec<String>,
    /// Last rendered payload.
    pub payload: Option<Vec<u8>>,
    /// Sent or received.
    pub processed: bool,
    /// Send or receipt time, as an offset of the player clock.
    pub stamp: Option<Duration>,
}

impl Message {
    /// Create a message with no timing, extractions or runtime state.
    #[must_use]
    pub fn new(
        direction: Direction,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        identity: impl Into<String>,
        template: PayloadTemplate,
    ) -> Self {
        let depends_on = template.variables().into_iter().map(String::from).collect();
        Self {
            direction,
            sender: sender.into(),
            receiver: receiver.into(),
            identity: identity.into(),
            timing: None,
            template,
            extract: Vec::new(),
            depends_on,
            payload: None,
            processed: false,
            stamp: None,
        }
    }

    /// Whether an arrival with this identity triple satisfies the item.
    #[must_use]
    pub fn matches(&self, sender: &str, receiver: &str, identity: &str) -> bool {
        self.direction == Direction::Rx
            && self.sender == sender
            && self.receiver == receiver
            && self.identity == identity
    }
}

/// Comparison used by conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    #[serde(rename = "==", alias = "eq")]
    Eq,
    /// `!=`
    #[serde(rename = "!=", alias = "ne")]
    Ne,
    /// `>`
    #[serde(rename = ">", alias = "gt")]
    Gt,
    /// `>=`
    #[serde(rename = ">=", alias = "ge")]
    Ge,
    /// `<`
    #[serde(rename = "<", alias = "lt")]
    Lt,
    /// `<=`
    #[serde(rename = "<=", alias = "le")]
    Le,
}

impl CmpOp {
    /// Evaluate `lhs <op> rhs`.
    #[must_use]
    pub fn eval(self, lhs: i128, rhs: i128) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        };
        f.write_str(s)
    }
}

/// Source of a `SetVar`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetSource {
    /// Literal value.
    Value(VarValue),
    /// Current value of another variable.
    Var(String),
}

/// Conditional jump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpCond {
    /// Tested variable (numeric).
    pub var: String,
    /// Comparison.
    pub op: CmpOp,
    /// Right-hand constant.
    pub value: i64,
    /// Label jumped to when the comparison holds.
    pub label: String,
}

/// Variable names read and written by an authentication computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthBindings {
    /// Network challenge (16 bytes).
    pub rand: String,
    /// Authentication token (16 bytes).
    pub autn: String,
    /// Response written back.
    pub res: String,
    /// Cipher key written back.
    pub ck: String,
    /// Integrity key written back.
    pub ik: String,
}

impl Default for AuthBindings {
    fn default() -> Self {
        Self {
            rand: "RAND".into(),
            autn: "AUTN".into(),
            res: "RES".into(),
            ck: "CK".into(),
            ik: "IK".into(),
        }
    }
}

impl AuthBindings {
    /// Every variable name referenced.
    #[must_use]
    pub fn names(&self) -> [&str; 5] {
        [&self.rand, &self.autn, &self.res, &self.ck, &self.ik]
    }
}

/// Per-kind payload of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    /// Send or expect a message.
    Message(Message),
    /// Jump target.
    Label(String),
    /// Variable declaration; load-time only, never dispatched.
    Variable(String),
    /// Assign a variable.
    SetVar {
        /// Target variable.
        var: String,
        /// Value source.
        source: SetSource,
    },
    /// Add one to a numeric variable.
    IncrVar(String),
    /// Subtract one from a numeric variable.
    DecrVar(String),
    /// Conditional jump.
    JumpCond(JumpCond),
    /// Suspend for a duration.
    Sleep(Duration),
    /// Stop the scenario: 0 is success, anything else failure.
    Exit(i32),
    /// Compute the authentication response from challenge variables.
    ComputeAuthParam(AuthBindings),
}

impl ItemKind {
    /// Short kind name for logs and traces.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(m) if m.direction == Direction::Tx => "tx_message",
            Self::Message(_) => "rx_message",
            Self::Label(_) => "label",
            Self::Variable(_) => "var",
            Self::SetVar { .. } => "set_var",
            Self::IncrVar(_) => "incr_var",
            Self::DecrVar(_) => "decr_var",
            Self::JumpCond(_) => "jump_cond",
            Self::Sleep(_) => "sleep",
            Self::Exit(_) => "exit",
            Self::ComputeAuthParam(_) => "compute_authentication_response_parameter",
        }
    }
}

/// One instruction of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Process-unique identifier.
    pub uid: ItemUid,
    /// Author-level name, used by relative timeouts.
    pub tag: Option<String>,
    /// Payload.
    pub kind: ItemKind,
}

impl Item {
    /// Create an item with a fresh uid.
    #[must_use]
    pub fn new(kind: ItemKind) -> Self {
        Self {
            uid: ItemUid::fresh(),
            tag: None,
            kind,
        }
    }

    /// Attach an author-level tag.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// The message payload, if this is a message item.
    #[must_use]
    pub fn as_message(&self) -> Option<&Message> {
        match &self.kind {
            ItemKind::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Mutable message payload, if this is a message item.
    pub fn as_message_mut(&mut self) -> Option<&mut Message> {
        match &mut self.kind {
            ItemKind::Message(m) => Some(m),
            _ => None,
        }
    }
}
