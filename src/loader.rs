//! Scenario documents and their validation into playable scenarios.
//!
//! A document is a list of scenarios, each a list of items, readable from
//! TOML (`[[scenario]]` tables with `[[scenario.item]]` entries) or JSON.
//! [`load_scenario`] resolves every label, variable and item reference and
//! either returns a LOADED scenario or a [`LoadError`]; a half-built program
//! is never handed out.
//!
//! ```toml
//! [[scenario]]
//! name = "attach"
//!
//! [[scenario.item]]
//! kind = "var"
//! name = "x"
//! type = "int64"
//! value = 5
//!
//! [[scenario.item]]
//! kind = "message"
//! tag = "attach_request"
//! direction = "tx"
//! sender = "ue"
//! receiver = "mme"
//! identity = "ATTACH_REQUEST"
//! payload = "count=${x}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use crate::auth::{AuthContext, UsimData};
use crate::config::PlayerConfig;
use crate::error::{LoadError, VarError};
use crate::item::{
    AuthBindings, CmpOp, Direction, Extraction, Item, ItemKind, ItemUid, JumpCond, Message,
    SetSource, TimeBase, Timing,
};
use crate::payload::PayloadTemplate;
use crate::program::Duplicate;
use crate::scenario::{Scenario, ScenarioId, ScenarioStatus};
use crate::value::{VarType, VarValue};

/// A document holding several scenarios, played in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDocument {
    /// Scenarios in play order.
    #[serde(default, rename = "scenario")]
    pub scenarios: Vec<ScenarioDef>,
}

impl ScenarioDocument {
    /// Load a document from a file; `.json` files are JSON, anything else TOML.
    ///
    /// # Errors
    ///
    /// [`LoadError::Parse`] if the file cannot be read or decoded.
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::Parse(format!("read {}: {e}", path.display())))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&content)
        } else {
            Self::parse(&content)
        }
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`LoadError::Parse`] if decoding fails.
    pub fn parse(s: &str) -> Result<Self, LoadError> {
        toml::from_str(s).map_err(|e| LoadError::Parse(format!("parse TOML: {e}")))
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// [`LoadError::Parse`] if decoding fails.
    pub fn from_json(s: &str) -> Result<Self, LoadError> {
        serde_json::from_str(s).map_err(|e| LoadError::Parse(format!("parse JSON: {e}")))
    }
}

/// One scenario as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDef {
    /// Unique name.
    pub name: String,
    /// Emulated USIM for authentication items.
    #[serde(default)]
    pub usim: Option<UsimData>,
    /// Items in program order.
    #[serde(default, rename = "item")]
    pub items: Vec<ItemDef>,
}

/// One item as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDef {
    /// Author-level name, referenced by relative timings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Item payload.
    #[serde(flatten)]
    pub kind: ItemDefKind,
}

/// Literal in a document: integer, text or byte array.
///
/// TOML integers are signed, so a uint64 above `i64::MAX` is written as a
/// decimal string there; JSON may use the bare number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    /// Integer, for int64 or non-negative uint64 variables.
    Int(i64),
    /// Integer above `i64::MAX`, for uint64 variables.
    Uint(u64),
    /// UTF-8 text, for bytes variables.
    Text(String),
    /// Raw bytes, for bytes variables.
    Bytes(Vec<u8>),
}

impl Literal {
    fn natural_type(&self) -> VarType {
        match self {
            Self::Int(_) => VarType::Int64,
            Self::Uint(_) => VarType::Uint64,
            Self::Text(_) | Self::Bytes(_) => VarType::Bytes,
        }
    }

    /// Convert into a value of type `ty`.
    fn coerce(&self, ty: VarType) -> Option<VarValue> {
        match (ty, self) {
            (VarType::Int64, Self::Int(v)) => Some(VarValue::Int(*v)),
            (VarType::Int64, Self::Uint(v)) => i64::try_from(*v).ok().map(VarValue::Int),
            (VarType::Uint64, Self::Int(v)) => u64::try_from(*v).ok().map(VarValue::Uint),
            (VarType::Uint64, Self::Uint(v)) => Some(VarValue::Uint(*v)),
            (VarType::Uint64, Self::Text(s)) => s.parse().ok().map(VarValue::Uint),
            (VarType::Bytes, Self::Text(s)) => Some(VarValue::text(s.as_str())),
            (VarType::Bytes, Self::Bytes(b)) => Some(VarValue::Bytes(b.clone())),
            _ => None,
        }
    }
}

/// Reference point of a message timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBaseDef {
    /// When the item is dispatched.
    Dispatch,
    /// When the scenario started.
    ScenarioStart,
    /// When the tagged message item was processed.
    Item(String),
}

/// A message as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDef {
    /// Send or expect.
    pub direction: Direction,
    /// Sending task.
    pub sender: String,
    /// Receiving task.
    pub receiver: String,
    /// Message type name.
    pub identity: String,
    /// Payload template with `${var}` placeholders.
    #[serde(default)]
    pub payload: String,
    /// Deadline (rx) or send delay (tx), in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// What `timeout_ms` counts from.
    #[serde(default)]
    pub base: Option<TimeBaseDef>,
    /// Fields copied into variables on receipt.
    #[serde(default)]
    pub extract: Vec<Extraction>,
}

/// Item payloads as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemDefKind {
    /// Declare a variable.
    Var {
        /// Name.
        name: String,
        /// Type.
        #[serde(rename = "type")]
        ty: VarType,
        /// Initial value; zero when absent.
        #[serde(default)]
        value: Option<Literal>,
    },
    /// Jump target.
    Label {
        /// Name.
        name: String,
    },
    /// Assign a literal (`value`) or another variable (`from`).
    SetVar {
        /// Target.
        var: String,
        /// Literal source.
        #[serde(default)]
        value: Option<Literal>,
        /// Variable source.
        #[serde(default)]
        from: Option<String>,
    },
    /// Increment.
    IncrVar {
        /// Target.
        var: String,
    },
    /// Decrement.
    DecrVar {
        /// Target.
        var: String,
    },
    /// Conditional jump.
    JumpCond {
        /// Tested variable.
        var: String,
        /// Comparison.
        op: CmpOp,
        /// Constant.
        value: i64,
        /// Target label.
        label: String,
    },
    /// Suspend.
    Sleep {
        /// Duration in milliseconds.
        ms: u64,
    },
    /// Stop.
    Exit {
        /// Exit code.
        #[serde(default)]
        code: i32,
    },
    /// Send or expect a message.
    Message(MessageDef),
    /// Run the authentication bridge.
    #[serde(alias = "compute_authentication_response_parameter")]
    ComputeAuth(AuthBindings),
}

/// Load every scenario of a document, assigning ids in order.
///
/// # Errors
///
/// The first [`LoadError`] met; nothing is returned in that case.
pub fn load_document(
    doc: &ScenarioDocument,
    config: &PlayerConfig,
) -> Result<Vec<Scenario>, LoadError> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(doc.scenarios.len());
    for (index, def) in doc.scenarios.iter().enumerate() {
        if !seen.insert(def.name.as_str()) {
            return Err(LoadError::DuplicateScenario(def.name.clone()));
        }
        let id = ScenarioId(u32::try_from(index).unwrap_or(u32::MAX));
        out.push(load_scenario(id, def, config)?);
    }
    Ok(out)
}

/// Build and validate one scenario.
///
/// # Errors
///
/// Any unresolved reference, duplicate name, type mismatch or malformed item.
pub fn load_scenario(
    id: ScenarioId,
    def: &ScenarioDef,
    config: &PlayerConfig,
) -> Result<Scenario, LoadError> {
    let auth = def.usim.clone().map(AuthContext::new).unwrap_or_default();
    let mut scenario = Scenario::new(id, def.name.clone(), auth);
    transition(&mut scenario, ScenarioStatus::Loading)?;
    match Builder::new(&mut scenario, config).build(&def.items) {
        Ok(()) => {
            transition(&mut scenario, ScenarioStatus::Loaded)?;
            tracing::info!(scenario = %def.name, items = scenario.program.len(), "loaded");
            Ok(scenario)
        }
        Err(err) => {
            tracing::warn!(scenario = %def.name, %err, "load failed");
            Err(err)
        }
    }
}

/// An empty scenario marked LOAD_FAILED, standing in for one that failed.
#[must_use]
pub fn load_failed(id: ScenarioId, name: &str) -> Scenario {
    let mut scenario = Scenario::new(id, name, AuthContext::default());
    // Null -> Loading -> LoadFailed is always legal.
    let _ = scenario.set_status(ScenarioStatus::Loading, Duration::ZERO);
    let _ = scenario.set_status(ScenarioStatus::LoadFailed, Duration::ZERO);
    scenario
}

fn transition(scenario: &mut Scenario, next: ScenarioStatus) -> Result<(), LoadError> {
    scenario
        .set_status(next, Duration::ZERO)
        .map_err(|_| LoadError::InvalidStatus {
            scenario: scenario.name.clone(),
            from: scenario.status,
            to: next,
        })
}

struct Builder<'s> {
    scenario: &'s mut Scenario,
    default_rx_timeout: Option<Duration>,
    /// Tag -> (definition index, uid).
    tags: BTreeMap<String, (usize, ItemUid)>,
    labels: BTreeSet<String>,
}

impl<'s> Builder<'s> {
    fn new(scenario: &'s mut Scenario, config: &PlayerConfig) -> Self {
        Self {
            scenario,
            default_rx_timeout: config.default_rx_timeout(),
            tags: BTreeMap::new(),
            labels: BTreeSet::new(),
        }
    }

    fn name(&self) -> String {
        self.scenario.name.clone()
    }

    fn build(mut self, defs: &[ItemDef]) -> Result<(), LoadError> {
        let uids: Vec<ItemUid> = defs.iter().map(|_| ItemUid::fresh()).collect();

        // Declarations and names first, so references may point anywhere.
        for (index, def) in defs.iter().enumerate() {
            if let Some(tag) = &def.tag {
                if self.tags.insert(tag.clone(), (index, uids[index])).is_some() {
                    return Err(LoadError::DuplicateTag {
                        scenario: self.name(),
                        tag: tag.clone(),
                    });
                }
            }
            match &def.kind {
                ItemDefKind::Var { name, ty, value } => {
                    self.declare(index, name, *ty, value.as_ref())?;
                }
                ItemDefKind::Label { name } => {
                    if name.is_empty() {
                        return Err(self.malformed(index, "empty label name"));
                    }
                    if !self.labels.insert(name.clone()) {
                        return Err(LoadError::DuplicateLabel {
                            scenario: self.name(),
                            name: name.clone(),
                        });
                    }
                }
                _ => {}
            }
        }

        for (index, (def, uid)) in defs.iter().zip(uids).enumerate() {
            let kind = self.resolve(index, &def.kind)?;
            let depends_on = match &kind {
                ItemKind::Message(msg) => msg.depends_on.clone(),
                _ => Vec::new(),
            };
            let item = Item {
                uid,
                tag: def.tag.clone(),
                kind,
            };
            self.scenario
                .program
                .append(item)
                .map_err(|dup| self.duplicate(index, dup))?;
            for var in &depends_on {
                self.scenario
                    .vars
                    .subscribe(var, uid)
                    .map_err(|_| self.unknown_variable(var))?;
            }
        }
        Ok(())
    }

    fn declare(
        &mut self,
        index: usize,
        name: &str,
        ty: VarType,
        value: Option<&Literal>,
    ) -> Result<(), LoadError> {
        if name.is_empty() {
            return Err(self.malformed(index, "empty variable name"));
        }
        let initial = value
            .map(|lit| {
                lit.coerce(ty).ok_or_else(|| LoadError::TypeMismatch {
                    scenario: self.name(),
                    name: name.to_string(),
                    expected: ty,
                    found: lit.natural_type(),
                })
            })
            .transpose()?;
        let declared = self.scenario.vars.declare(name, ty, initial);
        declared.map_err(|err| match err {
            VarError::Redeclared(name) => LoadError::DuplicateVariable {
                scenario: self.name(),
                name,
            },
            VarError::TypeMismatch {
                name,
                expected,
                found,
            } => LoadError::TypeMismatch {
                scenario: self.name(),
                name,
                expected,
                found,
            },
            other => self.malformed(index, &other.to_string()),
        })
    }

    fn resolve(&self, index: usize, def: &ItemDefKind) -> Result<ItemKind, LoadError> {
        let kind = match def {
            ItemDefKind::Var { name, .. } => ItemKind::Variable(name.clone()),
            ItemDefKind::Label { name } => ItemKind::Label(name.clone()),
            ItemDefKind::SetVar { var, value, from } => {
                let ty = self.var_type(var)?;
                let source = match (value, from) {
                    (Some(lit), None) => SetSource::Value(lit.coerce(ty).ok_or_else(|| {
                        LoadError::TypeMismatch {
                            scenario: self.name(),
                            name: var.clone(),
                            expected: ty,
                            found: lit.natural_type(),
                        }
                    })?),
                    (None, Some(other)) => {
                        let other_ty = self.var_type(other)?;
                        if other_ty != ty {
                            return Err(LoadError::TypeMismatch {
                                scenario: self.name(),
                                name: var.clone(),
                                expected: ty,
                                found: other_ty,
                            });
                        }
                        SetSource::Var(other.clone())
                    }
                    _ => return Err(self.malformed(index, "set_var needs exactly one of `value` or `from`")),
                };
                ItemKind::SetVar {
                    var: var.clone(),
                    source,
                }
            }
            ItemDefKind::IncrVar { var } => {
                self.numeric(var)?;
                ItemKind::IncrVar(var.clone())
            }
            ItemDefKind::DecrVar { var } => {
                self.numeric(var)?;
                ItemKind::DecrVar(var.clone())
            }
            ItemDefKind::JumpCond {
                var,
                op,
                value,
                label,
            } => {
                self.numeric(var)?;
                if !self.labels.contains(label) {
                    return Err(LoadError::UnknownLabel {
                        scenario: self.name(),
                        name: label.clone(),
                    });
                }
                ItemKind::JumpCond(JumpCond {
                    var: var.clone(),
                    op: *op,
                    value: *value,
                    label: label.clone(),
                })
            }
            ItemDefKind::Sleep { ms } => ItemKind::Sleep(Duration::from_millis(*ms)),
            ItemDefKind::Exit { code } => ItemKind::Exit(*code),
            ItemDefKind::Message(def) => ItemKind::Message(self.message(index, def)?),
            ItemDefKind::ComputeAuth(bindings) => {
                for name in bindings.names() {
                    let ty = self.var_type(name)?;
                    if ty != VarType::Bytes {
                        return Err(LoadError::TypeMismatch {
                            scenario: self.name(),
                            name: name.to_string(),
                            expected: VarType::Bytes,
                            found: ty,
                        });
                    }
                }
                ItemKind::ComputeAuthParam(bindings.clone())
            }
        };
        Ok(kind)
    }

    fn message(&self, index: usize, def: &MessageDef) -> Result<Message, LoadError> {
        let template = PayloadTemplate::parse(&def.payload)?;
        for var in template.variables() {
            self.var_type(var)?;
        }
        for extraction in &def.extract {
            self.var_type(&extraction.var)?;
        }
        if def.direction == Direction::Tx && !def.extract.is_empty() {
            return Err(self.malformed(index, "tx message cannot extract fields"));
        }

        let after = match (def.timeout_ms, def.direction) {
            (Some(ms), _) => Some(Duration::from_millis(ms)),
            (None, Direction::Rx) => Some(
                self.default_rx_timeout
                    .ok_or_else(|| self.malformed(index, "rx message needs `timeout_ms`"))?,
            ),
            (None, Direction::Tx) if def.base.is_some() => {
                return Err(self.malformed(index, "`base` given without `timeout_ms`"));
            }
            (None, Direction::Tx) => None,
        };
        let timing = match after {
            Some(after) => Some(Timing {
                after,
                base: self.time_base(index, def.base.as_ref())?,
            }),
            None => None,
        };

        let mut msg = Message::new(
            def.direction,
            def.sender.clone(),
            def.receiver.clone(),
            def.identity.clone(),
            template,
        );
        msg.timing = timing;
        msg.extract = def.extract.clone();
        Ok(msg)
    }

    fn time_base(&self, index: usize, base: Option<&TimeBaseDef>) -> Result<TimeBase, LoadError> {
        match base {
            None | Some(TimeBaseDef::Dispatch) => Ok(TimeBase::Dispatch),
            Some(TimeBaseDef::ScenarioStart) => Ok(TimeBase::ScenarioStart),
            Some(TimeBaseDef::Item(tag)) => {
                let (at, uid) = self.tags.get(tag).copied().ok_or_else(|| {
                    LoadError::UnknownItemRef {
                        scenario: self.name(),
                        tag: tag.clone(),
                    }
                })?;
                let is_message = self
                    .scenario
                    .program
                    .get(at)
                    .is_some_and(|item| item.as_message().is_some());
                // Definition indices equal program positions, and only
                // earlier items are in the program yet.
                if at >= index || !is_message {
                    return Err(LoadError::ForwardReference {
                        scenario: self.name(),
                        tag: tag.clone(),
                    });
                }
                Ok(TimeBase::Item(uid))
            }
        }
    }

    fn var_type(&self, name: &str) -> Result<VarType, LoadError> {
        self.scenario
            .vars
            .var_type(name)
            .map_err(|_| self.unknown_variable(name))
    }

    fn numeric(&self, name: &str) -> Result<(), LoadError> {
        let ty = self.var_type(name)?;
        if ty.is_numeric() {
            Ok(())
        } else {
            Err(LoadError::TypeMismatch {
                scenario: self.name(),
                name: name.to_string(),
                expected: VarType::Int64,
                found: ty,
            })
        }
    }

    fn unknown_variable(&self, name: &str) -> LoadError {
        LoadError::UnknownVariable {
            scenario: self.name(),
            name: name.to_string(),
        }
    }

    fn malformed(&self, index: usize, reason: &str) -> LoadError {
        LoadError::MalformedItem {
            scenario: self.name(),
            index,
            reason: reason.to_string(),
        }
    }

    fn duplicate(&self, index: usize, dup: Duplicate) -> LoadError {
        match dup {
            Duplicate::Label(name) => LoadError::DuplicateLabel {
                scenario: self.name(),
                name,
            },
            Duplicate::Variable(name) => LoadError::DuplicateVariable {
                scenario: self.name(),
                name,
            },
            Duplicate::Tag(tag) => LoadError::DuplicateTag {
                scenario: self.name(),
                tag,
            },
            Duplicate::Uid(uid) => self.malformed(index, &format!("duplicate uid {uid}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const JUMP: &str = r#"
        [[scenario]]
        name = "jump"

        [[scenario.item]]
        kind = "var"
        name = "x"
        type = "int64"

        [[scenario.item]]
        kind = "set_var"
        var = "x"
        value = 5

        [[scenario.item]]
        kind = "incr_var"
        var = "x"

        [[scenario.item]]
        kind = "jump_cond"
        var = "x"
        op = "=="
        value = 6
        label = "L"

        [[scenario.item]]
        kind = "exit"
        code = 1

        [[scenario.item]]
        kind = "label"
        name = "L"

        [[scenario.item]]
        kind = "exit"
    "#;

    fn load_one(toml: &str) -> Result<Scenario, LoadError> {
        let doc = ScenarioDocument::parse(toml)?;
        load_scenario(ScenarioId(0), &doc.scenarios[0], &PlayerConfig::default())
    }

    fn single(items: &str) -> String {
        format!("[[scenario]]\nname = \"s\"\n{items}")
    }

    #[test]
    fn test_loads_jump_scenario() {
        let scenario = load_one(JUMP).unwrap();
        assert_eq!(scenario.status(), ScenarioStatus::Loaded);
        assert_eq!(scenario.program().len(), 7);
        assert_eq!(scenario.program().find_label("L"), Some(5));
        assert_eq!(scenario.program().find_variable("x"), Some(0));
        assert_eq!(scenario.vars().get("x").unwrap(), &VarValue::Int(0));
    }

    #[test]
    fn test_unknown_label() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "x"
            type = "int64"
            [[scenario.item]]
            kind = "jump_cond"
            var = "x"
            op = "eq"
            value = 0
            label = "nowhere"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::UnknownLabel { name, .. }) if name == "nowhere");
    }

    #[test]
    fn test_incr_on_bytes_is_type_mismatch() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "s"
            type = "string"
            value = "abc"
            [[scenario.item]]
            kind = "incr_var"
            var = "s"
            "#,
        );
        assert_matches!(
            load_one(&doc),
            Err(LoadError::TypeMismatch { expected: VarType::Int64, found: VarType::Bytes, .. })
        );
    }

    #[test]
    fn test_set_var_literal_must_fit_type() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "n"
            type = "uint64"
            [[scenario.item]]
            kind = "set_var"
            var = "n"
            value = -1
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::TypeMismatch { .. }));
    }

    #[test]
    fn test_template_variables_must_exist() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "message"
            direction = "tx"
            sender = "ue"
            receiver = "mme"
            identity = "PING"
            payload = "v=${missing}"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::UnknownVariable { name, .. }) if name == "missing");
    }

    #[test]
    fn test_relative_timing_must_point_backwards() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "message"
            direction = "rx"
            sender = "mme"
            receiver = "ue"
            identity = "ACCEPT"
            timeout_ms = 100
            base = { item = "later" }
            [[scenario.item]]
            kind = "message"
            tag = "later"
            direction = "tx"
            sender = "ue"
            receiver = "mme"
            identity = "REQUEST"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::ForwardReference { tag, .. }) if tag == "later");

        let doc = single(
            r#"
            [[scenario.item]]
            kind = "message"
            direction = "rx"
            sender = "mme"
            receiver = "ue"
            identity = "ACCEPT"
            timeout_ms = 100
            base = { item = "nobody" }
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::UnknownItemRef { .. }));
    }

    #[test]
    fn test_relative_timing_resolves_to_uid() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "message"
            tag = "req"
            direction = "tx"
            sender = "ue"
            receiver = "mme"
            identity = "REQUEST"
            [[scenario.item]]
            kind = "message"
            direction = "rx"
            sender = "mme"
            receiver = "ue"
            identity = "ACCEPT"
            timeout_ms = 250
            base = { item = "req" }
            "#,
        );
        let scenario = load_one(&doc).unwrap();
        let req = scenario.program().get(0).unwrap().uid;
        let rx = scenario.program().get(1).and_then(Item::as_message).unwrap();
        assert_eq!(
            rx.timing,
            Some(Timing {
                after: Duration::from_millis(250),
                base: TimeBase::Item(req)
            })
        );
    }

    #[test]
    fn test_rx_needs_timeout_unless_configured() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "message"
            direction = "rx"
            sender = "mme"
            receiver = "ue"
            identity = "ACCEPT"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::MalformedItem { index: 0, .. }));

        let config = PlayerConfig {
            default_rx_timeout_ms: Some(1500),
            ..PlayerConfig::default()
        };
        let parsed = ScenarioDocument::parse(&doc).unwrap();
        let scenario = load_scenario(ScenarioId(0), &parsed.scenarios[0], &config).unwrap();
        let rx = scenario.program().get(0).and_then(Item::as_message).unwrap();
        assert_eq!(rx.timing, Some(Timing::after_dispatch(Duration::from_millis(1500))));
    }

    #[test]
    fn test_message_subscribes_to_template_variables() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "v"
            type = "bytes"
            value = "A"
            [[scenario.item]]
            kind = "message"
            direction = "tx"
            sender = "ue"
            receiver = "mme"
            identity = "PING"
            payload = "v=${v}"
            "#,
        );
        let scenario = load_one(&doc).unwrap();
        let uid = scenario.program().get(1).unwrap().uid;
        assert!(scenario.vars().variable("v").unwrap().subscribers.contains(&uid));
        assert!(scenario.vars().is_dirty(uid));
    }

    #[test]
    fn test_duplicate_names() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "label"
            name = "L"
            [[scenario.item]]
            kind = "label"
            name = "L"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::DuplicateLabel { .. }));

        let two = format!("{}\n{}", single(""), single(""));
        let parsed = ScenarioDocument::parse(&two).unwrap();
        assert_eq!(
            load_document(&parsed, &PlayerConfig::default()).unwrap_err(),
            LoadError::DuplicateScenario("s".into())
        );
    }

    #[test]
    fn test_json_document_with_usim() {
        let json = r#"{
            "scenario": [{
                "name": "auth",
                "usim": { "imsi": "001010000000001", "sqn": 7 },
                "item": [
                    { "kind": "var", "name": "RAND", "type": "bytes" },
                    { "kind": "var", "name": "AUTN", "type": "bytes" },
                    { "kind": "var", "name": "RES", "type": "bytes" },
                    { "kind": "var", "name": "CK", "type": "bytes" },
                    { "kind": "var", "name": "IK", "type": "bytes" },
                    { "kind": "compute_authentication_response_parameter" },
                    { "kind": "sleep", "ms": 10 }
                ]
            }]
        }"#;
        let doc = ScenarioDocument::from_json(json).unwrap();
        let scenarios = load_document(&doc, &PlayerConfig::default()).unwrap();
        assert_eq!(scenarios[0].auth().sqn, 7);
        assert_matches!(
            scenarios[0].program().get(5).map(|i| &i.kind),
            Some(ItemKind::ComputeAuthParam(b)) if *b == AuthBindings::default()
        );
    }

    #[test]
    fn test_malformed_declaration_reports_its_position() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "label"
            name = "top"
            [[scenario.item]]
            kind = "sleep"
            ms = 1
            [[scenario.item]]
            kind = "var"
            name = ""
            type = "int64"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::MalformedItem { index: 2, .. }));
    }

    #[test]
    fn test_redeclared_variable_is_duplicate() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "x"
            type = "int64"
            [[scenario.item]]
            kind = "var"
            name = "x"
            type = "uint64"
            "#,
        );
        assert_matches!(load_one(&doc), Err(LoadError::DuplicateVariable { name, .. }) if name == "x");
    }

    #[test]
    fn test_loading_twice_is_invalid_status() {
        let mut scenario = load_one(JUMP).unwrap();
        assert_eq!(
            transition(&mut scenario, ScenarioStatus::Loading),
            Err(LoadError::InvalidStatus {
                scenario: "jump".into(),
                from: ScenarioStatus::Loaded,
                to: ScenarioStatus::Loading,
            })
        );
    }

    #[test]
    fn test_uint64_above_i64_range() {
        let doc = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "n"
            type = "uint64"
            value = "18446744073709551615"
            [[scenario.item]]
            kind = "set_var"
            var = "n"
            value = "9223372036854775808"
            "#,
        );
        let scenario = load_one(&doc).unwrap();
        assert_eq!(scenario.vars().get("n").unwrap(), &VarValue::Uint(u64::MAX));
        assert_matches!(
            scenario.program().get(1).map(|i| &i.kind),
            Some(ItemKind::SetVar { source: SetSource::Value(VarValue::Uint(v)), .. })
                if *v == 1 << 63
        );

        let json = r#"{ "scenario": [{ "name": "u", "item": [
            { "kind": "var", "name": "n", "type": "uint64", "value": 18446744073709551615 }
        ] }] }"#;
        let doc = ScenarioDocument::from_json(json).unwrap();
        let scenarios = load_document(&doc, &PlayerConfig::default()).unwrap();
        assert_eq!(scenarios[0].vars().get("n").unwrap(), &VarValue::Uint(u64::MAX));

        let bad = single(
            r#"
            [[scenario.item]]
            kind = "var"
            name = "i"
            type = "int64"
            value = "12"
            "#,
        );
        assert_matches!(
            load_one(&bad),
            Err(LoadError::TypeMismatch { expected: VarType::Int64, found: VarType::Bytes, .. })
        );
    }

    #[test]
    fn test_bad_document_is_parse_error() {
        assert_matches!(ScenarioDocument::parse("[[scenario]]\nname = 3"), Err(LoadError::Parse(_)));
    }

    #[test]
    fn test_load_failed_placeholder() {
        let s = load_failed(ScenarioId(2), "broken");
        assert_eq!(s.status(), ScenarioStatus::LoadFailed);
        assert!(s.program().is_empty());
    }
}
