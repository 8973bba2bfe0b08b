//! Item dispatcher split by concern.
//!
//! Every handler returns a [`Flow`] telling the engine how to move the
//! instruction pointer. Handlers never arm timers or change status; the
//! engine commits those effects.

use std::time::Duration;

use crate::engine::PlayContext;
use crate::error::Fault;
use crate::item::{ItemKind, Pc};
use crate::scenario::{AwaitReason, Scenario};

pub(crate) mod auth;
pub(crate) mod control;
pub(crate) mod message;
pub(crate) mod vars;

/// A suspension requested by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Wait {
    pub(crate) reason: AwaitReason,
    pub(crate) deadline: Option<Duration>,
}

/// What the engine does after dispatching an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Advance to the next item.
    Continue,
    /// Redirect the instruction pointer.
    Jump(Pc),
    /// Suspend on this item.
    Await(Wait),
    /// Stop with an exit code.
    Exit(i32),
}

/// Dispatch the item at `pc` to its handler.
pub(crate) fn step_item(
    scenario: &mut Scenario,
    pc: Pc,
    ctx: &mut PlayContext<'_>,
) -> Result<Flow, Fault> {
    let kind = match scenario.program.get(pc) {
        None => return Ok(Flow::Continue),
        Some(item) if item.as_message().is_some() => None,
        Some(item) => Some(item.kind.clone()),
    };
    let Some(kind) = kind else {
        return message::step_message(scenario, pc, ctx);
    };
    match kind {
        ItemKind::Message(_) | ItemKind::Label(_) | ItemKind::Variable(_) => Ok(Flow::Continue),
        ItemKind::SetVar { var, source } => vars::step_set_var(scenario, &var, &source),
        ItemKind::IncrVar(var) => vars::step_incr(scenario, &var),
        ItemKind::DecrVar(var) => vars::step_decr(scenario, &var),
        ItemKind::JumpCond(cond) => control::step_jump_cond(scenario, &cond),
        ItemKind::Sleep(duration) => Ok(control::step_sleep(duration, ctx.clock.now())),
        ItemKind::Exit(code) => Ok(control::step_exit(code)),
        ItemKind::ComputeAuthParam(bindings) => auth::step_compute_auth(scenario, &bindings, ctx),
    }
}
