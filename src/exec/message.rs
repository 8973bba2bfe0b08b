//! Message exchange: tx send with payload regeneration, rx expectation and
//! arrival handling, deadline resolution.

use std::time::Duration;

use crate::engine::PlayContext;
use crate::error::Fault;
use crate::exec::{Flow, Wait};
use crate::item::{Direction, ItemUid, Pc, TimeBase, Timing};
use crate::scenario::{AwaitReason, Scenario, TraceEvent};
use crate::transport::{InboundMessage, OutboundMessage};

/// Execute a message item.
///
/// A tx message without timing is sent immediately. With timing it waits for
/// its send time, unless that time has already passed. An rx message always
/// suspends until a matching arrival or its deadline.
pub(crate) fn step_message(
    scenario: &mut Scenario,
    pc: Pc,
    ctx: &mut PlayContext<'_>,
) -> Result<Flow, Fault> {
    let Some(msg) = scenario.program.get(pc).and_then(|item| item.as_message()) else {
        return Ok(Flow::Continue);
    };
    let (direction, timing) = (msg.direction, msg.timing);
    let now = ctx.clock.now();
    let deadline = timing
        .map(|timing| resolve_deadline(scenario, timing, now))
        .transpose()?;

    match direction {
        Direction::Tx => match deadline {
            Some(at) if at > now => Ok(Flow::Await(Wait {
                reason: AwaitReason::DelayedSend,
                deadline: Some(at),
            })),
            _ => {
                send_now(scenario, pc, ctx)?;
                Ok(Flow::Continue)
            }
        },
        Direction::Rx => Ok(Flow::Await(Wait {
            reason: AwaitReason::Message,
            deadline,
        })),
    }
}

/// Absolute clock offset of a timing relative to its base.
pub(crate) fn resolve_deadline(
    scenario: &Scenario,
    timing: Timing,
    now: Duration,
) -> Result<Duration, Fault> {
    let base = match timing.base {
        TimeBase::Dispatch => now,
        TimeBase::ScenarioStart => scenario.started.unwrap_or(now),
        TimeBase::Item(uid) => reference_stamp(scenario, uid)?,
    };
    Ok(base.saturating_add(timing.after))
}

fn reference_stamp(scenario: &Scenario, uid: ItemUid) -> Result<Duration, Fault> {
    scenario
        .program
        .find_by_uid(uid)
        .and_then(|pc| scenario.program.get(pc))
        .and_then(|item| item.as_message())
        .filter(|msg| msg.processed)
        .and_then(|msg| msg.stamp)
        .ok_or(Fault::ReferenceUnprocessed(uid))
}

/// Regenerate the payload if stale, hand it to the transport and mark the
/// item processed.
pub(crate) fn send_now(
    scenario: &mut Scenario,
    pc: Pc,
    ctx: &mut PlayContext<'_>,
) -> Result<(), Fault> {
    let now = ctx.clock.now();
    let vars = &scenario.vars;
    let Some(item) = scenario.program.get_mut(pc) else {
        return Ok(());
    };
    let uid = item.uid;
    let Some(msg) = item.as_message_mut() else {
        return Ok(());
    };

    let regenerate = msg.payload.is_none() || vars.is_dirty(uid);
    if regenerate {
        let payload = msg.template.render(|name| vars.get(name).ok())?;
        tracing::trace!(%uid, len = payload.len(), "payload regenerated");
        msg.payload = Some(payload);
    }
    let outbound = OutboundMessage {
        scenario: scenario.name.clone(),
        uid,
        sender: msg.sender.clone(),
        receiver: msg.receiver.clone(),
        identity: msg.identity.clone(),
        payload: msg.payload.clone().unwrap_or_default(),
    };
    if regenerate {
        scenario.vars.clear_dirty(uid);
    }

    ctx.transport.send(&outbound)?;
    msg.processed = true;
    msg.stamp = Some(now);
    tracing::debug!(%uid, identity = %outbound.identity, to = %outbound.receiver, "sent");
    scenario.trace.push(TraceEvent::Sent {
        at: now,
        uid,
        identity: outbound.identity,
        payload: outbound.payload,
    });
    Ok(())
}

/// Whether `arrival` satisfies the rx item at `pc`.
pub(crate) fn arrival_matches(scenario: &Scenario, pc: Pc, arrival: &InboundMessage) -> bool {
    scenario
        .program
        .get(pc)
        .and_then(|item| item.as_message())
        .is_some_and(|msg| msg.matches(&arrival.sender, &arrival.receiver, &arrival.identity))
}

/// Apply an arrival to the awaited rx item at `pc`: extract variables, then
/// mark it processed.
pub(crate) fn accept_arrival(
    scenario: &mut Scenario,
    pc: Pc,
    arrival: InboundMessage,
    now: Duration,
) -> Result<(), Fault> {
    let Some(item) = scenario.program.get(pc) else {
        return Ok(());
    };
    let uid = item.uid;
    let extract = item
        .as_message()
        .map(|msg| msg.extract.clone())
        .unwrap_or_default();

    for extraction in &extract {
        let value = arrival
            .fields
            .get(&extraction.field)
            .ok_or_else(|| Fault::MissingField(extraction.field.clone()))?;
        scenario.vars.set(&extraction.var, value.clone())?;
    }

    if let Some(msg) = scenario
        .program
        .get_mut(pc)
        .and_then(|item| item.as_message_mut())
    {
        msg.processed = true;
        msg.stamp = Some(now);
        msg.payload = Some(arrival.payload);
    }
    tracing::debug!(%uid, identity = %arrival.identity, from = %arrival.sender, "received");
    scenario.trace.push(TraceEvent::Received {
        at: now,
        uid,
        identity: arrival.identity,
    });
    Ok(())
}
