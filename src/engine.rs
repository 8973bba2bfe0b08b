//! Execution engine.
//!
//! The engine is synchronous and owns no collaborators: every entry point
//! takes a [`PlayContext`] naming the transport, timers, authentication
//! algorithm and clock to use. Entry points are [`Scenario::start`],
//! [`Scenario::handle`] (timer expiry or message arrival), and the control
//! calls [`Scenario::pause`], [`Scenario::resume`] and [`Scenario::abort`].
//! Callers serialize them; the async runtime does so by owning the player on
//! a single executor task.

use std::time::Duration;

use crate::auth::AuthAlgorithm;
use crate::clock::Clock;
use crate::error::{Fault, PlayError};
use crate::exec::{self, message, Flow, Wait};
use crate::item::{ItemKind, ItemUid, Pc};
use crate::scenario::{
    AwaitReason, Resumption, Scenario, ScenarioStatus, Suspension, TraceEvent,
    HELD_QUEUE_MAX_SIZE,
};
use crate::timer::{TimerKey, TimerService};
use crate::transport::{InboundMessage, Transport};

/// Default bound on items dispatched by one entry point without awaiting.
pub const DEFAULT_MAX_ITEMS_PER_TICK: usize = 100_000;

/// Collaborators used while playing.
pub struct PlayContext<'a> {
    /// Outgoing message sink.
    pub transport: &'a dyn Transport,
    /// Timer service for deadlines and sleeps.
    pub timers: &'a mut dyn TimerService,
    /// Authentication algorithm for the crypto bridge.
    pub auth: &'a dyn AuthAlgorithm,
    /// Time source.
    pub clock: &'a dyn Clock,
    /// Items one entry point may dispatch before failing.
    pub max_items_per_tick: usize,
}

impl<'a> PlayContext<'a> {
    /// Context with the default step budget.
    pub fn new(
        transport: &'a dyn Transport,
        timers: &'a mut dyn TimerService,
        auth: &'a dyn AuthAlgorithm,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            transport,
            timers,
            auth,
            clock,
            max_items_per_tick: DEFAULT_MAX_ITEMS_PER_TICK,
        }
    }

    /// Override the step budget.
    #[must_use]
    pub fn with_max_items_per_tick(mut self, max: usize) -> Self {
        self.max_items_per_tick = max;
        self
    }
}

impl std::fmt::Debug for PlayContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayContext")
            .field("max_items_per_tick", &self.max_items_per_tick)
            .finish_non_exhaustive()
    }
}

impl Scenario {
    /// Start playing from the first item.
    ///
    /// Runs until the scenario suspends or terminates. Runtime faults are not
    /// returned here: they move the scenario to PLAY_FAILED and are available
    /// from [`Scenario::failure`].
    ///
    /// # Errors
    ///
    /// [`Fault::InvalidTransition`] unless the scenario is LOADED.
    pub fn start(&mut self, ctx: &mut PlayContext<'_>) -> Result<(), Fault> {
        let _span = tracing::info_span!("scenario", name = %self.name).entered();
        let now = ctx.clock.now();
        self.set_status(ScenarioStatus::Playing, now)?;
        self.started = Some(now);
        self.last_played = None;
        let first = self.program.first();
        self.run(first, ctx);
        Ok(())
    }

    /// Feed an external event into the scenario.
    ///
    /// Events for a terminal scenario are dropped. While held by
    /// [`Scenario::pause`] they are queued and replayed on resume.
    pub fn handle(&mut self, event: Resumption, ctx: &mut PlayContext<'_>) {
        let _span = tracing::info_span!("scenario", name = %self.name).entered();
        if self.status.is_terminal() {
            tracing::debug!(status = %self.status, "event for finished scenario dropped");
            return;
        }
        if self.held {
            self.defer(event, ctx.clock.now());
            return;
        }
        match event {
            Resumption::TimerExpired(key) => self.on_timer_expired(key, ctx),
            Resumption::Arrival(arrival) => self.on_message_arrived(arrival, ctx),
        }
    }

    /// Hold the scenario. Returns whether it was playing and not yet held.
    pub fn pause(&mut self, now: Duration) -> bool {
        if self.held || !matches!(self.status, ScenarioStatus::Playing | ScenarioStatus::Paused) {
            return false;
        }
        if self.status == ScenarioStatus::Playing
            && self.set_status(ScenarioStatus::Paused, now).is_err()
        {
            return false;
        }
        self.held = true;
        tracing::info!(scenario = %self.name, "held");
        true
    }

    /// Release a hold and replay the events queued meanwhile, in order.
    /// Returns whether the scenario was held.
    pub fn resume(&mut self, ctx: &mut PlayContext<'_>) -> bool {
        if !self.held {
            return false;
        }
        self.held = false;
        tracing::info!(scenario = %self.name, queued = self.deferred.len(), "released");
        while let Some(event) = self.deferred.pop_front() {
            if self.status.is_terminal() {
                self.deferred.clear();
                break;
            }
            self.handle(event, ctx);
            if self.held {
                break;
            }
        }
        true
    }

    /// Stop the scenario as if an exit were injected at the current position.
    ///
    /// Code 0 ends in PLAY_SUCCESS; any other code fails with
    /// [`Fault::Aborted`].
    ///
    /// # Errors
    ///
    /// [`Fault::InvalidTransition`] if the scenario has not started or has
    /// already finished.
    pub fn abort(&mut self, code: i32, ctx: &mut PlayContext<'_>) -> Result<(), Fault> {
        let _span = tracing::info_span!("scenario", name = %self.name).entered();
        let now = ctx.clock.now();
        if !matches!(self.status, ScenarioStatus::Playing | ScenarioStatus::Paused) {
            return Err(Fault::InvalidTransition {
                from: self.status,
                to: ScenarioStatus::PlayFailed,
            });
        }
        self.held = false;
        self.deferred.clear();
        let item = self.suspension.as_ref().map(|s| s.uid);
        self.disarm(ctx);
        if code == 0 {
            self.finish(0, now);
            return Ok(());
        }
        self.exit_code = Some(code);
        self.fail(item, Fault::Aborted(code), now);
        Ok(())
    }

    /// Tick: dispatch items from `next` until one suspends or the scenario
    /// terminates.
    fn run(&mut self, mut next: Option<Pc>, ctx: &mut PlayContext<'_>) {
        let mut budget = ctx.max_items_per_tick;
        loop {
            let Some(pc) = next else {
                self.finish(0, ctx.clock.now());
                return;
            };
            let Some(item) = self.program.get(pc) else {
                self.finish(0, ctx.clock.now());
                return;
            };
            if matches!(item.kind, ItemKind::Variable(_)) {
                next = self.program.next(pc);
                continue;
            }
            let uid = item.uid;
            let kind = item.kind.name();
            let now = ctx.clock.now();
            if budget == 0 {
                self.fail(Some(uid), Fault::StepBudgetExceeded(ctx.max_items_per_tick), now);
                return;
            }
            budget -= 1;

            self.last_played = Some(pc);
            self.items_played += 1;
            self.trace.push(TraceEvent::Dispatched {
                at: now,
                pc,
                uid,
                kind: kind.to_string(),
            });
            tracing::debug!(pc, %uid, kind, "dispatch");

            match exec::step_item(self, pc, ctx) {
                Ok(Flow::Continue) => next = self.program.next(pc),
                Ok(Flow::Jump(target)) => {
                    self.trace.push(TraceEvent::Jumped {
                        at: now,
                        from: pc,
                        to: target,
                    });
                    next = Some(target);
                }
                Ok(Flow::Await(wait)) => {
                    self.suspend(pc, wait, ctx);
                    return;
                }
                Ok(Flow::Exit(code)) => {
                    self.finish(code, ctx.clock.now());
                    return;
                }
                Err(fault) => {
                    self.fail(Some(uid), fault, ctx.clock.now());
                    return;
                }
            }
        }
    }

    fn suspend(&mut self, pc: Pc, wait: Wait, ctx: &mut PlayContext<'_>) {
        let now = ctx.clock.now();
        let Some(uid) = self.program.get(pc).map(|item| item.uid) else {
            return;
        };
        let timer = wait.deadline.map(|deadline| {
            self.timer_generation += 1;
            let key = TimerKey {
                scenario: self.id,
                item: uid,
                generation: self.timer_generation,
            };
            ctx.timers.arm(key, deadline);
            self.outstanding_timers += 1;
            self.trace.push(TraceEvent::TimerArmed {
                at: now,
                uid,
                deadline,
            });
            tracing::debug!(%uid, ?deadline, reason = ?wait.reason, "timer armed");
            key
        });
        self.suspension = Some(Suspension {
            pc,
            uid,
            reason: wait.reason,
            armed_at: now,
            deadline: wait.deadline,
            timer,
        });
        if self.status == ScenarioStatus::Playing {
            // Playing -> Paused is always legal.
            let _ = self.set_status(ScenarioStatus::Paused, now);
        }
    }

    /// Cancel the current suspension's timer, if any.
    fn disarm(&mut self, ctx: &mut PlayContext<'_>) {
        if let Some(key) = self.suspension.take().and_then(|s| s.timer) {
            if ctx.timers.cancel(key) {
                tracing::debug!(uid = %key.item, "timer cancelled");
            }
            self.outstanding_timers = self.outstanding_timers.saturating_sub(1);
        }
    }

    /// Continue after the awaited item at `pc` was satisfied.
    fn resume_after(&mut self, pc: Pc, ctx: &mut PlayContext<'_>) {
        if self.status == ScenarioStatus::Paused {
            if let Err(fault) = self.set_status(ScenarioStatus::Playing, ctx.clock.now()) {
                let uid = self.program.get(pc).map(|item| item.uid);
                self.fail(uid, fault, ctx.clock.now());
                return;
            }
        }
        let next = self.program.next(pc);
        self.run(next, ctx);
    }

    fn on_timer_expired(&mut self, key: TimerKey, ctx: &mut PlayContext<'_>) {
        let current = self.suspension.as_ref().is_some_and(|s| s.timer == Some(key));
        if !current {
            tracing::debug!(uid = %key.item, generation = key.generation, "stale timer ignored");
            return;
        }
        let Some(suspension) = self.suspension.take() else {
            return;
        };
        self.outstanding_timers = self.outstanding_timers.saturating_sub(1);
        let now = ctx.clock.now();
        self.trace.push(TraceEvent::TimerExpired {
            at: now,
            uid: suspension.uid,
        });
        match suspension.reason {
            AwaitReason::Message => {
                let waited = suspension
                    .deadline
                    .unwrap_or(now)
                    .saturating_sub(suspension.armed_at);
                self.fail(Some(suspension.uid), Fault::Timeout { waited }, now);
            }
            AwaitReason::Sleep => self.resume_after(suspension.pc, ctx),
            AwaitReason::DelayedSend => {
                if let Err(fault) = message::send_now(self, suspension.pc, ctx) {
                    self.fail(Some(suspension.uid), fault, ctx.clock.now());
                    return;
                }
                self.resume_after(suspension.pc, ctx);
            }
        }
    }

    fn on_message_arrived(&mut self, arrival: InboundMessage, ctx: &mut PlayContext<'_>) {
        let now = ctx.clock.now();
        let awaited = self
            .suspension
            .as_ref()
            .filter(|s| s.reason == AwaitReason::Message)
            .map(|s| (s.pc, s.uid))
            .filter(|(pc, _)| message::arrival_matches(self, *pc, &arrival));
        let Some((pc, uid)) = awaited else {
            tracing::warn!(
                scenario = %self.name,
                sender = %arrival.sender,
                receiver = %arrival.receiver,
                identity = %arrival.identity,
                "unexpected message ignored"
            );
            self.trace.push(TraceEvent::Ignored {
                at: now,
                sender: arrival.sender,
                receiver: arrival.receiver,
                identity: arrival.identity,
            });
            return;
        };
        self.disarm(ctx);
        if let Err(fault) = message::accept_arrival(self, pc, arrival, now) {
            self.fail(Some(uid), fault, now);
            return;
        }
        self.resume_after(pc, ctx);
    }

    fn defer(&mut self, event: Resumption, now: Duration) {
        match event {
            Resumption::Arrival(arrival) if self.deferred.len() >= HELD_QUEUE_MAX_SIZE => {
                tracing::warn!(
                    scenario = %self.name,
                    identity = %arrival.identity,
                    "held queue full, arrival dropped"
                );
                self.trace.push(TraceEvent::Ignored {
                    at: now,
                    sender: arrival.sender,
                    receiver: arrival.receiver,
                    identity: arrival.identity,
                });
            }
            event => self.deferred.push_back(event),
        }
    }

    /// Terminate on an exit code: 0 succeeds, anything else fails.
    fn finish(&mut self, code: i32, now: Duration) {
        self.exit_code = Some(code);
        if code != 0 {
            let item = self.last_played.and_then(|pc| self.program.get(pc)).map(|i| i.uid);
            self.fail(item, Fault::ExitCode(code), now);
            return;
        }
        match self.set_status(ScenarioStatus::PlaySuccess, now) {
            Ok(()) => tracing::info!(scenario = %self.name, items = self.items_played, "play succeeded"),
            Err(fault) => tracing::error!(scenario = %self.name, %fault, "cannot conclude"),
        }
    }

    fn fail(&mut self, item: Option<ItemUid>, fault: Fault, now: Duration) {
        let error = PlayError {
            scenario: self.name.clone(),
            item,
            fault,
        };
        tracing::warn!(%error, "play failed");
        if let Err(fault) = self.set_status(ScenarioStatus::PlayFailed, now) {
            tracing::error!(scenario = %self.name, %fault, "cannot conclude");
        }
        self.failure = Some(error);
    }
}
