//! Async runtime: a single executor owning the player.
//!
//! Timer expiries, message arrivals and control requests all become
//! [`PlayerEvent`]s on one bounded queue. The executor consumes them one at a
//! time, so a timer firing and a matching arrival for the same item can never
//! both act: whichever is dequeued first resumes the scenario, and the other
//! finds nothing to resume.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::auth::AuthAlgorithm;
use crate::clock::{Clock, TokioClock};
use crate::engine::PlayContext;
use crate::error::PlayerError;
use crate::player::ScenarioPlayer;
use crate::scenario::{Resumption, ScenarioStatus};
use crate::timer::{TimerKey, TokioTimers};
use crate::transport::{ArrivalSource, InboundMessage, Transport};

type Reply<T> = oneshot::Sender<Result<T, PlayerError>>;

/// An event for the executor.
#[derive(Debug)]
pub enum PlayerEvent {
    /// A message arrived from the transport.
    Arrival(InboundMessage),
    /// A timer fired.
    TimerExpired(TimerKey),
    /// Hold a scenario.
    Pause {
        /// Scenario name.
        scenario: String,
        /// Whether the hold took effect.
        reply: Reply<bool>,
    },
    /// Release a held scenario.
    Resume {
        /// Scenario name.
        scenario: String,
        /// Whether the scenario was held.
        reply: Reply<bool>,
    },
    /// Abort a playing scenario.
    Abort {
        /// Scenario name.
        scenario: String,
        /// Exit code reported.
        code: i32,
        /// Completion.
        reply: Reply<()>,
    },
    /// Query a scenario's status.
    Status {
        /// Scenario name.
        scenario: String,
        /// Current status.
        reply: Reply<ScenarioStatus>,
    },
}

/// Cloneable handle posting events to the executor.
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerEvent>,
}

impl PlayerHandle {
    /// Deliver an arrival.
    ///
    /// # Errors
    ///
    /// [`PlayerError::ExecutorGone`] if the runtime was dropped.
    pub async fn deliver(&self, arrival: InboundMessage) -> Result<(), PlayerError> {
        self.tx
            .send(PlayerEvent::Arrival(arrival))
            .await
            .map_err(|_| PlayerError::ExecutorGone)
    }

    /// Hold a scenario.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`] or [`PlayerError::ExecutorGone`].
    pub async fn pause(&self, scenario: &str) -> Result<bool, PlayerError> {
        self.request(|reply| PlayerEvent::Pause {
            scenario: scenario.to_string(),
            reply,
        })
        .await
    }

    /// Release a held scenario and replay what it queued.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`] or [`PlayerError::ExecutorGone`].
    pub async fn resume(&self, scenario: &str) -> Result<bool, PlayerError> {
        self.request(|reply| PlayerEvent::Resume {
            scenario: scenario.to_string(),
            reply,
        })
        .await
    }

    /// Abort a playing scenario.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`], [`PlayerError::Play`] if it is not
    /// playing, or [`PlayerError::ExecutorGone`].
    pub async fn abort(&self, scenario: &str, code: i32) -> Result<(), PlayerError> {
        self.request(|reply| PlayerEvent::Abort {
            scenario: scenario.to_string(),
            code,
            reply,
        })
        .await
    }

    /// Current status of a scenario.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`] or [`PlayerError::ExecutorGone`].
    pub async fn status(&self, scenario: &str) -> Result<ScenarioStatus, PlayerError> {
        self.request(|reply| PlayerEvent::Status {
            scenario: scenario.to_string(),
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> PlayerEvent,
    ) -> Result<T, PlayerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| PlayerError::ExecutorGone)?;
        rx.await.map_err(|_| PlayerError::ExecutorGone)?
    }
}

/// Outcome of one scenario in [`PlayerRuntime::run_all`].
pub type RunReport = Vec<(String, Result<ScenarioStatus, PlayerError>)>;

/// Executor owning a player and its collaborators.
pub struct PlayerRuntime<T: Transport, A: AuthAlgorithm> {
    player: ScenarioPlayer,
    transport: T,
    auth: A,
    clock: TokioClock,
    timers: TokioTimers<PlayerEvent>,
    tx: mpsc::Sender<PlayerEvent>,
    rx: mpsc::Receiver<PlayerEvent>,
}

impl<T: Transport, A: AuthAlgorithm> PlayerRuntime<T, A> {
    /// Build a runtime. Must be called from within a tokio runtime.
    pub fn new(player: ScenarioPlayer, transport: T, auth: A) -> Self {
        let capacity = player.config().event_queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let clock = TokioClock::start();
        let timers = TokioTimers::new(clock, tx.clone(), PlayerEvent::TimerExpired);
        Self {
            player,
            transport,
            auth,
            clock,
            timers,
            tx,
            rx,
        }
    }

    /// Handle for posting arrivals and control requests.
    #[must_use]
    pub fn handle(&self) -> PlayerHandle {
        PlayerHandle {
            tx: self.tx.clone(),
        }
    }

    /// The player.
    #[must_use]
    pub fn player(&self) -> &ScenarioPlayer {
        &self.player
    }

    /// The runtime's clock.
    #[must_use]
    pub fn clock(&self) -> TokioClock {
        self.clock
    }

    /// Give the player back.
    #[must_use]
    pub fn into_player(self) -> ScenarioPlayer {
        self.player
    }

    /// Pump arrivals from `source` into the event queue until either ends.
    pub fn attach_source<S>(&self, mut source: S) -> JoinHandle<()>
    where
        S: ArrivalSource + 'static,
    {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(arrival) = source.next_arrival().await {
                if tx.send(PlayerEvent::Arrival(arrival)).await.is_err() {
                    break;
                }
            }
            tracing::debug!("arrival source exhausted");
        })
    }

    /// Play one scenario to a terminal status.
    ///
    /// # Errors
    ///
    /// Start errors, or [`PlayerError::Play`] with the cause of a
    /// PLAY_FAILED outcome.
    pub async fn run(&mut self, name: &str) -> Result<ScenarioStatus, PlayerError> {
        {
            let Self {
                player,
                transport,
                auth,
                clock,
                timers,
                ..
            } = self;
            let max = player.config().max_items_per_tick;
            let mut ctx = PlayContext::new(&*transport, timers, &*auth, &*clock)
                .with_max_items_per_tick(max);
            player.start(name, &mut ctx)?;
        }
        loop {
            if let Some(outcome) = self.player.outcome(name) {
                return outcome.map_err(PlayerError::from);
            }
            let Some(event) = self.rx.recv().await else {
                return Err(PlayerError::ExecutorGone);
            };
            self.dispatch(event);
        }
    }

    /// Play every LOADED scenario in order.
    ///
    /// Scenarios that failed to load are reported as not loaded. With
    /// `stop_on_failure`, the first failure ends the run.
    pub async fn run_all(&mut self) -> RunReport {
        let mut report = Vec::new();
        for name in self.player.names() {
            let result = self.run(&name).await;
            let failed = result.is_err();
            report.push((name, result));
            if failed && self.player.config().stop_on_failure {
                break;
            }
        }
        report
    }

    fn dispatch(&mut self, event: PlayerEvent) {
        let Self {
            player,
            transport,
            auth,
            clock,
            timers,
            ..
        } = self;
        let max = player.config().max_items_per_tick;
        let mut ctx = PlayContext::new(&*transport, timers, &*auth, &*clock)
            .with_max_items_per_tick(max);
        match event {
            PlayerEvent::Arrival(arrival) => player.handle(Resumption::Arrival(arrival), &mut ctx),
            PlayerEvent::TimerExpired(key) => player.handle(Resumption::TimerExpired(key), &mut ctx),
            PlayerEvent::Pause { scenario, reply } => {
                let _ = reply.send(player.pause(&scenario, clock.now()));
            }
            PlayerEvent::Resume { scenario, reply } => {
                let _ = reply.send(player.resume(&scenario, &mut ctx));
            }
            PlayerEvent::Abort {
                scenario,
                code,
                reply,
            } => {
                let _ = reply.send(player.abort(&scenario, code, &mut ctx));
            }
            PlayerEvent::Status { scenario, reply } => {
                let _ = reply.send(player.status(&scenario));
            }
        }
    }
}

impl<T: Transport, A: AuthAlgorithm> std::fmt::Debug for PlayerRuntime<T, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRuntime")
            .field("player", &self.player)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}
