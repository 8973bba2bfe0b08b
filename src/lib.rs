//! Scripted protocol scenario player.
//!
//! Replays declarative scenarios (messages to send and expect, variables,
//! timers, conditional jumps, authentication computations) against a network
//! element under test and checks that the exchange matches the script within
//! its timing bounds.
//!
//! # Architecture
//!
//! - **Program** ([`program::Program`]): an index-addressed arena of
//!   [`item::Item`]s with label, variable, uid and tag indices
//! - **Variables** ([`vars::VariableStore`]): typed cells whose changes mark
//!   subscribed message items dirty
//! - **Engine** ([`engine`]): a synchronous interpreter driving the
//!   instruction pointer of a [`scenario::Scenario`], with handlers split by
//!   concern under `exec`
//! - **Timers** ([`timer::TimerService`]): one armed timer per suspended item
//! - **Loader** ([`loader`]): TOML/JSON scenario documents validated into
//!   LOADED scenarios
//! - **Runtime** ([`runtime::PlayerRuntime`]): a single async executor that
//!   owns the player and serializes timer expiries, arrivals and control
//!   requests through one event queue
//!
//! The engine never blocks and never owns its collaborators. Transport,
//! timers, authentication algorithm and clock are passed in through an
//! [`engine::PlayContext`], so tests drive it deterministically with
//! [`clock::MockClock`] and [`timer::ManualTimers`].
//!
//! # Usage
//!
//! ```ignore
//! use scenario_player::{PlayerConfig, PlayerRuntime, ScenarioDocument, ScenarioPlayer};
//! use scenario_player::testing::XorAuthAlgorithm;
//! use scenario_player::transport::ChannelTransport;
//!
//! let doc = ScenarioDocument::from_file(path)?;
//! let player = ScenarioPlayer::load(&doc, PlayerConfig::default())?;
//! let (transport, outbound) = ChannelTransport::new();
//! let mut runtime = PlayerRuntime::new(player, transport, XorAuthAlgorithm);
//! runtime.attach_source(inbound);
//! let report = runtime.run_all().await;
//! ```

pub mod auth;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub(crate) mod exec;
pub mod item;
pub mod loader;
pub mod payload;
pub mod player;
pub mod program;
pub mod runtime;
pub mod scenario;
pub mod testing;
pub mod timer;
pub mod transport;
pub mod value;
pub mod vars;

pub use auth::{AuthAlgorithm, AuthContext, UsimData};
pub use clock::{Clock, MockClock, TokioClock};
pub use config::PlayerConfig;
pub use engine::PlayContext;
pub use error::{AuthError, Fault, LoadError, PlayError, PlayerError, TransportError, VarError};
pub use item::{Direction, Item, ItemKind, ItemUid};
pub use loader::{ScenarioDef, ScenarioDocument};
pub use player::ScenarioPlayer;
pub use runtime::{PlayerEvent, PlayerHandle, PlayerRuntime};
pub use scenario::{Resumption, Scenario, ScenarioStatus, TraceEvent};
pub use timer::{ManualTimers, TimerKey, TimerService, TokioTimers};
pub use transport::{InboundMessage, OutboundMessage, RecordingTransport, Transport};
pub use value::{VarType, VarValue};
