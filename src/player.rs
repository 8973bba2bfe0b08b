//! Scenario player: owns the loaded scenarios and routes events to the one
//! currently playing. Scenarios never play concurrently.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::config::PlayerConfig;
use crate::engine::PlayContext;
use crate::error::{LoadError, PlayError, PlayerError};
use crate::loader::{load_document, load_failed, load_scenario, ScenarioDef, ScenarioDocument};
use crate::scenario::{Resumption, Scenario, ScenarioId, ScenarioStatus};

/// Loaded scenarios in play order, at most one of them current.
#[derive(Debug, Default)]
pub struct ScenarioPlayer {
    scenarios: Vec<Scenario>,
    by_name: BTreeMap<String, usize>,
    current: Option<usize>,
    config: PlayerConfig,
}

impl ScenarioPlayer {
    /// Empty player.
    #[must_use]
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Load every scenario of a document.
    ///
    /// # Errors
    ///
    /// The first [`LoadError`]; no player is built in that case.
    pub fn load(doc: &ScenarioDocument, config: PlayerConfig) -> Result<Self, LoadError> {
        let scenarios = load_document(doc, &config)?;
        let by_name = scenarios
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name().to_string(), i))
            .collect();
        Ok(Self {
            scenarios,
            by_name,
            current: None,
            config,
        })
    }

    /// Load a document file (TOML, or JSON by extension).
    ///
    /// # Errors
    ///
    /// Any [`LoadError`] while reading, decoding or validating.
    pub fn from_file(path: &Path, config: PlayerConfig) -> Result<Self, LoadError> {
        let doc = ScenarioDocument::from_file(path)?;
        Self::load(&doc, config)
    }

    /// Append one scenario.
    ///
    /// A scenario that fails validation is still recorded, as LOAD_FAILED
    /// with an empty program, so its status stays observable.
    ///
    /// # Errors
    ///
    /// [`LoadError::DuplicateScenario`] if the name is taken (nothing is
    /// recorded), or the validation error.
    pub fn add(&mut self, def: &ScenarioDef) -> Result<ScenarioId, LoadError> {
        if self.by_name.contains_key(&def.name) {
            return Err(LoadError::DuplicateScenario(def.name.clone()));
        }
        let id = ScenarioId(u32::try_from(self.scenarios.len()).unwrap_or(u32::MAX));
        let (scenario, result) = match load_scenario(id, def, &self.config) {
            Ok(scenario) => (scenario, Ok(id)),
            Err(err) => (load_failed(id, &def.name), Err(err)),
        };
        self.by_name.insert(def.name.clone(), self.scenarios.len());
        self.scenarios.push(scenario);
        result
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Scenarios in play order.
    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter()
    }

    /// Scenario names in play order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scenarios.iter().map(|s| s.name().to_string()).collect()
    }

    /// Look up a scenario by name.
    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.by_name.get(name).map(|&i| &self.scenarios[i])
    }

    /// Status of a scenario.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`].
    pub fn status(&self, name: &str) -> Result<ScenarioStatus, PlayerError> {
        self.scenario(name)
            .map(Scenario::status)
            .ok_or_else(|| PlayerError::UnknownScenario(name.to_string()))
    }

    /// The scenario currently playing.
    #[must_use]
    pub fn current(&self) -> Option<&Scenario> {
        self.current.map(|i| &self.scenarios[i])
    }

    /// Start a LOADED scenario and make it current.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`], [`PlayerError::Busy`] if another
    /// scenario is still playing, or [`PlayerError::NotLoaded`].
    pub fn start(&mut self, name: &str, ctx: &mut PlayContext<'_>) -> Result<(), PlayerError> {
        let index = self.index(name)?;
        if let Some(current) = self.current() {
            return Err(PlayerError::Busy(current.name().to_string()));
        }
        let status = self.scenarios[index].status();
        if status != ScenarioStatus::Loaded {
            return Err(PlayerError::NotLoaded {
                name: name.to_string(),
                status,
            });
        }
        self.scenarios[index]
            .start(ctx)
            .map_err(|fault| PlayError {
                scenario: name.to_string(),
                item: None,
                fault,
            })?;
        self.current = Some(index);
        self.settle();
        Ok(())
    }

    /// Route an external event to the current scenario.
    ///
    /// Timer expiries for any other scenario are stale and dropped.
    pub fn handle(&mut self, event: Resumption, ctx: &mut PlayContext<'_>) {
        let Some(index) = self.current else {
            tracing::debug!("event with no current scenario dropped");
            return;
        };
        if let Resumption::TimerExpired(key) = &event {
            if key.scenario != self.scenarios[index].id() {
                tracing::debug!(scenario = %key.scenario, "timer for inactive scenario dropped");
                return;
            }
        }
        self.scenarios[index].handle(event, ctx);
        self.settle();
    }

    /// Hold a scenario. Returns whether it took effect.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`].
    pub fn pause(&mut self, name: &str, now: Duration) -> Result<bool, PlayerError> {
        let index = self.index(name)?;
        Ok(self.scenarios[index].pause(now))
    }

    /// Release a held scenario. Returns whether it was held.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`].
    pub fn resume(&mut self, name: &str, ctx: &mut PlayContext<'_>) -> Result<bool, PlayerError> {
        let index = self.index(name)?;
        let resumed = self.scenarios[index].resume(ctx);
        self.settle();
        Ok(resumed)
    }

    /// Abort a playing scenario with `code`.
    ///
    /// # Errors
    ///
    /// [`PlayerError::UnknownScenario`], or [`PlayerError::Play`] if the
    /// scenario is not playing.
    pub fn abort(
        &mut self,
        name: &str,
        code: i32,
        ctx: &mut PlayContext<'_>,
    ) -> Result<(), PlayerError> {
        let index = self.index(name)?;
        self.scenarios[index]
            .abort(code, ctx)
            .map_err(|fault| PlayError {
                scenario: name.to_string(),
                item: None,
                fault,
            })?;
        self.settle();
        Ok(())
    }

    /// Result of a finished scenario: its status on success, the failure
    /// otherwise. `None` while it has not finished playing.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<Result<ScenarioStatus, PlayError>> {
        let scenario = self.scenario(name)?;
        match scenario.status() {
            ScenarioStatus::PlaySuccess => Some(Ok(ScenarioStatus::PlaySuccess)),
            ScenarioStatus::PlayFailed => scenario.failure().cloned().map(Err),
            _ => None,
        }
    }

    fn index(&self, name: &str) -> Result<usize, PlayerError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| PlayerError::UnknownScenario(name.to_string()))
    }

    /// Release the current slot once its scenario has finished.
    fn settle(&mut self) {
        if let Some(index) = self.current {
            if self.scenarios[index].status().is_terminal() {
                self.current = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::item::ItemUid;
    use crate::testing::XorAuthAlgorithm;
    use crate::timer::{ManualTimers, TimerKey};
    use crate::transport::RecordingTransport;
    use assert_matches::assert_matches;

    const TWO: &str = r#"
        [[scenario]]
        name = "first"
        [[scenario.item]]
        kind = "sleep"
        ms = 10

        [[scenario]]
        name = "second"
        [[scenario.item]]
        kind = "exit"
    "#;

    struct Env {
        transport: RecordingTransport,
        timers: ManualTimers,
        clock: MockClock,
        auth: XorAuthAlgorithm,
    }

    impl Env {
        fn new() -> Self {
            Self {
                transport: RecordingTransport::new(),
                timers: ManualTimers::new(),
                clock: MockClock::new(),
                auth: XorAuthAlgorithm,
            }
        }

        fn ctx(&mut self) -> PlayContext<'_> {
            PlayContext::new(&self.transport, &mut self.timers, &self.auth, &self.clock)
        }
    }

    fn player() -> ScenarioPlayer {
        ScenarioPlayer::load(
            &ScenarioDocument::parse(TWO).unwrap(),
            PlayerConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_one_scenario_at_a_time() {
        let mut env = Env::new();
        let mut player = player();
        player.start("first", &mut env.ctx()).unwrap();
        assert_eq!(player.current().map(Scenario::name), Some("first"));
        assert_eq!(
            player.start("second", &mut env.ctx()),
            Err(PlayerError::Busy("first".into()))
        );

        env.clock.advance(Duration::from_millis(10));
        let due = env.timers.take_due(Duration::from_millis(10));
        for key in due {
            player.handle(Resumption::TimerExpired(key), &mut env.ctx());
        }
        assert_eq!(player.status("first"), Ok(ScenarioStatus::PlaySuccess));
        assert!(player.current().is_none());

        player.start("second", &mut env.ctx()).unwrap();
        assert_eq!(player.outcome("second"), Some(Ok(ScenarioStatus::PlaySuccess)));
        assert_matches!(
            player.start("second", &mut env.ctx()),
            Err(PlayerError::NotLoaded { status: ScenarioStatus::PlaySuccess, .. })
        );
    }

    #[test]
    fn test_timer_for_other_scenario_is_dropped() {
        let mut env = Env::new();
        let mut player = player();
        player.start("first", &mut env.ctx()).unwrap();
        let foreign = TimerKey {
            scenario: ScenarioId(1),
            item: ItemUid::from_raw(1),
            generation: 1,
        };
        player.handle(Resumption::TimerExpired(foreign), &mut env.ctx());
        assert_eq!(player.status("first"), Ok(ScenarioStatus::Paused));
    }

    #[test]
    fn test_add_records_load_failure() {
        let mut player = ScenarioPlayer::new(PlayerConfig::default());
        let doc = ScenarioDocument::parse(
            r#"
            [[scenario]]
            name = "bad"
            [[scenario.item]]
            kind = "jump_cond"
            var = "x"
            op = "=="
            value = 1
            label = "L"
            "#,
        )
        .unwrap();
        assert_matches!(
            player.add(&doc.scenarios[0]),
            Err(LoadError::UnknownVariable { .. })
        );
        assert_eq!(player.status("bad"), Ok(ScenarioStatus::LoadFailed));
        assert_eq!(
            player.add(&doc.scenarios[0]),
            Err(LoadError::DuplicateScenario("bad".into()))
        );
        assert_eq!(player.names(), vec!["bad".to_string()]);
        assert_eq!(
            player.status("other"),
            Err(PlayerError::UnknownScenario("other".into()))
        );
    }
}
