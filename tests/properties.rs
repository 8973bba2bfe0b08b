//! Property tests for the variable store, conditional jumps and the status
//! state machine.

use proptest::prelude::*;
use scenario_player::item::CmpOp;
use scenario_player::loader::load_scenario;
use scenario_player::scenario::ScenarioId;
use scenario_player::testing::XorAuthAlgorithm;
use scenario_player::vars::VariableStore;
use scenario_player::{
    ItemUid, ManualTimers, MockClock, PlayContext, PlayerConfig, RecordingTransport, Scenario,
    ScenarioDocument, ScenarioStatus, TraceEvent, VarType, VarValue,
};

fn op_strategy() -> impl Strategy<Value = CmpOp> {
    prop_oneof![
        Just(CmpOp::Eq),
        Just(CmpOp::Ne),
        Just(CmpOp::Gt),
        Just(CmpOp::Ge),
        Just(CmpOp::Lt),
        Just(CmpOp::Le),
    ]
}

fn jump_scenario(x: i64, op: CmpOp, c: i64, forward: bool) -> Scenario {
    let var = format!(
        "[[scenario.item]]\nkind = \"var\"\nname = \"x\"\ntype = \"int64\"\nvalue = {x}\n"
    );
    let jump = format!(
        "[[scenario.item]]\nkind = \"jump_cond\"\nvar = \"x\"\nop = \"{op}\"\nvalue = {c}\nlabel = \"L\"\n"
    );
    let fail = "[[scenario.item]]\nkind = \"exit\"\ncode = 1\n";
    let label = "[[scenario.item]]\nkind = \"label\"\nname = \"L\"\n";
    let succeed = "[[scenario.item]]\nkind = \"exit\"\ncode = 0\n";
    let body = if forward {
        // var, jump, exit 1, L, exit 0
        format!("{var}{jump}{fail}{label}{succeed}")
    } else {
        // var, jump to skip, L, exit 0, skip: jump back to L, exit 1
        let skip = "[[scenario.item]]\nkind = \"label\"\nname = \"skip\"\n";
        let always = "[[scenario.item]]\nkind = \"jump_cond\"\nvar = \"x\"\nop = \"==\"\nvalue = 0\nlabel = \"skip\"\n";
        let always = always.replace("value = 0", &format!("value = {x}"));
        format!("{var}{always}{label}{succeed}{skip}{jump}{fail}")
    };
    let doc = ScenarioDocument::parse(&format!("[[scenario]]\nname = \"p\"\n{body}")).unwrap();
    load_scenario(ScenarioId(0), &doc.scenarios[0], &PlayerConfig::default()).unwrap()
}

fn play(scenario: &mut Scenario) {
    let transport = RecordingTransport::new();
    let mut timers = ManualTimers::new();
    let clock = MockClock::new();
    let auth = XorAuthAlgorithm;
    let mut ctx = PlayContext::new(&transport, &mut timers, &auth, &clock);
    scenario.start(&mut ctx).unwrap();
}

proptest! {
    /// Every subscriber is dirty as soon as `set` returns.
    #[test]
    fn set_marks_all_subscribers_dirty(
        subscribers in proptest::collection::btree_set(1u64..1000, 0..16),
        value in any::<i64>(),
    ) {
        let mut vars = VariableStore::new();
        vars.declare("v", VarType::Int64, None).unwrap();
        for &raw in &subscribers {
            vars.subscribe("v", ItemUid::from_raw(raw)).unwrap();
            vars.clear_dirty(ItemUid::from_raw(raw));
        }
        vars.set("v", VarValue::Int(value)).unwrap();
        for &raw in &subscribers {
            prop_assert!(vars.is_dirty(ItemUid::from_raw(raw)));
        }
        prop_assert!(!vars.variable("v").unwrap().changed);
        prop_assert!(!vars.is_dirty(ItemUid::from_raw(5000)));
    }

    /// Increment then decrement is the identity, wrapping included.
    #[test]
    fn incr_decr_round_trip(start in any::<i64>(), steps in 0usize..8) {
        let mut vars = VariableStore::new();
        vars.declare("n", VarType::Int64, Some(VarValue::Int(start))).unwrap();
        for _ in 0..steps {
            vars.increment("n").unwrap();
        }
        for _ in 0..steps {
            vars.decrement("n").unwrap();
        }
        prop_assert_eq!(vars.get("n").unwrap(), &VarValue::Int(start));
    }

    /// A taken jump lands exactly on its label, forwards or backwards; an
    /// untaken one advances by one item.
    #[test]
    fn jump_lands_on_label(
        x in -5i64..5,
        c in -5i64..5,
        op in op_strategy(),
        forward in any::<bool>(),
    ) {
        let mut scenario = jump_scenario(x, op, c, forward);
        play(&mut scenario);
        let taken = op.eval(i128::from(x), i128::from(c));
        let expected = if taken { ScenarioStatus::PlaySuccess } else { ScenarioStatus::PlayFailed };
        prop_assert_eq!(scenario.status(), expected);

        let label = scenario.program().find_label("L").unwrap();
        let jumps: Vec<(usize, usize)> = scenario
            .trace()
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Jumped { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        if taken {
            prop_assert_eq!(jumps.last().map(|j| j.1), Some(label));
        } else {
            prop_assert!(jumps.iter().all(|j| j.1 != label));
        }
    }

    /// Recorded status changes form one legal chain ending in a terminal
    /// status.
    #[test]
    fn status_trace_is_a_legal_chain(
        x in -5i64..5,
        c in -5i64..5,
        op in op_strategy(),
        forward in any::<bool>(),
    ) {
        let mut scenario = jump_scenario(x, op, c, forward);
        play(&mut scenario);
        let changes: Vec<(ScenarioStatus, ScenarioStatus)> = scenario
            .trace()
            .iter()
            .filter_map(|e| match e {
                TraceEvent::Status { from, to, .. } => Some((*from, *to)),
                _ => None,
            })
            .collect();
        prop_assert_eq!(changes.first().map(|c| c.0), Some(ScenarioStatus::Null));
        for window in changes.windows(2) {
            prop_assert_eq!(window[0].1, window[1].0);
        }
        for (from, to) in &changes {
            prop_assert!(from.can_transition_to(*to));
        }
        prop_assert!(changes.last().is_some_and(|c| c.1.is_terminal()));
    }
}
