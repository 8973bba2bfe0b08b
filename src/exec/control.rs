//! Control-flow instruction execution.

use std::time::Duration;

use crate::error::{Fault, VarError};
use crate::exec::{Flow, Wait};
use crate::item::JumpCond;
use crate::scenario::{AwaitReason, Scenario};
use crate::value::VarType;

/// Execute `jump_cond`: redirect to the label when `var <op> value` holds.
pub(crate) fn step_jump_cond(scenario: &Scenario, cond: &JumpCond) -> Result<Flow, Fault> {
    let current = scenario.vars.get(&cond.var)?;
    let lhs = current.as_i128().ok_or_else(|| VarError::TypeMismatch {
        name: cond.var.clone(),
        expected: VarType::Int64,
        found: current.var_type(),
    })?;
    let taken = cond.op.eval(lhs, i128::from(cond.value));
    tracing::debug!(var = %cond.var, %lhs, op = %cond.op, rhs = cond.value, taken, "jump_cond");
    if !taken {
        return Ok(Flow::Continue);
    }
    scenario
        .program
        .find_label(&cond.label)
        .map(Flow::Jump)
        .ok_or_else(|| Fault::UnknownLabel(cond.label.clone()))
}

/// Execute `sleep`.
#[must_use]
pub(crate) fn step_sleep(duration: Duration, now: Duration) -> Flow {
    Flow::Await(Wait {
        reason: AwaitReason::Sleep,
        deadline: Some(now.saturating_add(duration)),
    })
}

/// Execute `exit`.
#[must_use]
pub(crate) fn step_exit(code: i32) -> Flow {
    Flow::Exit(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthContext;
    use crate::item::{CmpOp, Item, ItemKind};
    use crate::scenario::ScenarioId;
    use crate::value::VarValue;
    use assert_matches::assert_matches;

    fn scenario(x: i64) -> Scenario {
        let mut s = Scenario::new(ScenarioId(0), "ctl", AuthContext::default());
        s.vars
            .declare("x", VarType::Int64, Some(VarValue::Int(x)))
            .unwrap();
        s.vars.declare("s", VarType::Bytes, None).unwrap();
        s.program
            .append(Item::new(ItemKind::Label("top".into())))
            .unwrap();
        s.program.append(Item::new(ItemKind::Exit(0))).unwrap();
        s
    }

    fn cond(var: &str, op: CmpOp, value: i64, label: &str) -> JumpCond {
        JumpCond {
            var: var.into(),
            op,
            value,
            label: label.into(),
        }
    }

    #[test]
    fn test_true_predicate_jumps_to_label() {
        let s = scenario(6);
        let flow = step_jump_cond(&s, &cond("x", CmpOp::Eq, 6, "top")).unwrap();
        assert_eq!(flow, Flow::Jump(0));
    }

    #[test]
    fn test_false_predicate_continues() {
        let s = scenario(5);
        let flow = step_jump_cond(&s, &cond("x", CmpOp::Gt, 5, "top")).unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    #[test]
    fn test_bytes_variable_cannot_be_compared() {
        let s = scenario(0);
        assert_matches!(
            step_jump_cond(&s, &cond("s", CmpOp::Eq, 0, "top")),
            Err(Fault::Variable(VarError::TypeMismatch { .. }))
        );
    }

    #[test]
    fn test_missing_label_is_fault() {
        let s = scenario(1);
        assert_eq!(
            step_jump_cond(&s, &cond("x", CmpOp::Ne, 0, "gone")),
            Err(Fault::UnknownLabel("gone".into()))
        );
    }

    #[test]
    fn test_sleep_deadline() {
        let flow = step_sleep(Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(
            flow,
            Flow::Await(Wait {
                reason: AwaitReason::Sleep,
                deadline: Some(Duration::from_secs(3)),
            })
        );
    }
}
