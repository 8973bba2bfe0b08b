//! Variable instruction execution.

use crate::error::Fault;
use crate::exec::Flow;
use crate::item::SetSource;
use crate::scenario::Scenario;

/// Execute `set_var`.
pub(crate) fn step_set_var(
    scenario: &mut Scenario,
    var: &str,
    source: &SetSource,
) -> Result<Flow, Fault> {
    let value = match source {
        SetSource::Value(value) => value.clone(),
        SetSource::Var(from) => scenario.vars.get(from)?.clone(),
    };
    tracing::debug!(var, %value, "set_var");
    scenario.vars.set(var, value)?;
    Ok(Flow::Continue)
}

/// Execute `incr_var`.
pub(crate) fn step_incr(scenario: &mut Scenario, var: &str) -> Result<Flow, Fault> {
    scenario.vars.increment(var)?;
    Ok(Flow::Continue)
}

/// Execute `decr_var`.
pub(crate) fn step_decr(scenario: &mut Scenario, var: &str) -> Result<Flow, Fault> {
    scenario.vars.decrement(var)?;
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthContext;
    use crate::error::VarError;
    use crate::scenario::ScenarioId;
    use crate::value::{VarType, VarValue};
    use assert_matches::assert_matches;

    fn scenario() -> Scenario {
        let mut s = Scenario::new(ScenarioId(0), "vars", AuthContext::default());
        s.vars
            .declare("n", VarType::Int64, Some(VarValue::Int(5)))
            .unwrap();
        s.vars.declare("m", VarType::Int64, None).unwrap();
        s.vars.declare("b", VarType::Bytes, None).unwrap();
        s
    }

    #[test]
    fn test_set_from_other_variable() {
        let mut s = scenario();
        let flow = step_set_var(&mut s, "m", &SetSource::Var("n".into())).unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(s.vars.get("m").unwrap(), &VarValue::Int(5));
    }

    #[test]
    fn test_incr_decr() {
        let mut s = scenario();
        step_incr(&mut s, "n").unwrap();
        step_incr(&mut s, "n").unwrap();
        step_decr(&mut s, "n").unwrap();
        assert_eq!(s.vars.get("n").unwrap(), &VarValue::Int(6));
    }

    #[test]
    fn test_incr_bytes_is_type_mismatch() {
        let mut s = scenario();
        assert_matches!(
            step_incr(&mut s, "b"),
            Err(Fault::Variable(VarError::TypeMismatch { .. }))
        );
    }
}
