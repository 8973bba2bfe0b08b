//! Authentication instruction execution.

use crate::auth::compute_authentication_response;
use crate::engine::PlayContext;
use crate::error::Fault;
use crate::exec::Flow;
use crate::item::AuthBindings;
use crate::scenario::Scenario;

/// Execute `compute_authentication_response_parameter`.
pub(crate) fn step_compute_auth(
    scenario: &mut Scenario,
    bindings: &AuthBindings,
    ctx: &PlayContext<'_>,
) -> Result<Flow, Fault> {
    compute_authentication_response(&mut scenario.auth, &mut scenario.vars, bindings, ctx.auth)?;
    Ok(Flow::Continue)
}
