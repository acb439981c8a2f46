//! Named guard predicates for the state-machine transition table (§4.7).
//!
//! Guards are plain `fn(&FsmContext) -> bool` so the transition table can
//! reference them by name instead of inlining boolean expressions, and so
//! each guard can carry its own doc comment describing the condition it
//! checks.

use oht_common::state::FsmContext;

/// Always fires.
pub fn always(_ctx: &FsmContext) -> bool {
    true
}

/// `context.safety_ok`.
pub fn safety_ok(ctx: &FsmContext) -> bool {
    ctx.guards.safety_ok
}

/// `system_ready ∧ safety_ok ∧ comms_ok ∧ sensors_ok ∧ fault == None`.
pub fn system_ready(ctx: &FsmContext) -> bool {
    ctx.guards.system_ready
        && ctx.guards.safety_ok
        && ctx.guards.comms_ok
        && ctx.guards.sensors_ok
        && ctx.current_fault == oht_common::state::FaultKind::None
}

/// `fault == None`.
pub fn no_fault(ctx: &FsmContext) -> bool {
    ctx.current_fault == oht_common::state::FaultKind::None
}

/// `safety_ok ∧ location_ok ∧ target_valid`.
pub fn move_ready(ctx: &FsmContext) -> bool {
    ctx.guards.safety_ok && ctx.guards.location_ok && ctx.guards.target_valid
}

/// `safety_ok ∧ comms_ok ∧ sensors_ok ∧ ¬estop_triggered ∧ fault == None`,
/// used for `Fault/EStop → Safe`. E-Stop-triggered is inferred from
/// `safety_ok` being false, since the safety monitor clears it only once
/// the channels agree and no fault is latched.
pub fn safety_verified(ctx: &FsmContext) -> bool {
    ctx.guards.safety_ok
        && ctx.guards.comms_ok
        && ctx.guards.sensors_ok
        && ctx.current_fault == oht_common::state::FaultKind::None
}
