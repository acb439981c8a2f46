mod common;

mod bus_timeout_escalation;
mod cold_start;
mod estop_during_movement;
mod guarded_transition_rejected;
mod network_failover;
mod safe_mode_recovery;
