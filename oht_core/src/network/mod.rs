//! C8 Network Link Manager (§4.8): up to [`oht_common::consts::MAX_INTERFACES`]
//! uplinks, health probing, and priority-ordered failover.

pub mod link;

pub use link::{LinkError, LinkManager};
