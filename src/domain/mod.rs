//! Domain layer: the order aggregate, its satellites, and the ports the
//! reconciliation engine talks to.

pub mod event;
pub mod inventory;
pub mod money;
pub mod order;
pub mod payment;
pub mod ports;
pub mod retry;
