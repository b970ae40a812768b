//! Input and output formats at the edge of the service.

pub mod csv;
pub mod seed;
pub mod stripe;
