//! Stripe webhook payloads: envelope decoding, normalization, JSON-lines input.

pub mod event_reader;
pub mod normalizer;
