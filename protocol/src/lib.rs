//! Wire types and shared data model for the custom-match coordination backend.
//!
//! This crate holds everything that has to agree bit-for-bit between the
//! backend and a client-gateway: the JSON frame envelope, the persisted
//! draft/match/player shapes, the fixed draft ordering, and the rating
//! formula. None of it talks to a socket, a KV store, or a database -
//! that belongs to `coordinator-server`.

pub mod draft_order;
pub mod frames;
pub mod model;
pub mod names;
pub mod rating;

pub use model::*;
