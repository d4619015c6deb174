// Points, coins and achievement ledger for employee gamification
// The `engine::Engine` owns every mutating operation. Storage sits behind
// the traits in `store`, with an in-memory backend and a Firestore one.

pub mod api;
pub mod cli;
pub mod commands;
pub mod engine;
pub mod error;
pub mod models;
pub mod store;
pub mod utils;
