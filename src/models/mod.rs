// src/models/mod.rs
//! Data structures shared across the engine.

pub mod claim;
pub mod document;
pub mod secrets;
pub mod verdict;
