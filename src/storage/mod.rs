// src/storage/mod.rs
//! Claim persistence.

pub mod claim_store;
