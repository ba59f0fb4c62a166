// src/services/mod.rs
//! Business logic and the HTTP adapter.

pub mod api_server;
pub mod assembler;
pub mod email_verifier;
pub mod orchestrator;
pub mod secret_gate;
pub mod social_verifier;
pub mod verifier;
