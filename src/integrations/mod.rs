// src/integrations/mod.rs
//! External collaborators: secret decryption, email, social network, DID
//! resolution and analytics.

pub mod analytics;
pub mod email_dispatch;
pub mod key_resolver;
pub mod secret_source;
pub mod social_source;
