//! Session and linked-identity management.
//!
//! - oauth: Microsoft authorization-code flow with PKCE, verifier storage
//! - pkce: verifier/challenge generation
//! - session: per-user session state and change subscriptions
//! - tokens: persisted provider tokens and refresh

pub mod handlers;
pub mod oauth;
pub mod pkce;
pub mod session;
pub mod tokens;
