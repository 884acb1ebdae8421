//! Secret handling for budget
//!
//! Provides scrubbed buffers for raw config bytes and zeroed strings for
//! passwords. Database encryption itself lives outside this crate.

pub mod secure_memory;

pub use secure_memory::{OsScrubber, Scrubber, SecretBuffer, SecureString, WIPE_PASSES};
