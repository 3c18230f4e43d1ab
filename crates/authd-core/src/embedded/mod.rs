//! In-memory collaborator stores backed by the configuration file.
//!
//! Users and clients are read once at startup and never change. Login
//! sessions live in process memory, so they do not survive a restart.

mod clients;
mod otp;
mod people;

pub use clients::EmbeddedClientStore;
pub use otp::EmbeddedOtpStore;
pub use people::{AuthenticPerson, EmbeddedIdentityStore};
