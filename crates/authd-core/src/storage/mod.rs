//! Collaborator interfaces the protocol engine depends on.
//!
//! - [`IdentityStore`]: password authentication, person lookup and login sessions
//! - [`ClientStore`]: client registrations and client authentication
//! - [`OtpStore`]: second-factor keys
//!
//! In-memory implementations live in [`crate::embedded`].

pub mod client;
pub mod identity;
pub mod model;
pub mod otp;

pub use client::ClientStore;
pub use identity::IdentityStore;
pub use model::{Client, Person, SessionStatus, User};
pub use otp::OtpStore;
