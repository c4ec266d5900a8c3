//! Patient onboarding and authentication for the Bubble therapy app.
//!
//! Server side: an axum REST service (`app`, `auth`, `patients`, `bubble`)
//! over a [`store::Store`]. Client side: [`client`] holds the session
//! context and the remote-then-local fallback used by the mobile app.

pub mod app;
pub mod auth;
pub mod bubble;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod patients;
pub mod state;
pub mod store;

pub use error::{AuthError, AuthResult};
