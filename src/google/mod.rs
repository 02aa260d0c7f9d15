//! Google OAuth plumbing shared by the Google-backed clients.

pub mod auth;

pub use auth::{adc_authenticator, service_account_authenticator, GoogleAuthenticator};
