//! Credentials and token models exchanged with the authentication endpoints.

pub mod account;
pub mod secret;
pub mod tokens;

pub use account::*;
pub use secret::*;
pub use tokens::*;
