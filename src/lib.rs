//! Routes chat messages between front-end surfaces (chat bots) and a single
//! NLU back-end, correlating every reply with the message that caused it.

pub mod backend;
pub mod capsule;
pub mod config;
pub mod consts;
pub mod error;
pub mod frontend;
pub mod lifecycle;
pub mod logging;
pub mod pending;
pub mod registry;

pub use capsule::{Capsule, Content};
pub use error::{Error, Result};
