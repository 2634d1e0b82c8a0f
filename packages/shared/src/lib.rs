//! Utilities shared by the clinic chat packages.

pub mod logger;
pub mod time;
