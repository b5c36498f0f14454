pub mod action;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod logger;
pub mod matcher;
pub mod platform;
pub mod sleep;
pub mod templates;
pub mod types;

pub use error::{BotError, Result};
