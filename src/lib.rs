//! SOS intake, severity triage, ambulance dispatch and green-corridor
//! signalling for a city emergency network.

pub mod config;
pub mod corridor;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod kafka;
pub mod models;
pub mod processor;
pub mod registry;
pub mod reporter;
pub mod severity;
pub mod store;

#[cfg(test)]
mod testing;
