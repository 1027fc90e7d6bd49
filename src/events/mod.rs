//! Board event system
//!
//! This module provides:
//! - `BoardEvent`: typed events for card, agent and graph activity
//! - `EventBus`: broadcast channel distributing events to in-process listeners
//! - `EventEmitter`: the producer-side trait injected into the pool, graph and card service

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{BoardEvent, EventEmitter};
