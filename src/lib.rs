//! Smart traffic dashboard: per-frame vehicle counting over an uploaded video
//! and a signal timing recommendation derived from the totals.

pub mod config;
pub mod counts;
pub mod decision;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod types;
pub mod web_api;

#[cfg(feature = "vision")]
pub mod vehicle_detection;
#[cfg(feature = "vision")]
pub mod video_processor;
