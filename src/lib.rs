//! Alert-reaction analysis for a residential energy community.
//!
//! Household meter series are compared, window by window, against their own
//! same-weekday, same-time-of-day history to measure how much consumption
//! dropped during announced demand-response alerts, and in the hours around
//! them.

pub mod alerts;
pub mod baseline;
pub mod config;
pub mod convert;
pub mod error;
pub mod graph;
pub mod horizon;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod resample;
pub mod score;
pub mod series;
