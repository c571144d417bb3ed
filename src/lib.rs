//! Marketsnap - multi-asset market snapshot with period returns
//!
//! Fetches daily closes for a configured instrument universe, anchors them
//! to a single timezone and reports 1D/1W/1M/1Y/QTD/YTD percentage changes.

pub mod anchor;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod pricing;
pub mod returns;
pub mod series;
pub mod snapshot;
pub mod store;
pub mod utils;
