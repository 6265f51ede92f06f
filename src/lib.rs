//! Typed client, sweep orchestration and display reshaping for a
//! counterfactual-explanation backend (GLANCE, GroupCFE, GLOBE_CE).

pub mod api;
pub mod compare;
pub mod config;
pub mod logging;
pub mod reshape;
pub mod session;
pub mod store;
pub mod sweep;
