//! Signal filtering stages
//!
//! A cheap structural pre-filter, the heuristic quality filter and the
//! conditional sniper safety gate nested inside it. Collaborator contracts
//! live in [`collaborators`].

pub mod collaborators;
pub mod config;
pub mod heuristics;
pub mod pre_filter;
pub mod quality;
pub mod sniper;
pub mod symbol_state;
pub mod types;

pub use collaborators::{
    ConfirmationFilter, HoneypotAnalytics, OnChainAnalytics, SocialAnalytics,
};
pub use config::{PreFilterConfig, QualityFilterConfig, SniperConfig};
pub use pre_filter::PreFilter;
pub use quality::{QualityFilter, QualityStats, QualityVerdict};
pub use sniper::{SafetyGate, SniperResult, SniperStats};
pub use types::{Action, CheckPolicy, CheckResult, Recommendation, Signal, SniperAnalysis};
