//! Placement for Tessera.
//!
//! While a page is built, content and part handlers produce a flat list of
//! shapes. A [`PlacementStrategy`] decides where in the page tree each of
//! them goes. [`RulePlacementStrategy`] checks custom handlers, then regex
//! [`MatchRule`]s, then a type table, then the shape's own `meta.placement`.

pub mod config;
pub mod error;
pub mod rule;
pub mod strategy;

pub use config::{MatchRuleConfig, PlacementConfig};
pub use error::{PlacementError, PlacementResult};
pub use rule::{Field, MatchRule, Target};
pub use strategy::{
    PlacementContext, PlacementHandler, PlacementStrategy, RulePlacementStrategy,
    PLACEMENT_HANDLER, PLACEMENT_STRATEGY,
};
