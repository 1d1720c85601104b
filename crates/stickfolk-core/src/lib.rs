//! Core simulation for the Stickfolk sandbox: stick-figure agents, fish-like predators,
//! and the crowds that form and dissolve between them.

use slotmap::{SecondaryMap, new_key_type};
use stickfolk_index::IndexError;
use thiserror::Error;

pub mod behavior;
pub mod chain;
pub mod cluster;
pub mod config;
pub mod crowd;
pub mod geometry;
pub mod ik;
pub mod phase;
pub mod pose;
pub mod predator;
pub mod render;
pub mod skeleton;
pub mod stickman;
pub mod world;

pub use behavior::{BehaviorState, Personality};
pub use config::StickfolkConfig;
pub use crowd::{Crowd, CrowdState};
pub use geometry::{Position, Tick};
pub use phase::{GroupId, Phase, PhaseController};
pub use predator::Predator;
pub use render::{AgentFrame, PredatorFrame, RenderFrame};
pub use skeleton::SkeletonError;
pub use stickman::{Directive, EventKind, Stickman};
pub use world::{TickEvents, TickSummary, WorldState};

new_key_type! {
    /// Stable handle for agents backed by a generational slot map.
    pub struct AgentId;
}

/// Convenience alias for associating side data with agents.
pub type AgentMap<T> = SecondaryMap<AgentId, T>;

/// Errors that can occur when constructing world state or requesting spawns.
#[derive(Debug, Error)]
pub enum WorldStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// A spawn request carried a NaN or infinite coordinate.
    #[error("spawn position ({x}, {y}) is not finite")]
    NonFiniteSpawn { x: f32, y: f32 },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
}
