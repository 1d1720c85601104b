//! Read-only frame snapshots handed to renderers and frame dumps.

use serde::{Deserialize, Serialize};

use crate::AgentId;
use crate::behavior::{BehaviorState, Personality};
use crate::geometry::{Position, Tick};
use crate::phase::{GroupId, Phase};
use crate::stickman::EventKind;
use crate::world::WorldState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFrame {
    pub id: AgentId,
    pub position: Position,
    pub state: BehaviorState,
    pub personality: Personality,
    pub event: Option<EventKind>,
    pub group: Option<GroupId>,
    /// World-space start/end of every skeletal link.
    pub segments: Vec<(Position, Position)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredatorFrame {
    pub heading: f32,
    /// Spine joints from head to tail.
    pub joints: Vec<Position>,
    pub angles: Vec<f32>,
    pub body_radii: Vec<f32>,
    pub mouth_radius: f32,
}

/// Everything needed to draw one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub tick: Tick,
    pub phase: Phase,
    pub agents: Vec<AgentFrame>,
    pub predators: Vec<PredatorFrame>,
}

impl RenderFrame {
    #[must_use]
    pub fn capture(world: &WorldState) -> Self {
        let agents = world
            .agents()
            .iter()
            .map(|(id, agent)| AgentFrame {
                id,
                position: agent.position,
                state: agent.state(),
                personality: agent.personality(),
                event: agent.event().map(|event| event.kind),
                group: agent.group_id(),
                segments: agent.segments(),
            })
            .collect();
        let predators = world
            .predators()
            .iter()
            .map(|predator| PredatorFrame {
                heading: predator.heading(),
                joints: predator.spine().joints().to_vec(),
                angles: predator.spine().angles().to_vec(),
                body_radii: predator.body_radii().to_vec(),
                mouth_radius: predator.mouth_radius(),
            })
            .collect();
        Self {
            tick: world.tick(),
            phase: world.phase(),
            agents,
            predators,
        }
    }
}
