//! The tick pipeline tying agents, predators, and crowds together.

use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

use crate::behavior::BehaviorState;
use crate::cluster::{dbscan, plan_rally_points};
use crate::config::StickfolkConfig;
use crate::crowd::{Crowd, CrowdContext, CrowdMember, CrowdOutcome, CrowdState};
use crate::geometry::{Position, Tick, centroid};
use crate::phase::{GroupId, Phase, PhaseController};
use crate::predator::{Predator, PredatorView, edge_spawn, home_for};
use crate::render::RenderFrame;
use crate::stickman::{Contact, Directive, Neighborhood, Stickman};
use crate::{AgentId, AgentMap, WorldStateError};

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    /// Agents created from queued spawn requests.
    pub spawned: Vec<AgentId>,
    pub predators_spawned: usize,
    /// Phase entered this tick, if the controller rolled over.
    pub phase_changed: Option<Phase>,
    /// Contact event pairs started this tick.
    pub events_started: usize,
    pub captured: Vec<AgentId>,
}

/// Per-tick population summary retained in the world history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub agent_count: usize,
    pub predator_count: usize,
    pub crowd_count: usize,
    pub grouped: usize,
    pub phase: Phase,
    pub captured: usize,
    pub events_started: usize,
}

/// Aggregate simulation state owned by the tick driver.
pub struct WorldState {
    config: StickfolkConfig,
    tick: Tick,
    rng: SmallRng,
    agents: SlotMap<AgentId, Stickman>,
    predators: Vec<Predator>,
    phase: PhaseController,
    crowds: Vec<Crowd>,
    directives: AgentMap<Directive>,
    neighborhood: Neighborhood,
    pending_spawns: Vec<Position>,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("tick", &self.tick)
            .field("phase", &self.phase.phase())
            .field("agent_count", &self.agents.len())
            .field("predator_count", &self.predators.len())
            .field("crowd_count", &self.crowds.len())
            .finish()
    }
}

impl WorldState {
    /// Instantiate an empty world using the supplied configuration.
    pub fn new(config: StickfolkConfig) -> Result<Self, WorldStateError> {
        config.validate()?;
        let rng = config.seeded_rng();
        let agents = SlotMap::with_key();
        let mut neighborhood = Neighborhood::new(config.agent.quiet_density_radius);
        neighborhood.rebuild(&agents, Vec::new())?;
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            agents,
            predators: Vec::new(),
            phase: PhaseController::new(),
            crowds: Vec::new(),
            directives: AgentMap::new(),
            neighborhood,
            pending_spawns: Vec::new(),
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();

        let spawned = self.stage_spawn_commit();
        let predators_spawned = self.stage_predator_spawns();
        let phase_changed = self.stage_phase(next_tick);
        let events_started = self.stage_agents();
        self.stage_predators();
        let captured = self.capture_sweep();
        self.stage_pose();

        self.tick = next_tick;
        self.stage_summary(captured.len(), events_started);
        TickEvents {
            tick: next_tick,
            spawned,
            predators_spawned,
            phase_changed,
            events_started,
            captured,
        }
    }

    fn stage_spawn_commit(&mut self) -> Vec<AgentId> {
        if self.pending_spawns.is_empty() {
            return Vec::new();
        }
        let requests = std::mem::take(&mut self.pending_spawns);
        let mut spawned = Vec::with_capacity(requests.len());
        for position in requests {
            match self.spawn_agent(position) {
                Ok(id) => spawned.push(id),
                Err(err) => warn!(%err, "dropping queued spawn"),
            }
        }
        spawned
    }

    /// Bring the predator population up to one per `agents_per_predator` live agents.
    fn stage_predator_spawns(&mut self) -> usize {
        let tuning = &self.config.predator;
        let wanted = (self.agents.len() / tuning.agents_per_predator).min(tuning.max_predators);
        let mut spawned = 0;
        while self.predators.len() < wanted {
            let (origin, home) = edge_spawn(
                self.config.world_width,
                self.config.world_height,
                tuning.spawn_margin,
                tuning.home_inset,
                &mut self.rng,
            );
            self.predators
                .push(Predator::new(origin, home, tuning, &mut self.rng));
            spawned += 1;
        }
        if spawned > 0 {
            info!(
                spawned,
                predators = self.predators.len(),
                agents = self.agents.len(),
                "predators entered the world"
            );
        }
        spawned
    }

    fn stage_phase(&mut self, next_tick: Tick) -> Option<Phase> {
        self.refresh_neighborhood();
        let mut regrouped = false;
        if self.phase.should_cluster() {
            self.form_groups();
            regrouped = true;
        }

        let changed = self.phase.advance(&self.config.phases);
        if let Some(phase) = changed {
            info!(tick = next_tick.0, ?phase, "crowd phase changed");
            match phase {
                Phase::Holding => self.build_crowds(),
                Phase::Disbanding => self.release_all(),
                Phase::Forming => {}
            }
            regrouped = true;
        }

        self.directives.clear();
        match self.phase.phase() {
            Phase::Forming => self.issue_rally_orders(),
            Phase::Holding => regrouped |= self.tick_crowds(),
            Phase::Disbanding => {}
        }
        if regrouped {
            self.refresh_neighborhood();
        }
        changed
    }

    fn refresh_neighborhood(&mut self) {
        let heads = self.predators.iter().map(Predator::head).collect();
        if let Err(err) = self.neighborhood.rebuild(&self.agents, heads) {
            warn!(%err, "failed to rebuild agent neighborhood");
        }
    }

    /// Cluster every agent and hand each cluster a group id and rally point.
    fn form_groups(&mut self) {
        let ids: Vec<AgentId> = self.agents.keys().collect();
        let positions: Vec<(f32, f32)> = self
            .agents
            .values()
            .map(|agent| agent.position.as_tuple())
            .collect();
        let tuning = &self.config.crowd;
        let labels = match dbscan(&positions, tuning.eps, tuning.min_pts) {
            Ok(labels) => labels,
            Err(err) => {
                warn!(%err, "clustering skipped");
                return;
            }
        };

        let cluster_count = labels.iter().flatten().max().map_or(0, |max| max + 1);
        let mut clusters: Vec<Vec<AgentId>> = vec![Vec::new(); cluster_count];
        for (id, label) in ids.iter().zip(&labels) {
            if let Some(cluster) = label {
                clusters[*cluster].push(*id);
            }
        }
        let mut groups = Vec::with_capacity(cluster_count);
        for members in clusters {
            let points = members
                .iter()
                .filter_map(|id| self.agents.get(*id))
                .map(|agent| agent.position);
            match centroid(points) {
                Some(center) => groups.push((members, center)),
                None => debug!("skipping empty cluster"),
            }
        }

        let centroids: Vec<Position> = groups.iter().map(|(_, center)| *center).collect();
        let rally_points = plan_rally_points(
            &centroids,
            tuning.eps,
            tuning.rally_band,
            tuning.rally_min_separation,
            &mut self.rng,
        );
        let mut grouped = 0;
        for ((members, _), rally_point) in groups.into_iter().zip(rally_points) {
            let group = self.phase.allocate_group(rally_point);
            for id in members {
                if let Some(agent) = self.agents.get_mut(id) {
                    agent.join_group(group);
                    grouped += 1;
                }
            }
        }
        info!(
            groups = centroids.len(),
            grouped,
            noise = ids.len() - grouped,
            "agents clustered"
        );
    }

    /// One crowd per surviving group; groups that lost too many members are released.
    fn build_crowds(&mut self) {
        let mut groups: BTreeMap<GroupId, Vec<AgentId>> = BTreeMap::new();
        for (id, agent) in &self.agents {
            if let Some(group) = agent.group_id() {
                groups.entry(group).or_default().push(id);
            }
        }
        self.crowds.clear();
        let mut released = Vec::new();
        for (group, members) in groups {
            if members.len() < self.config.crowd.min_members {
                released.extend(members);
                continue;
            }
            self.crowds
                .push(Crowd::new(group, members, &self.config.crowd));
        }
        self.release(&released, BehaviorState::Wander);
        info!(crowds = self.crowds.len(), "crowds assembled");
    }

    fn release_all(&mut self) {
        let grouped: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|(_, agent)| agent.group_id().is_some())
            .map(|(id, _)| id)
            .collect();
        self.release(&grouped, BehaviorState::Wander);
        self.crowds.clear();
    }

    fn release(&mut self, ids: &[AgentId], state: BehaviorState) {
        for id in ids {
            if let Some(agent) = self.agents.get_mut(*id) {
                agent.leave_group(state, &self.neighborhood, &self.config, &mut self.rng);
            }
        }
    }

    fn issue_rally_orders(&mut self) {
        for (id, agent) in &self.agents {
            let Some(group) = agent.group_id() else {
                continue;
            };
            let directive = match self.phase.rally_point(group) {
                Some(target) => Directive::MoveTo {
                    target,
                    speed_scale: 1.0,
                    state: BehaviorState::Wander,
                },
                None => Directive::Hold {
                    state: BehaviorState::Idle,
                },
            };
            self.directives.insert(id, directive);
        }
    }

    /// Tick every crowd; returns whether any crowd dissolved.
    fn tick_crowds(&mut self) -> bool {
        let heads = self.neighborhood.predator_heads().to_vec();
        let rally: Vec<(GroupId, Position)> = self
            .crowds
            .iter()
            .filter_map(|crowd| self.phase.rally_point(crowd.id()).map(|p| (crowd.id(), p)))
            .collect();
        let mut released = Vec::new();
        for crowd in &mut self.crowds {
            let members: Vec<CrowdMember> = crowd
                .members()
                .iter()
                .filter_map(|id| {
                    self.agents.get(*id).map(|agent| CrowdMember {
                        id: *id,
                        position: agent.position,
                        personality: agent.personality(),
                    })
                })
                .collect();
            let rivals: Vec<Position> = rally
                .iter()
                .filter(|(group, _)| *group != crowd.id())
                .map(|(_, point)| *point)
                .collect();
            let ctx = CrowdContext {
                members: &members,
                predator_heads: &heads,
                rival_rally_points: &rivals,
                neighborhood: &self.neighborhood,
                tuning: &self.config.crowd,
                agent: &self.config.agent,
            };
            match crowd.tick(&ctx, &mut self.rng) {
                CrowdOutcome::Directives(orders) => {
                    for (id, directive) in orders {
                        self.directives.insert(id, directive);
                    }
                }
                CrowdOutcome::Disband(ids) => released.extend(ids),
            }
        }
        let before = self.crowds.len();
        self.crowds.retain(|crowd| crowd.state() != CrowdState::Disband);
        self.release(&released, CrowdState::Disband.member_state());
        self.crowds.len() != before
    }

    fn stage_agents(&mut self) -> usize {
        let ids: Vec<AgentId> = self.agents.keys().collect();
        let mut started = 0;
        for id in ids {
            let Some(agent) = self.agents.get_mut(id) else {
                continue;
            };
            if agent.group_id().is_some() {
                let directive = self.directives.get(id).copied().unwrap_or(Directive::Hold {
                    state: BehaviorState::Idle,
                });
                agent.follow(directive, &self.config);
                continue;
            }
            let Some(contact) = agent.update(id, &self.neighborhood, &self.config, &mut self.rng)
            else {
                continue;
            };
            if self.start_contact(id, contact) {
                started += 1;
            }
        }
        started
    }

    /// Start the event pair for a contact if both agents are still free.
    fn start_contact(&mut self, initiator: AgentId, contact: Contact) -> bool {
        let free = |id: AgentId| {
            self.agents
                .get(id)
                .filter(|agent| agent.event().is_none() && agent.group_id().is_none())
                .map(|agent| agent.position)
        };
        if initiator == contact.target {
            return false;
        }
        let (Some(from), Some(to)) = (free(initiator), free(contact.target)) else {
            return false;
        };
        if let Some(agent) = self.agents.get_mut(initiator) {
            agent.start_event(contact.kind, Some(contact.target), from.angle_to(to));
        }
        if let Some(agent) = self.agents.get_mut(contact.target) {
            agent.start_event(contact.kind.counterpart(), Some(initiator), to.angle_to(from));
        }
        debug!(?initiator, target = ?contact.target, kind = ?contact.kind, "contact event started");
        true
    }

    fn stage_predators(&mut self) {
        let views: Vec<PredatorView> = self.predators.iter().map(Predator::view).collect();
        let homes: Vec<Position> = self.predators.iter().map(Predator::home).collect();
        for (idx, predator) in self.predators.iter_mut().enumerate() {
            let others: Vec<PredatorView> = views
                .iter()
                .enumerate()
                .filter(|(other, _)| *other != idx)
                .map(|(_, view)| *view)
                .collect();
            predator.update(&others, &homes, &self.config.predator, &mut self.rng);
        }
    }

    /// Remove every agent inside a predator's mouth radius, returning their handles.
    pub fn capture_sweep(&mut self) -> Vec<AgentId> {
        if self.predators.is_empty() {
            return Vec::new();
        }
        let mouths: Vec<(Position, f32)> = self
            .predators
            .iter()
            .map(|predator| (predator.head(), predator.mouth_radius()))
            .collect();
        let captured: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|(_, agent)| {
                mouths
                    .iter()
                    .any(|(head, radius)| head.distance_sq(agent.position) <= radius * radius)
            })
            .map(|(id, _)| id)
            .collect();
        for id in &captured {
            self.agents.remove(*id);
            self.directives.remove(*id);
            debug!(agent = ?id, "agent captured");
        }
        captured
    }

    fn stage_pose(&mut self) {
        let event_duration = self.config.agent.event_duration;
        for agent in self.agents.values_mut() {
            agent.pose(&self.config.gait, event_duration);
        }
    }

    fn stage_summary(&mut self, captured: usize, events_started: usize) {
        let summary = TickSummary {
            tick: self.tick,
            agent_count: self.agents.len(),
            predator_count: self.predators.len(),
            crowd_count: self.crowds.len(),
            grouped: self.grouped_count(),
            phase: self.phase.phase(),
            captured,
            events_started,
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    /// Create an agent immediately; only call this between ticks.
    pub fn spawn_agent(&mut self, position: Position) -> Result<AgentId, WorldStateError> {
        if !position.is_finite() {
            return Err(WorldStateError::NonFiniteSpawn {
                x: position.x,
                y: position.y,
            });
        }
        let agent = Stickman::new(position, &self.config, &mut self.rng)?;
        let personality = agent.personality();
        let id = self.agents.insert(agent);
        debug!(agent = ?id, ?personality, x = position.x, y = position.y, "agent spawned");
        Ok(id)
    }

    /// Buffer a spawn request, committed at the start of the next tick.
    pub fn queue_spawn(&mut self, position: Position) -> Result<(), WorldStateError> {
        if !position.is_finite() {
            return Err(WorldStateError::NonFiniteSpawn {
                x: position.x,
                y: position.y,
            });
        }
        self.pending_spawns.push(position);
        Ok(())
    }

    /// Place a predator with its head at `position`, homed inside the world rectangle.
    pub fn spawn_predator(&mut self, position: Position) -> Result<usize, WorldStateError> {
        if !position.is_finite() {
            return Err(WorldStateError::NonFiniteSpawn {
                x: position.x,
                y: position.y,
            });
        }
        let tuning = &self.config.predator;
        let home = home_for(
            position,
            self.config.world_width,
            self.config.world_height,
            tuning.home_inset,
        );
        self.predators
            .push(Predator::new(position, home, tuning, &mut self.rng));
        Ok(self.predators.len() - 1)
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &StickfolkConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.phase()
    }

    #[must_use]
    pub fn phase_controller(&self) -> &PhaseController {
        &self.phase
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Borrow the world RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    #[must_use]
    pub fn agents(&self) -> &SlotMap<AgentId, Stickman> {
        &self.agents
    }

    #[must_use]
    pub fn agent(&self, id: AgentId) -> Option<&Stickman> {
        self.agents.get(id)
    }

    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Agents currently controlled by a crowd or rally order.
    #[must_use]
    pub fn grouped_count(&self) -> usize {
        self.agents
            .values()
            .filter(|agent| agent.group_id().is_some())
            .count()
    }

    #[must_use]
    pub fn predators(&self) -> &[Predator] {
        &self.predators
    }

    #[must_use]
    pub fn crowds(&self) -> &[Crowd] {
        &self.crowds
    }

    /// Order issued to a grouped agent during the last tick.
    #[must_use]
    pub fn directive(&self, id: AgentId) -> Option<Directive> {
        self.directives.get(id).copied()
    }

    /// Snapshot of everything the renderer draws.
    #[must_use]
    pub fn render_frame(&self) -> RenderFrame {
        RenderFrame::capture(self)
    }
}
