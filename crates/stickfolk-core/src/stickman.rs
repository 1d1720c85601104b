//! Individual stick-figure agents: per-tick overrides, the personality FSM, and the
//! movement policy of each behavior state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};
use std::f32::consts::TAU;
use stickfolk_index::{IndexError, NeighborhoodIndex, UniformGridIndex};
use tracing::{debug, warn};

use crate::AgentId;
use crate::behavior::{BehaviorState, Personality, sample_next};
use crate::config::{GaitTuning, StickfolkConfig};
use crate::geometry::Position;
use crate::phase::GroupId;
use crate::pose::{PoseKind, PoseState, VignetteInput, apply_pose};
use crate::skeleton::{Skeleton, SkeletonError, StickmanRig};

/// Animation-only states triggered by contact between two agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Caught,
    CaughtVictim,
    Investigated,
    InvestigatedTarget,
}

impl EventKind {
    /// Event played by the other agent of the pair.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Caught => Self::CaughtVictim,
            Self::CaughtVictim => Self::Caught,
            Self::Investigated => Self::InvestigatedTarget,
            Self::InvestigatedTarget => Self::Investigated,
        }
    }
}

/// Running transient event; suspends the FSM and movement until it expires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub kind: EventKind,
    pub timer: u32,
    pub partner: Option<AgentId>,
    /// Angle from this agent toward its partner when the event started.
    pub heading: f32,
}

/// Contact reported by a chaser or investigator that reached its target this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub target: AgentId,
    /// Event for the initiating agent; the target plays the counterpart.
    pub kind: EventKind,
}

/// Movement order issued to a grouped agent by its crowd or the phase controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    /// Walk toward `target`, posing as `state`; stop once within the arrival buffer.
    MoveTo {
        target: Position,
        speed_scale: f32,
        state: BehaviorState,
    },
    /// Run straight away from `threat`.
    FleeFrom { threat: Position, speed_scale: f32 },
    /// Stand in place, posing as `state`.
    Hold { state: BehaviorState },
}

/// Frozen view of one agent taken before the agent stage runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub position: Position,
    pub personality: Personality,
    pub state: BehaviorState,
    pub focus: Option<AgentId>,
    pub busy: bool,
    pub grouped: bool,
}

/// Everything an agent may observe about the rest of the world during its update.
///
/// Rebuilt once per tick so every agent reads the same pre-update positions.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    snapshots: Vec<AgentSnapshot>,
    lookup: SecondaryMap<AgentId, usize>,
    pursuers: SecondaryMap<AgentId, Position>,
    index: UniformGridIndex,
    predator_heads: Vec<Position>,
}

impl Neighborhood {
    /// Create an empty neighborhood bucketed with the given grid cell size.
    #[must_use]
    pub fn new(cell_size: f32) -> Self {
        Self {
            snapshots: Vec::new(),
            lookup: SecondaryMap::new(),
            pursuers: SecondaryMap::new(),
            index: UniformGridIndex::new(cell_size),
            predator_heads: Vec::new(),
        }
    }

    /// Snapshot every agent and re-bucket their positions.
    pub fn rebuild(
        &mut self,
        agents: &SlotMap<AgentId, Stickman>,
        predator_heads: Vec<Position>,
    ) -> Result<(), IndexError> {
        self.snapshots.clear();
        self.lookup.clear();
        self.pursuers.clear();
        for (id, agent) in agents {
            self.lookup.insert(id, self.snapshots.len());
            self.snapshots.push(agent.snapshot(id));
        }
        for snapshot in &self.snapshots {
            let hunting = snapshot.personality == Personality::Hostile
                && snapshot.state == BehaviorState::Chase
                && !snapshot.busy
                && !snapshot.grouped;
            let Some(victim) = snapshot.focus.filter(|_| hunting) else {
                continue;
            };
            if !self.pursuers.contains_key(victim) {
                self.pursuers.insert(victim, snapshot.position);
            }
        }
        let positions: Vec<(f32, f32)> = self.snapshots.iter().map(|s| s.position.as_tuple()).collect();
        self.index.rebuild(&positions)?;
        self.predator_heads = predator_heads;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self, id: AgentId) -> Option<&AgentSnapshot> {
        self.lookup.get(id).map(|&idx| &self.snapshots[idx])
    }

    #[must_use]
    pub fn snapshots(&self) -> &[AgentSnapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn predator_heads(&self) -> &[Position] {
        &self.predator_heads
    }

    /// Number of agents within `radius` of `point`.
    #[must_use]
    pub fn density(&self, point: Position, radius: f32) -> usize {
        self.index.count_within(point.as_tuple(), radius)
    }

    /// Position of a hostile agent currently chasing `id`, if any.
    #[must_use]
    pub fn pursuer_of(&self, id: AgentId) -> Option<Position> {
        self.pursuers.get(id).copied()
    }

    /// Closest predator head within `radius` of `point`.
    #[must_use]
    pub fn nearest_predator(&self, point: Position, radius: f32) -> Option<Position> {
        let radius_sq = radius * radius;
        self.predator_heads
            .iter()
            .copied()
            .filter(|head| head.distance_sq(point) <= radius_sq)
            .min_by(|a, b| a.distance_sq(point).total_cmp(&b.distance_sq(point)))
    }

    /// Nearest free, ungrouped agent other than `id` within `radius`.
    #[must_use]
    pub fn nearest_free(&self, id: AgentId, radius: f32) -> Option<AgentSnapshot> {
        let own = self.lookup.get(id).copied();
        let center = self.snapshot(id)?.position;
        self.index
            .nearest_within(center.as_tuple(), radius, &|idx| {
                Some(idx) == own || self.snapshots[idx].busy || self.snapshots[idx].grouped
            })
            .map(|idx| self.snapshots[idx])
    }

    /// Pick the least crowded of `candidates` random points around `origin`.
    pub fn quiet_spot<R: Rng + ?Sized>(
        &self,
        origin: Position,
        candidates: usize,
        search_radius: f32,
        density_radius: f32,
        rng: &mut R,
    ) -> Position {
        let mut best = origin;
        let mut best_score = usize::MAX;
        for _ in 0..candidates.max(1) {
            let angle = rng.random_range(0.0..TAU);
            let distance = rng.random_range(0.5..=1.0) * search_radius;
            let candidate = origin.offset(angle, distance);
            let score = self.density(candidate, density_radius);
            if score < best_score {
                best = candidate;
                best_score = score;
            }
        }
        best
    }
}

/// An autonomous stick figure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stickman {
    pub position: Position,
    pub velocity: Position,
    personality: Personality,
    state: BehaviorState,
    state_timer: u32,
    event: Option<ActiveEvent>,
    group_id: Option<GroupId>,
    walk_speed: f32,
    wander_radius: f32,
    target: Position,
    focus: Option<AgentId>,
    threat: Option<Position>,
    pose: PoseState,
    skeleton: Skeleton,
    rig: StickmanRig,
}

impl Stickman {
    /// Create a wandering agent with randomly drawn personality and traits.
    pub fn new<R: Rng + ?Sized>(
        position: Position,
        config: &StickfolkConfig,
        rng: &mut R,
    ) -> Result<Self, SkeletonError> {
        let personality = Personality::random(rng);
        Self::with_personality(position, personality, config, rng)
    }

    /// Create a wandering agent with a fixed personality; speed and wander radius are
    /// still drawn from the configured ranges.
    pub fn with_personality<R: Rng + ?Sized>(
        position: Position,
        personality: Personality,
        config: &StickfolkConfig,
        rng: &mut R,
    ) -> Result<Self, SkeletonError> {
        let tuning = &config.agent;
        let (skeleton, rig) = StickmanRig::build(position)?;
        let mut agent = Self {
            position,
            velocity: Position::ORIGIN,
            personality,
            state: BehaviorState::Wander,
            state_timer: 0,
            event: None,
            group_id: None,
            walk_speed: rng.random_range(tuning.walk_speed_min..=tuning.walk_speed_max),
            wander_radius: rng.random_range(tuning.wander_radius_min..=tuning.wander_radius_max),
            target: position,
            focus: None,
            threat: None,
            pose: PoseState::default(),
            skeleton,
            rig,
        };
        agent.pick_wander_target(rng);
        Ok(agent)
    }

    #[must_use]
    pub fn personality(&self) -> Personality {
        self.personality
    }

    #[must_use]
    pub fn state(&self) -> BehaviorState {
        self.state
    }

    #[must_use]
    pub fn state_timer(&self) -> u32 {
        self.state_timer
    }

    #[must_use]
    pub fn event(&self) -> Option<&ActiveEvent> {
        self.event.as_ref()
    }

    #[must_use]
    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    #[must_use]
    pub fn walk_speed(&self) -> f32 {
        self.walk_speed
    }

    #[must_use]
    pub fn wander_radius(&self) -> f32 {
        self.wander_radius
    }

    /// Current movement target for walking states.
    #[must_use]
    pub fn target(&self) -> Position {
        self.target
    }

    /// Agent currently being chased or investigated.
    #[must_use]
    pub fn focus(&self) -> Option<AgentId> {
        self.focus
    }

    #[must_use]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[must_use]
    pub fn rig(&self) -> &StickmanRig {
        &self.rig
    }

    #[must_use]
    pub fn pose_state(&self) -> &PoseState {
        &self.pose
    }

    /// World-space start/end of every link.
    #[must_use]
    pub fn segments(&self) -> Vec<(Position, Position)> {
        self.skeleton.segments()
    }

    #[must_use]
    pub fn snapshot(&self, id: AgentId) -> AgentSnapshot {
        AgentSnapshot {
            id,
            position: self.position,
            personality: self.personality,
            state: self.state,
            focus: self.focus,
            busy: self.event.is_some(),
            grouped: self.group_id.is_some(),
        }
    }

    /// Begin a transient event, suspending the FSM until it expires.
    pub fn start_event(&mut self, kind: EventKind, partner: Option<AgentId>, heading: f32) {
        self.event = Some(ActiveEvent {
            kind,
            timer: 0,
            partner,
            heading,
        });
        self.focus = None;
        self.velocity = Position::ORIGIN;
    }

    /// Hand control to a crowd; any event or pursuit is abandoned.
    pub fn join_group(&mut self, group: GroupId) {
        self.group_id = Some(group);
        self.event = None;
        self.focus = None;
        self.state_timer = 0;
    }

    /// Return control to the individual FSM in `state`.
    pub fn leave_group<R: Rng + ?Sized>(
        &mut self,
        state: BehaviorState,
        hood: &Neighborhood,
        config: &StickfolkConfig,
        rng: &mut R,
    ) {
        self.group_id = None;
        self.enter_state(state, hood, config, rng);
    }

    /// Force a behavior state, running its entry policy.
    pub fn enter_state<R: Rng + ?Sized>(
        &mut self,
        state: BehaviorState,
        hood: &Neighborhood,
        config: &StickfolkConfig,
        rng: &mut R,
    ) {
        self.state = state;
        self.state_timer = 0;
        self.focus = None;
        match state {
            BehaviorState::Wander => self.pick_wander_target(rng),
            BehaviorState::SeekQuiet => {
                let tuning = &config.agent;
                self.target = hood.quiet_spot(
                    self.position,
                    tuning.quiet_candidates,
                    tuning.quiet_search_radius,
                    tuning.quiet_density_radius,
                    rng,
                );
            }
            _ => {}
        }
    }

    fn pick_wander_target<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let angle = rng.random_range(0.0..TAU);
        let distance = rng.random_range(0.0..=self.wander_radius);
        self.target = self.position.offset(angle, distance);
    }

    /// One tick of the individual FSM for an ungrouped agent.
    ///
    /// Returns a contact when a chase or investigation reached its target; the caller
    /// decides whether both agents are still free to start the event pair.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        hood: &Neighborhood,
        config: &StickfolkConfig,
        rng: &mut R,
    ) -> Option<Contact> {
        let tuning = &config.agent;

        if let Some(threat) = hood.nearest_predator(self.position, tuning.flee_distance) {
            if self.state != BehaviorState::RunAway {
                debug!(?id, "fleeing predator");
            }
            self.event = None;
            self.focus = None;
            self.state = BehaviorState::RunAway;
            self.state_timer = 0;
            self.threat = Some(threat);
            self.run_from(threat, self.walk_speed * tuning.predator_flee_multiplier);
            return None;
        }

        if let Some(event) = self.event.as_mut() {
            event.timer += 1;
            self.velocity = Position::ORIGIN;
            if event.timer >= tuning.event_duration {
                self.event = None;
                self.enter_state(BehaviorState::Wander, hood, config, rng);
            }
            return None;
        }

        if let Some(chaser) = hood.pursuer_of(id) {
            self.focus = None;
            self.state = BehaviorState::RunAway;
            self.state_timer = 0;
            self.threat = Some(chaser);
            self.run_from(chaser, self.walk_speed * tuning.chaser_flee_multiplier);
            return None;
        }

        self.state_timer += 1;
        if self.state_timer > self.state.duration(&config.durations) {
            let next = sample_next(self.personality, self.state, rng).unwrap_or_else(|| {
                warn!(
                    personality = ?self.personality,
                    state = ?self.state,
                    "no transition row defined; falling back to wander"
                );
                BehaviorState::Wander
            });
            self.enter_state(next, hood, config, rng);
        }

        self.run_state(id, hood, config, rng)
    }

    fn run_state<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        hood: &Neighborhood,
        config: &StickfolkConfig,
        rng: &mut R,
    ) -> Option<Contact> {
        let tuning = &config.agent;
        match self.state {
            BehaviorState::Idle | BehaviorState::Rest => {
                self.velocity = self.velocity * tuning.idle_damping;
                self.position += self.velocity;
                None
            }
            BehaviorState::Wander => {
                if self.position.distance(self.target) <= tuning.arrival_buffer {
                    self.pick_wander_target(rng);
                }
                self.walk_to(self.target, self.walk_speed, tuning.arrival_buffer);
                None
            }
            BehaviorState::SeekQuiet => {
                self.walk_to(self.target, self.walk_speed, tuning.arrival_buffer);
                None
            }
            BehaviorState::RunAway => {
                match self.threat {
                    Some(threat) => self.run_from(threat, self.walk_speed),
                    None => {
                        self.velocity = self.velocity * tuning.idle_damping;
                        self.position += self.velocity;
                    }
                }
                None
            }
            BehaviorState::Chase => self.pursue(
                id,
                hood,
                config,
                rng,
                self.walk_speed * tuning.chase_multiplier,
                tuning.arrival_buffer,
                EventKind::Caught,
            ),
            BehaviorState::Investigate => self.pursue(
                id,
                hood,
                config,
                rng,
                self.walk_speed,
                tuning.arrival_buffer * tuning.investigate_buffer_scale,
                EventKind::Investigated,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pursue<R: Rng + ?Sized>(
        &mut self,
        id: AgentId,
        hood: &Neighborhood,
        config: &StickfolkConfig,
        rng: &mut R,
        speed: f32,
        buffer: f32,
        kind: EventKind,
    ) -> Option<Contact> {
        let radius = config.agent.detection_radius;
        let current = self.focus.and_then(|focus| hood.snapshot(focus).copied()).filter(|s| {
            !s.busy && !s.grouped && s.position.distance(self.position) <= radius
        });
        let Some(target) = current.or_else(|| hood.nearest_free(id, radius)) else {
            self.enter_state(BehaviorState::Wander, hood, config, rng);
            self.walk_to(self.target, self.walk_speed, config.agent.arrival_buffer);
            return None;
        };
        self.focus = Some(target.id);
        self.target = target.position;
        if self.position.distance(target.position) <= buffer {
            self.velocity = Position::ORIGIN;
            return Some(Contact {
                target: target.id,
                kind,
            });
        }
        self.walk_to(target.position, speed, buffer);
        None
    }

    /// Carry out a crowd or phase order for a grouped agent.
    pub fn follow(&mut self, directive: Directive, config: &StickfolkConfig) {
        let tuning = &config.agent;
        self.event = None;
        self.focus = None;
        self.state_timer = 0;
        match directive {
            Directive::MoveTo {
                target,
                speed_scale,
                state,
            } => {
                self.state = state;
                self.target = target;
                self.walk_to(target, self.walk_speed * speed_scale, tuning.arrival_buffer);
            }
            Directive::FleeFrom { threat, speed_scale } => {
                self.state = BehaviorState::RunAway;
                self.threat = Some(threat);
                self.run_from(threat, self.walk_speed * speed_scale);
            }
            Directive::Hold { state } => {
                self.state = state;
                self.velocity = self.velocity * tuning.idle_damping;
                self.position += self.velocity;
            }
        }
    }

    fn walk_to(&mut self, target: Position, speed: f32, buffer: f32) {
        let offset = target - self.position;
        if offset.length() <= buffer {
            self.velocity = Position::ORIGIN;
            return;
        }
        self.velocity = offset.normalize_or_zero() * speed;
        self.position += self.velocity;
    }

    fn run_from(&mut self, threat: Position, speed: f32) {
        let mut away = (self.position - threat).normalize_or_zero();
        if away == Position::ORIGIN {
            away = Position::new(1.0, 0.0);
        }
        self.velocity = away * speed;
        self.position += self.velocity;
    }

    /// Advance the animation state and recompute every link.
    pub fn pose(&mut self, gait: &GaitTuning, event_duration: u32) {
        let kind = PoseKind::select(self.state, self.event.map(|event| event.kind));
        self.pose.advance(self.velocity, kind, gait);
        let vignette = self.event.map(|event| VignetteInput {
            progress: (event.timer as f32 / event_duration.max(1) as f32).min(1.0),
            heading: event.heading,
        });
        apply_pose(
            &mut self.skeleton,
            &self.rig,
            self.position,
            kind,
            &self.pose,
            vignette,
            gait,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    fn setup(points: &[(f32, f32)]) -> (SlotMap<AgentId, Stickman>, Vec<AgentId>, StickfolkConfig, SmallRng) {
        let config = StickfolkConfig::default();
        let mut rng = SmallRng::seed_from_u64(42);
        let mut agents = SlotMap::with_key();
        let ids = points
            .iter()
            .map(|&(x, y)| {
                let agent = Stickman::new(Position::new(x, y), &config, &mut rng).expect("agent");
                agents.insert(agent)
            })
            .collect();
        (agents, ids, config, rng)
    }

    fn hostile_at(position: Position, config: &StickfolkConfig, rng: &mut SmallRng) -> Stickman {
        Stickman::with_personality(position, Personality::Hostile, config, rng).expect("agent")
    }

    fn hood(agents: &SlotMap<AgentId, Stickman>, predators: Vec<Position>) -> Neighborhood {
        let mut hood = Neighborhood::new(80.0);
        hood.rebuild(agents, predators).expect("rebuild");
        hood
    }

    #[test]
    fn predator_flee_overrides_everything() {
        let (mut agents, ids, config, mut rng) = setup(&[(0.0, 0.0)]);
        let id = ids[0];
        agents[id].start_event(EventKind::Caught, None, 0.0);
        let h = hood(&agents, vec![Position::new(100.0, 0.0)]);
        let agent = &mut agents[id];
        let speed = agent.walk_speed();
        assert!(agent.update(id, &h, &config, &mut rng).is_none());
        assert_eq!(agent.state(), BehaviorState::RunAway);
        assert!(agent.event().is_none());
        assert!(agent.velocity.x < 0.0);
        assert!((agent.velocity.length() - speed * 2.0).abs() < 1e-4);
    }

    #[test]
    fn event_expiry_returns_to_wander() {
        let (mut agents, ids, config, mut rng) = setup(&[(0.0, 0.0)]);
        let id = ids[0];
        let h = hood(&agents, vec![]);
        let agent = &mut agents[id];
        agent.enter_state(BehaviorState::Rest, &h, &config, &mut rng);
        agent.start_event(EventKind::InvestigatedTarget, None, 0.0);
        for _ in 0..config.agent.event_duration - 1 {
            agent.update(id, &h, &config, &mut rng);
            assert!(agent.event().is_some());
            assert_eq!(agent.velocity, Position::ORIGIN);
        }
        agent.update(id, &h, &config, &mut rng);
        assert!(agent.event().is_none());
        assert_eq!(agent.state(), BehaviorState::Wander);
        assert_eq!(agent.state_timer(), 0);
    }

    #[test]
    fn chase_reports_contact_on_arrival() {
        let (mut agents, ids, config, mut rng) = setup(&[(0.0, 0.0), (8.0, 0.0)]);
        let (chaser, victim) = (ids[0], ids[1]);
        agents[chaser] = hostile_at(agents[chaser].position, &config, &mut rng);
        let h = hood(&agents, vec![]);
        agents[chaser].enter_state(BehaviorState::Chase, &h, &config, &mut rng);
        let contact = agents[chaser].update(chaser, &h, &config, &mut rng);
        assert_eq!(
            contact,
            Some(Contact {
                target: victim,
                kind: EventKind::Caught
            })
        );
    }

    #[test]
    fn chase_without_candidates_falls_back_to_wander() {
        let (mut agents, ids, config, mut rng) = setup(&[(0.0, 0.0), (5_000.0, 0.0)]);
        let id = ids[0];
        let h = hood(&agents, vec![]);
        agents[id].enter_state(BehaviorState::Chase, &h, &config, &mut rng);
        assert!(agents[id].update(id, &h, &config, &mut rng).is_none());
        assert_eq!(agents[id].state(), BehaviorState::Wander);
    }

    #[test]
    fn hostile_pursuit_makes_the_victim_run() {
        let (mut agents, ids, config, mut rng) = setup(&[(0.0, 0.0), (100.0, 0.0)]);
        let (chaser, victim) = (ids[0], ids[1]);
        agents[chaser] = hostile_at(agents[chaser].position, &config, &mut rng);
        let h = hood(&agents, vec![]);
        agents[chaser].enter_state(BehaviorState::Chase, &h, &config, &mut rng);
        agents[chaser].update(chaser, &h, &config, &mut rng);
        assert_eq!(agents[chaser].focus(), Some(victim));

        let h = hood(&agents, vec![]);
        agents[victim].update(victim, &h, &config, &mut rng);
        assert_eq!(agents[victim].state(), BehaviorState::RunAway);
        assert!(agents[victim].velocity.x > 0.0);
    }

    #[test]
    fn missing_transition_row_falls_back_to_wander() {
        let (mut agents, ids, mut config, mut rng) = setup(&[(0.0, 0.0), (100.0, 0.0)]);
        config.durations.investigate = 3;
        let id = ids[0];
        agents[id] = Stickman::with_personality(Position::ORIGIN, Personality::Loner, &config, &mut rng)
            .expect("agent");
        let h = hood(&agents, vec![]);
        // Loners have no Investigate row; force one and let the state run out.
        agents[id].enter_state(BehaviorState::Investigate, &h, &config, &mut rng);
        for _ in 0..3 {
            assert!(agents[id].update(id, &h, &config, &mut rng).is_none());
            assert_eq!(agents[id].state(), BehaviorState::Investigate);
        }
        agents[id].update(id, &h, &config, &mut rng);
        assert_eq!(agents[id].state(), BehaviorState::Wander);
        assert_eq!(agents[id].state_timer(), 0);
    }

    #[test]
    fn stationary_states_damp_velocity() {
        let (mut agents, ids, config, mut rng) = setup(&[(0.0, 0.0)]);
        let id = ids[0];
        let h = hood(&agents, vec![]);
        agents[id].enter_state(BehaviorState::Idle, &h, &config, &mut rng);
        agents[id].velocity = Position::new(1.0, 0.0);
        agents[id].update(id, &h, &config, &mut rng);
        assert!((agents[id].velocity.x - 0.9).abs() < 1e-6);
    }

    #[test]
    fn seek_quiet_prefers_empty_space() {
        let mut points = vec![(0.0, 0.0)];
        // Pack the area to the right so every candidate there scores high.
        for i in 0..40 {
            points.push((120.0 + (i % 8) as f32 * 10.0, -40.0 + (i / 8) as f32 * 20.0));
        }
        let (mut agents, ids, config, mut rng) = setup(&points);
        let h = hood(&agents, vec![]);
        for _ in 0..20 {
            agents[ids[0]].enter_state(BehaviorState::SeekQuiet, &h, &config, &mut rng);
            let target = agents[ids[0]].target();
            assert!(h.density(target, config.agent.quiet_density_radius) <= 1);
        }
    }

    #[test]
    fn grouped_agent_stops_at_its_rally_point() {
        let (mut agents, ids, config, _rng) = setup(&[(0.0, 0.0)]);
        let agent = &mut agents[ids[0]];
        agent.join_group(GroupId(1));
        let directive = Directive::MoveTo {
            target: Position::new(30.0, 0.0),
            speed_scale: 1.0,
            state: BehaviorState::Wander,
        };
        for _ in 0..200 {
            agent.follow(directive, &config);
        }
        assert!(agent.position.distance(Position::new(30.0, 0.0)) <= config.agent.arrival_buffer + 1e-3);
        assert_eq!(agent.velocity, Position::ORIGIN);
    }
}
