//! Group-level state machine driving every member of a crowd during the Holding phase.

use ordered_float::OrderedFloat;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::debug;

use crate::AgentId;
use crate::behavior::{BehaviorState, Personality};
use crate::config::{AgentTuning, CrowdTuning};
use crate::geometry::{Position, centroid};
use crate::phase::GroupId;
use crate::stickman::{Directive, Neighborhood};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CrowdState {
    #[default]
    Roam,
    Chase,
    Flee,
    SeekQuiet,
    Disband,
}

impl CrowdState {
    /// Behavior state members are posed with while the crowd is in this state.
    #[must_use]
    pub const fn member_state(self) -> BehaviorState {
        match self {
            Self::Roam => BehaviorState::Wander,
            Self::Chase => BehaviorState::Chase,
            Self::Flee => BehaviorState::RunAway,
            Self::SeekQuiet => BehaviorState::SeekQuiet,
            Self::Disband => BehaviorState::Idle,
        }
    }

    #[must_use]
    pub fn duration(self, tuning: &CrowdTuning) -> u32 {
        match self {
            Self::Roam => tuning.roam_duration,
            Self::Chase => tuning.chase_duration,
            Self::Flee => tuning.flee_duration,
            Self::SeekQuiet => tuning.seek_quiet_duration,
            Self::Disband => 0,
        }
    }
}

/// Live member as seen by its crowd this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrowdMember {
    pub id: AgentId,
    pub position: Position,
    pub personality: Personality,
}

/// World facts a crowd reads while deciding where its members go.
#[derive(Debug, Clone, Copy)]
pub struct CrowdContext<'a> {
    /// Members still alive, in membership order.
    pub members: &'a [CrowdMember],
    pub predator_heads: &'a [Position],
    /// Rally points of every other live crowd.
    pub rival_rally_points: &'a [Position],
    pub neighborhood: &'a Neighborhood,
    pub tuning: &'a CrowdTuning,
    pub agent: &'a AgentTuning,
}

/// Result of one crowd tick.
#[derive(Debug, Clone, PartialEq)]
pub enum CrowdOutcome {
    /// Orders for every live member.
    Directives(Vec<(AgentId, Directive)>),
    /// The crowd dissolved; these members return to their own FSMs.
    Disband(Vec<AgentId>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crowd {
    id: GroupId,
    members: Vec<AgentId>,
    state: CrowdState,
    timer: u32,
    duration: u32,
    shared_target: Option<Position>,
    member_targets: Vec<Position>,
    threat: Option<Position>,
}

impl Crowd {
    #[must_use]
    pub fn new(id: GroupId, members: Vec<AgentId>, tuning: &CrowdTuning) -> Self {
        let count = members.len();
        Self {
            id,
            members,
            state: CrowdState::Roam,
            timer: 0,
            duration: CrowdState::Roam.duration(tuning),
            shared_target: None,
            member_targets: vec![Position::ORIGIN; count],
            threat: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    #[must_use]
    pub fn state(&self) -> CrowdState {
        self.state
    }

    #[must_use]
    pub fn timer(&self) -> u32 {
        self.timer
    }

    #[must_use]
    pub fn shared_target(&self) -> Option<Position> {
        self.shared_target
    }

    /// Advance the crowd one tick and issue member directives.
    pub fn tick<R: Rng + ?Sized>(&mut self, ctx: &CrowdContext<'_>, rng: &mut R) -> CrowdOutcome {
        self.prune(ctx.members);
        let positions = ctx.members.iter().map(|m| m.position);
        let centroid = match centroid(positions) {
            Some(centroid) if ctx.members.len() >= ctx.tuning.min_members => centroid,
            _ => return self.disband(),
        };

        let detection_sq = ctx.tuning.predator_detection_radius * ctx.tuning.predator_detection_radius;
        let threatened = ctx
            .predator_heads
            .iter()
            .any(|head| head.distance_sq(centroid) <= detection_sq);
        if threatened && self.state != CrowdState::Flee {
            debug!(group = %self.id, "crowd spotted a predator");
            self.enter(CrowdState::Flee, ctx.tuning);
        }

        self.timer += 1;
        if self.timer > self.duration {
            let next = self.resample(ctx, rng);
            self.enter(next, ctx.tuning);
        }
        if self.state == CrowdState::Chase && ctx.rival_rally_points.is_empty() {
            self.enter(CrowdState::Roam, ctx.tuning);
        }

        let state = self.state.member_state();
        let directives = match self.state {
            CrowdState::Roam | CrowdState::SeekQuiet => {
                if self.needs_new_center(ctx) {
                    let center = match self.state {
                        CrowdState::SeekQuiet => ctx.neighborhood.quiet_spot(
                            centroid,
                            ctx.agent.quiet_candidates,
                            ctx.tuning.roam_radius,
                            ctx.agent.quiet_density_radius,
                            rng,
                        ),
                        _ => centroid.offset(
                            rng.random_range(0.0..TAU),
                            rng.random_range(0.0..=ctx.tuning.roam_radius),
                        ),
                    };
                    self.scatter_around(center, ctx.tuning.member_jitter, rng);
                }
                self.move_orders(state, 1.0)
            }
            CrowdState::Chase => {
                let goal = ctx
                    .rival_rally_points
                    .iter()
                    .copied()
                    .min_by_key(|rally| OrderedFloat(rally.distance_sq(centroid)))
                    .unwrap_or(centroid);
                if self.shared_target != Some(goal) {
                    self.scatter_around(goal, ctx.tuning.member_jitter, rng);
                }
                self.move_orders(state, 1.0)
            }
            CrowdState::Flee => {
                if let Some(threat) = centroid_of(ctx.predator_heads) {
                    self.threat = Some(threat);
                }
                let threat = self.threat.unwrap_or(centroid);
                self.members
                    .iter()
                    .map(|&id| {
                        (
                            id,
                            Directive::FleeFrom {
                                threat,
                                speed_scale: ctx.tuning.flee_multiplier,
                            },
                        )
                    })
                    .collect()
            }
            CrowdState::Disband => return self.disband(),
        };
        CrowdOutcome::Directives(directives)
    }

    fn prune(&mut self, live: &[CrowdMember]) {
        let mut kept_members = Vec::with_capacity(live.len());
        let mut kept_targets = Vec::with_capacity(live.len());
        for (id, target) in self.members.iter().zip(&self.member_targets) {
            if live.iter().any(|m| m.id == *id) {
                kept_members.push(*id);
                kept_targets.push(*target);
            }
        }
        self.members = kept_members;
        self.member_targets = kept_targets;
    }

    fn disband(&mut self) -> CrowdOutcome {
        debug!(group = %self.id, members = self.members.len(), "crowd disbanded");
        self.state = CrowdState::Disband;
        CrowdOutcome::Disband(self.members.clone())
    }

    fn enter(&mut self, state: CrowdState, tuning: &CrowdTuning) {
        self.state = state;
        self.timer = 0;
        self.duration = state.duration(tuning);
        self.shared_target = None;
    }

    /// Next state once the current one has run its course.
    fn resample<R: Rng + ?Sized>(&self, ctx: &CrowdContext<'_>, rng: &mut R) -> CrowdState {
        match self.state {
            CrowdState::Roam => {
                let total = ctx.members.len() as f32;
                let count = |p: Personality| ctx.members.iter().filter(|m| m.personality == p).count() as f32;
                let chase = ctx.tuning.chase_bias * count(Personality::Hostile) / total;
                let quiet = ctx.tuning.quiet_bias * count(Personality::Loner) / total;
                let draw: f32 = rng.random();
                if draw < chase {
                    if ctx.rival_rally_points.is_empty() {
                        CrowdState::Roam
                    } else {
                        CrowdState::Chase
                    }
                } else if draw < chase + quiet {
                    CrowdState::SeekQuiet
                } else {
                    CrowdState::Roam
                }
            }
            CrowdState::Chase | CrowdState::SeekQuiet => CrowdState::Roam,
            CrowdState::Flee => CrowdState::SeekQuiet,
            CrowdState::Disband => CrowdState::Disband,
        }
    }

    fn needs_new_center(&self, ctx: &CrowdContext<'_>) -> bool {
        if self.shared_target.is_none() {
            return true;
        }
        ctx.members
            .iter()
            .zip(&self.member_targets)
            .any(|(member, target)| member.position.distance(*target) <= ctx.agent.arrival_buffer)
    }

    fn scatter_around<R: Rng + ?Sized>(&mut self, center: Position, jitter: f32, rng: &mut R) {
        self.shared_target = Some(center);
        self.member_targets = self
            .members
            .iter()
            .map(|_| center.offset(rng.random_range(0.0..TAU), rng.random_range(0.0..=jitter)))
            .collect();
    }

    fn move_orders(&self, state: BehaviorState, speed_scale: f32) -> Vec<(AgentId, Directive)> {
        self.members
            .iter()
            .zip(&self.member_targets)
            .map(|(&id, &target)| {
                (
                    id,
                    Directive::MoveTo {
                        target,
                        speed_scale,
                        state,
                    },
                )
            })
            .collect()
    }
}

fn centroid_of(points: &[Position]) -> Option<Position> {
    centroid(points.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StickfolkConfig;
    use crate::stickman::Stickman;
    use rand::{SeedableRng, rngs::SmallRng};
    use slotmap::SlotMap;

    struct Fixture {
        agents: SlotMap<AgentId, Stickman>,
        ids: Vec<AgentId>,
        config: StickfolkConfig,
        rng: SmallRng,
    }

    fn fixture(points: &[(f32, f32)], personality: Personality) -> Fixture {
        let config = StickfolkConfig::default();
        let mut rng = SmallRng::seed_from_u64(21);
        let mut agents = SlotMap::with_key();
        let ids = points
            .iter()
            .map(|&(x, y)| {
                let agent = Stickman::with_personality(Position::new(x, y), personality, &config, &mut rng)
                    .expect("agent");
                agents.insert(agent)
            })
            .collect();
        Fixture {
            agents,
            ids,
            config,
            rng,
        }
    }

    fn members(fixture: &Fixture) -> Vec<CrowdMember> {
        fixture
            .ids
            .iter()
            .filter_map(|id| {
                fixture.agents.get(*id).map(|agent| CrowdMember {
                    id: *id,
                    position: agent.position,
                    personality: agent.personality(),
                })
            })
            .collect()
    }

    fn neighborhood(fixture: &Fixture) -> Neighborhood {
        let mut hood = Neighborhood::new(80.0);
        hood.rebuild(&fixture.agents, Vec::new()).expect("rebuild");
        hood
    }

    #[test]
    fn predator_near_centroid_forces_flee() {
        let mut fx = fixture(&[(0.0, 0.0), (20.0, 0.0), (10.0, 15.0)], Personality::Curious);
        let mut crowd = Crowd::new(GroupId(1), fx.ids.clone(), &fx.config.crowd);
        let live = members(&fx);
        let hood = neighborhood(&fx);
        let heads = [Position::new(200.0, 0.0)];
        let ctx = CrowdContext {
            members: &live,
            predator_heads: &heads,
            rival_rally_points: &[],
            neighborhood: &hood,
            tuning: &fx.config.crowd,
            agent: &fx.config.agent,
        };
        let CrowdOutcome::Directives(orders) = crowd.tick(&ctx, &mut fx.rng) else {
            panic!("crowd should stay together");
        };
        assert_eq!(crowd.state(), CrowdState::Flee);
        assert_eq!(orders.len(), 3);
        for (_, directive) in orders {
            match directive {
                Directive::FleeFrom { threat, speed_scale } => {
                    assert_eq!(threat, heads[0]);
                    assert!((speed_scale - 1.5).abs() < 1e-6);
                }
                other => panic!("unexpected directive {other:?}"),
            }
        }
    }

    #[test]
    fn losing_members_below_two_disbands() {
        let mut fx = fixture(&[(0.0, 0.0), (20.0, 0.0)], Personality::Hostile);
        let mut crowd = Crowd::new(GroupId(3), fx.ids.clone(), &fx.config.crowd);
        fx.agents.remove(fx.ids[1]);
        let live = members(&fx);
        let hood = neighborhood(&fx);
        let ctx = CrowdContext {
            members: &live,
            predator_heads: &[],
            rival_rally_points: &[],
            neighborhood: &hood,
            tuning: &fx.config.crowd,
            agent: &fx.config.agent,
        };
        assert_eq!(crowd.tick(&ctx, &mut fx.rng), CrowdOutcome::Disband(vec![fx.ids[0]]));
        assert_eq!(crowd.state(), CrowdState::Disband);
    }

    #[test]
    fn all_hostile_crowd_without_rivals_never_chases() {
        let mut fx = fixture(&[(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)], Personality::Hostile);
        fx.config.crowd.roam_duration = 1;
        let mut crowd = Crowd::new(GroupId(1), fx.ids.clone(), &fx.config.crowd);
        let live = members(&fx);
        let hood = neighborhood(&fx);
        let ctx = CrowdContext {
            members: &live,
            predator_heads: &[],
            rival_rally_points: &[],
            neighborhood: &hood,
            tuning: &fx.config.crowd,
            agent: &fx.config.agent,
        };
        for _ in 0..200 {
            crowd.tick(&ctx, &mut fx.rng);
            assert_ne!(crowd.state(), CrowdState::Chase);
            assert_ne!(crowd.state(), CrowdState::SeekQuiet);
        }
    }

    #[test]
    fn hostile_crowd_with_a_rival_eventually_chases_its_rally_point() {
        let mut fx = fixture(&[(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)], Personality::Hostile);
        fx.config.crowd.roam_duration = 1;
        let mut crowd = Crowd::new(GroupId(1), fx.ids.clone(), &fx.config.crowd);
        let live = members(&fx);
        let hood = neighborhood(&fx);
        let rivals = [Position::new(900.0, 0.0), Position::new(400.0, 0.0)];
        let ctx = CrowdContext {
            members: &live,
            predator_heads: &[],
            rival_rally_points: &rivals,
            neighborhood: &hood,
            tuning: &fx.config.crowd,
            agent: &fx.config.agent,
        };
        let mut chased = false;
        for _ in 0..50 {
            crowd.tick(&ctx, &mut fx.rng);
            if crowd.state() == CrowdState::Chase {
                assert_eq!(crowd.shared_target(), Some(rivals[1]));
                chased = true;
                break;
            }
        }
        assert!(chased);
    }

    #[test]
    fn roam_targets_stay_near_the_shared_center() {
        let mut fx = fixture(&[(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)], Personality::Curious);
        let mut crowd = Crowd::new(GroupId(1), fx.ids.clone(), &fx.config.crowd);
        let live = members(&fx);
        let hood = neighborhood(&fx);
        let ctx = CrowdContext {
            members: &live,
            predator_heads: &[],
            rival_rally_points: &[],
            neighborhood: &hood,
            tuning: &fx.config.crowd,
            agent: &fx.config.agent,
        };
        let CrowdOutcome::Directives(orders) = crowd.tick(&ctx, &mut fx.rng) else {
            panic!("crowd should stay together");
        };
        let center = crowd.shared_target().expect("roam center");
        for (_, directive) in orders {
            let Directive::MoveTo { target, state, .. } = directive else {
                panic!("roaming members walk");
            };
            assert_eq!(state, BehaviorState::Wander);
            assert!(target.distance(center) <= fx.config.crowd.member_jitter + 1e-3);
        }
    }
}
