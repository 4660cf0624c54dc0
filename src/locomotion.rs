use crate::effects::EngineCue;
use crate::player::{Player, RagdollState};
use crate::session::RunSession;
use crate::FORWARD;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

/// Vertical velocity held while grounded so the character controller keeps
/// probing for ground contact.
pub const GROUNDED_VELOCITY: f32 = -1.0;

#[derive(Resource, Debug, Clone)]
pub struct LocomotionTuning {
    /// Constant forward speed, m/s.
    pub forward_speed: f32,
    /// Vertical velocity forced while thrusting.
    pub up_lift: f32,
    pub gravity: f32,
    /// Fastest allowed fall, negative.
    pub terminal_velocity: f32,
    /// Rate at which the flight pose blends in and out.
    pub layer_weight_speed: f32,
    /// Steering rate; also the smoothing rate of the lateral follow.
    pub side_speed: f32,
    pub max_horizontal_limit: f32,
}

impl Default for LocomotionTuning {
    fn default() -> Self {
        Self {
            forward_speed: 5.0,
            up_lift: 30.0,
            gravity: 20.0,
            terminal_velocity: -100.0,
            layer_weight_speed: 5.0,
            side_speed: 100.0,
            max_horizontal_limit: 23.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEdge {
    Ignite,
    Cutoff,
}

/// Steering axis delivered by whatever control surface is bound to the player.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct SteeringInput {
    pub axis: Vec2,
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocomotionStep {
    pub displacement: Vec3,
    pub engine: Option<EngineEdge>,
    /// Player was grounded or flying, so its position counts as safe.
    pub safe: bool,
}

impl LocomotionStep {
    fn idle() -> Self {
        Self {
            displacement: Vec3::ZERO,
            engine: None,
            safe: false,
        }
    }
}

#[derive(Component, Debug, Clone)]
pub struct LocomotionState {
    target_x: f32,
    vertical_velocity: f32,
    flying: bool,
    was_flying: bool,
    /// Meters travelled, carried across lives by the session.
    distance: f32,
    control_enabled: bool,
    hit: bool,
}

impl LocomotionState {
    pub fn new(start_x: f32) -> Self {
        Self {
            target_x: start_x,
            vertical_velocity: 0.0,
            flying: false,
            was_flying: false,
            distance: 0.0,
            control_enabled: true,
            hit: false,
        }
    }

    pub fn start_flying(&mut self) {
        self.flying = true;
    }

    pub fn stop_flying(&mut self) {
        self.flying = false;
    }

    pub fn is_flying(&self) -> bool {
        self.flying
    }

    pub fn target_x(&self) -> f32 {
        self.target_x
    }

    pub fn vertical_velocity(&self) -> f32 {
        self.vertical_velocity
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn distance_km(&self) -> f32 {
        self.distance / 1000.0
    }

    pub fn set_distance(&mut self, meters: f32) {
        self.distance = meters.max(0.0);
    }

    pub fn control_enabled(&self) -> bool {
        self.control_enabled
    }

    pub fn is_hit(&self) -> bool {
        self.hit
    }

    /// Advances one tick. `grounded` is the contact reported by the last
    /// physics step and `current_x` the player's actual lateral position.
    pub fn step(
        &mut self,
        steer_x: f32,
        grounded: bool,
        current_x: f32,
        dt: f32,
        tuning: &LocomotionTuning,
    ) -> LocomotionStep {
        if !self.control_enabled {
            return LocomotionStep::idle();
        }
        let dt = dt.max(0.0);
        let steer_x = steer_x.clamp(-1.0, 1.0);

        let limit = tuning.max_horizontal_limit;
        self.target_x = (self.target_x + steer_x * tuning.side_speed * dt).clamp(-limit, limit);
        let follow = 1.0 - (-tuning.side_speed * dt).exp();
        let lateral = (self.target_x - current_x) * follow;

        if self.flying {
            self.vertical_velocity = tuning.up_lift;
        } else if !grounded {
            self.vertical_velocity = (self.vertical_velocity - tuning.gravity * dt)
                .clamp(tuning.terminal_velocity, tuning.up_lift);
        } else {
            self.vertical_velocity = GROUNDED_VELOCITY;
        }

        let engine = match (self.flying, self.was_flying) {
            (true, false) => Some(EngineEdge::Ignite),
            (false, true) => Some(EngineEdge::Cutoff),
            _ => None,
        };
        self.was_flying = self.flying;

        let safe = grounded || self.flying;
        if safe {
            self.distance += tuning.forward_speed * dt;
        }

        LocomotionStep {
            displacement: FORWARD * tuning.forward_speed * dt
                + Vec3::X * lateral
                + Vec3::Y * self.vertical_velocity * dt,
            engine,
            safe,
        }
    }

    /// Latches the first hit and drops primary control. Later calls return
    /// `false` so one collision yields one hit.
    pub fn register_hit(&mut self) -> bool {
        if self.hit {
            return false;
        }
        self.hit = true;
        self.control_enabled = false;
        true
    }
}

/// Blend weight of the airborne pose layer.
#[derive(Component, Debug, Clone, Copy)]
pub struct FlightPose {
    pub weight: f32,
    pub enabled: bool,
}

impl Default for FlightPose {
    fn default() -> Self {
        Self {
            weight: 0.0,
            enabled: true,
        }
    }
}

impl FlightPose {
    pub fn blend(&mut self, grounded: bool, dt: f32, speed: f32) {
        if !self.enabled {
            return;
        }
        let target = if grounded { 0.0 } else { 1.0 };
        self.weight += (target - self.weight) * (speed * dt).clamp(0.0, 1.0);
    }
}

/// Puts a player back under direct control: locomotion and pose on, ragdoll
/// kinematic, no vertical motion, not flying.
pub fn reset_to_active(
    state: &mut LocomotionState,
    pose: &mut FlightPose,
    ragdoll: &mut RagdollState,
) {
    state.control_enabled = true;
    state.hit = false;
    state.vertical_velocity = 0.0;
    state.flying = false;
    state.was_flying = false;
    pose.enabled = true;
    ragdoll.simulated = false;
}

pub fn drive_players(
    time: Res<Time>,
    tuning: Res<LocomotionTuning>,
    mut session: ResMut<RunSession>,
    mut players: Query<
        (
            Entity,
            &mut LocomotionState,
            &mut FlightPose,
            &SteeringInput,
            &Transform,
            &mut KinematicCharacterController,
            Option<&KinematicCharacterControllerOutput>,
        ),
        With<Player>,
    >,
    mut cues: EventWriter<EngineCue>,
) {
    let dt = time.delta_seconds();

    for (entity, mut state, mut pose, steering, transform, mut controller, output) in &mut players
    {
        if !state.control_enabled() {
            continue;
        }
        let grounded = output.map_or(false, |output| output.grounded);

        let step = state.step(
            steering.axis.x,
            grounded,
            transform.translation.x,
            dt,
            &tuning,
        );
        controller.translation = Some(step.displacement);
        pose.blend(grounded, dt, tuning.layer_weight_speed);

        if let Some(edge) = step.engine {
            cues.send(EngineCue {
                player: entity,
                edge,
            });
        }
        if step.safe {
            session.record_safe_position(entity, transform.translation);
        }
    }
}
