mod camera;
mod controls;
mod corridor;
mod effects;
mod error;
mod hud;
mod locomotion;
mod player;
mod pool;
mod session;

use crate::camera::*;
use crate::controls::*;
use crate::corridor::*;
use crate::effects::*;
use crate::hud::*;
use crate::locomotion::*;
use crate::player::*;
use crate::session::*;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

pub const SEED: f32 = 23.0;
pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 2.0, 0.0);
/// The run always moves along +Z.
pub const FORWARD: Vec3 = Vec3::Z;

pub const OBSTACLE_POOL_SIZE: usize = 5;
pub const OBSTACLE_SIZE: Vec3 = Vec3::new(6.0, 6.0, 2.0);

pub const PLATFORM_POOL_SIZE: usize = 10;
pub const PLATFORM_LENGTH: f32 = 100.0;
pub const PLATFORM_WIDTH: f32 = 50.0;
pub const PLATFORM_THICKNESS: f32 = 1.0;
pub const INITIAL_PLATFORMS: usize = 5;

pub const PLAYER_GROUP: Group = Group::GROUP_1;
pub const GROUND_GROUP: Group = Group::GROUP_2;
pub const OBSTACLE_GROUP: Group = Group::GROUP_3;
pub const DEBRIS_GROUP: Group = Group::GROUP_4;

pub fn map_range(from_range: (f32, f32), to_range: (f32, f32), s: f32) -> f32 {
    to_range.0 + (s - from_range.0) * (to_range.1 - to_range.0) / (from_range.1 - from_range.0)
}

/// Per-frame order: read controls, grow the corridor, move the player, settle
/// the session, then present.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerSet {
    Input,
    Spawn,
    Locomotion,
    Session,
    Presentation,
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Jetpack Run".to_string(),
                ..default()
            }),
            ..default()
        }))
        .add_plugin(RapierPhysicsPlugin::<NoUserData>::default())
        .add_plugin(RapierDebugRenderPlugin::default())
        .add_event::<PlayerHit>()
        .add_event::<EngineCue>()
        .add_event::<SessionCue>()
        .add_event::<RespawnRequested>()
        .add_event::<SecondChanceDeclined>()
        .init_resource::<LocomotionTuning>()
        .init_resource::<SessionTuning>()
        .init_resource::<SpawnRng>()
        .init_resource::<InputBinding>()
        .configure_sets(
            (
                RunnerSet::Input,
                RunnerSet::Spawn,
                RunnerSet::Locomotion,
                RunnerSet::Session,
                RunnerSet::Presentation,
            )
                .chain(),
        )
        .add_startup_system(setup_lighting)
        .add_startup_system(setup_run)
        .add_startup_system(setup_hud)
        .add_startup_system(load_cue_assets)
        .add_systems((read_steering, read_session_keys).in_set(RunnerSet::Input))
        .add_systems(
            (
                spawn_obstacles,
                extend_platforms,
                recycle_passed_obstacles,
                return_passed_platforms,
                spin_obstacles,
            )
                .chain()
                .in_set(RunnerSet::Spawn),
        )
        .add_systems(
            (
                drive_players,
                detect_obstacle_hits,
                sync_ragdoll_bodies,
                expire_collision_immunity,
                clear_debris,
            )
                .chain()
                .in_set(RunnerSet::Locomotion),
        )
        .add_systems(
            (handle_player_hits, expire_second_chance, respawn_player, decline_second_chance)
                .chain()
                .in_set(RunnerSet::Session),
        )
        .add_systems(
            (
                follow_target,
                update_distance_text,
                update_session_banner,
                play_engine_cues,
                toggle_exhaust_plumes,
                play_session_cues,
                pose_flight_layer,
            )
                .in_set(RunnerSet::Presentation),
        )
        .run();
}
