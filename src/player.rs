use crate::corridor::{Obstacle, SpawnRng};
use crate::effects::{ExhaustPlume, PlumeKind};
use crate::locomotion::{reset_to_active, FlightPose, LocomotionState, SteeringInput};
use crate::pool::Pooled;
use crate::{DEBRIS_GROUP, GROUND_GROUP, OBSTACLE_GROUP, PLAYER_GROUP};
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use rand::Rng;

pub const PLAYER_HALF_HEIGHT: f32 = 0.5;
pub const PLAYER_RADIUS: f32 = 0.5;

const EJECT_LATERAL: f32 = 5.0;
const EJECT_LIFT: f32 = 10.0;
const EJECT_TORQUE: f32 = 10.0;
const DEBRIS_LIFETIME: f32 = 8.0;

#[derive(Component)]
pub struct Player;

/// Emitted once when a player enters an obstacle.
#[derive(Debug, Clone, Copy)]
pub struct PlayerHit {
    pub player: Entity,
    pub position: Vec3,
    pub distance: f32,
}

/// Whether the player's ragdoll bodies are physically simulated.
#[derive(Component, Debug, Default, Clone, Copy)]
pub struct RagdollState {
    pub simulated: bool,
}

#[derive(Component)]
pub struct RagdollBody {
    pub owner: Entity,
}

/// Removable decoration thrown clear on impact.
#[derive(Component)]
pub struct Jetpack {
    pub owner: Entity,
}

/// Pivot the flight pose tilts.
#[derive(Component)]
pub struct PoseRig {
    pub owner: Entity,
}

#[derive(Component)]
pub struct Debris {
    timer: Timer,
}

/// Obstacles are filtered out of the player's collisions until this runs out.
#[derive(Component)]
pub struct CollisionImmunity {
    timer: Timer,
}

impl CollisionImmunity {
    pub fn new(seconds: f32) -> Self {
        Self {
            timer: Timer::from_seconds(seconds, TimerMode::Once),
        }
    }
}

pub fn player_collision_groups() -> CollisionGroups {
    CollisionGroups::new(PLAYER_GROUP, GROUND_GROUP | OBSTACLE_GROUP)
}

fn immune_collision_groups() -> CollisionGroups {
    CollisionGroups::new(PLAYER_GROUP, GROUND_GROUP)
}

fn debris_collision_groups() -> CollisionGroups {
    CollisionGroups::new(DEBRIS_GROUP, GROUND_GROUP)
}

#[derive(Resource, Clone)]
pub struct PlayerPrefab {
    torso_mesh: Handle<Mesh>,
    head_mesh: Handle<Mesh>,
    jetpack_mesh: Handle<Mesh>,
    plume_mesh: Handle<Mesh>,
    suit_material: Handle<StandardMaterial>,
    skin_material: Handle<StandardMaterial>,
    jetpack_material: Handle<StandardMaterial>,
    steam_material: Handle<StandardMaterial>,
    gas_material: Handle<StandardMaterial>,
}

impl PlayerPrefab {
    pub fn new(meshes: &mut Assets<Mesh>, materials: &mut Assets<StandardMaterial>) -> Self {
        Self {
            torso_mesh: meshes.add(Mesh::from(shape::Capsule {
                radius: 0.35,
                depth: 0.6,
                ..default()
            })),
            head_mesh: meshes.add(Mesh::from(shape::UVSphere {
                radius: 0.25,
                ..default()
            })),
            jetpack_mesh: meshes.add(Mesh::from(shape::Box::new(0.6, 0.8, 0.3))),
            plume_mesh: meshes.add(Mesh::from(shape::Box::new(0.15, 0.5, 0.15))),
            suit_material: materials.add(Color::rgb(0.2, 0.4, 0.9).into()),
            skin_material: materials.add(Color::rgb(0.9, 0.75, 0.6).into()),
            jetpack_material: materials.add(Color::rgb(0.3, 0.3, 0.3).into()),
            steam_material: materials.add(Color::rgba(1.0, 1.0, 1.0, 0.6).into()),
            gas_material: materials.add(Color::rgb(1.0, 0.5, 0.1).into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn placeholder() -> Self {
        Self {
            torso_mesh: Handle::default(),
            head_mesh: Handle::default(),
            jetpack_mesh: Handle::default(),
            plume_mesh: Handle::default(),
            suit_material: Handle::default(),
            skin_material: Handle::default(),
            jetpack_material: Handle::default(),
            steam_material: Handle::default(),
            gas_material: Handle::default(),
        }
    }
}

/// Spawns a controllable player at `position` that has already travelled
/// `distance` meters.
pub fn spawn_player(
    commands: &mut Commands,
    prefab: &PlayerPrefab,
    position: Vec3,
    distance: f32,
) -> Entity {
    let mut state = LocomotionState::new(position.x);
    let mut pose = FlightPose::default();
    let mut ragdoll = RagdollState::default();
    reset_to_active(&mut state, &mut pose, &mut ragdoll);
    state.set_distance(distance);

    let player = commands
        .spawn((
            SpatialBundle::from_transform(Transform::from_translation(position)),
            Player,
            state,
            pose,
            ragdoll,
            SteeringInput::default(),
            RigidBody::KinematicPositionBased,
            Collider::capsule_y(PLAYER_HALF_HEIGHT, PLAYER_RADIUS),
            KinematicCharacterController {
                filter_groups: Some(immune_collision_groups()),
                ..default()
            },
            player_collision_groups(),
            ActiveEvents::COLLISION_EVENTS,
            ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_STATIC,
        ))
        .id();

    commands.entity(player).with_children(|c| {
        c.spawn((SpatialBundle::default(), PoseRig { owner: player }))
            .with_children(|rig| {
                rig.spawn((
                    PbrBundle {
                        mesh: prefab.torso_mesh.clone(),
                        material: prefab.suit_material.clone(),
                        ..default()
                    },
                    RigidBody::KinematicPositionBased,
                    Collider::capsule_y(0.3, 0.35),
                    debris_collision_groups(),
                    RagdollBody { owner: player },
                ));
                rig.spawn((
                    PbrBundle {
                        mesh: prefab.head_mesh.clone(),
                        material: prefab.skin_material.clone(),
                        transform: Transform::from_xyz(0.0, 0.75, 0.0),
                        ..default()
                    },
                    RigidBody::KinematicPositionBased,
                    Collider::ball(0.25),
                    debris_collision_groups(),
                    RagdollBody { owner: player },
                ));
            });

        c.spawn((
            PbrBundle {
                mesh: prefab.jetpack_mesh.clone(),
                material: prefab.jetpack_material.clone(),
                transform: Transform::from_xyz(0.0, 0.2, -0.5),
                ..default()
            },
            RigidBody::KinematicPositionBased,
            Collider::cuboid(0.3, 0.4, 0.15),
            debris_collision_groups(),
            Jetpack { owner: player },
        ))
        .with_children(|jetpack| {
            for (kind, material) in [
                (PlumeKind::Steam, prefab.steam_material.clone()),
                (PlumeKind::Gas, prefab.gas_material.clone()),
            ] {
                for x in [-0.2, 0.2] {
                    jetpack.spawn((
                        PbrBundle {
                            mesh: prefab.plume_mesh.clone(),
                            material: material.clone(),
                            transform: Transform::from_xyz(x, -0.65, 0.0),
                            visibility: Visibility::Hidden,
                            ..default()
                        },
                        ExhaustPlume {
                            owner: player,
                            kind,
                        },
                    ));
                }
            }
        });
    });

    player
}

/// Linear and angular impulse that throws the jetpack clear.
pub fn ejection_impulse(rng: &mut impl Rng) -> (Vec3, Vec3) {
    let impulse = Vec3::new(
        rng.gen_range(-EJECT_LATERAL..=EJECT_LATERAL),
        EJECT_LIFT,
        rng.gen_range(-EJECT_LATERAL..=EJECT_LATERAL),
    );
    (impulse, random_in_unit_sphere(rng) * EJECT_TORQUE)
}

fn random_in_unit_sphere(rng: &mut impl Rng) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        if v.length_squared() <= 1.0 {
            return v;
        }
    }
}

pub fn detect_obstacle_hits(
    mut collisions: EventReader<CollisionEvent>,
    obstacles: Query<&Pooled, With<Obstacle>>,
    mut players: Query<
        (
            &mut LocomotionState,
            &mut FlightPose,
            &mut RagdollState,
            &Transform,
        ),
        With<Player>,
    >,
    jetpacks: Query<(Entity, &Jetpack, &GlobalTransform)>,
    mut hits: EventWriter<PlayerHit>,
    mut rng: ResMut<SpawnRng>,
    mut commands: Commands,
) {
    for event in collisions.iter() {
        let CollisionEvent::Started(a, b, _) = event else {
            continue;
        };

        for (player, other) in [(*a, *b), (*b, *a)] {
            if !obstacles.get(other).map_or(false, |pooled| pooled.active) {
                continue;
            }
            let Ok((mut state, mut pose, mut ragdoll, transform)) = players.get_mut(player) else {
                continue;
            };
            if !state.register_hit() {
                continue;
            }

            pose.enabled = false;
            ragdoll.simulated = true;
            info!(
                "player {:?} hit obstacle {:?} after {:.1} m",
                player,
                other,
                state.distance()
            );
            hits.send(PlayerHit {
                player,
                position: transform.translation,
                distance: state.distance(),
            });

            for (entity, jetpack, global) in &jetpacks {
                if jetpack.owner == player {
                    eject_jetpack(&mut commands, entity, global, &mut rng.0);
                }
            }
        }
    }
}

fn eject_jetpack(
    commands: &mut Commands,
    jetpack: Entity,
    global: &GlobalTransform,
    rng: &mut impl Rng,
) {
    let (impulse, torque_impulse) = ejection_impulse(rng);
    commands
        .entity(jetpack)
        .remove_parent()
        .remove::<Jetpack>()
        .insert((
            global.compute_transform(),
            RigidBody::Dynamic,
            ExternalImpulse {
                impulse,
                torque_impulse,
            },
            Debris {
                timer: Timer::from_seconds(DEBRIS_LIFETIME, TimerMode::Once),
            },
        ));
}

/// Switches ragdoll bodies between kinematic and simulated whenever a
/// player's ragdoll state changes.
pub fn sync_ragdoll_bodies(
    players: Query<(Entity, &RagdollState), Changed<RagdollState>>,
    bodies: Query<(Entity, &RagdollBody)>,
    mut commands: Commands,
) {
    for (player, ragdoll) in &players {
        let body = if ragdoll.simulated {
            RigidBody::Dynamic
        } else {
            RigidBody::KinematicPositionBased
        };
        for (entity, part) in &bodies {
            if part.owner == player {
                commands.entity(entity).insert(body);
            }
        }
    }
}

pub fn grant_collision_immunity(commands: &mut Commands, player: Entity, seconds: f32) {
    commands
        .entity(player)
        .insert((CollisionImmunity::new(seconds), immune_collision_groups()));
}

pub fn expire_collision_immunity(
    time: Res<Time>,
    mut players: Query<(Entity, &mut CollisionImmunity)>,
    mut commands: Commands,
) {
    for (player, mut immunity) in &mut players {
        if immunity.timer.tick(time.delta()).finished() {
            debug!("collision immunity over for {:?}", player);
            commands
                .entity(player)
                .remove::<CollisionImmunity>()
                .insert(player_collision_groups());
        }
    }
}

pub fn clear_debris(
    time: Res<Time>,
    mut debris: Query<(Entity, &mut Debris)>,
    mut commands: Commands,
) {
    for (entity, mut debris) in &mut debris {
        if debris.timer.tick(time.delta()).finished() {
            commands.entity(entity).despawn_recursive();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_rapier3d::rapier::geometry::CollisionEventFlags;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_ejection_impulse_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let (impulse, torque) = ejection_impulse(&mut rng);
            assert!(impulse.x.abs() <= EJECT_LATERAL);
            assert!(impulse.z.abs() <= EJECT_LATERAL);
            assert_eq!(impulse.y, EJECT_LIFT);
            assert!(torque.length() <= EJECT_TORQUE + 1e-4);
        }
    }

    #[test]
    fn test_immunity_filters_out_obstacles() {
        let normal = player_collision_groups();
        let immune = immune_collision_groups();
        assert!(normal.filters.contains(OBSTACLE_GROUP));
        assert!(!immune.filters.contains(OBSTACLE_GROUP));
        assert!(immune.filters.contains(GROUND_GROUP));
    }

    #[test]
    fn test_collision_immunity_expires() {
        let mut app = App::new();
        app.init_resource::<Time>();
        app.add_system(expire_collision_immunity);

        let player = app
            .world
            .spawn((CollisionImmunity::new(0.0), immune_collision_groups()))
            .id();
        app.update();

        assert!(app.world.get::<CollisionImmunity>(player).is_none());
        let groups = app.world.get::<CollisionGroups>(player).unwrap();
        assert!(groups.filters.contains(OBSTACLE_GROUP));
    }

    #[test]
    fn test_ragdoll_sync_switches_owned_bodies_only() {
        let mut app = App::new();
        app.add_system(sync_ragdoll_bodies);

        let player = app.world.spawn(RagdollState { simulated: true }).id();
        let other = app.world.spawn(RagdollState::default()).id();
        let mine = app
            .world
            .spawn((RagdollBody { owner: player }, RigidBody::KinematicPositionBased))
            .id();
        let theirs = app
            .world
            .spawn((RagdollBody { owner: other }, RigidBody::KinematicPositionBased))
            .id();
        app.update();

        assert_eq!(app.world.get::<RigidBody>(mine), Some(&RigidBody::Dynamic));
        assert_eq!(
            app.world.get::<RigidBody>(theirs),
            Some(&RigidBody::KinematicPositionBased)
        );
    }

    fn hit_app(obstacle_active: bool) -> (App, Entity, Entity, Entity) {
        let mut app = App::new();
        app.add_event::<CollisionEvent>()
            .add_event::<PlayerHit>()
            .insert_resource(SpawnRng::seeded(5))
            .add_system(detect_obstacle_hits);

        let player = app
            .world
            .spawn((
                Player,
                LocomotionState::new(0.0),
                FlightPose::default(),
                RagdollState::default(),
                TransformBundle::from_transform(Transform::from_xyz(0.0, 1.0, 80.0)),
            ))
            .id();
        let jetpack = app
            .world
            .spawn((TransformBundle::default(), Jetpack { owner: player }))
            .id();
        app.world.entity_mut(player).push_children(&[jetpack]);

        let obstacle = app
            .world
            .spawn((
                Obstacle,
                Pooled {
                    kind: crate::pool::PoolKind::Obstacle,
                    active: obstacle_active,
                },
            ))
            .id();
        (app, player, jetpack, obstacle)
    }

    fn collide(app: &mut App, a: Entity, b: Entity) {
        app.world
            .resource_mut::<Events<CollisionEvent>>()
            .send(CollisionEvent::Started(a, b, CollisionEventFlags::empty()));
    }

    fn hits(app: &App) -> Vec<PlayerHit> {
        let events = app.world.resource::<Events<PlayerHit>>();
        events.get_reader().iter(events).copied().collect()
    }

    #[test]
    fn test_obstacle_contact_reports_one_hit_and_ejects_jetpack() {
        let (mut app, player, jetpack, obstacle) = hit_app(true);
        collide(&mut app, player, obstacle);
        collide(&mut app, obstacle, player);
        app.update();

        let reported = hits(&app);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].player, player);
        assert_eq!(reported[0].position, Vec3::new(0.0, 1.0, 80.0));

        assert!(app.world.get::<LocomotionState>(player).unwrap().is_hit());
        assert!(app.world.get::<RagdollState>(player).unwrap().simulated);
        assert!(!app.world.get::<FlightPose>(player).unwrap().enabled);

        assert!(app.world.get::<Parent>(jetpack).is_none());
        assert!(app.world.get::<Jetpack>(jetpack).is_none());
        assert_eq!(app.world.get::<RigidBody>(jetpack), Some(&RigidBody::Dynamic));
        assert!(app.world.get::<ExternalImpulse>(jetpack).is_some());
        assert!(app.world.get::<Debris>(jetpack).is_some());
    }

    #[test]
    fn test_parked_obstacle_never_hits() {
        let (mut app, player, jetpack, obstacle) = hit_app(false);
        collide(&mut app, player, obstacle);
        app.update();

        assert!(hits(&app).is_empty());
        assert!(!app.world.get::<LocomotionState>(player).unwrap().is_hit());
        assert!(!app.world.get::<RagdollState>(player).unwrap().simulated);
        assert_eq!(app.world.get::<Parent>(jetpack).map(|p| p.get()), Some(player));
    }
}
