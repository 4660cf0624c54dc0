use crate::corridor::{Obstacle, Platform, Spin};
use crate::error::RunnerError;
use crate::{
    map_range, GROUND_GROUP, OBSTACLE_GROUP, OBSTACLE_SIZE, PLATFORM_LENGTH, PLATFORM_THICKNESS,
    PLATFORM_WIDTH, PLAYER_GROUP, SEED,
};
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use noisy_bevy::simplex_noise_2d_seeded;
use std::fmt::Debug;

/// Side effects a pool sequences but never interprets.
pub trait PoolHooks<H> {
    fn create(&mut self) -> H;
    fn on_acquire(&mut self, handle: H, position: Vec3);
    fn on_release(&mut self, handle: H);
    fn destroy(&mut self, handle: H);
}

/// Bounded object cache. A handle is either idle or active, never both, and the
/// two sets together never exceed `hard_max`.
#[derive(Debug)]
pub struct Pool<H> {
    name: &'static str,
    capacity: usize,
    idle: Vec<H>,
    active: Vec<H>,
}

impl<H: Copy + PartialEq + Debug> Pool<H> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            idle: Vec::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn hard_max(&self) -> usize {
        self.capacity * 2
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn is_active(&self, handle: H) -> bool {
        self.active.contains(&handle)
    }

    pub fn active(&self) -> &[H] {
        &self.active
    }

    /// Reuses an idle object or creates one while under the hard limit. The
    /// activation hook has run by the time the handle is returned.
    pub fn acquire(
        &mut self,
        position: Vec3,
        hooks: &mut impl PoolHooks<H>,
    ) -> Result<H, RunnerError> {
        let handle = match self.idle.pop() {
            Some(handle) => handle,
            None if self.active.len() < self.hard_max() => hooks.create(),
            None => {
                return Err(RunnerError::PoolExhausted {
                    pool: self.name,
                    hard_max: self.hard_max(),
                })
            }
        };

        self.active.push(handle);
        hooks.on_acquire(handle, position);
        Ok(handle)
    }

    /// Returns `false` without touching anything when the handle is not active,
    /// so releasing twice is harmless. Objects created past `capacity` under
    /// load are destroyed once the idle stack is full again.
    pub fn release(&mut self, handle: H, hooks: &mut impl PoolHooks<H>) -> bool {
        let Some(index) = self.active.iter().position(|h| *h == handle) else {
            return false;
        };
        self.active.remove(index);

        if self.idle.len() < self.capacity {
            self.idle.push(handle);
            hooks.on_release(handle);
        } else {
            hooks.on_release(handle);
            hooks.destroy(handle);
        }
        true
    }

    /// Releases every active object. Works from a snapshot so hooks may touch
    /// the pool's bookkeeping freely.
    pub fn reset_all(&mut self, hooks: &mut impl PoolHooks<H>) -> usize {
        let snapshot = self.active.clone();
        snapshot
            .into_iter()
            .filter(|handle| self.release(*handle, hooks))
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Obstacle,
    Platform,
}

/// Owning pool and activity flag of a pooled world object.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pooled {
    pub kind: PoolKind,
    pub active: bool,
}

#[derive(Resource, Debug)]
pub struct ObstaclePool(pub Pool<Entity>);

impl ObstaclePool {
    pub fn new(capacity: usize) -> Self {
        Self(Pool::new("obstacle", capacity))
    }
}

#[derive(Resource, Debug)]
pub struct PlatformPool(pub Pool<Entity>);

impl PlatformPool {
    pub fn new(capacity: usize) -> Self {
        Self(Pool::new("platform", capacity))
    }
}

/// Meshes and materials shared by every pooled object.
#[derive(Resource, Clone)]
pub struct WorldObjectAssets {
    obstacle_mesh: Handle<Mesh>,
    obstacle_material: Handle<StandardMaterial>,
    platform_mesh: Handle<Mesh>,
    platform_materials: Vec<Handle<StandardMaterial>>,
}

const PLATFORM_HUES: usize = 6;

impl WorldObjectAssets {
    pub fn new(meshes: &mut Assets<Mesh>, materials: &mut Assets<StandardMaterial>) -> Self {
        Self {
            obstacle_mesh: meshes.add(Mesh::from(shape::Box::new(
                OBSTACLE_SIZE.x,
                OBSTACLE_SIZE.y,
                OBSTACLE_SIZE.z,
            ))),
            obstacle_material: materials.add(Color::rgb(0.8, 0.1, 0.1).into()),
            platform_mesh: meshes.add(Mesh::from(shape::Box::new(
                PLATFORM_WIDTH,
                PLATFORM_THICKNESS,
                PLATFORM_LENGTH,
            ))),
            platform_materials: (0..PLATFORM_HUES)
                .map(|i| {
                    let hue = map_range((0.0, PLATFORM_HUES as f32), (180.0, 260.0), i as f32);
                    materials.add(Color::hsl(hue, 0.4, 0.35).into())
                })
                .collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn placeholder() -> Self {
        Self {
            obstacle_mesh: Handle::default(),
            obstacle_material: Handle::default(),
            platform_mesh: Handle::default(),
            platform_materials: vec![Handle::default(); 2],
        }
    }

    fn platform_material(&self, z: f32) -> Handle<StandardMaterial> {
        let noise = simplex_noise_2d_seeded(Vec2::new(z / PLATFORM_LENGTH, 0.5), SEED);
        let index = map_range((-1.0, 1.0), (0.0, self.platform_materials.len() as f32), noise)
            as usize;
        self.platform_materials[index.min(self.platform_materials.len() - 1)].clone()
    }
}

/// Spin rate of an obstacle activated at `position`, in radians per second.
pub fn obstacle_spin_speed(position: Vec3) -> f32 {
    let noise = simplex_noise_2d_seeded(Vec2::new(position.x, position.z) * 0.05, SEED);
    map_range((-1.0, 1.0), (0.5, 3.0), noise)
}

/// Pool hooks that realise pooled objects as ECS entities.
pub struct PooledObjectHooks<'a, 'w, 's> {
    kind: PoolKind,
    commands: &'a mut Commands<'w, 's>,
    assets: &'a WorldObjectAssets,
}

impl<'a, 'w, 's> PooledObjectHooks<'a, 'w, 's> {
    pub fn new(
        kind: PoolKind,
        commands: &'a mut Commands<'w, 's>,
        assets: &'a WorldObjectAssets,
    ) -> Self {
        Self {
            kind,
            commands,
            assets,
        }
    }
}

impl PoolHooks<Entity> for PooledObjectHooks<'_, '_, '_> {
    fn create(&mut self) -> Entity {
        let pooled = Pooled {
            kind: self.kind,
            active: false,
        };
        let parked = CollisionGroups::new(Group::NONE, Group::NONE);

        match self.kind {
            PoolKind::Obstacle => self
                .commands
                .spawn((
                    PbrBundle {
                        mesh: self.assets.obstacle_mesh.clone(),
                        material: self.assets.obstacle_material.clone(),
                        visibility: Visibility::Hidden,
                        ..default()
                    },
                    Collider::cuboid(
                        0.5 * OBSTACLE_SIZE.x,
                        0.5 * OBSTACLE_SIZE.y,
                        0.5 * OBSTACLE_SIZE.z,
                    ),
                    Sensor,
                    ActiveEvents::COLLISION_EVENTS,
                    ActiveCollisionTypes::default() | ActiveCollisionTypes::KINEMATIC_STATIC,
                    parked,
                    Obstacle,
                    Spin::default(),
                    pooled,
                ))
                .id(),
            PoolKind::Platform => self
                .commands
                .spawn((
                    PbrBundle {
                        mesh: self.assets.platform_mesh.clone(),
                        visibility: Visibility::Hidden,
                        ..default()
                    },
                    RigidBody::Fixed,
                    Collider::cuboid(
                        0.5 * PLATFORM_WIDTH,
                        0.5 * PLATFORM_THICKNESS,
                        0.5 * PLATFORM_LENGTH,
                    ),
                    parked,
                    Platform::default(),
                    pooled,
                ))
                .id(),
        }
    }

    fn on_acquire(&mut self, handle: Entity, position: Vec3) {
        let pooled = Pooled {
            kind: self.kind,
            active: true,
        };
        let mut entity = self.commands.entity(handle);
        entity.insert((Transform::from_translation(position), Visibility::Visible, pooled));

        match self.kind {
            PoolKind::Obstacle => {
                entity.insert((
                    CollisionGroups::new(OBSTACLE_GROUP, PLAYER_GROUP),
                    Spin {
                        axis: Vec3::X,
                        speed: obstacle_spin_speed(position),
                    },
                ));
            }
            PoolKind::Platform => {
                entity.insert((
                    CollisionGroups::new(GROUND_GROUP, Group::ALL),
                    self.assets.platform_material(position.z),
                    Platform::default(),
                ));
            }
        }
    }

    fn on_release(&mut self, handle: Entity) {
        let mut entity = self.commands.entity(handle);
        entity.insert((
            Visibility::Hidden,
            CollisionGroups::new(Group::NONE, Group::NONE),
            Pooled {
                kind: self.kind,
                active: false,
            },
        ));
        if self.kind == PoolKind::Platform {
            entity.insert(Platform::default());
        }
    }

    fn destroy(&mut self, handle: Entity) {
        debug!("destroying surplus {:?} {:?}", self.kind, handle);
        self.commands.entity(handle).despawn_recursive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::CommandQueue;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// Hooks that record every call and hand out sequential ids.
    #[derive(Default)]
    struct Recorder {
        next: u32,
        log: Vec<String>,
    }

    impl PoolHooks<u32> for Recorder {
        fn create(&mut self) -> u32 {
            let id = self.next;
            self.next += 1;
            self.log.push(format!("create {id}"));
            id
        }

        fn on_acquire(&mut self, handle: u32, position: Vec3) {
            self.log.push(format!("acquire {handle} at {}", position.z));
        }

        fn on_release(&mut self, handle: u32) {
            self.log.push(format!("release {handle}"));
        }

        fn destroy(&mut self, handle: u32) {
            self.log.push(format!("destroy {handle}"));
        }
    }

    #[test]
    fn test_acquire_grows_to_hard_max_then_exhausts() {
        let mut pool = Pool::new("test", 5);
        let mut hooks = Recorder::default();

        for i in 0..6 {
            assert!(pool.acquire(Vec3::Z * i as f32, &mut hooks).is_ok());
        }
        assert_eq!(pool.active_count(), 6);

        for i in 6..10 {
            assert!(pool.acquire(Vec3::Z * i as f32, &mut hooks).is_ok());
        }
        assert_eq!(
            pool.acquire(Vec3::ZERO, &mut hooks),
            Err(RunnerError::PoolExhausted {
                pool: "test",
                hard_max: 10
            })
        );
        assert_eq!(pool.active_count(), 10);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut pool = Pool::new("test", 2);
        let mut hooks = Recorder::default();
        let a = pool.acquire(Vec3::ZERO, &mut hooks).unwrap();
        let _b = pool.acquire(Vec3::ZERO, &mut hooks).unwrap();

        assert!(pool.release(a, &mut hooks));
        let log_len = hooks.log.len();
        let (active, idle) = (pool.active_count(), pool.idle_count());

        assert!(!pool.release(a, &mut hooks));
        assert!(!pool.release(a, &mut hooks));
        assert_eq!(hooks.log.len(), log_len);
        assert_eq!((pool.active_count(), pool.idle_count()), (active, idle));
    }

    #[test]
    fn test_release_of_foreign_handle_is_ignored() {
        let mut pool: Pool<u32> = Pool::new("test", 2);
        let mut hooks = Recorder::default();
        assert!(!pool.release(42, &mut hooks));
        assert!(hooks.log.is_empty());
    }

    #[test]
    fn test_idle_objects_are_reused() {
        let mut pool = Pool::new("test", 3);
        let mut hooks = Recorder::default();

        let first = pool.acquire(Vec3::Z, &mut hooks).unwrap();
        pool.release(first, &mut hooks);
        let second = pool.acquire(Vec3::Z * 2.0, &mut hooks).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            hooks.log,
            vec!["create 0", "acquire 0 at 1", "release 0", "acquire 0 at 2"]
        );
    }

    #[test]
    fn test_reset_all_returns_everything() {
        let mut pool = Pool::new("test", 4);
        let mut hooks = Recorder::default();
        for _ in 0..5 {
            pool.acquire(Vec3::ZERO, &mut hooks).unwrap();
        }

        assert_eq!(pool.reset_all(&mut hooks), 5);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 4);
        assert_eq!(pool.reset_all(&mut hooks), 0);
    }

    #[test]
    fn test_surplus_beyond_capacity_is_destroyed_on_release() {
        let mut pool = Pool::new("test", 2);
        let mut hooks = Recorder::default();
        let handles: Vec<u32> = (0..4)
            .map(|_| pool.acquire(Vec3::ZERO, &mut hooks).unwrap())
            .collect();
        hooks.log.clear();

        for handle in &handles {
            assert!(pool.release(*handle, &mut hooks));
        }

        assert_eq!(pool.idle_count(), 2);
        assert_eq!(
            hooks.log,
            vec![
                "release 0",
                "release 1",
                "release 2",
                "destroy 2",
                "release 3",
                "destroy 3"
            ]
        );

        // The trimmed pool still grows back under load.
        for _ in 0..4 {
            assert!(pool.acquire(Vec3::ZERO, &mut hooks).is_ok());
        }
        assert_eq!(pool.active_count(), 4);
    }

    #[test]
    fn test_random_traffic_keeps_sets_disjoint_and_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut pool = Pool::new("test", 3);
        let mut hooks = Recorder::default();

        for _ in 0..500 {
            match rng.gen_range(0..4) {
                0 | 1 => {
                    let _ = pool.acquire(Vec3::ZERO, &mut hooks);
                }
                2 => {
                    let handle = rng.gen_range(0..8);
                    pool.release(handle, &mut hooks);
                }
                _ => {
                    if rng.gen_bool(0.1) {
                        pool.reset_all(&mut hooks);
                    }
                }
            }

            assert!(pool.idle_count() + pool.active_count() <= pool.hard_max());
            for handle in pool.active() {
                assert!(!pool.idle.contains(handle));
            }
        }
    }

    #[test]
    fn test_entity_hooks_toggle_visibility_and_flag() {
        let mut world = World::new();
        let assets = WorldObjectAssets::placeholder();
        let mut pool = ObstaclePool::new(2);

        let mut queue = CommandQueue::default();
        let entity = {
            let mut commands = Commands::new(&mut queue, &world);
            let mut hooks = PooledObjectHooks::new(PoolKind::Obstacle, &mut commands, &assets);
            pool.0
                .acquire(Vec3::new(1.0, 2.0, 3.0), &mut hooks)
                .unwrap()
        };
        queue.apply(&mut world);

        let pooled = world.get::<Pooled>(entity).unwrap();
        assert!(pooled.active);
        assert_eq!(pooled.kind, PoolKind::Obstacle);
        assert_eq!(world.get::<Visibility>(entity), Some(&Visibility::Visible));
        assert_eq!(
            world.get::<Transform>(entity).unwrap().translation,
            Vec3::new(1.0, 2.0, 3.0)
        );

        {
            let mut commands = Commands::new(&mut queue, &world);
            let mut hooks = PooledObjectHooks::new(PoolKind::Obstacle, &mut commands, &assets);
            assert!(pool.0.release(entity, &mut hooks));
        }
        queue.apply(&mut world);

        assert!(!world.get::<Pooled>(entity).unwrap().active);
        assert_eq!(world.get::<Visibility>(entity), Some(&Visibility::Hidden));
    }
}
