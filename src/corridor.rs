use crate::camera::FollowCamera;
use crate::error::RunnerError;
use crate::player::Player;
use crate::pool::{
    ObstaclePool, PlatformPool, Pool, PoolHooks, PoolKind, Pooled, PooledObjectHooks,
    WorldObjectAssets,
};
use crate::{INITIAL_PLATFORMS, PLATFORM_LENGTH};
use bevy::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;
use std::fmt::Debug;
use std::time::Duration;

#[derive(Component)]
pub struct Obstacle;

/// Constant rotation of an active obstacle.
#[derive(Component, Debug, Clone, Copy)]
pub struct Spin {
    pub axis: Vec3,
    pub speed: f32,
}

impl Default for Spin {
    fn default() -> Self {
        Self {
            axis: Vec3::X,
            speed: 0.0,
        }
    }
}

/// Per-platform return rule. The player reference is re-acquired when the
/// entity it points at is gone.
#[derive(Component, Debug, Default)]
pub struct Platform {
    pub player: Option<Entity>,
    return_timer: Option<Timer>,
}

impl Platform {
    pub fn is_returning(&self) -> bool {
        self.return_timer.is_some()
    }
}

/// Randomness for obstacle placement and debris. Fresh every run; tests seed it.
#[derive(Resource)]
pub struct SpawnRng(pub StdRng);

impl SpawnRng {
    #[cfg(test)]
    pub(crate) fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for SpawnRng {
    fn default() -> Self {
        Self(StdRng::from_entropy())
    }
}

#[derive(Debug, Clone)]
pub struct ObstacleSpawnerConfig {
    pub spawn_interval: f32,
    /// How far ahead of the player obstacles appear.
    pub lead_distance: f32,
    pub lateral_band: f32,
    pub min_height: f32,
    pub max_height: f32,
    /// How far behind the camera an obstacle may fall before it is recycled.
    pub trailing_distance: f32,
}

impl Default for ObstacleSpawnerConfig {
    fn default() -> Self {
        Self {
            spawn_interval: 5.0,
            lead_distance: 30.0,
            lateral_band: 20.0,
            min_height: 5.0,
            max_height: 35.0,
            trailing_distance: 10.0,
        }
    }
}

#[derive(Resource, Debug)]
pub struct ObstacleSpawner {
    pub player: Option<Entity>,
    config: ObstacleSpawnerConfig,
    timer: Timer,
}

impl ObstacleSpawner {
    pub fn new(player: Option<Entity>, config: ObstacleSpawnerConfig) -> Self {
        Self {
            player,
            timer: Timer::from_seconds(config.spawn_interval, TimerMode::Repeating),
            config,
        }
    }

    pub fn config(&self) -> &ObstacleSpawnerConfig {
        &self.config
    }

    /// True on the ticks where the spawn interval elapses.
    pub fn tick(&mut self, delta: Duration) -> bool {
        self.timer.tick(delta).just_finished()
    }

    pub fn spawn_position(&self, player_z: f32, rng: &mut impl Rng) -> Vec3 {
        let band = self.config.lateral_band;
        Vec3::new(
            rng.gen_range(-band..=band),
            rng.gen_range(self.config.min_height..=self.config.max_height),
            player_z + self.config.lead_distance,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PlatformSpawnerConfig {
    pub length: f32,
    /// Platforms kept ahead of the player.
    pub lookahead: usize,
    /// How far the player must be beyond a platform before it starts returning.
    pub pass_distance: f32,
    pub return_delay: f32,
}

impl Default for PlatformSpawnerConfig {
    fn default() -> Self {
        Self {
            length: PLATFORM_LENGTH,
            lookahead: INITIAL_PLATFORMS,
            pass_distance: 50.0,
            return_delay: 20.0,
        }
    }
}

#[derive(Resource, Debug)]
pub struct PlatformSpawner {
    pub player: Option<Entity>,
    config: PlatformSpawnerConfig,
    next_z: f32,
}

impl PlatformSpawner {
    pub fn new(player: Option<Entity>, config: PlatformSpawnerConfig) -> Self {
        Self {
            player,
            config,
            next_z: 0.0,
        }
    }

    pub fn config(&self) -> &PlatformSpawnerConfig {
        &self.config
    }

    pub fn next_z(&self) -> f32 {
        self.next_z
    }

    pub fn wants_spawn(&self, player_z: f32) -> bool {
        let lookahead = self.config.lookahead.saturating_sub(1) as f32;
        player_z > self.next_z - self.config.length * lookahead
    }

    /// Places one platform at the running offset. The offset only advances
    /// when the pool hands out an object.
    pub fn spawn_next<H: Copy + PartialEq + Debug>(
        &mut self,
        pool: &mut Pool<H>,
        hooks: &mut impl PoolHooks<H>,
    ) -> Result<H, RunnerError> {
        let handle = pool.acquire(Vec3::new(0.0, 0.0, self.next_z), hooks)?;
        self.next_z += self.config.length;
        Ok(handle)
    }

    /// Lays the initial run of platforms end to end.
    pub fn prime<H: Copy + PartialEq + Debug>(
        &mut self,
        pool: &mut Pool<H>,
        hooks: &mut impl PoolHooks<H>,
    ) -> usize {
        let mut spawned = 0;
        for _ in 0..self.config.lookahead {
            match self.spawn_next(pool, hooks) {
                Ok(_) => spawned += 1,
                Err(err) => {
                    warn!("{err}; platform prefill stopped at {spawned}");
                    break;
                }
            }
        }
        spawned
    }

    /// Restarts the run of platforms at the segment containing `z`.
    pub fn restart_at<H: Copy + PartialEq + Debug>(
        &mut self,
        z: f32,
        pool: &mut Pool<H>,
        hooks: &mut impl PoolHooks<H>,
    ) -> usize {
        self.next_z = (z / self.config.length).round() * self.config.length;
        self.prime(pool, hooks)
    }
}

pub fn setup_lighting(mut commands: Commands) {
    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        transform: Transform {
            translation: Vec3::new(0.0, 2.0, 0.0),
            rotation: Quat::from_rotation_x(-PI / 4.),
            ..default()
        },
        ..default()
    });
}

pub fn spawn_obstacles(
    time: Res<Time>,
    mut spawner: ResMut<ObstacleSpawner>,
    players: Query<&Transform, With<Player>>,
    mut pool: ResMut<ObstaclePool>,
    assets: Res<WorldObjectAssets>,
    mut rng: ResMut<SpawnRng>,
    mut commands: Commands,
) {
    if !spawner.tick(time.delta()) {
        return;
    }
    let Some(player_z) = spawner
        .player
        .and_then(|player| players.get(player).ok())
        .map(|transform| transform.translation.z)
    else {
        debug!("no live player bound, skipping obstacle spawn");
        return;
    };

    let position = spawner.spawn_position(player_z, &mut rng.0);
    let mut hooks = PooledObjectHooks::new(PoolKind::Obstacle, &mut commands, &assets);
    match pool.0.acquire(position, &mut hooks) {
        Ok(obstacle) => debug!("obstacle {:?} at {}", obstacle, position),
        Err(err) => warn!("{err}; dropping this spawn"),
    }
}

pub fn extend_platforms(
    mut spawner: ResMut<PlatformSpawner>,
    players: Query<&Transform, With<Player>>,
    mut pool: ResMut<PlatformPool>,
    assets: Res<WorldObjectAssets>,
    mut commands: Commands,
) {
    let Some(player_z) = spawner
        .player
        .and_then(|player| players.get(player).ok())
        .map(|transform| transform.translation.z)
    else {
        return;
    };
    if !spawner.wants_spawn(player_z) {
        return;
    }

    let mut hooks = PooledObjectHooks::new(PoolKind::Platform, &mut commands, &assets);
    if let Err(err) = spawner.spawn_next(&mut pool.0, &mut hooks) {
        warn!("{err}; retrying next tick");
    }
}

/// Returns obstacles that fell too far behind the camera, or behind the
/// player when no camera exists.
pub fn recycle_passed_obstacles(
    spawner: Res<ObstacleSpawner>,
    cameras: Query<&Transform, With<FollowCamera>>,
    players: Query<&Transform, With<Player>>,
    obstacles: Query<(Entity, &Transform, &Pooled), With<Obstacle>>,
    mut pool: ResMut<ObstaclePool>,
    assets: Res<WorldObjectAssets>,
    mut commands: Commands,
) {
    let reference = cameras.get_single().ok().or_else(|| {
        spawner
            .player
            .and_then(|player| players.get(player).ok())
    });
    let Some(reference_z) = reference.map(|transform| transform.translation.z) else {
        return;
    };
    let cutoff = reference_z - spawner.config().trailing_distance;

    let passed: Vec<Entity> = obstacles
        .iter()
        .filter(|(_, transform, pooled)| pooled.active && transform.translation.z < cutoff)
        .map(|(entity, _, _)| entity)
        .collect();
    if passed.is_empty() {
        return;
    }

    let mut hooks = PooledObjectHooks::new(PoolKind::Obstacle, &mut commands, &assets);
    for obstacle in passed {
        pool.0.release(obstacle, &mut hooks);
    }
}

pub fn return_passed_platforms(
    time: Res<Time>,
    spawner: Res<PlatformSpawner>,
    players: Query<(Entity, &Transform), With<Player>>,
    mut platforms: Query<(Entity, &Transform, &mut Platform, &Pooled)>,
    mut pool: ResMut<PlatformPool>,
    assets: Res<WorldObjectAssets>,
    mut commands: Commands,
) {
    let config = spawner.config();
    let mut due = Vec::new();

    for (entity, transform, mut platform, pooled) in &mut platforms {
        if !pooled.active {
            continue;
        }
        if let Some(timer) = platform.return_timer.as_mut() {
            if timer.tick(time.delta()).just_finished() {
                due.push(entity);
            }
            continue;
        }

        let player_z = match platform.player.and_then(|player| players.get(player).ok()) {
            Some((_, player_transform)) => player_transform.translation.z,
            None => match players.iter().next() {
                Some((player, player_transform)) => {
                    platform.player = Some(player);
                    player_transform.translation.z
                }
                None => continue,
            },
        };

        if player_z - transform.translation.z > config.pass_distance {
            platform.return_timer = Some(Timer::from_seconds(config.return_delay, TimerMode::Once));
        }
    }

    if due.is_empty() {
        return;
    }
    let mut hooks = PooledObjectHooks::new(PoolKind::Platform, &mut commands, &assets);
    for platform in due {
        pool.0.release(platform, &mut hooks);
    }
}

pub fn spin_obstacles(
    time: Res<Time>,
    mut obstacles: Query<(&mut Transform, &Spin, &Pooled), With<Obstacle>>,
) {
    for (mut transform, spin, pooled) in &mut obstacles {
        if pooled.active {
            transform.rotate(Quat::from_axis_angle(spin.axis, spin.speed * time.delta_seconds()));
        }
    }
}
