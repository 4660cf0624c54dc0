use crate::camera::{spawn_follow_camera, FollowCamera};
use crate::controls::{InputBinding, RespawnRequested, SecondChanceDeclined};
use crate::corridor::{
    ObstacleSpawner, ObstacleSpawnerConfig, PlatformSpawner, PlatformSpawnerConfig,
};
use crate::effects::SessionCue;
use crate::error::RunnerError;
use crate::player::{grant_collision_immunity, spawn_player, PlayerHit, PlayerPrefab};
use crate::pool::{ObstaclePool, PlatformPool, PoolKind, PooledObjectHooks, WorldObjectAssets};
use crate::{DEFAULT_POSITION, OBSTACLE_POOL_SIZE, PLATFORM_POOL_SIZE};
use bevy::prelude::*;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Playing,
    Hit,
    SecondChanceOffered,
    GameOver,
}

#[derive(Resource, Debug, Clone)]
pub struct SessionTuning {
    /// Obstacle immunity granted to a respawned player.
    pub immunity_seconds: f32,
    /// How long the second chance stays on offer.
    pub offer_seconds: f32,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            immunity_seconds: 3.0,
            offer_seconds: 10.0,
        }
    }
}

/// Where and with how much distance the next life starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RespawnPlan {
    pub position: Vec3,
    pub distance: f32,
}

/// Game-over and second-chance bookkeeping for one run. Owns the handle of the
/// live player; only hits from that player are accepted.
#[derive(Resource, Debug)]
pub struct RunSession {
    phase: RunPhase,
    player: Option<Entity>,
    last_safe_position: Option<Vec3>,
    saved_distance: f32,
    second_chance_used: bool,
    offer_timer: Timer,
}

impl RunSession {
    pub fn new(player: Entity, offer_seconds: f32) -> Self {
        Self {
            phase: RunPhase::Playing,
            player: Some(player),
            last_safe_position: None,
            saved_distance: 0.0,
            second_chance_used: false,
            offer_timer: Timer::from_seconds(offer_seconds, TimerMode::Once),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == RunPhase::Playing
    }

    pub fn player(&self) -> Option<Entity> {
        self.player
    }

    pub fn last_safe_position(&self) -> Option<Vec3> {
        self.last_safe_position
    }

    pub fn saved_distance(&self) -> f32 {
        self.saved_distance
    }

    pub fn second_chance_used(&self) -> bool {
        self.second_chance_used
    }

    pub fn offer_remaining(&self) -> f32 {
        self.offer_timer.remaining_secs()
    }

    /// Accepts a safe position from the current player; anything else is
    /// ignored.
    pub fn record_safe_position(&mut self, player: Entity, position: Vec3) -> bool {
        if self.phase != RunPhase::Playing || self.player != Some(player) {
            return false;
        }
        self.last_safe_position = Some(position);
        true
    }

    /// Snapshots the run and hands back the player so the caller can destroy
    /// it. `position` stands in for the safe position if none was reported.
    pub fn register_hit(
        &mut self,
        player: Entity,
        position: Vec3,
        distance: f32,
    ) -> Result<Entity, RunnerError> {
        if self.phase != RunPhase::Playing {
            return Err(self.reject("register a hit"));
        }
        if self.player != Some(player) {
            return Err(self.reject("register a hit from a replaced player"));
        }

        self.phase = RunPhase::Hit;
        self.saved_distance = distance;
        self.last_safe_position.get_or_insert(position);
        self.player = None;
        Ok(player)
    }

    pub fn settle_hit(&mut self) -> Result<RunPhase, RunnerError> {
        if self.phase != RunPhase::Hit {
            return Err(self.reject("settle a hit"));
        }
        self.phase = if self.second_chance_used {
            RunPhase::GameOver
        } else {
            self.offer_timer.reset();
            RunPhase::SecondChanceOffered
        };
        Ok(self.phase)
    }

    /// Consumes the second chance and installs the player `spawn` creates
    /// from the saved snapshot. Nothing changes if the offer is not open.
    pub fn respawn(
        &mut self,
        spawn: impl FnOnce(RespawnPlan) -> Entity,
    ) -> Result<Entity, RunnerError> {
        if self.phase != RunPhase::SecondChanceOffered {
            return Err(self.reject("respawn"));
        }
        let plan = RespawnPlan {
            position: self.last_safe_position.unwrap_or(DEFAULT_POSITION),
            distance: self.saved_distance,
        };

        self.second_chance_used = true;
        let player = spawn(plan);
        self.player = Some(player);
        self.last_safe_position = Some(plan.position);
        self.phase = RunPhase::Playing;
        Ok(player)
    }

    pub fn decline(&mut self) -> Result<(), RunnerError> {
        if self.phase != RunPhase::SecondChanceOffered {
            return Err(self.reject("decline the second chance"));
        }
        self.phase = RunPhase::GameOver;
        Ok(())
    }

    /// Runs down the open offer; returns `true` on the tick it lapses.
    pub fn tick_offer(&mut self, delta: Duration) -> bool {
        if self.phase != RunPhase::SecondChanceOffered {
            return false;
        }
        if self.offer_timer.tick(delta).just_finished() {
            self.phase = RunPhase::GameOver;
            return true;
        }
        false
    }

    fn reject(&self, action: &'static str) -> RunnerError {
        RunnerError::InvalidStateTransition {
            from: self.phase,
            action,
        }
    }
}

pub fn setup_run(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    tuning: Res<SessionTuning>,
    mut binding: ResMut<InputBinding>,
) {
    let prefab = PlayerPrefab::new(&mut meshes, &mut materials);
    let assets = WorldObjectAssets::new(&mut meshes, &mut materials);

    let player = spawn_player(&mut commands, &prefab, DEFAULT_POSITION, 0.0);
    spawn_follow_camera(&mut commands, player, DEFAULT_POSITION);
    binding.target = Some(player);

    let mut platform_pool = PlatformPool::new(PLATFORM_POOL_SIZE);
    let mut platform_spawner = PlatformSpawner::new(Some(player), PlatformSpawnerConfig::default());
    {
        let mut hooks = PooledObjectHooks::new(PoolKind::Platform, &mut commands, &assets);
        platform_spawner.prime(&mut platform_pool.0, &mut hooks);
    }

    commands.insert_resource(ObstaclePool::new(OBSTACLE_POOL_SIZE));
    commands.insert_resource(ObstacleSpawner::new(
        Some(player),
        ObstacleSpawnerConfig::default(),
    ));
    commands.insert_resource(platform_pool);
    commands.insert_resource(platform_spawner);
    commands.insert_resource(RunSession::new(player, tuning.offer_seconds));
    commands.insert_resource(prefab);
    commands.insert_resource(assets);
    info!("run started with player {:?}", player);
}

pub fn handle_player_hits(
    mut hits: EventReader<PlayerHit>,
    mut session: ResMut<RunSession>,
    mut binding: ResMut<InputBinding>,
    mut cues: EventWriter<SessionCue>,
    mut commands: Commands,
) {
    for hit in hits.iter() {
        let player = match session.register_hit(hit.player, hit.position, hit.distance) {
            Ok(player) => player,
            Err(err) => {
                warn!("ignoring hit on {:?}: {err}", hit.player);
                continue;
            }
        };

        binding.target = None;
        commands.entity(player).despawn_recursive();
        cues.send(SessionCue::Crash);

        match session.settle_hit() {
            Ok(phase) => info!("player down at {:.1} m, now {:?}", hit.distance, phase),
            Err(err) => warn!("{err}"),
        }
    }
}

pub fn expire_second_chance(time: Res<Time>, mut session: ResMut<RunSession>) {
    if session.tick_offer(time.delta()) {
        info!("second chance expired, game over");
    }
}

pub fn decline_second_chance(
    mut declines: EventReader<SecondChanceDeclined>,
    mut session: ResMut<RunSession>,
) {
    for _ in declines.iter() {
        match session.decline() {
            Ok(()) => info!("second chance declined, game over"),
            Err(err) => warn!("{err}"),
        }
    }
}

pub fn respawn_player(
    mut requests: EventReader<RespawnRequested>,
    mut session: ResMut<RunSession>,
    tuning: Res<SessionTuning>,
    prefab: Res<PlayerPrefab>,
    assets: Res<WorldObjectAssets>,
    obstacle_spawner: Option<ResMut<ObstacleSpawner>>,
    platform_spawner: Option<ResMut<PlatformSpawner>>,
    mut obstacle_pool: ResMut<ObstaclePool>,
    mut platform_pool: ResMut<PlatformPool>,
    mut cameras: Query<&mut FollowCamera>,
    mut binding: ResMut<InputBinding>,
    mut commands: Commands,
) {
    if requests.iter().count() == 0 {
        return;
    }

    let player = match session.respawn(|plan| {
        spawn_player(&mut commands, &prefab, plan.position, plan.distance)
    }) {
        Ok(player) => player,
        Err(err) => {
            warn!("respawn rejected: {err}");
            return;
        }
    };
    let position = session.last_safe_position().unwrap_or(DEFAULT_POSITION);
    info!(
        "second chance: {:?} respawned at {} with {:.1} m",
        player,
        position,
        session.saved_distance()
    );

    grant_collision_immunity(&mut commands, player, tuning.immunity_seconds);
    binding.target = Some(player);

    {
        let mut hooks = PooledObjectHooks::new(PoolKind::Obstacle, &mut commands, &assets);
        let cleared = obstacle_pool.0.reset_all(&mut hooks);
        debug!("cleared {cleared} stale obstacles");
    }
    let mut platform_hooks = PooledObjectHooks::new(PoolKind::Platform, &mut commands, &assets);
    platform_pool.0.reset_all(&mut platform_hooks);

    match obstacle_spawner {
        Some(mut spawner) => spawner.player = Some(player),
        None => warn!(
            "{}",
            RunnerError::MissingOptionalCollaborator("obstacle spawner")
        ),
    }

    match platform_spawner {
        Some(mut spawner) => {
            spawner.player = Some(player);
            spawner.restart_at(position.z, &mut platform_pool.0, &mut platform_hooks);
        }
        None => warn!(
            "{}",
            RunnerError::MissingOptionalCollaborator("platform spawner")
        ),
    }

    match cameras.get_single_mut() {
        Ok(mut camera) => camera.retarget_next_frame(player),
        Err(_) => warn!("{}", RunnerError::MissingOptionalCollaborator("follow camera")),
    }
}
