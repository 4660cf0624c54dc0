use crate::locomotion::{EngineEdge, FlightPose};
use crate::player::{PlayerHit, PoseRig};
use bevy::prelude::*;

const ENGINE_SOUND: &str = "sounds/jetpack.ogg";
const CRASH_SOUND: &str = "sounds/crash.ogg";
/// Forward lean of the body at full flight weight, in radians.
const FLIGHT_TILT: f32 = 0.6;

/// Emitted when a player's jetpack ignites or cuts out.
#[derive(Debug, Clone, Copy)]
pub struct EngineCue {
    pub player: Entity,
    pub edge: EngineEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCue {
    Crash,
}

#[derive(Resource)]
pub struct CueAssets {
    engine: Handle<AudioSource>,
    crash: Handle<AudioSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlumeKind {
    Steam,
    Gas,
}

#[derive(Component)]
pub struct ExhaustPlume {
    pub owner: Entity,
    pub kind: PlumeKind,
}

/// Steam shows under thrust, gas while coasting.
pub fn plume_visible(kind: PlumeKind, thrusting: bool) -> bool {
    match kind {
        PlumeKind::Steam => thrusting,
        PlumeKind::Gas => !thrusting,
    }
}

pub fn load_cue_assets(mut commands: Commands, asset_server: Res<AssetServer>) {
    commands.insert_resource(CueAssets {
        engine: asset_server.load(ENGINE_SOUND),
        crash: asset_server.load(CRASH_SOUND),
    });
}

pub fn play_engine_cues(
    mut cues: EventReader<EngineCue>,
    mut hits: EventReader<PlayerHit>,
    assets: Option<Res<CueAssets>>,
    audio: Res<Audio>,
    sinks: Res<Assets<AudioSink>>,
    mut engine: Local<Option<Handle<AudioSink>>>,
) {
    let stop = |engine: &mut Option<Handle<AudioSink>>| {
        if let Some(sink) = engine.take().and_then(|handle| sinks.get(&handle)) {
            sink.stop();
        }
    };

    for cue in cues.iter() {
        match cue.edge {
            EngineEdge::Ignite => {
                let Some(assets) = &assets else {
                    warn!("no cue assets loaded, engine stays silent");
                    continue;
                };
                stop(&mut *engine);
                let weak = audio.play_with_settings(assets.engine.clone(), PlaybackSettings::LOOP);
                *engine = Some(sinks.get_handle(weak));
            }
            EngineEdge::Cutoff => stop(&mut *engine),
        }
    }

    if hits.iter().count() > 0 {
        stop(&mut *engine);
    }
}

pub fn play_session_cues(
    mut cues: EventReader<SessionCue>,
    assets: Option<Res<CueAssets>>,
    audio: Res<Audio>,
) {
    for cue in cues.iter() {
        let Some(assets) = &assets else {
            warn!("no cue assets loaded, skipping {:?}", cue);
            continue;
        };
        match cue {
            SessionCue::Crash => {
                audio.play(assets.crash.clone());
            }
        }
    }
}

pub fn toggle_exhaust_plumes(
    mut cues: EventReader<EngineCue>,
    mut hits: EventReader<PlayerHit>,
    mut plumes: Query<(&ExhaustPlume, &mut Visibility)>,
) {
    for cue in cues.iter() {
        let thrusting = cue.edge == EngineEdge::Ignite;
        for (plume, mut visibility) in &mut plumes {
            if plume.owner == cue.player {
                *visibility = if plume_visible(plume.kind, thrusting) {
                    Visibility::Visible
                } else {
                    Visibility::Hidden
                };
            }
        }
    }

    for hit in hits.iter() {
        for (plume, mut visibility) in &mut plumes {
            if plume.owner == hit.player {
                *visibility = Visibility::Hidden;
            }
        }
    }
}

/// Leans each player's body rig by its flight-pose weight.
pub fn pose_flight_layer(
    players: Query<&FlightPose>,
    mut rigs: Query<(&PoseRig, &mut Transform)>,
) {
    for (rig, mut transform) in &mut rigs {
        let Ok(pose) = players.get(rig.owner) else {
            continue;
        };
        if pose.enabled {
            transform.rotation = Quat::from_rotation_x(pose.weight * FLIGHT_TILT);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plume_app() -> (App, Entity, Entity, Entity) {
        let mut app = App::new();
        app.add_event::<EngineCue>()
            .add_event::<PlayerHit>()
            .add_system(toggle_exhaust_plumes);

        let player = app.world.spawn_empty().id();
        let steam = app
            .world
            .spawn((
                ExhaustPlume {
                    owner: player,
                    kind: PlumeKind::Steam,
                },
                Visibility::Hidden,
            ))
            .id();
        let gas = app
            .world
            .spawn((
                ExhaustPlume {
                    owner: player,
                    kind: PlumeKind::Gas,
                },
                Visibility::Hidden,
            ))
            .id();
        (app, player, steam, gas)
    }

    #[test]
    fn test_plume_visibility_by_kind() {
        assert!(plume_visible(PlumeKind::Steam, true));
        assert!(!plume_visible(PlumeKind::Gas, true));
        assert!(!plume_visible(PlumeKind::Steam, false));
        assert!(plume_visible(PlumeKind::Gas, false));
    }

    #[test]
    fn test_plumes_follow_engine_and_hide_on_hit() {
        let (mut app, player, steam, gas) = plume_app();

        app.world.resource_mut::<Events<EngineCue>>().send(EngineCue {
            player,
            edge: EngineEdge::Ignite,
        });
        app.update();
        assert_eq!(app.world.get::<Visibility>(steam), Some(&Visibility::Visible));
        assert_eq!(app.world.get::<Visibility>(gas), Some(&Visibility::Hidden));

        app.world.resource_mut::<Events<EngineCue>>().send(EngineCue {
            player,
            edge: EngineEdge::Cutoff,
        });
        app.update();
        assert_eq!(app.world.get::<Visibility>(steam), Some(&Visibility::Hidden));
        assert_eq!(app.world.get::<Visibility>(gas), Some(&Visibility::Visible));

        app.world.resource_mut::<Events<PlayerHit>>().send(PlayerHit {
            player,
            position: Vec3::ZERO,
            distance: 0.0,
        });
        app.update();
        assert_eq!(app.world.get::<Visibility>(gas), Some(&Visibility::Hidden));
    }

    #[test]
    fn test_cues_for_other_players_are_ignored() {
        let (mut app, _, steam, _) = plume_app();

        app.world.resource_mut::<Events<EngineCue>>().send(EngineCue {
            player: Entity::from_raw(999),
            edge: EngineEdge::Ignite,
        });
        app.update();
        assert_eq!(app.world.get::<Visibility>(steam), Some(&Visibility::Hidden));
    }

    #[test]
    fn test_pose_tilts_rig_only_while_enabled() {
        let mut app = App::new();
        app.add_system(pose_flight_layer);

        let flying = app
            .world
            .spawn(FlightPose {
                weight: 1.0,
                enabled: true,
            })
            .id();
        let ragdolled = app
            .world
            .spawn(FlightPose {
                weight: 1.0,
                enabled: false,
            })
            .id();
        let tilted = app
            .world
            .spawn((PoseRig { owner: flying }, Transform::IDENTITY))
            .id();
        let limp = app
            .world
            .spawn((PoseRig { owner: ragdolled }, Transform::IDENTITY))
            .id();
        app.update();

        let rotation = app.world.get::<Transform>(tilted).unwrap().rotation;
        assert!(rotation.abs_diff_eq(Quat::from_rotation_x(FLIGHT_TILT), 1e-5));
        assert_eq!(
            app.world.get::<Transform>(limp).unwrap().rotation,
            Quat::IDENTITY
        );
    }
}
