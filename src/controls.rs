use crate::locomotion::{LocomotionState, SteeringInput};
use crate::session::{RunPhase, RunSession};
use bevy::prelude::*;

/// Which player the on-screen controls currently drive. Cleared on a hit and
/// pointed at the new player on respawn.
#[derive(Resource, Debug, Default)]
pub struct InputBinding {
    pub target: Option<Entity>,
}

#[derive(Debug, Clone, Copy)]
pub struct RespawnRequested;

#[derive(Debug, Clone, Copy)]
pub struct SecondChanceDeclined;

pub fn steering_axis(left: bool, right: bool) -> f32 {
    match (left, right) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    }
}

pub fn read_steering(
    keyboard: Res<Input<KeyCode>>,
    binding: Res<InputBinding>,
    mut players: Query<(&mut SteeringInput, &mut LocomotionState)>,
) {
    let Some(target) = binding.target else {
        return;
    };
    let Ok((mut steering, mut state)) = players.get_mut(target) else {
        return;
    };

    let left = keyboard.any_pressed([KeyCode::Left, KeyCode::A]);
    let right = keyboard.any_pressed([KeyCode::Right, KeyCode::D]);
    steering.axis = Vec2::new(steering_axis(left, right), 0.0);

    if keyboard.just_pressed(KeyCode::Space) {
        state.start_flying();
    }
    if keyboard.just_released(KeyCode::Space) {
        state.stop_flying();
    }
}

pub fn read_session_keys(
    keyboard: Res<Input<KeyCode>>,
    session: Res<RunSession>,
    mut respawns: EventWriter<RespawnRequested>,
    mut declines: EventWriter<SecondChanceDeclined>,
) {
    if session.phase() != RunPhase::SecondChanceOffered {
        return;
    }
    if keyboard.just_pressed(KeyCode::Return) {
        respawns.send(RespawnRequested);
    } else if keyboard.just_pressed(KeyCode::Escape) {
        declines.send(SecondChanceDeclined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steering_axis() {
        assert_eq!(steering_axis(true, false), -1.0);
        assert_eq!(steering_axis(false, true), 1.0);
        assert_eq!(steering_axis(true, true), 0.0);
        assert_eq!(steering_axis(false, false), 0.0);
    }

    #[test]
    fn test_steering_only_reaches_bound_player() {
        let mut app = App::new();
        app.init_resource::<Input<KeyCode>>()
            .init_resource::<InputBinding>()
            .add_system(read_steering);

        let bound = app
            .world
            .spawn((SteeringInput::default(), LocomotionState::new(0.0)))
            .id();
        let stray = app
            .world
            .spawn((SteeringInput::default(), LocomotionState::new(0.0)))
            .id();
        app.world.resource_mut::<InputBinding>().target = Some(bound);

        {
            let mut keyboard = app.world.resource_mut::<Input<KeyCode>>();
            keyboard.press(KeyCode::Right);
            keyboard.press(KeyCode::Space);
        }
        app.update();

        assert_eq!(app.world.get::<SteeringInput>(bound).unwrap().axis.x, 1.0);
        assert!(app.world.get::<LocomotionState>(bound).unwrap().is_flying());
        assert_eq!(app.world.get::<SteeringInput>(stray).unwrap().axis.x, 0.0);
        assert!(!app.world.get::<LocomotionState>(stray).unwrap().is_flying());
    }
}
