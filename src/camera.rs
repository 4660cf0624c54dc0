use crate::player::Player;
use bevy::prelude::*;

const CAMERA_OFFSET: Vec3 = Vec3::new(0.0, 4.0, -10.0);
const CAMERA_SMOOTHING: f32 = 8.0;

/// Third-person camera trailing a player. Retargeting waits one frame so the
/// new player's transform exists before the camera latches on.
#[derive(Component, Debug)]
pub struct FollowCamera {
    pub target: Option<Entity>,
    pending: Option<Entity>,
    frames_to_wait: u8,
    offset: Vec3,
}

impl FollowCamera {
    pub fn new(target: Entity) -> Self {
        Self {
            target: Some(target),
            pending: None,
            frames_to_wait: 0,
            offset: CAMERA_OFFSET,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> Option<Entity> {
        self.pending
    }

    pub fn retarget_next_frame(&mut self, target: Entity) {
        self.pending = Some(target);
        self.frames_to_wait = 1;
    }

    /// Advances a pending retarget by one frame. The target is only taken if
    /// `alive` still reports it.
    pub fn poll_pending(&mut self, alive: impl Fn(Entity) -> bool) -> Option<Entity> {
        let pending = self.pending?;
        if self.frames_to_wait > 0 {
            self.frames_to_wait -= 1;
            return None;
        }
        self.pending = None;
        if alive(pending) {
            self.target = Some(pending);
            Some(pending)
        } else {
            warn!("camera target {:?} vanished before rebinding", pending);
            None
        }
    }
}

pub fn spawn_follow_camera(commands: &mut Commands, target: Entity, target_position: Vec3) {
    commands.spawn((
        Camera3dBundle {
            transform: Transform::from_translation(target_position + CAMERA_OFFSET)
                .looking_at(target_position + Vec3::Y, Vec3::Y),
            ..default()
        },
        FollowCamera::new(target),
    ));
}

pub fn follow_target(
    time: Res<Time>,
    mut cameras: Query<(&mut FollowCamera, &mut Transform), Without<Player>>,
    targets: Query<&Transform, With<Player>>,
) {
    let follow = 1.0 - (-CAMERA_SMOOTHING * time.delta_seconds()).exp();

    for (mut camera, mut transform) in &mut cameras {
        if let Some(target) = camera.poll_pending(|entity| targets.contains(entity)) {
            info!("camera now following {:?}", target);
        }
        let Some(target) = camera.target.and_then(|target| targets.get(target).ok()) else {
            continue;
        };

        let desired = target.translation + camera.offset;
        transform.translation = transform.translation.lerp(desired, follow);
        transform.look_at(target.translation + Vec3::Y, Vec3::Y);
    }
}
