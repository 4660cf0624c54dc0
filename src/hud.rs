use crate::locomotion::LocomotionState;
use crate::session::{RunPhase, RunSession};
use bevy::prelude::*;

const FONT: &str = "fonts/FiraSans-Bold.ttf";

#[derive(Component)]
pub struct DistanceText;

#[derive(Component)]
pub struct SessionBanner;

pub fn format_distance(meters: f32) -> String {
    format!("Distance: {:.2} KM", meters / 1000.0)
}

/// Overlay text for the current phase, if any.
pub fn banner_message(session: &RunSession) -> Option<String> {
    match session.phase() {
        RunPhase::Playing | RunPhase::Hit => None,
        RunPhase::SecondChanceOffered => Some(format!(
            "CRASHED at {:.2} KM\nReturn: second chance ({:.0}s)   Escape: give up",
            session.saved_distance() / 1000.0,
            session.offer_remaining().ceil()
        )),
        RunPhase::GameOver => Some(format!(
            "GAME OVER\nFinal distance {:.2} KM",
            session.saved_distance() / 1000.0
        )),
    }
}

pub fn setup_hud(mut commands: Commands, asset_server: Res<AssetServer>) {
    let font = asset_server.load(FONT);

    commands.spawn((
        TextBundle::from_section(
            format_distance(0.0),
            TextStyle {
                font: font.clone(),
                font_size: 32.0,
                color: Color::WHITE,
            },
        )
        .with_style(Style {
            position_type: PositionType::Absolute,
            position: UiRect {
                top: Val::Px(12.0),
                left: Val::Px(16.0),
                ..default()
            },
            ..default()
        }),
        DistanceText,
    ));

    let mut banner = TextBundle::from_section(
        "",
        TextStyle {
            font,
            font_size: 48.0,
            color: Color::rgb(0.95, 0.3, 0.2),
        },
    )
    .with_text_alignment(TextAlignment::Center)
    .with_style(Style {
        position_type: PositionType::Absolute,
        position: UiRect {
            top: Val::Percent(35.0),
            left: Val::Percent(25.0),
            ..default()
        },
        ..default()
    });
    banner.visibility = Visibility::Hidden;
    commands.spawn((banner, SessionBanner));
}

pub fn update_distance_text(
    session: Res<RunSession>,
    players: Query<&LocomotionState>,
    mut texts: Query<(&mut Text, &mut Visibility), With<DistanceText>>,
) {
    let distance = session
        .player()
        .and_then(|player| players.get(player).ok())
        .map(LocomotionState::distance);

    for (mut text, mut visibility) in &mut texts {
        match distance.filter(|_| session.is_playing()) {
            Some(meters) => {
                *visibility = Visibility::Visible;
                text.sections[0].value = format_distance(meters);
            }
            None => *visibility = Visibility::Hidden,
        }
    }
}

pub fn update_session_banner(
    session: Res<RunSession>,
    mut banners: Query<(&mut Text, &mut Visibility), With<SessionBanner>>,
) {
    let message = banner_message(&session);

    for (mut text, mut visibility) in &mut banners {
        match &message {
            Some(message) => {
                *visibility = Visibility::Visible;
                if text.sections[0].value != *message {
                    text.sections[0].value = message.clone();
                }
            }
            None => *visibility = Visibility::Hidden,
        }
    }
}
