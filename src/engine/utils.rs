use std::f32::consts::{FRAC_PI_4, TAU};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::{WIND_BIAS_CHANCE, WIND_BIAS_SPREAD};
use crate::rng::Rng;
use crate::types::Vec2;

pub(super) fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

pub(super) fn polar_offset(origin: Vec2, angle: f32, distance: f32) -> Vec2 {
    Vec2 {
        x: origin.x + angle.cos() * distance,
        y: origin.y + angle.sin() * distance,
    }
}

/// Mostly downwind, occasionally anywhere.
pub(super) fn wind_biased_angle(rng: &mut Rng, wind_angle: f32) -> f32 {
    if rng.bool(WIND_BIAS_CHANCE) {
        wind_angle + rng.range(-WIND_BIAS_SPREAD, WIND_BIAS_SPREAD)
    } else {
        rng.angle()
    }
}

/// Screen-space compass name; y grows downward so positive angles turn south.
pub fn wind_direction_name(angle: f32) -> &'static str {
    const DIRS: [&str; 8] = [
        "East",
        "South-East",
        "South",
        "South-West",
        "West",
        "North-West",
        "North",
        "North-East",
    ];
    let normalized = angle.rem_euclid(TAU);
    let index = (normalized / FRAC_PI_4).round() as usize % DIRS.len();
    DIRS[index]
}

/// Signed smallest difference between two angles, in `(-PI, PI]`.
pub(super) fn angle_delta(a: f32, b: f32) -> f32 {
    let mut delta = (a - b).rem_euclid(TAU);
    if delta > std::f32::consts::PI {
        delta -= TAU;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn compass_names_follow_screen_axes() {
        assert_eq!(wind_direction_name(0.0), "East");
        assert_eq!(wind_direction_name(FRAC_PI_2), "South");
        assert_eq!(wind_direction_name(PI), "West");
        assert_eq!(wind_direction_name(TAU - 0.01), "East");
        assert_eq!(wind_direction_name(-FRAC_PI_2), "North");
    }

    #[test]
    fn wind_bias_concentrates_around_wind_angle() {
        let mut rng = Rng::new(2_024);
        let wind = 1.0;
        let samples = 4_000;
        let near = (0..samples)
            .filter(|_| angle_delta(wind_biased_angle(&mut rng, wind), wind).abs() <= WIND_BIAS_SPREAD)
            .count();
        let ratio = near as f32 / samples as f32;
        assert!(ratio > 0.75 && ratio < 0.9, "ratio {ratio}");
    }

    #[test]
    fn angle_delta_wraps() {
        assert!((angle_delta(0.1, TAU - 0.1) - 0.2).abs() < 1e-5);
        assert!((angle_delta(TAU - 0.1, 0.1) + 0.2).abs() < 1e-5);
    }
}
