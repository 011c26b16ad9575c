//! Physical unit conversion for the VAST stage axes.
//!
//! Linear axes are addressed in microsteps, the rotation axis in motor steps
//! of 0.72°. Conversions to the wire truncate toward zero; they never round.

/// Micrometers to microsteps (1 µm = 21.33333 µsteps).
pub const UM_TO_US: f64 = 21.33333;

/// Degrees to rotation motor steps (1 step = 0.72°).
pub const DEG_TO_US: f64 = 1.0 / 0.72;

/// Convert a linear distance in micrometers to whole microsteps.
pub fn um_to_microsteps(um: f64) -> i64 {
    (um * UM_TO_US) as i64
}

/// Convert microsteps back to micrometers.
pub fn microsteps_to_um(microsteps: i64) -> f64 {
    microsteps as f64 / UM_TO_US
}

/// Convert an angle in degrees to whole rotation steps.
pub fn deg_to_steps(deg: f64) -> i64 {
    (deg * DEG_TO_US) as i64
}

/// Convert rotation steps back to degrees.
pub fn steps_to_deg(steps: i64) -> f64 {
    steps as f64 / DEG_TO_US
}
