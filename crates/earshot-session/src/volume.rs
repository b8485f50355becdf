//! Distance-to-volume mapping.

/// Beyond this distance a player is silent.
pub const VOLUME_CUTOFF: f64 = 30.0;

/// Divisor applied to the remaining distance. At distance 0 the volume is
/// `VOLUME_CUTOFF / VOLUME_SCALE`.
pub const VOLUME_SCALE: f64 = 100.0;

/// Volume for a speaker `distance` blocks away, in `[0, 1]`.
///
/// Non-increasing in `distance`; `0.3` at 0, `0.0` from 30 on. A NaN
/// distance is treated as out of range.
pub fn proximity_volume(distance: f64) -> f64 {
    if distance.is_nan() {
        return 0.0;
    }
    ((VOLUME_CUTOFF - distance) / VOLUME_SCALE).clamp(0.0, 1.0)
}
