//! Wireless and compute parameters plus the free-space link-rate model.
//!
//! All values are SI: bits, seconds, joules, watts, metres. These are the
//! physical constants of the deployment; the tunable control knobs (slot
//! duration, iteration budget, cost weights) live in [`crate::config`] with
//! these values as defaults.

/// Control interval length in seconds.
pub const SLOT_DURATION_S: f64 = 0.05;

/// Carrier frequency in Hz (FR1).
pub const CARRIER_FREQ_HZ: f64 = 3.5e9;

/// Channel bandwidth in Hz.
pub const BANDWIDTH_HZ: f64 = 5e7;

/// Noise power in W.
pub const NOISE_W: f64 = 1e-9;

/// User-equipment transmit power in W (4G LTE class).
pub const USER_TX_POWER_W: f64 = 0.2;

/// Base-station transmit power in W.
pub const COMM_TX_POWER_W: f64 = 2.0;

/// CPU cycles required per bit of task data.
pub const CYCLES_PER_BIT: f64 = 1000.0;

/// Peak CPU rate of a compute device in cycles/s.
pub const CPU_CYCLES_PER_S: f64 = 1e9;

/// Energy coefficient of the compute power model (E = f·κ·C³·Δ).
pub const ENERGY_COEFF: f64 = 1e-27;

/// Wireless coverage radius in metres.
pub const COVERAGE_RADIUS_M: f64 = 400.0;

/// Lyapunov drift-vs-penalty trade-off weight.
pub const DRIFT_WEIGHT_V: f64 = 100.0;

/// Normaliser applied to drift and penalty terms to keep costs small.
pub const SHRINK_NORMALIZER_S: f64 = 10_000.0;

/// Penalty weight on total delay.
pub const COST_ALPHA: f64 = 0.3;

/// Penalty weight on total energy.
pub const COST_BETA: f64 = 0.3;

/// Penalty weight on load.
pub const COST_GAMMA: f64 = 0.4;

/// Search iteration budget of the Lyapunov scheduler.
pub const MAX_ITERATIONS: usize = 20;

/// Early-termination cost bias for the Lyapunov search.
pub const EARLY_STOP_BIAS: f64 = 0.1;

/// Speed of light in m/s.
const C_LIGHT: f64 = 3e8;

/// Euclidean distance between two points.
#[must_use]
pub fn distance(x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    (x2 - x1).hypot(y2 - y1)
}

/// Achievable link rate in bits/s for transmit power `tx_power_w` over
/// distance `d_m`, per the free-space path-loss model and Shannon capacity.
///
/// `d_m = 0` would make the received power unbounded; callers only evaluate
/// this between distinct devices (a user and its nearest comm are never
/// co-located), so the degenerate case returns 0 rather than infinity.
#[must_use]
pub fn shannon_rate(tx_power_w: f64, d_m: f64) -> f64 {
    if d_m <= 0.0 {
        return 0.0;
    }

    let lambda = C_LIGHT / CARRIER_FREQ_HZ;

    // Received power P_r = P_t · (λ / 4πd)²
    let attenuation = lambda / (4.0 * std::f64::consts::PI * d_m);
    let received = tx_power_w * attenuation * attenuation;

    BANDWIDTH_HZ * (1.0 + received / NOISE_W).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        assert!((distance(0.0, 0.0, 3.0, 4.0) - 5.0).abs() < f64::EPSILON);
        assert!(distance(1.0, 1.0, 1.0, 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn shannon_rate_decreases_with_distance() {
        let near = shannon_rate(USER_TX_POWER_W, 10.0);
        let far = shannon_rate(USER_TX_POWER_W, 100.0);
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn shannon_rate_increases_with_power() {
        let weak = shannon_rate(USER_TX_POWER_W, 50.0);
        let strong = shannon_rate(COMM_TX_POWER_W, 50.0);
        assert!(strong > weak);
    }

    #[test]
    fn zero_distance_yields_zero_rate() {
        assert_eq!(shannon_rate(USER_TX_POWER_W, 0.0), 0.0);
    }

    #[test]
    fn short_range_uplink_fits_a_task_in_one_slot() {
        // 10 m at user power comfortably exceeds 10⁴ bits per 50 ms slot.
        let rate = shannon_rate(USER_TX_POWER_W, 10.0);
        assert!(rate * SLOT_DURATION_S > 1e4);
    }
}
