/// Rescale `value` linearly against `[floor, ceiling]` into `[0, 100]`,
/// clamped at both ends. Used for the liquidity sub-components (spread,
/// open interest, volume), each of which has its own configured floor and
/// ceiling rather than a hardcoded one.
pub fn rescale_linear(value: f64, floor: f64, ceiling: f64, invert: bool) -> f64 {
    if (ceiling - floor).abs() < f64::EPSILON {
        return 50.0;
    }
    let raw = ((value - floor) / (ceiling - floor)).clamp(0.0, 1.0) * 100.0;
    if invert {
        100.0 - raw
    } else {
        raw
    }
}

/// Logistic curve saturating near `midpoint`, mapped to `[0, 100]`. Used for
/// `profitability`, where `risk_reward_ratio` keeps improving the score but
/// with diminishing returns past the configured saturation point.
pub fn logistic_saturating(value: f64, midpoint: f64, steepness: f64) -> f64 {
    let x = steepness * (value - midpoint);
    100.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_clamps_below_floor() {
        assert_eq!(rescale_linear(-5.0, 0.0, 10.0, false), 0.0);
    }

    #[test]
    fn rescale_clamps_above_ceiling() {
        assert_eq!(rescale_linear(20.0, 0.0, 10.0, false), 100.0);
    }

    #[test]
    fn rescale_inverts() {
        let normal = rescale_linear(8.0, 0.0, 10.0, false);
        let inverted = rescale_linear(8.0, 0.0, 10.0, true);
        assert!((normal + inverted - 100.0).abs() < 1e-9);
    }

    #[test]
    fn logistic_is_monotonic_increasing() {
        let low = logistic_saturating(0.5, 2.0, 2.0);
        let high = logistic_saturating(3.0, 2.0, 2.0);
        assert!(high > low);
    }

    #[test]
    fn logistic_saturates_near_midpoint() {
        let near_mid = logistic_saturating(2.0, 2.0, 2.0);
        assert!((near_mid - 50.0).abs() < 1.0);
    }
}
