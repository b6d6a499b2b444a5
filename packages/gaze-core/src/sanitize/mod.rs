/// Largest magnitude a standardised feature may take before it is clipped.
pub const MAX_FEATURE_ABS: f64 = 50.0;

/// Replace a non-finite value with `0.0`.
#[inline]
pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Replace non-finite raw features with zero in place.
pub fn sanitize_raw_features(x: &mut [f64]) {
    for val in x.iter_mut() {
        *val = finite_or_zero(*val);
    }
}

/// Clean a standardised feature vector: NaN/Inf become zero, outliers are
/// clipped to `±MAX_FEATURE_ABS`.
pub fn sanitize_feature_vector(x: &mut [f64]) {
    for val in x.iter_mut() {
        if val.is_nan() || val.is_infinite() {
            *val = 0.0;
        } else if *val > MAX_FEATURE_ABS {
            *val = MAX_FEATURE_ABS;
        } else if *val < -MAX_FEATURE_ABS {
            *val = -MAX_FEATURE_ABS;
        }
    }
}

/// Clamp a probability into `[0, 1]`, mapping non-finite input to the
/// neutral prior.
pub fn sanitize_probability(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_feature_vector() {
        let mut x = vec![f64::NAN, f64::INFINITY, 100.0, -100.0, 1.5];
        sanitize_feature_vector(&mut x);
        assert_eq!(x, vec![0.0, 0.0, MAX_FEATURE_ABS, -MAX_FEATURE_ABS, 1.5]);
    }

    #[test]
    fn test_sanitize_raw_features_keeps_magnitude() {
        let mut x = vec![f64::NAN, 1e6];
        sanitize_raw_features(&mut x);
        assert_eq!(x, vec![0.0, 1e6]);
    }

    #[test]
    fn test_sanitize_probability() {
        assert_eq!(sanitize_probability(1.2), 1.0);
        assert_eq!(sanitize_probability(-0.1), 0.0);
        assert_eq!(sanitize_probability(f64::NAN), 0.5);
    }
}
