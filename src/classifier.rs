//! Head-movement classification and the optional gyro smoothing step.
//!
//! The classifier is a pure threshold test.  Any smoothing happens before it,
//! behind the [`GyroFilter`] trait; the control loop's default is
//! [`PassThrough`], which classifies the bias-corrected axes as they arrive.

use crate::types::MovementIntent;

/// Default dead-band half-width in raw gyro units.
pub const DEFAULT_THRESHOLD: i16 = 15;

/// Classify one `(gyro_x, gyro_y)` pair.
///
/// First match wins, so a diagonal movement resolves to the vertical axis:
///
/// 1. `gyro_y >  threshold` → `Forward`
/// 2. `gyro_y < -threshold` → `Backward`
/// 3. `gyro_x >  threshold` → `Right`
/// 4. `gyro_x < -threshold` → `Left`
/// 5. otherwise → `None`
///
/// `threshold` is a magnitude; its sign is ignored.
///
/// ```
/// # use epoc_pilot::classifier::classify;
/// # use epoc_pilot::types::MovementIntent;
/// assert_eq!(classify(0, 20, 15), MovementIntent::Forward);
/// assert_eq!(classify(20, 20, 15), MovementIntent::Forward);
/// assert_eq!(classify(5, 5, 15), MovementIntent::None);
/// ```
pub fn classify(gyro_x: i16, gyro_y: i16, threshold: i16) -> MovementIntent {
    let t = threshold.saturating_abs();
    if gyro_y > t {
        MovementIntent::Forward
    } else if gyro_y < -t {
        MovementIntent::Backward
    } else if gyro_x > t {
        MovementIntent::Right
    } else if gyro_x < -t {
        MovementIntent::Left
    } else {
        MovementIntent::None
    }
}

/// Stateless threshold classifier.
///
/// A larger threshold needs a bigger head movement to trigger (fewer false
/// positives); a smaller one reacts sooner but also to jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementClassifier {
    threshold: i16,
}

impl MovementClassifier {
    pub fn new(threshold: i16) -> Self {
        Self {
            threshold: threshold.saturating_abs(),
        }
    }

    pub fn threshold(&self) -> i16 {
        self.threshold
    }

    pub fn classify(&self, gyro_x: i16, gyro_y: i16) -> MovementIntent {
        classify(gyro_x, gyro_y, self.threshold)
    }
}

impl Default for MovementClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

// ── Filtering ─────────────────────────────────────────────────────────────────

/// A smoothing step applied to the gyro axes before classification.
pub trait GyroFilter: Send {
    /// Feed one bias-corrected sample, get the filtered pair back.
    fn update(&mut self, gyro_x: i16, gyro_y: i16) -> (i16, i16);
}

/// Identity filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl GyroFilter for PassThrough {
    fn update(&mut self, gyro_x: i16, gyro_y: i16) -> (i16, i16) {
        (gyro_x, gyro_y)
    }
}

/// Scalar Kalman estimator for one axis (random-walk state model).
#[derive(Debug, Clone, Copy)]
pub struct ScalarKalman {
    /// Process noise variance.
    pub q: f64,
    /// Measurement noise variance.
    pub r: f64,
    x: f64,
    p: f64,
    primed: bool,
}

impl ScalarKalman {
    pub fn new(q: f64, r: f64) -> Self {
        Self {
            q,
            r,
            x: 0.0,
            p: 1.0,
            primed: false,
        }
    }

    /// Current estimate.
    pub fn estimate(&self) -> f64 {
        self.x
    }

    /// Fold in one measurement and return the new estimate.
    ///
    /// The first measurement seeds the estimate directly so the filter does
    /// not crawl up from zero.
    pub fn update(&mut self, z: f64) -> f64 {
        if !self.primed {
            self.x = z;
            self.primed = true;
            return self.x;
        }
        self.p += self.q;
        let k = self.p / (self.p + self.r);
        self.x += k * (z - self.x);
        self.p *= 1.0 - k;
        self.x
    }
}

impl Default for ScalarKalman {
    fn default() -> Self {
        Self::new(1e-2, 1.0)
    }
}

/// Independent [`ScalarKalman`] per axis; outputs are rounded back to integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KalmanFilter {
    x: ScalarKalman,
    y: ScalarKalman,
}

impl KalmanFilter {
    pub fn new(q: f64, r: f64) -> Self {
        Self {
            x: ScalarKalman::new(q, r),
            y: ScalarKalman::new(q, r),
        }
    }
}

impl GyroFilter for KalmanFilter {
    fn update(&mut self, gyro_x: i16, gyro_y: i16) -> (i16, i16) {
        let fx = self.x.update(gyro_x as f64).round();
        let fy = self.y.update(gyro_y as f64).round();
        (
            fx.clamp(i16::MIN as f64, i16::MAX as f64) as i16,
            fy.clamp(i16::MIN as f64, i16::MAX as f64) as i16,
        )
    }
}

/// Which [`GyroFilter`] the control loop builds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FilterKind {
    #[default]
    None,
    Kalman {
        q: f64,
        r: f64,
    },
}

impl FilterKind {
    pub fn build(self) -> Box<dyn GyroFilter> {
        match self {
            FilterKind::None => Box::new(PassThrough),
            FilterKind::Kalman { q, r } => Box::new(KalmanFilter::new(q, r)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MovementIntent::*;

    #[test]
    fn single_axis_intents() {
        assert_eq!(classify(0, 20, 15), Forward);
        assert_eq!(classify(0, -20, 15), Backward);
        assert_eq!(classify(20, 0, 15), Right);
        assert_eq!(classify(-20, 0, 15), Left);
        assert_eq!(classify(5, 5, 15), None);
    }

    #[test]
    fn vertical_axis_wins_ties() {
        assert_eq!(classify(20, 20, 15), Forward);
        assert_eq!(classify(-20, -20, 15), Backward);
        assert_eq!(classify(-40, 16, 15), Forward);
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(classify(15, 15, 15), None);
        assert_eq!(classify(-15, -15, 15), None);
        assert_eq!(classify(16, 0, 15), Right);
    }

    #[test]
    fn threshold_changes_sensitivity() {
        let strict = MovementClassifier::new(30);
        let loose = MovementClassifier::new(5);
        assert_eq!(strict.classify(0, 20), None);
        assert_eq!(loose.classify(0, 6), Forward);
        assert_eq!(MovementClassifier::new(-15).threshold(), 15);
        assert_eq!(MovementClassifier::default().threshold(), DEFAULT_THRESHOLD);
    }

    #[test]
    fn passthrough_is_identity() {
        let mut f = PassThrough;
        assert_eq!(f.update(-7, 42), (-7, 42));
    }

    #[test]
    fn kalman_seeds_then_smooths_spikes() {
        let mut f = KalmanFilter::default();
        assert_eq!(f.update(0, 0), (0, 0));
        for _ in 0..20 {
            f.update(0, 0);
        }
        // A single-sample spike is heavily damped.
        let (x, y) = f.update(80, -80);
        assert!(x.abs() < 15, "x = {x}");
        assert!(y.abs() < 15, "y = {y}");
    }

    #[test]
    fn kalman_converges_to_steady_input() {
        let mut k = ScalarKalman::new(0.5, 1.0);
        assert_eq!(k.update(-4.0), -4.0);
        assert_eq!(k.estimate(), -4.0);
        let mut last = 0.0;
        for _ in 0..50 {
            last = k.update(30.0);
        }
        assert!((last - 30.0).abs() < 0.5, "estimate {last}");
        assert_eq!(k.estimate(), last);
    }
}
