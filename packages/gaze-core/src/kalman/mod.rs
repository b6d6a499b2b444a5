//! Constant-acceleration Kalman filter over 2-D gaze measurements.
//!
//! State layout: `[x, y, vx, vy, ax, ay]`. Only position is observed.

use serde::{Deserialize, Serialize};

use crate::matrix::{identity, invert_2x2, mat_add, mat_mul, mat_sub, mat_vec_mul, transpose};
use crate::types::{Point2, NOMINAL_FRAME_DT};

const STATE_DIM: usize = 6;
const MEAS_DIM: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanConfig {
    /// Fixed transition step in seconds.
    pub dt: f64,
    /// Diagonal of the initial state covariance.
    pub initial_covariance: f64,
    /// Diagonal of the process noise covariance.
    pub process_noise: f64,
    /// Diagonal of the measurement noise covariance.
    pub measurement_noise: f64,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            dt: NOMINAL_FRAME_DT,
            initial_covariance: 10.0,
            process_noise: 0.01,
            measurement_noise: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanState {
    pub state: [f64; STATE_DIM],
    /// Row-major 6x6 covariance.
    pub covariance: Vec<f64>,
}

impl KalmanState {
    fn initial(config: &KalmanConfig) -> Self {
        let mut covariance = identity(STATE_DIM);
        for v in covariance.iter_mut() {
            *v *= config.initial_covariance;
        }
        Self {
            state: [0.0; STATE_DIM],
            covariance,
        }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> Point2 {
        Point2::new(self.state[2], self.state[3])
    }

    pub fn acceleration(&self) -> Point2 {
        Point2::new(self.state[4], self.state[5])
    }
}

/// Gaze smoother for one tracked subject. Fed every measurement in order,
/// across calibration and successive sessions.
#[derive(Debug, Clone)]
pub struct GazeStateEstimator {
    config: KalmanConfig,
    transition: Vec<f64>,
    transition_t: Vec<f64>,
    process: Vec<f64>,
    measurement_noise: [f64; 4],
    state: KalmanState,
    updates: u64,
}

impl Default for GazeStateEstimator {
    fn default() -> Self {
        Self::new(KalmanConfig::default())
    }
}

impl GazeStateEstimator {
    pub fn new(config: KalmanConfig) -> Self {
        let dt = config.dt;
        let half_dt2 = 0.5 * dt * dt;
        let mut transition = identity(STATE_DIM);
        // position += v dt + a dt^2 / 2, velocity += a dt
        for axis in 0..2 {
            transition[axis * STATE_DIM + axis + 2] = dt;
            transition[axis * STATE_DIM + axis + 4] = half_dt2;
            transition[(axis + 2) * STATE_DIM + axis + 4] = dt;
        }
        let transition_t = transpose(&transition, STATE_DIM, STATE_DIM);

        let mut process = identity(STATE_DIM);
        for v in process.iter_mut() {
            *v *= config.process_noise;
        }
        let r = config.measurement_noise;

        Self {
            state: KalmanState::initial(&config),
            transition,
            transition_t,
            process,
            measurement_noise: [r, 0.0, 0.0, r],
            config,
            updates: 0,
        }
    }

    pub fn config(&self) -> &KalmanConfig {
        &self.config
    }

    pub fn state(&self) -> &KalmanState {
        &self.state
    }

    pub fn update_count(&self) -> u64 {
        self.updates
    }

    /// Back to zero state and the initial covariance. Only used when the
    /// tracker itself is re-initialised.
    pub fn reset(&mut self) {
        self.state = KalmanState::initial(&self.config);
        self.updates = 0;
    }

    /// Time update: `x = F x`, `P = F P F^T + Q`.
    pub fn predict(&mut self) {
        let x = mat_vec_mul(&self.transition, &self.state.state, STATE_DIM, STATE_DIM);
        self.state.state.copy_from_slice(&x);

        let fp = mat_mul(&self.transition, &self.state.covariance, STATE_DIM, STATE_DIM, STATE_DIM);
        let fpft = mat_mul(&fp, &self.transition_t, STATE_DIM, STATE_DIM, STATE_DIM);
        self.state.covariance = mat_add(&fpft, &self.process);
    }

    /// Measurement update against an observed position. Returns `false` if
    /// the innovation covariance could not be inverted.
    pub fn correct(&mut self, measurement: Point2) -> bool {
        let p = &self.state.covariance;
        let innovation = [
            measurement.x - self.state.state[0],
            measurement.y - self.state.state[1],
        ];

        // H selects the position rows/cols, so H P H^T is P's top-left block.
        let s = [
            p[0] + self.measurement_noise[0],
            p[1] + self.measurement_noise[1],
            p[STATE_DIM] + self.measurement_noise[2],
            p[STATE_DIM + 1] + self.measurement_noise[3],
        ];
        let Some(s_inv) = invert_2x2(&s) else {
            return false;
        };

        // K = P H^T S^-1  (6x2)
        let mut pht = vec![0.0; STATE_DIM * MEAS_DIM];
        for row in 0..STATE_DIM {
            pht[row * MEAS_DIM] = p[row * STATE_DIM];
            pht[row * MEAS_DIM + 1] = p[row * STATE_DIM + 1];
        }
        let gain = mat_mul(&pht, &s_inv, STATE_DIM, MEAS_DIM, MEAS_DIM);

        for row in 0..STATE_DIM {
            self.state.state[row] +=
                gain[row * MEAS_DIM] * innovation[0] + gain[row * MEAS_DIM + 1] * innovation[1];
        }

        // P = (I - K H) P
        let mut kh = vec![0.0; STATE_DIM * STATE_DIM];
        for row in 0..STATE_DIM {
            kh[row * STATE_DIM] = gain[row * MEAS_DIM];
            kh[row * STATE_DIM + 1] = gain[row * MEAS_DIM + 1];
        }
        let i_kh = mat_sub(&identity(STATE_DIM), &kh);
        self.state.covariance = mat_mul(&i_kh, &self.state.covariance, STATE_DIM, STATE_DIM, STATE_DIM);

        true
    }

    /// Predict then update with one raw gaze measurement; returns the
    /// smoothed position. A non-finite measurement leaves the filter
    /// untouched.
    pub fn update(&mut self, measurement: Point2) -> Point2 {
        if !measurement.is_finite() {
            tracing::debug!("non-finite gaze measurement ignored");
            return self.state.position();
        }
        self.predict();
        if self.correct(measurement) {
            self.updates += 1;
        } else {
            tracing::warn!("singular innovation covariance, keeping prediction");
        }
        self.state.position()
    }
}
