//! Online plant identification and gain tuning.
//!
//! While learning, readings accumulate in a one-hour window. Once enough of
//! them show a clear step response the plant is approximated as first order
//! with dead time and the gains come from Cohen-Coon style formulas. After
//! that the gains drift slowly based on how well the loop holds the target.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    history::{PerformanceHistory, TemperatureHistory, TemperatureSample},
    pid::Gains,
};

pub const HISTORY_WINDOW_SECS: i64 = 3_600;
pub const LEARNING_TIMEOUT_SECS: i64 = 3_600;
pub const MIN_LEARNING_SAMPLES: usize = 30;
/// Smallest step response, in degrees, considered enough excitation.
pub const MIN_EXCITATION: f64 = 0.5;
pub const PERFORMANCE_CAPACITY: usize = 1_000;
pub const ADAPTATION_WINDOW: usize = 100;

const TIME_CONSTANT_FRACTION: f64 = 0.632;
const DEAD_TIME_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningPhase {
    Learning,
    Tuned,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantModel {
    pub time_constant_secs: f64,
    pub dead_time_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuningRegime {
    Fast,
    Moderate,
    Slow,
}

impl PlantModel {
    pub fn ratio(&self) -> f64 {
        self.dead_time_secs / self.time_constant_secs
    }

    pub fn regime(&self) -> TuningRegime {
        let ratio = self.ratio();
        if ratio < 0.1 {
            TuningRegime::Fast
        } else if ratio < 0.5 {
            TuningRegime::Moderate
        } else {
            TuningRegime::Slow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningOutcome {
    Continue,
    Tuned { gains: Gains, model: PlantModel },
    TimedOut,
}

/// Estimates dead time and time constant from the step response recorded in
/// `history`, measured from its first sample.
///
/// Returns `None` when there are too few samples or the response never moved
/// far enough from the starting temperature.
pub fn estimate_plant(history: &TemperatureHistory) -> Option<PlantModel> {
    if history.len() < MIN_LEARNING_SAMPLES {
        return None;
    }
    let first = *history.get(0)?;

    let peak = history
        .iter()
        .map(|sample| sample.temperature - first.temperature)
        .max_by(|a, b| a.abs().total_cmp(&b.abs()))?;
    if peak.abs() < MIN_EXCITATION {
        return None;
    }

    let elapsed_at = |fraction: f64| -> Option<f64> {
        let threshold = peak.abs() * fraction;
        history
            .iter()
            .find(|sample| (sample.temperature - first.temperature) * peak.signum() >= threshold)
            .map(|sample| seconds_between(first, *sample))
    };

    let time_constant_secs = elapsed_at(TIME_CONSTANT_FRACTION)?;
    let dead_time_secs = elapsed_at(DEAD_TIME_FRACTION)?;
    if time_constant_secs <= 0.0 || dead_time_secs <= 0.0 {
        return None;
    }

    Some(PlantModel {
        time_constant_secs,
        dead_time_secs,
    })
}

pub fn cohen_coon(model: &PlantModel) -> Gains {
    let ratio = model.ratio();
    let dead_time = model.dead_time_secs;

    let (kp, ki, kd) = match model.regime() {
        TuningRegime::Fast => {
            let kp = 1.35 / ratio;
            (kp, kp / (2.5 * dead_time), kp * 0.37 * dead_time)
        }
        TuningRegime::Moderate => {
            let kp = (1.35 + 0.25 * ratio) / ratio;
            (
                kp,
                kp / ((2.5 - 2.0 * ratio) * dead_time),
                kp * (0.37 - 0.3 * ratio) * dead_time,
            )
        }
        TuningRegime::Slow => {
            let kp = 0.9 / ratio;
            (kp, kp / (3.3 * dead_time), kp * 0.2 * dead_time)
        }
    };

    Gains { kp, ki, kd }.clamped()
}

fn seconds_between(from: TemperatureSample, to: TemperatureSample) -> f64 {
    (to.at - from.at).num_milliseconds() as f64 / 1_000.0
}

#[derive(Debug, Clone)]
pub struct LearningState {
    pub(crate) phase: LearningPhase,
    pub(crate) history: TemperatureHistory,
    pub(crate) performance: PerformanceHistory,
    pub(crate) started_at: Option<DateTime<Utc>>,
}

impl Default for LearningState {
    fn default() -> Self {
        Self {
            phase: LearningPhase::Learning,
            history: TemperatureHistory::new(Duration::seconds(HISTORY_WINDOW_SECS)),
            performance: PerformanceHistory::new(PERFORMANCE_CAPACITY),
            started_at: None,
        }
    }
}

impl LearningState {
    pub fn phase(&self) -> LearningPhase {
        self.phase
    }

    pub fn is_learning(&self) -> bool {
        self.phase == LearningPhase::Learning
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn history(&self) -> &TemperatureHistory {
        &self.history
    }

    pub fn performance(&self) -> &PerformanceHistory {
        &self.performance
    }

    /// Records a reading during the learning phase and tries to finish it.
    pub fn observe(&mut self, temperature: f64, now: DateTime<Utc>, gains: &mut Gains) -> LearningOutcome {
        if !self.is_learning() {
            return LearningOutcome::Continue;
        }
        let started_at = *self.started_at.get_or_insert(now);

        self.history.push(TemperatureSample {
            temperature,
            at: now,
        });

        if let Some(model) = estimate_plant(&self.history) {
            *gains = cohen_coon(&model);
            self.phase = LearningPhase::Tuned;
            info!(
                time_constant_secs = model.time_constant_secs,
                dead_time_secs = model.dead_time_secs,
                regime = ?model.regime(),
                kp = gains.kp,
                ki = gains.ki,
                kd = gains.kd,
                "learning complete"
            );
            return LearningOutcome::Tuned {
                gains: *gains,
                model,
            };
        }

        if now - started_at >= Duration::seconds(LEARNING_TIMEOUT_SECS) {
            self.phase = LearningPhase::Tuned;
            info!(
                samples = self.history.len(),
                "learning timed out without enough excitation, keeping current gains"
            );
            return LearningOutcome::TimedOut;
        }

        LearningOutcome::Continue
    }

    /// Slow gain drift from steady-state performance. Returns true when the
    /// gains actually changed.
    pub fn adapt(&mut self, abs_error: f64, hysteresis: f64, gains: &mut Gains) -> bool {
        if self.is_learning() {
            return false;
        }
        self.performance.push(abs_error);

        // Once the buffer is full its length stays at capacity, so every
        // further sample re-evaluates the last window.
        if self.performance.len() % ADAPTATION_WINDOW != 0 {
            return false;
        }
        let Some((mean, std_dev)) = self.performance.recent_stats(ADAPTATION_WINDOW) else {
            return false;
        };

        let before = *gains;
        let mut next = before;
        if std_dev > mean * 0.5 {
            next.kp *= 0.95;
            next.kd *= 0.95;
        } else if mean > hysteresis * 2.0 {
            next.kp *= 1.02;
        }
        *gains = next.clamped();

        let changed = *gains != before;
        if changed {
            debug!(mean, std_dev, kp = gains.kp, kd = gains.kd, "adapted gains");
        }
        changed
    }

    pub fn restart(&mut self, now: DateTime<Utc>) {
        self.phase = LearningPhase::Learning;
        self.history.clear();
        self.performance.clear();
        self.started_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::pid::{KD_MAX, KP_MAX};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 6, 0, 0).unwrap()
    }

    /// First-order response with dead time, sampled once a minute.
    fn step_response(dead_time_secs: f64, tau_secs: f64, amplitude: f64, minutes: i64) -> Vec<TemperatureSample> {
        (0..minutes)
            .map(|minute| {
                let t = (minute * 60) as f64;
                let rise = if t <= dead_time_secs {
                    0.0
                } else {
                    amplitude * (1.0 - (-(t - dead_time_secs) / tau_secs).exp())
                };
                TemperatureSample {
                    temperature: 18.0 + rise,
                    at: start() + Duration::minutes(minute),
                }
            })
            .collect()
    }

    fn window(samples: Vec<TemperatureSample>) -> TemperatureHistory {
        TemperatureHistory::from_samples(Duration::seconds(HISTORY_WINDOW_SECS), samples)
    }

    #[test]
    fn estimates_dead_time_and_time_constant() {
        let history = window(step_response(300.0, 1_200.0, 3.0, 30));

        let model = estimate_plant(&history).unwrap();

        // 10% of the 2.1° peak is first reached at 7 min, 63.2% at 17 min.
        assert_eq!(model.dead_time_secs, 420.0);
        assert_eq!(model.time_constant_secs, 1_020.0);
        assert_eq!(model.regime(), TuningRegime::Moderate);
    }

    #[test]
    fn small_response_is_inconclusive() {
        let history = window(step_response(300.0, 1_200.0, 0.4, 30));
        assert_eq!(estimate_plant(&history), None);
    }

    #[test]
    fn too_few_samples_is_inconclusive() {
        let history = window(step_response(60.0, 300.0, 3.0, 29));
        assert_eq!(estimate_plant(&history), None);
    }

    #[test]
    fn falling_response_is_measured_by_magnitude() {
        let falling: Vec<_> = step_response(300.0, 1_200.0, 3.0, 30)
            .into_iter()
            .map(|sample| TemperatureSample {
                temperature: 36.0 - sample.temperature,
                ..sample
            })
            .collect();

        let model = estimate_plant(&window(falling)).unwrap();
        assert_eq!(model.dead_time_secs, 420.0);
    }

    #[test]
    fn cohen_coon_regimes_and_clamping() {
        let fast = cohen_coon(&PlantModel {
            time_constant_secs: 2_000.0,
            dead_time_secs: 60.0,
        });
        assert_eq!(fast.kp, KP_MAX);
        assert_eq!(fast.kd, KD_MAX);

        let slow_model = PlantModel {
            time_constant_secs: 100.0,
            dead_time_secs: 90.0,
        };
        assert_eq!(slow_model.regime(), TuningRegime::Slow);
        let slow = cohen_coon(&slow_model);
        assert!((slow.kp - 1.0).abs() < 1e-12);
        assert!((slow.ki - 1.0 / (3.3 * 90.0)).abs() < 1e-12);
        assert_eq!(slow.kd, KD_MAX);

        let moderate = cohen_coon(&PlantModel {
            time_constant_secs: 25.0,
            dead_time_secs: 10.0,
        });
        assert!((moderate.kp - 3.625).abs() < 1e-9);
        assert!((moderate.ki - 3.625 / 17.0).abs() < 1e-9);
        assert_eq!(moderate.kd, KD_MAX);
    }

    #[test]
    fn observe_tunes_once_response_is_clear() {
        let mut state = LearningState::default();
        let mut gains = Gains::default();

        let samples = step_response(300.0, 1_200.0, 3.0, 30);
        let (last, warmup) = samples.split_last().unwrap();
        for sample in warmup {
            assert_eq!(
                state.observe(sample.temperature, sample.at, &mut gains),
                LearningOutcome::Continue
            );
        }

        let outcome = state.observe(last.temperature, last.at, &mut gains);
        assert!(matches!(outcome, LearningOutcome::Tuned { .. }));
        assert_eq!(state.phase(), LearningPhase::Tuned);
        assert_ne!(gains, Gains::default());
        assert_eq!(state.started_at(), Some(start()));
    }

    #[test]
    fn observe_times_out_after_an_hour() {
        let mut state = LearningState::default();
        let mut gains = Gains::default();

        for minute in 0..60 {
            let outcome = state.observe(20.0, start() + Duration::minutes(minute), &mut gains);
            assert_eq!(outcome, LearningOutcome::Continue);
        }

        let outcome = state.observe(20.0, start() + Duration::minutes(60), &mut gains);
        assert_eq!(outcome, LearningOutcome::TimedOut);
        assert_eq!(gains, Gains::default());
        assert!(!state.is_learning());
    }

    fn tuned_state() -> LearningState {
        LearningState {
            phase: LearningPhase::Tuned,
            ..LearningState::default()
        }
    }

    #[test]
    fn oscillation_softens_kp_and_kd() {
        let mut state = tuned_state();
        let mut gains = Gains::default();

        let mut changed = false;
        for n in 0..ADAPTATION_WINDOW {
            let error = if n % 2 == 0 { 0.0 } else { 2.0 };
            changed = state.adapt(error, 0.2, &mut gains);
        }

        assert!(changed);
        assert!((gains.kp - 0.95).abs() < 1e-12);
        assert!((gains.kd - 0.05 * 0.95).abs() < 1e-12);
    }

    #[test]
    fn sluggish_loop_raises_kp() {
        let mut state = tuned_state();
        let mut gains = Gains::default();

        for n in 0..ADAPTATION_WINDOW {
            let changed = state.adapt(1.0, 0.2, &mut gains);
            assert_eq!(changed, n + 1 == ADAPTATION_WINDOW);
        }

        assert!((gains.kp - 1.02).abs() < 1e-12);
        assert_eq!(gains.kd, 0.05);
    }

    #[test]
    fn settled_loop_keeps_gains() {
        let mut state = tuned_state();
        let mut gains = Gains::default();

        for _ in 0..ADAPTATION_WINDOW {
            assert!(!state.adapt(0.1, 0.2, &mut gains));
        }
        assert_eq!(gains, Gains::default());
    }

    #[test]
    fn full_buffer_adapts_on_every_sample() {
        let mut state = tuned_state();
        let mut gains = Gains::default();

        for _ in 0..PERFORMANCE_CAPACITY {
            state.adapt(1.0, 0.2, &mut gains);
        }
        assert_eq!(state.performance().len(), PERFORMANCE_CAPACITY);

        for _ in 0..3 {
            let kp = gains.kp;
            assert!(state.adapt(1.0, 0.2, &mut gains));
            assert!((gains.kp - kp * 1.02).abs() < 1e-12);
        }
        assert_eq!(state.performance().len(), PERFORMANCE_CAPACITY);
    }

    #[test]
    fn adaptation_is_skipped_while_learning() {
        let mut state = LearningState::default();
        let mut gains = Gains::default();

        assert!(!state.adapt(5.0, 0.2, &mut gains));
        assert!(state.performance().is_empty());
    }
}
