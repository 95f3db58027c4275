use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{
    config::{is_supported_precision, ControllerConfig},
    error::InputError,
    history::{PerformanceHistory, TemperatureHistory, TrendWindow},
    latch::{is_stable, ActivationLatch, LatchInput},
    learning::{
        LearningOutcome, LearningPhase, LearningState, HISTORY_WINDOW_SECS, PERFORMANCE_CAPACITY,
    },
    pid::{compute_pid, is_mode_mismatch, relax_integral, Gains, PidTerms},
    schedule::Schedule,
    shaper::{raw_setpoint, round_within_bounds, shape_setpoint, ShapeRequest},
    snapshot::ControllerSnapshot,
    target::{
        resolve_effective_target, AwayCommand, AwayState, BoostCommand, BoostState,
        OverrideState, TargetResolution,
    },
    types::{
        ActiveMode, ControllerStatus, DebugRecord, OperatingMode, ThermalMode, UpdateResult,
    },
};

#[derive(Debug, Clone)]
struct ControlState {
    gains: Gains,
    integral: f64,
    last_error: Option<f64>,
    last_temp: Option<f64>,
    last_setpoint: Option<f64>,
    last_update: Option<DateTime<Utc>>,
    active_mode: ActiveMode,
}

/// Adaptive setpoint controller for one plant.
///
/// Every call runs to completion on `&mut self`; callers sharing an engine
/// across tasks must serialize access themselves.
#[derive(Debug, Clone)]
pub struct ThermostatEngine {
    config: ControllerConfig,
    control: ControlState,
    learning: LearningState,
    schedule: Option<Schedule>,
    overrides: OverrideState,
    latch: ActivationLatch,
    trend: TrendWindow,
    parameters_changed: bool,
}

impl ThermostatEngine {
    pub fn new(mut config: ControllerConfig) -> Self {
        config.sanitize();
        let control = ControlState {
            gains: config.initial_gains,
            integral: 0.0,
            last_error: None,
            last_temp: None,
            last_setpoint: None,
            last_update: None,
            active_mode: config.thermal_mode.default_active(),
        };
        Self {
            config,
            control,
            learning: LearningState::default(),
            schedule: None,
            overrides: OverrideState::default(),
            latch: ActivationLatch::default(),
            trend: TrendWindow::default(),
            parameters_changed: false,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn gains(&self) -> Gains {
        self.control.gains
    }

    pub fn integral(&self) -> f64 {
        self.control.integral
    }

    pub fn active_mode(&self) -> ActiveMode {
        self.control.active_mode
    }

    pub fn learning(&self) -> &LearningState {
        &self.learning
    }

    pub fn learning_phase(&self) -> LearningPhase {
        self.learning.phase()
    }

    pub fn latch(&self) -> ActivationLatch {
        self.latch
    }

    pub fn overrides(&self) -> &OverrideState {
        &self.overrides
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn last_setpoint(&self) -> Option<f64> {
        self.control.last_setpoint
    }

    /// One control cycle for a fresh reading.
    ///
    /// A non-finite reading is refused and leaves every piece of state as it
    /// was; the caller keeps driving the actuator with the previous setpoint.
    pub fn update(&mut self, current_temp: f64, now: DateTime<Utc>) -> Result<UpdateResult, InputError> {
        if !current_temp.is_finite() {
            debug!("ignoring non-finite temperature reading");
            return Err(InputError::NotFinite {
                field: "temperature",
            });
        }

        if self.overrides.expire_boost(now) {
            info!("boost expired");
        }

        let resolution = self.resolve(now);
        let target = resolution.target;
        let error = target - current_temp;

        self.trend.push(current_temp);
        let trend = self.trend.trend();
        let dt_secs = self.elapsed_secs(now);

        let (setpoint, pid) = if self.config.operating_mode == OperatingMode::Off {
            self.control.integral = 0.0;
            let idle = round_within_bounds(&self.config, target);
            (idle, None)
        } else {
            self.regulate(current_temp, target, error, dt_secs, now)
        };

        let actuator_active = self.latch.evaluate(
            self.config.thermal_mode,
            self.config.operating_mode,
            &LatchInput {
                error,
                setpoint,
                target,
                precision: self.config.precision,
                hysteresis: self.config.hysteresis,
                trend,
            },
        );

        self.control.last_error = Some(error);
        self.control.last_temp = Some(current_temp);
        self.control.last_setpoint = Some(setpoint);
        self.control.last_update = Some(now);

        debug!(
            current_temp,
            target,
            setpoint,
            error,
            actuator_active,
            "control cycle"
        );

        Ok(UpdateResult {
            setpoint,
            actuator_active,
            debug: DebugRecord {
                current_temp,
                target_temp: target,
                base_target_temp: self.config.target_temp,
                setpoint,
                error,
                trend,
                thermal_mode: self.config.thermal_mode,
                active_mode: self.control.active_mode,
                precision: self.config.precision,
                learning_phase: self.learning.phase(),
                gains: self.control.gains,
                pid,
                operating_mode: self.config.operating_mode,
                target_source: resolution.source,
                schedule_active: resolution.schedule.is_some(),
                schedule_slot: resolution.schedule.and_then(|matched| matched.slot_info()),
                boost_active: self.overrides.active_boost(now).is_some(),
                boost_remaining_min: self.overrides.boost_remaining_min(now),
                away_active: self.overrides.away.is_some(),
                away_temp: self.overrides.away.map(|away| away.temperature),
                heating_active: self.latch.heating,
                cooling_active: self.latch.cooling,
            },
        })
    }

    /// Effective target for `now` without consuming a reading.
    pub fn resolve_current_target(&self, now: DateTime<Utc>) -> f64 {
        self.resolve(now).target
    }

    pub fn set_manual_target(&mut self, temp: f64) -> Result<bool, InputError> {
        let temp = self.checked_temp("target temperature", temp)?;
        Ok(replace_if_changed(&mut self.config.target_temp, temp))
    }

    pub fn set_operating_mode(&mut self, mode: OperatingMode) -> bool {
        if self.config.operating_mode == mode {
            return false;
        }
        self.config.operating_mode = mode;
        self.control.integral = 0.0;
        if mode == OperatingMode::Off {
            self.latch.release();
        }
        true
    }

    pub fn set_thermal_mode(&mut self, mode: ThermalMode) -> bool {
        if self.config.thermal_mode == mode {
            return false;
        }
        self.config.thermal_mode = mode;
        self.control.integral = 0.0;
        self.control.active_mode = mode.default_active();
        self.latch.release();
        true
    }

    pub fn set_schedule(&mut self, schedule: Option<Schedule>) -> Result<bool, InputError> {
        let schedule = match schedule {
            Some(mut schedule) => {
                schedule.validate()?;
                schedule.normalize();
                Some(schedule)
            }
            None => None,
        };

        if self.schedule == schedule {
            return Ok(false);
        }
        self.schedule = schedule;
        Ok(true)
    }

    pub fn set_boost(&mut self, command: BoostCommand, now: DateTime<Utc>) -> Result<bool, InputError> {
        match command {
            BoostCommand::Cancel => Ok(self.overrides.boost.take().is_some()),
            BoostCommand::Start {
                temperature,
                duration_minutes,
            } => {
                if !temperature.is_finite() {
                    return Err(InputError::NotFinite {
                        field: "boost temperature",
                    });
                }
                if !duration_minutes.is_finite() || duration_minutes <= 0.0 {
                    return Err(InputError::InvalidDuration);
                }
                let expires_at = Duration::try_milliseconds((duration_minutes * 60_000.0).round() as i64)
                    .and_then(|duration| now.checked_add_signed(duration))
                    .ok_or(InputError::InvalidDuration)?;

                info!(temperature, duration_minutes, "boost started");
                self.overrides.boost = Some(BoostState {
                    temperature,
                    expires_at,
                });
                Ok(true)
            }
        }
    }

    pub fn set_away(&mut self, command: AwayCommand) -> Result<bool, InputError> {
        let away = match command {
            AwayCommand::Off => None,
            AwayCommand::On => Some(AwayState {
                temperature: self.config.away_temp,
            }),
            AwayCommand::At(temp) => Some(AwayState {
                temperature: self.checked_temp("away temperature", temp)?,
            }),
        };

        if self.overrides.away == away {
            return Ok(false);
        }
        self.overrides.away = away;
        Ok(true)
    }

    pub fn set_hysteresis(&mut self, hysteresis: f64) -> Result<bool, InputError> {
        if !hysteresis.is_finite() {
            return Err(InputError::NotFinite { field: "hysteresis" });
        }
        if hysteresis < 0.0 {
            return Err(InputError::OutOfRange {
                field: "hysteresis",
                value: hysteresis,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        Ok(replace_if_changed(&mut self.config.hysteresis, hysteresis))
    }

    pub fn set_precision(&mut self, precision: f64) -> Result<bool, InputError> {
        if !is_supported_precision(precision) {
            return Err(InputError::UnsupportedPrecision(precision));
        }
        Ok(replace_if_changed(&mut self.config.precision, precision))
    }

    /// Manual tuning. Ends any learning in progress.
    pub fn set_gains(&mut self, gains: Gains) -> Result<bool, InputError> {
        if !gains.is_finite() {
            return Err(InputError::NotFinite { field: "gains" });
        }
        let gains = gains.clamped();
        let changed = self.control.gains != gains || self.learning.is_learning();
        self.control.gains = gains;
        self.learning.phase = LearningPhase::Tuned;
        self.parameters_changed |= changed;
        Ok(changed)
    }

    pub fn restart_learning(&mut self, now: DateTime<Utc>) {
        info!("restarting plant learning");
        self.learning.restart(now);
        self.parameters_changed = true;
    }

    /// One-shot: true once after gains or the learning phase changed.
    pub fn parameters_changed(&mut self) -> bool {
        std::mem::take(&mut self.parameters_changed)
    }

    pub fn status(&self, now: DateTime<Utc>) -> ControllerStatus {
        let resolution = self.resolve(now);
        ControllerStatus {
            current_temp: self.control.last_temp,
            target_temp: resolution.target,
            base_target_temp: self.config.target_temp,
            setpoint: self.control.last_setpoint,
            error: self.control.last_temp.map(|temp| resolution.target - temp),
            trend: self.trend.trend(),
            thermal_mode: self.config.thermal_mode,
            active_mode: self.control.active_mode,
            operating_mode: self.config.operating_mode,
            precision: self.config.precision,
            hysteresis: self.config.hysteresis,
            learning_phase: self.learning.phase(),
            gains: self.control.gains,
            target_source: resolution.source,
            heating_active: self.latch.heating,
            cooling_active: self.latch.cooling,
            actuator_active: self.latch.is_active(),
            schedule_active: resolution.schedule.is_some(),
            schedule_slot: resolution.schedule.and_then(|matched| matched.slot_info()),
            next_schedule_event_epoch: self
                .schedule
                .as_ref()
                .and_then(|schedule| schedule.next_event_epoch(now)),
            timezone: self
                .schedule
                .as_ref()
                .map(|schedule| schedule.timezone.name())
                .unwrap_or("local")
                .to_string(),
            boost_active: self.overrides.active_boost(now).is_some(),
            boost_remaining_min: self.overrides.boost_remaining_min(now),
            away_active: self.overrides.away.is_some(),
            away_temp: self.overrides.away.map(|away| away.temperature),
            last_update_epoch: self.control.last_update.map(|at| at.timestamp()),
        }
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            gains: Some(self.control.gains),
            integral: Some(self.control.integral),
            last_error: self.control.last_error,
            last_temp: self.control.last_temp,
            last_setpoint: self.control.last_setpoint,
            last_update: self.control.last_update,
            active_mode: Some(self.control.active_mode),
            latch: Some(self.latch),
            learning: Some(self.learning.is_learning()),
            tuned: Some(self.learning.phase() == LearningPhase::Tuned),
            learning_started: self.learning.started_at,
            temperature_history: Some(self.learning.history.iter().copied().collect()),
            performance_history: Some(self.learning.performance.iter().copied().collect()),
            performance_samples: Some(self.learning.performance.total()),
            trend_samples: Some(self.trend.samples()),
            schedule: self.schedule.clone(),
            overrides: Some(self.overrides),
            thermal_mode: Some(self.config.thermal_mode),
            operating_mode: Some(self.config.operating_mode),
            base_target: Some(self.config.target_temp),
            hysteresis: Some(self.config.hysteresis),
            precision: Some(self.config.precision),
        }
    }

    /// Rehydrates from a snapshot. Absent or unusable fields keep their
    /// current values; restored values are brought back inside the same
    /// bounds the engine enforces at runtime.
    pub fn restore(&mut self, snapshot: ControllerSnapshot) {
        if let Some(mode) = snapshot.thermal_mode {
            self.config.thermal_mode = mode;
            self.control.active_mode = mode.default_active();
        }
        if let Some(mode) = snapshot.operating_mode {
            self.config.operating_mode = mode;
        }
        if let Some(target) = snapshot.base_target.filter(|temp| self.config.contains(*temp)) {
            self.config.target_temp = target;
        }
        if let Some(hysteresis) = snapshot
            .hysteresis
            .filter(|value| value.is_finite() && *value >= 0.0)
        {
            self.config.hysteresis = hysteresis;
        }
        if let Some(precision) = snapshot.precision.filter(|step| is_supported_precision(*step)) {
            self.config.precision = precision;
        }

        if let Some(gains) = snapshot.gains.filter(Gains::is_finite) {
            self.control.gains = gains.clamped();
        }
        if let Some(integral) = snapshot.integral.filter(|value| value.is_finite()) {
            let limit = self.config.integral_limit(self.control.gains.ki);
            self.control.integral = integral.clamp(0.0, limit);
        }
        if let Some(error) = snapshot.last_error.filter(|value| value.is_finite()) {
            self.control.last_error = Some(error);
        }
        if let Some(temp) = snapshot.last_temp.filter(|value| value.is_finite()) {
            self.control.last_temp = Some(temp);
        }
        if let Some(setpoint) = snapshot.last_setpoint.filter(|value| value.is_finite()) {
            self.control.last_setpoint = Some(setpoint);
        }
        if let Some(at) = snapshot.last_update {
            self.control.last_update = Some(at);
        }
        if let Some(mode) = snapshot.active_mode {
            self.control.active_mode = mode;
        }
        if let Some(latch) = snapshot.latch {
            self.latch = latch;
        }

        match (snapshot.learning, snapshot.tuned) {
            (_, Some(true)) | (Some(false), None) => self.learning.phase = LearningPhase::Tuned,
            (Some(true), _) | (_, Some(false)) => self.learning.phase = LearningPhase::Learning,
            (None, None) => {}
        }
        if let Some(started) = snapshot.learning_started {
            self.learning.started_at = Some(started);
        }
        if let Some(samples) = snapshot.temperature_history {
            self.learning.history =
                TemperatureHistory::from_samples(Duration::seconds(HISTORY_WINDOW_SECS), samples);
        }
        if let Some(errors) = snapshot.performance_history {
            self.learning.performance = PerformanceHistory::from_errors(
                PERFORMANCE_CAPACITY,
                errors,
                snapshot.performance_samples.unwrap_or(0),
            );
        }
        if let Some(samples) = snapshot.trend_samples {
            self.trend = TrendWindow::from_samples(samples);
        }

        if let Some(mut schedule) = snapshot.schedule {
            if schedule.validate().is_ok() {
                schedule.normalize();
                self.schedule = Some(schedule);
            }
        }
        if let Some(overrides) = snapshot.overrides {
            self.overrides = OverrideState {
                boost: overrides.boost.filter(|boost| boost.temperature.is_finite()),
                away: overrides.away.filter(|away| away.temperature.is_finite()),
            };
        }
    }

    pub fn restore_json(&mut self, raw: &str) -> serde_json::Result<()> {
        self.restore(ControllerSnapshot::from_json(raw)?);
        Ok(())
    }

    fn resolve(&self, now: DateTime<Utc>) -> TargetResolution {
        resolve_effective_target(&self.config, self.schedule.as_ref(), &self.overrides, now)
    }

    fn regulate(
        &mut self,
        current_temp: f64,
        target: f64,
        error: f64,
        dt_secs: f64,
        now: DateTime<Utc>,
    ) -> (f64, Option<PidTerms>) {
        let mode = self.select_active_mode(error);

        let (raw, pid, enforce_min_step) = if is_mode_mismatch(mode, error) {
            // Room is already past the target: let it coast.
            relax_integral(&mut self.control.integral, error);
            (target, None, false)
        } else {
            let limit = self.config.integral_limit(self.control.gains.ki);
            let terms = compute_pid(
                error,
                self.control.last_error,
                dt_secs,
                mode,
                &self.control.gains,
                &mut self.control.integral,
                limit,
            );
            (
                raw_setpoint(target, terms.adjustment, mode),
                Some(terms),
                !is_stable(error, self.config.hysteresis),
            )
        };

        self.learn(current_temp, error, now);

        let setpoint = shape_setpoint(
            &self.config,
            ShapeRequest {
                target,
                raw,
                mode,
                enforce_min_step,
                previous: self.control.last_setpoint,
            },
        );
        (setpoint, pid)
    }

    fn select_active_mode(&mut self, error: f64) -> ActiveMode {
        let next = match self.config.thermal_mode {
            ThermalMode::Heat => ActiveMode::Heat,
            ThermalMode::Cool => ActiveMode::Cool,
            ThermalMode::HeatCool if error > 0.0 => ActiveMode::Heat,
            ThermalMode::HeatCool if error < 0.0 => ActiveMode::Cool,
            ThermalMode::HeatCool => self.control.active_mode,
        };

        if next != self.control.active_mode {
            debug!(
                from = self.control.active_mode.as_str(),
                to = next.as_str(),
                "active direction changed"
            );
            self.control.integral = 0.0;
            self.control.active_mode = next;
        }
        next
    }

    fn learn(&mut self, current_temp: f64, error: f64, now: DateTime<Utc>) {
        if self.learning.is_learning() {
            match self.learning.observe(current_temp, now, &mut self.control.gains) {
                LearningOutcome::Continue => {}
                LearningOutcome::Tuned { .. } | LearningOutcome::TimedOut => {
                    self.parameters_changed = true;
                }
            }
        } else if self
            .learning
            .adapt(error.abs(), self.config.hysteresis, &mut self.control.gains)
        {
            self.parameters_changed = true;
        }
    }

    fn elapsed_secs(&self, now: DateTime<Utc>) -> f64 {
        self.control
            .last_update
            .map(|last| (now - last).num_milliseconds() as f64 / 1_000.0)
            .filter(|dt| *dt > 0.0)
            .unwrap_or_else(|| self.config.sample_interval_secs_f64())
    }

    fn checked_temp(&self, field: &'static str, temp: f64) -> Result<f64, InputError> {
        if !temp.is_finite() {
            debug!(field, "rejected non-finite temperature");
            return Err(InputError::NotFinite { field });
        }
        if !self.config.contains(temp) {
            debug!(field, temp, "rejected temperature outside bounds");
            return Err(InputError::OutOfRange {
                field,
                value: temp,
                min: self.config.min_temp,
                max: self.config.max_temp,
            });
        }
        Ok(temp)
    }
}

fn replace_if_changed(slot: &mut f64, value: f64) -> bool {
    if (*slot - value).abs() > f64::EPSILON {
        *slot = value;
        true
    } else {
        false
    }
}
