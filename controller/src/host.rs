use std::{io::ErrorKind, path::PathBuf};

use adaptive_thermostat_common::{
    AwayCommand, BoostCommand, ControllerConfig, ControllerSnapshot, Gains, InputError,
    OperatingMode, Schedule, ThermalMode, ThermostatEngine,
};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// One stdin line that is not a bare temperature.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
enum HostCommand {
    Target {
        temp: f64,
    },
    Mode {
        mode: String,
    },
    ThermalMode {
        mode: String,
    },
    Schedule {
        schedule: Option<Schedule>,
    },
    Boost {
        temp: Option<f64>,
        #[serde(rename = "durationMinutes", default)]
        duration_minutes: f64,
    },
    Away {
        on: Option<bool>,
        temp: Option<f64>,
    },
    Hysteresis {
        value: f64,
    },
    Precision {
        value: f64,
    },
    Gains {
        kp: f64,
        ki: f64,
        kd: f64,
    },
    Relearn,
    Status,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

struct AppStore {
    config_path: PathBuf,
    state_path: PathBuf,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let store = AppStore::new();
    let config = store.load_config().await.unwrap_or_else(|err| {
        warn!("failed to load controller config from store: {err:#}");
        ControllerConfig::default()
    });

    let mut engine = ThermostatEngine::new(config);
    match store.load_state().await {
        Ok(Some(snapshot)) => {
            engine.restore(snapshot);
            info!("restored controller state from {}", store.state_path.display());
        }
        Ok(None) => {}
        Err(err) => warn!("failed to load controller state from store: {err:#}"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = if let Ok(temperature) = line.parse::<f64>() {
            handle_reading(&mut engine, &store, temperature).await?
        } else {
            match serde_json::from_str::<HostCommand>(line) {
                Ok(command) => handle_command(&mut engine, &store, command).await?,
                Err(err) => {
                    warn!("ignoring unparseable input line: {err}");
                    error_line(format!("unparseable input: {err}"))?
                }
            }
        };

        if let Some(reply) = reply {
            stdout.write_all(reply.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
    }

    info!("stdin closed, saving state");
    store.save_state(&engine.snapshot()).await
}

async fn handle_reading(
    engine: &mut ThermostatEngine,
    store: &AppStore,
    temperature: f64,
) -> anyhow::Result<Option<String>> {
    let result = match engine.update(temperature, Utc::now()) {
        Ok(result) => result,
        Err(err) => {
            warn!("rejected temperature reading: {err}");
            return error_line(err.to_string());
        }
    };

    if engine.parameters_changed() {
        info!(
            kp = result.debug.gains.kp,
            ki = result.debug.gains.ki,
            kd = result.debug.gains.kd,
            "controller parameters changed"
        );
        persist(engine, store).await;
    }

    Ok(Some(serde_json::to_string(&result)?))
}

async fn handle_command(
    engine: &mut ThermostatEngine,
    store: &AppStore,
    command: HostCommand,
) -> anyhow::Result<Option<String>> {
    let now = Utc::now();
    debug!(?command, "host command");

    let outcome: Result<bool, InputError> = match command {
        HostCommand::Status => {
            return Ok(Some(serde_json::to_string(&engine.status(now))?));
        }
        HostCommand::Target { temp } => engine.set_manual_target(temp),
        HostCommand::Mode { mode } => mode
            .parse::<OperatingMode>()
            .map(|mode| engine.set_operating_mode(mode)),
        HostCommand::ThermalMode { mode } => mode
            .parse::<ThermalMode>()
            .map(|mode| engine.set_thermal_mode(mode)),
        HostCommand::Schedule { schedule } => engine.set_schedule(schedule),
        HostCommand::Boost {
            temp,
            duration_minutes,
        } => {
            let command = match temp {
                Some(temperature) => BoostCommand::Start {
                    temperature,
                    duration_minutes,
                },
                None => BoostCommand::Cancel,
            };
            engine.set_boost(command, now)
        }
        HostCommand::Away { on, temp } => {
            let command = match (on, temp) {
                (_, Some(temp)) => AwayCommand::At(temp),
                (Some(false), None) => AwayCommand::Off,
                _ => AwayCommand::On,
            };
            engine.set_away(command)
        }
        HostCommand::Hysteresis { value } => engine.set_hysteresis(value),
        HostCommand::Precision { value } => engine.set_precision(value),
        HostCommand::Gains { kp, ki, kd } => engine.set_gains(Gains { kp, ki, kd }),
        HostCommand::Relearn => {
            engine.restart_learning(now);
            Ok(true)
        }
    };

    match outcome {
        Ok(changed) => {
            if changed {
                // Saving below covers any pending parameter change too.
                let _persisted_now = engine.parameters_changed();
                persist(engine, store).await;
            }
            Ok(Some(serde_json::to_string(&engine.status(now))?))
        }
        Err(err) => {
            warn!("rejected command: {err}");
            error_line(err.to_string())
        }
    }
}

fn error_line(error: String) -> anyhow::Result<Option<String>> {
    Ok(Some(serde_json::to_string(&ErrorBody { error })?))
}

async fn persist(engine: &ThermostatEngine, store: &AppStore) {
    if let Err(err) = store.save_state(&engine.snapshot()).await {
        warn!("failed to persist controller state: {err:#}");
    }
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));

        Self {
            config_path: data_dir.join("config.json"),
            state_path: data_dir.join("state.json"),
        }
    }

    async fn load_config(&self) -> anyhow::Result<ControllerConfig> {
        match tokio::fs::read(&self.config_path).await {
            Ok(raw) => serde_json::from_slice::<ControllerConfig>(&raw)
                .with_context(|| format!("invalid config at {}", self.config_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ControllerConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn load_state(&self) -> anyhow::Result<Option<ControllerSnapshot>> {
        match tokio::fs::read_to_string(&self.state_path).await {
            Ok(raw) => ControllerSnapshot::from_json(&raw)
                .map(Some)
                .with_context(|| format!("invalid state at {}", self.state_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_state(&self, snapshot: &ControllerSnapshot) -> anyhow::Result<()> {
        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = snapshot.to_json()?;
        tokio::fs::write(&self.state_path, payload)
            .await
            .with_context(|| format!("failed to write {}", self.state_path.display()))?;
        Ok(())
    }
}
