// Zenoh bridge around the base: commands in, odometry and health out
//
// The control loop runs on its own thread, paced by deadline anchoring. The
// async side drains commands as they arrive and publishes odometry and health
// at the odometry rate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{info, warn};

use crate::base::Base;
use crate::config::{BaseConfig, TOPIC_CMD_WHEELS, TOPIC_HEALTH, TOPIC_ODOM};
use crate::control::ControlLoop;
use crate::messages::WheelCommand;
use crate::motor::{SerialBoard, SimBoard, WheelBoard};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where the wheels are and how they are configured
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config: BaseConfig,
    pub port: String,
    pub sim: bool,
}

fn open_board(options: &RuntimeOptions) -> Result<Box<dyn WheelBoard>, BoxError> {
    if options.sim {
        info!("Using simulated wheel board");
        return Ok(Box::new(SimBoard::new(&options.config)));
    }
    let mut board = SerialBoard::open(&options.port)?;
    board.initialize()?;
    Ok(Box::new(board))
}

/// Run the control loop every `period` until `running` is cleared, then stop the motors
pub fn spawn_control_thread(
    mut control: ControlLoop,
    period: Duration,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("hase-control".to_string())
        .spawn(move || {
            let mut next_tick = Instant::now() + period;
            while running.load(Ordering::Acquire) {
                control.cycle(Instant::now());

                let now = Instant::now();
                if next_tick > now {
                    spin_sleep::sleep(next_tick - now);
                } else {
                    warn!(
                        "Control loop overrun by {:?} (period {:?}), re-anchoring",
                        now - next_tick,
                        period
                    );
                    next_tick = now;
                }
                next_tick += period;
            }

            if let Err(e) = control.stop() {
                warn!("Failed to stop motors: {}", e);
            }
        })
}

async fn publish<T: serde::Serialize>(
    publisher: &zenoh::pubsub::Publisher<'_>,
    message: &T,
) -> Result<(), BoxError> {
    let json = serde_json::to_string(message)?;
    publisher.put(json).await?;
    Ok(())
}

pub async fn run(options: RuntimeOptions) -> Result<(), BoxError> {
    // board construction already derives values from the calibration
    options.config.validate()?;
    let board = open_board(&options)?;
    let Base {
        handle,
        control,
        mut odometry,
    } = Base::new(&options.config, board)?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_WHEELS).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let running = Arc::new(AtomicBool::new(true));
    let control_thread = spawn_control_thread(
        control,
        options.config.control_period(),
        Arc::clone(&running),
    )?;

    let mut tick = interval(options.config.odom_period());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz control, {}Hz odometry, {}ms watchdog timeout",
        options.config.pid_rate_hz, options.config.odom_rate_hz, options.config.auto_stop_ms
    );
    info!("Subscribed to: {}", TOPIC_CMD_WHEELS);
    info!("Publishing to: {}, {}", TOPIC_ODOM, TOPIC_HEALTH);

    let result: Result<(), BoxError> = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break Ok(());
            }
            sample = subscriber.recv_async() => {
                let sample = match sample {
                    Ok(sample) => sample,
                    Err(e) => break Err(format!("command subscriber closed: {}", e).into()),
                };
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<WheelCommand>(&payload) {
                    Ok(cmd) => cmd.apply(&handle),
                    Err(e) => warn!("Failed to parse command: {}", e),
                }
            }
            _ = tick.tick() => {
                let odom = odometry.cycle(Instant::now());
                if let Err(e) = publish(&pub_odom, &odom).await {
                    break Err(e);
                }
                if let Err(e) = publish(&pub_health, &handle.health()).await {
                    break Err(e);
                }
            }
        }
    };

    running.store(false, Ordering::Release);
    if tokio::task::spawn_blocking(move || control_thread.join())
        .await?
        .is_err()
    {
        warn!("Control thread panicked");
    }
    info!("Runtime stopped");

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Calibration, ConfigError};

    #[tokio::test]
    async fn test_run_rejects_invalid_calibration_before_opening_board() {
        let options = RuntimeOptions {
            config: BaseConfig {
                calibration: Calibration {
                    encoder_cpr: u32::MAX,
                    gear_ratio: 2,
                    ..Calibration::default()
                },
                ..BaseConfig::default()
            },
            port: "/dev/null".to_string(),
            sim: true,
        };
        let err = run(options).await.unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
