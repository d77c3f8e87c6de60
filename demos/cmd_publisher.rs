// Keyboard teleop: W/S drive, A/D turn, R/F speed, SPACE stop, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use hase_zenoh_runtime::config::TOPIC_CMD_WHEELS;
use hase_zenoh_runtime::messages::WheelCommand;

const SPEEDS: [f64; 3] = [0.1, 0.25, 0.5]; // m/s
const TURN_RATES: [f64; 3] = [0.5, 1.0, 2.0]; // rad/s
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input
const PUBLISH_PERIOD: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_WHEELS).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, SPACE=stop, Q=quit");
    print_speed(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    let mut linear = 0.0;
    let mut angular = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        if event::poll(PUBLISH_PERIOD)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        linear = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        linear = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        angular = TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        angular = -TURN_RATES[speed_idx];
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char(' ') if pressed => {
                        linear = 0.0;
                        angular = 0.0;
                    }

                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            linear = 0.0;
            angular = 0.0;
        }

        // Publish continuously so the runtime watchdog stays fed
        let cmd = WheelCommand::Twist { linear, angular };
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    // Leave the base stopped
    let stop = WheelCommand::Speeds {
        left: 0.0,
        right: 0.0,
    };
    publisher.put(serde_json::to_string(&stop)?).await?;

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {} ({} m/s, {} rad/s)", label, SPEEDS[idx], TURN_RATES[idx]);
}
