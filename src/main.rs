use std::io::{self, BufRead};
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};

use muse_session::prelude::*;

/// Drain every buffer and print one summary line per sensor.
fn report<L: RadioLink>(session: &mut DeviceSession<L>) {
    for electrode in EegElectrode::ALL {
        let samples: Vec<f64> = std::iter::from_fn(|| session.read_eeg(electrode)).collect();
        if let Some(last) = samples.last() {
            println!(
                "[EEG] {:4} n={:3}  last={last:+8.3} µV",
                electrode.name(),
                samples.len()
            );
        }
    }
    for ch in PpgChannel::ALL {
        let samples: Vec<u32> = std::iter::from_fn(|| session.read_ppg(ch)).collect();
        if let Some(last) = samples.last() {
            println!("[PPG] {:8} n={:3}  last={last}", ch.name(), samples.len());
        }
    }
    let acc: Vec<f32> = Axis::ALL
        .into_iter()
        .filter_map(|a| std::iter::from_fn(|| session.read_accelerometer(a)).last())
        .collect();
    if let &[x, y, z] = acc.as_slice() {
        println!("[ACCEL] x={x:+.5}g  y={y:+.5}g  z={z:+.5}g");
    }
    let gyro: Vec<f32> = Axis::ALL
        .into_iter()
        .filter_map(|a| std::iter::from_fn(|| session.read_gyroscope(a)).last())
        .collect();
    if let &[x, y, z] = gyro.as_slice() {
        println!("[GYRO]  x={x:+.5}°/s  y={y:+.5}°/s  z={z:+.5}°/s");
    }
    if let Some(level) = session.battery_level() {
        println!("[BATTERY] {level:.1}%");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG=muse_session=debug for control fragments and command traces.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    // Optional first argument narrows the scan, e.g. `muse-session Muse-AB12`.
    let mut link_config = LinkConfig::default();
    if let Some(prefix) = std::env::args().nth(1) {
        link_config.name_prefix = prefix;
    }
    let session_config = SessionConfig::default();

    // ── Connect ───────────────────────────────────────────────────────────────
    let device = BleLink::find_first(&link_config).await?;
    let (link, mut events) = BleLink::new(device, link_config);
    let mut session = DeviceSession::new(link, session_config);

    info!("Connecting to {} …", session.link().device().name);
    session.connect().await?;
    info!("Streaming started. Type a command + Enter:");
    info!("  q  – quit");
    info!("  p  – pause streaming");
    info!("  r  – resume streaming");
    info!("  i  – request device info");
    info!("  <any other string> – send as raw command\n");

    // Stdin is read on an OS thread; lines are handled in the select loop below
    // so every session call stays on one task.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line.trim().to_owned()).is_err() {
                break;
            }
        }
    });

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    let mut stdin_open = true;
    let mut info_keys = 0;

    // ── Main event loop ───────────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = session.handle_event(event) {
                    warn!("{e}");
                }
                if session.state() == SessionState::Idle {
                    info!("❌  Disconnected from device.");
                    break;
                }
            }
            line = line_rx.recv(), if stdin_open => {
                let Some(line) = line else {
                    stdin_open = false;
                    continue;
                };
                let result = match line.as_str() {
                    "" => Ok(()),
                    "q" => {
                        info!("Quit requested.");
                        session.disconnect().await;
                        break;
                    }
                    "p" => session.pause().await,
                    "r" => session.resume().await,
                    "i" => session.request_device_info().await,
                    cmd => {
                        info!("Sending command: '{cmd}'");
                        session.send_command(cmd).await
                    }
                };
                if let Err(e) = result {
                    error!("Command error: {e}");
                }
            }
            _ = tick.tick() => {
                report(&mut session);
                if session.info().len() != info_keys {
                    info_keys = session.info().len();
                    info!("Device info: {}", serde_json::Value::Object(session.info().clone()));
                }
            }
        }
    }

    Ok(())
}
