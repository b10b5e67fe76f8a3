use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use muse_session::error::{LinkError, SessionError};
use muse_session::link::RadioLink;
use muse_session::protocol::encode_command;
use muse_session::session::{DeviceSession, SessionConfig};
use muse_session::types::{Axis, Channel, EegElectrode, LinkEvent, PpgChannel, SessionState};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Connect,
    Subscribe(Channel),
    Send(Vec<u8>),
    Disconnect,
}

/// In-memory link that records every call and can fail the n-th one.
#[derive(Clone, Default)]
struct ScriptedLink {
    calls: Arc<Mutex<Vec<Call>>>,
    fail_at: Option<usize>,
    fail_disconnect: bool,
}

impl ScriptedLink {
    fn failing_at(n: usize) -> Self {
        Self {
            fail_at: Some(n),
            ..Self::default()
        }
    }

    fn record(&self, call: Call) -> Result<(), LinkError> {
        let mut calls = self.calls.lock().unwrap();
        let fail = self.fail_at == Some(calls.len());
        calls.push(call);
        if fail {
            Err(LinkError::NotConnected)
        } else {
            Ok(())
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl RadioLink for ScriptedLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.record(Call::Connect)
    }

    async fn subscribe(&mut self, channel: Channel) -> Result<(), LinkError> {
        self.record(Call::Subscribe(channel))
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        self.record(Call::Send(frame.to_vec()))
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.calls.lock().unwrap().push(Call::Disconnect);
        if self.fail_disconnect {
            Err(LinkError::NotConnected)
        } else {
            Ok(())
        }
    }
}

fn frames(cmds: &[&str]) -> Vec<Vec<u8>> {
    cmds.iter().map(|c| encode_command(c).unwrap()).collect()
}

/// 1 connect + 12 subscriptions + 5 commands.
const STARTUP_CALLS: usize = 18;

async fn streaming_session() -> (DeviceSession<ScriptedLink>, ScriptedLink) {
    let link = ScriptedLink::default();
    let mut session = DeviceSession::new(link.clone(), SessionConfig::default());
    session.connect().await.unwrap();
    (session, link)
}

fn control_frame(text: &str) -> Vec<u8> {
    let mut frame = vec![text.len() as u8];
    frame.extend_from_slice(text.as_bytes());
    frame.resize(20, 0);
    frame
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn connect_subscribes_then_runs_startup_commands_in_order() {
    let (session, link) = streaming_session().await;
    assert_eq!(session.state(), SessionState::Streaming);

    let calls = link.calls();
    assert_eq!(calls.len(), STARTUP_CALLS);
    assert_eq!(calls[0], Call::Connect);
    let subscribed: Vec<Channel> = calls[1..13]
        .iter()
        .map(|c| match c {
            Call::Subscribe(ch) => *ch,
            other => panic!("expected subscribe, got {other:?}"),
        })
        .collect();
    assert_eq!(subscribed, Channel::SUBSCRIPTIONS);
    assert_eq!(link.sent(), frames(&["h", "p50", "s", "d", "v1"]));
}

#[tokio::test]
async fn preset_comes_from_config() {
    let link = ScriptedLink::default();
    let config = SessionConfig {
        preset: "p21".into(),
        ..SessionConfig::default()
    };
    let mut session = DeviceSession::new(link.clone(), config);
    session.connect().await.unwrap();
    assert_eq!(link.sent()[1], encode_command("p21").unwrap());
}

#[tokio::test]
async fn failure_at_any_step_returns_to_idle() {
    for step in 0..STARTUP_CALLS {
        let link = ScriptedLink::failing_at(step);
        let mut session = DeviceSession::new(link.clone(), SessionConfig::default());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::TransportFailure(_)), "step {step}: {err}");
        assert_eq!(session.state(), SessionState::Idle, "step {step}");

        // Nothing after the failing call, apart from the teardown request.
        let calls = link.calls();
        assert_eq!(calls.len(), step + 2, "step {step}");
        assert_eq!(calls.last(), Some(&Call::Disconnect));
    }
}

#[tokio::test]
async fn failed_reconnect_keeps_earlier_info_and_samples() {
    // Fails the Connect of the second attempt: 18 startup calls + 1 disconnect.
    let link = ScriptedLink::failing_at(STARTUP_CALLS + 1);
    let mut session = DeviceSession::new(link.clone(), SessionConfig::default());
    session.connect().await.unwrap();

    session
        .on_notification(Channel::Control, &control_frame(r#"{"fw":"1.2"}{"hw":"#))
        .unwrap();
    let mut frame = vec![0x00, 0x01];
    frame.extend([0x80, 0x08, 0x00].repeat(6));
    session
        .on_notification(Channel::Eeg(EegElectrode::Tp9), &frame)
        .unwrap();
    session
        .on_notification(Channel::Battery, &[0x00, 0x00, 0xC8, 0x00])
        .unwrap();
    session.disconnect().await;

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::TransportFailure(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(link.calls()[STARTUP_CALLS + 1], Call::Connect);
    assert_eq!(link.calls().last(), Some(&Call::Disconnect));

    assert_eq!(session.info()["fw"], "1.2");
    assert_eq!(session.buffers().eeg(EegElectrode::Tp9).len(), 12);
    assert_eq!(session.battery_level(), Some(100.0));

    // The scripted failure is spent; the half-received object does not leak
    // into the next connection.
    session.connect().await.unwrap();
    session
        .on_notification(Channel::Control, &control_frame(r#"{"ok":1}"#))
        .unwrap();
    assert_eq!(session.info()["ok"], 1);
    assert!(!session.info().contains_key("hw"));
}

#[tokio::test]
async fn connect_twice_is_rejected_without_transport_calls() {
    let (mut session, link) = streaming_session().await;
    let err = session.connect().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState { op: "connect", state: SessionState::Streaming }
    ));
    assert_eq!(link.calls().len(), STARTUP_CALLS);
}

#[tokio::test]
async fn disconnect_goes_idle_even_if_transport_errors() {
    let link = ScriptedLink {
        fail_disconnect: true,
        ..ScriptedLink::default()
    };
    let mut session = DeviceSession::new(link.clone(), SessionConfig::default());
    session.connect().await.unwrap();

    session.disconnect().await;
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(link.calls().last(), Some(&Call::Disconnect));

    // Already idle: no further transport calls.
    session.disconnect().await;
    assert_eq!(link.calls().len(), STARTUP_CALLS + 1);
}

#[tokio::test]
async fn unsolicited_disconnect_sends_nothing() {
    let (mut session, link) = streaming_session().await;
    session.handle_event(LinkEvent::Disconnected).unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(link.calls().len(), STARTUP_CALLS);
}

#[tokio::test]
async fn commands_require_a_link() {
    let link = ScriptedLink::default();
    let mut session = DeviceSession::new(link.clone(), SessionConfig::default());
    assert!(matches!(
        session.pause().await,
        Err(SessionError::InvalidState { op: "send_command", state: SessionState::Idle })
    ));
    assert!(link.calls().is_empty());
}

#[tokio::test]
async fn pause_resume_and_raw_commands() {
    let (mut session, link) = streaming_session().await;
    session.pause().await.unwrap();
    session.resume().await.unwrap();
    session.request_device_info().await.unwrap();
    session.send_command("p21").await.unwrap();
    assert_eq!(link.sent()[5..], frames(&["h", "d", "v1", "p21"]));

    let too_long = "x".repeat(300);
    assert!(matches!(
        session.send_command(&too_long).await,
        Err(SessionError::Command(_))
    ));
}

#[tokio::test]
async fn command_frame_echo_is_byte_identical() {
    let (mut session, link) = streaming_session().await;
    session.send_command("dc001").await.unwrap();
    let echoed = link.sent().last().cloned().unwrap();
    assert_eq!(echoed, encode_command("dc001").unwrap());
}

// ── Notifications ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_rejected_while_idle() {
    let mut session = DeviceSession::new(ScriptedLink::default(), SessionConfig::default());
    let err = session
        .on_notification(Channel::Battery, &[0, 0, 0x64, 0x00])
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));
    assert_eq!(session.battery_level(), None);
}

#[tokio::test]
async fn eeg_frame_fills_its_electrode_buffer_only() {
    let (mut session, _) = streaming_session().await;
    // Header, then 6 groups: [0x80 0x08 0x00] = 2048, 2048 → 0 µV; last group = 4095, 0.
    let mut frame = vec![0x00, 0x01];
    frame.extend([0x80, 0x08, 0x00].repeat(5));
    frame.extend([0xFF, 0xF0, 0x00]);

    session
        .handle_event(LinkEvent::Notification {
            channel: Channel::Eeg(EegElectrode::Af8),
            data: frame,
        })
        .unwrap();

    assert_eq!(session.buffers().eeg(EegElectrode::Af8).len(), 12);
    assert!(session.buffers().eeg(EegElectrode::Tp9).is_empty());
    assert!(session.buffers().eeg(EegElectrode::Af8).last_write_ms().is_some());

    let samples: Vec<f64> =
        std::iter::from_fn(|| session.read_eeg(EegElectrode::Af8)).collect();
    assert_eq!(samples[..10], [0.0; 10]);
    assert_eq!(samples[10], 0.48828125 * 2047.0);
    assert_eq!(samples[11], -1000.0);
}

#[tokio::test]
async fn ppg_frame_is_unscaled() {
    let (mut session, _) = streaming_session().await;
    let mut frame = vec![0x12, 0x34];
    frame.extend([0x00, 0x00, 0x01, 0x01, 0x00, 0x00]);
    session
        .on_notification(Channel::Ppg(PpgChannel::Infrared), &frame)
        .unwrap();
    assert_eq!(session.read_ppg(PpgChannel::Infrared), Some(1));
    assert_eq!(session.read_ppg(PpgChannel::Infrared), Some(0x010000));
    assert_eq!(session.read_ppg(PpgChannel::Infrared), None);
}

#[tokio::test]
async fn motion_frame_writes_three_samples_per_axis() {
    let (mut session, _) = streaming_session().await;
    let mut frame = vec![0u8; 20];
    for (i, raw) in [100i16, 200, 300, 400, 500, 600, 700, 800, 900].iter().enumerate() {
        frame[2 + 2 * i..4 + 2 * i].copy_from_slice(&raw.to_be_bytes());
    }
    session.on_notification(Channel::Gyroscope, &frame).unwrap();

    let scale = 0.0074768f32;
    let xs: Vec<f32> = std::iter::from_fn(|| session.read_gyroscope(Axis::X)).collect();
    let zs: Vec<f32> = std::iter::from_fn(|| session.read_gyroscope(Axis::Z)).collect();
    assert_eq!(xs, [100.0 * scale, 400.0 * scale, 700.0 * scale]);
    assert_eq!(zs, [300.0 * scale, 600.0 * scale, 900.0 * scale]);
    assert!(session.buffers().accelerometer(Axis::X).is_empty());
}

#[tokio::test]
async fn battery_is_stored_not_buffered() {
    let (mut session, _) = streaming_session().await;
    session
        .on_notification(Channel::Battery, &[0x00, 0x07, 0x96, 0x00, 0x12, 0x34])
        .unwrap();
    assert_eq!(session.battery_level(), Some(75.0));
}

#[tokio::test]
async fn malformed_frame_writes_nothing() {
    let (mut session, _) = streaming_session().await;
    let err = session
        .on_notification(Channel::Eeg(EegElectrode::Tp9), &[0, 1, 0xAA, 0xBB])
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Decode { channel: Channel::Eeg(EegElectrode::Tp9), .. }
    ));
    assert!(session.buffers().eeg(EegElectrode::Tp9).is_empty());

    assert!(session.on_notification(Channel::Accelerometer, &[0; 10]).is_err());
    assert!(session.on_notification(Channel::Battery, &[0]).is_err());
}

#[tokio::test]
async fn full_channel_drops_newest_samples() {
    let link = ScriptedLink::default();
    let config = SessionConfig {
        buffer_capacity: 16,
        ..SessionConfig::default()
    };
    let mut session = DeviceSession::new(link, config);
    session.connect().await.unwrap();

    // Two EEG frames: twelve samples of -1000 µV, then twelve of 0 µV.
    let low = [vec![0, 0], vec![0x00; 18]].concat();
    let mid = [vec![0, 1], [0x80, 0x08, 0x00].repeat(6)].concat();
    session.on_notification(Channel::Eeg(EegElectrode::Tp10), &low).unwrap();
    session.on_notification(Channel::Eeg(EegElectrode::Tp10), &mid).unwrap();

    let buf = session.buffers().eeg(EegElectrode::Tp10);
    assert!(buf.is_full());
    let samples: Vec<f64> =
        std::iter::from_fn(|| session.read_eeg(EegElectrode::Tp10)).collect();
    assert_eq!(samples.len(), 16);
    assert!(samples[..12].iter().all(|&s| s == -1000.0));
    assert!(samples[12..].iter().all(|&s| s == 0.0));
}

#[tokio::test]
async fn control_fragments_merge_into_info() {
    let (mut session, _) = streaming_session().await;
    for part in [r#"{"fw":"1.2.13","#, r#""hw":"03.1"}"#, r#"{"rc":0}"#] {
        session
            .on_notification(Channel::Control, &control_frame(part))
            .unwrap();
    }
    assert_eq!(session.info()["fw"], "1.2.13");
    assert_eq!(session.info()["hw"], "03.1");
    assert_eq!(session.info()["rc"], json!(0));
}

#[tokio::test]
async fn malformed_control_is_surfaced_and_stream_recovers() {
    let (mut session, _) = streaming_session().await;
    let err = session
        .on_notification(Channel::Control, &control_frame("oops}"))
        .unwrap_err();
    assert!(matches!(err, SessionError::MalformedControlFragment(_)));

    session
        .on_notification(Channel::Control, &control_frame(r#"{"ok":1}"#))
        .unwrap();
    assert_eq!(session.info()["ok"], 1);
}

#[tokio::test]
async fn info_survives_disconnect_but_partial_fragment_does_not() {
    let (mut session, _) = streaming_session().await;
    session
        .on_notification(Channel::Control, &control_frame(r#"{"a":1}{"b":"#))
        .unwrap();
    session.on_unsolicited_disconnect();
    assert_eq!(session.info().len(), 1);

    session.connect().await.unwrap();
    session
        .on_notification(Channel::Control, &control_frame(r#"{"c":2}"#))
        .unwrap();
    assert_eq!(session.info()["a"], 1);
    assert_eq!(session.info()["c"], 2);
    assert!(!session.info().contains_key("b"));
}
