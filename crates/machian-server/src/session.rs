//! Streaming N-body session over WebSocket.
//!
//! The first client text message configures the session; everything after
//! is a one-way stream of position frames. Three tasks cooperate: a
//! stepper advancing the engine on a fixed cadence, an emitter forwarding
//! frames to the client, and a read loop watching for the client close.
//! Frames flow through a `watch` channel, so a slow client only ever sees
//! the newest frame and the stepper is never throttled. The first task to
//! finish tears down the others and drops the engine.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use machian_engine::Error;
use machian_engine::params::{NBodyConfig, NBodyRequest};
use machian_nbody::{Frame, NBodyEngine};

use crate::state::AppState;

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

/// Parse and validate the opening configuration message.
fn parse_config(text: &str) -> Result<NBodyRequest, Error> {
    let config: NBodyConfig = serde_json::from_str(text)
        .map_err(|err| Error::ProtocolViolation(format!("config must be JSON: {err}")))?;
    NBodyRequest::new(config)
}

fn session_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[derive(Serialize)]
struct FramePayload<'a> {
    x: &'a [f32],
    y: &'a [f32],
}

fn serialize_frame(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(&FramePayload {
        x: &frame.x,
        y: &frame.y,
    })
}

/// Advance the engine on a fixed cadence, publishing each frame.
///
/// Missed ticks are skipped rather than bursted, so the cadence holds no
/// matter how long a step takes, and each step runs on the blocking pool
/// so a heavy session cannot starve other sessions' tasks. Ends when the
/// frame receiver is dropped.
async fn step_frames(mut engine: NBodyEngine, frames_tx: watch::Sender<Frame>, tick: Duration) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        engine = match tokio::task::spawn_blocking(move || {
            engine.step();
            engine
        })
        .await
        {
            Ok(engine) => engine,
            Err(err) => {
                warn!("stepper task failed: {err}");
                break;
            }
        };
        if frames_tx.send(engine.frame()).is_err() {
            break;
        }
    }
}

async fn run_session(mut socket: WebSocket, state: AppState) {
    info!("new N-body session");

    let text = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => break text,
            Some(Ok(Message::Close(_))) | None => {
                info!("session closed before configuration");
                return;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!("WebSocket error before configuration: {err}");
                return;
            }
        }
    };

    let req = match parse_config(&text) {
        Ok(req) => req,
        Err(err) => {
            info!("rejecting session config: {err}");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: err.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let seed = session_seed();
    let engine = NBodyEngine::new(&req, state.device.force_backend(), seed);
    info!(
        n = req.n_particles,
        beta = req.beta,
        backend = engine.backend_name(),
        seed,
        "session started"
    );

    let (frames_tx, mut frames_rx) = watch::channel(engine.frame());
    let stepper = tokio::spawn(step_frames(engine, frames_tx, state.tick));

    let (mut sender, mut receiver) = socket.split();

    // Emitter: forwards the latest frame only. A stalled client skips
    // intermediate frames instead of queueing them.
    let emit = async {
        while frames_rx.changed().await.is_ok() {
            let text = {
                let frame = frames_rx.borrow_and_update();
                serialize_frame(&frame)
            };
            match text {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        debug!("frame send failed, client gone");
                        break;
                    }
                }
                Err(err) => {
                    warn!("failed to serialize frame: {err}");
                    break;
                }
            }
        }
    };

    // Only a close (or error) matters from the client after configuration.
    let read = async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    info!("session closed by client");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    debug!("session socket error: {err}");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = emit => {},
        _ = read => {},
    }

    stepper.abort();
    info!("N-body session ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_must_be_json() {
        let err = parse_config("not json").unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn config_rejections_name_the_field() {
        let err = parse_config(r#"{"n_particles": 999}"#).unwrap_err();
        assert!(err.to_string().contains("n_particles"));
    }

    #[test]
    fn config_accepts_defaults_and_the_wire_alias() {
        let req = parse_config("{}").unwrap();
        assert_eq!(req.n_particles, 1000);
        assert_eq!(req.beta, 5.0);

        let req = parse_config(r#"{"particle_count": 2000, "beta": 1.0}"#).unwrap();
        assert_eq!(req.n_particles, 2000);
        assert_eq!(req.beta, 1.0);
    }

    #[test]
    fn frames_serialize_as_coordinate_arrays() {
        let frame = Frame {
            tick: 1,
            x: vec![1.0, 2.0],
            y: vec![3.0, 4.0],
        };
        let value: serde_json::Value =
            serde_json::from_str(&serialize_frame(&frame).unwrap()).unwrap();
        assert_eq!(value["x"].as_array().unwrap().len(), 2);
        assert_eq!(value["y"][1], 4.0);
    }

    #[tokio::test]
    async fn stalled_consumer_sees_only_the_newest_frame() {
        let (tx, mut rx) = watch::channel(Frame::default());
        for i in 1..=3 {
            tx.send(Frame {
                tick: i,
                x: vec![i as f32],
                y: vec![0.0],
            })
            .unwrap();
        }
        assert!(rx.changed().await.is_ok());
        assert_eq!(rx.borrow_and_update().x, vec![3.0]);
        // Everything older was conflated away.
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn stepper_holds_cadence_for_a_stalled_consumer() {
        let config: NBodyConfig = serde_json::from_str(r#"{"n_particles": 500}"#).unwrap();
        let req = NBodyRequest::new(config).unwrap();
        let engine = NBodyEngine::new(&req, Box::new(machian_nbody::CpuBackend), 11);
        let (tx, rx) = watch::channel(engine.frame());

        // Nobody ever reads a frame; the stepper must not care.
        let stepper = tokio::spawn(step_frames(engine, tx, Duration::from_millis(20)));
        tokio::time::sleep(Duration::from_millis(400)).await;
        stepper.abort();

        let ticks = rx.borrow().tick;
        assert!(ticks >= 12, "only {ticks} steps in 400ms at a 20ms cadence");
        assert!(ticks <= 24, "{ticks} steps means the stepper bursts");
    }
}
