//! Heartbeat monitor
//!
//! Runs beside the session actor for the lifetime of one connection and
//! writes straight to the transport, so a slow listener never delays a beat.

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::state::HeartbeatHandle;
use super::SessionSignal;
use crate::codec::FrameCodec;
use crate::protocol::GatewayFrame;
use crate::transport::TransportSender;

/// Largest fraction shaved off the interval between beats
const INTERVAL_JITTER: f64 = 0.05;

/// Start beating on `sender`
///
/// The first beat waits a random fraction of the interval. A beat that finds
/// the previous one unacknowledged reports [`SessionSignal::Zombied`] tagged
/// with `generation` and stops.
pub(crate) fn spawn_heartbeat(
    handle: HeartbeatHandle,
    sender: TransportSender,
    signals: mpsc::UnboundedSender<SessionSignal>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = handle.interval();
        let first = interval.mul_f64(rand::thread_rng().gen_range(0.0..1.0));
        tracing::debug!(
            generation,
            interval_ms = interval.as_millis() as u64,
            first_ms = first.as_millis() as u64,
            "Heartbeat started"
        );
        sleep(first).await;

        loop {
            if !handle.is_acked() {
                tracing::warn!(generation, "Heartbeat not acknowledged, connection zombied");
                let _ = signals.send(SessionSignal::Zombied { generation });
                return;
            }

            let frame = GatewayFrame::heartbeat(handle.sequence());
            let text = match FrameCodec::encode(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(generation, error = %e, "Failed to encode heartbeat");
                    return;
                }
            };

            handle.mark_sent();
            if sender.send_text(text).is_err() {
                tracing::debug!(generation, "Transport gone, heartbeat stopped");
                return;
            }
            tracing::trace!(generation, seq = ?handle.sequence(), "Heartbeat sent");

            let shave = rand::thread_rng().gen_range(0.0..INTERVAL_JITTER);
            sleep(interval.mul_f64(1.0 - shave)).await;
        }
    })
}
