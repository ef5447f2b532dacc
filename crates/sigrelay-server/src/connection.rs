use crate::error::RelayError;
use crate::metrics::{counters, gauges, histograms};
use crate::registry::Registry;
use crate::server::ServerState;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sigrelay_common::types::message_type;
use sigrelay_common::{ConnectionId, MessageKind, ServerMessage, SignalMessage};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocket, Message>;
type WsRecv = SplitStream<WebSocket>;

/// Why an inbound frame was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DropReason {
    /// Not a JSON object.
    Malformed,
    /// `type` absent or empty.
    MissingType,
    /// Relay type without a `to`.
    MissingDestination,
    /// `type` the relay does not route.
    UnknownType,
    /// `to` does not name a registered connection.
    Offline,
    /// Destination's outbound queue is full.
    QueueFull,
}

impl DropReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::MissingType => "missing_type",
            Self::MissingDestination => "missing_destination",
            Self::UnknownType => "unknown_type",
            Self::Offline => "offline",
            Self::QueueFull => "queue_full",
        }
    }
}

/// Outcome of handling one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// Queued for delivery to `to`.
    Relayed {
        kind: &'static str,
        to: ConnectionId,
    },
    Dropped(DropReason),
}

fn relay_label(kind: &MessageKind) -> Option<&'static str> {
    match kind {
        MessageKind::Offer => Some(message_type::OFFER),
        MessageKind::Answer => Some(message_type::ANSWER),
        MessageKind::IceCandidate => Some(message_type::ICE_CANDIDATE),
        MessageKind::Hangup => Some(message_type::HANGUP),
        MessageKind::Other(_) => None,
    }
}

/// Validate one frame from `sender` and forward it to the peer it names.
///
/// Never blocks: the forward is a `try_send` onto the destination's queue.
/// The sender is told nothing either way.
pub(crate) fn dispatch_frame(data: &[u8], registry: &Registry, sender: &ConnectionId) -> Dispatch {
    let mut message = match SignalMessage::parse(data) {
        Ok(message) => message,
        Err(e) => {
            debug!(peer = %sender, "invalid json: {}", e);
            return Dispatch::Dropped(DropReason::Malformed);
        }
    };

    let kind = match message.kind.as_ref() {
        None => return Dispatch::Dropped(DropReason::MissingType),
        Some(kind) => match relay_label(kind) {
            Some(label) => label,
            None => {
                debug!(peer = %sender, kind = kind.as_str(), "ignoring unrecognized message type");
                return Dispatch::Dropped(DropReason::UnknownType);
            }
        },
    };

    let Some(to) = message.to.as_deref() else {
        return Dispatch::Dropped(DropReason::MissingDestination);
    };
    // An unparseable `to` can't name a live connection.
    let Ok(dest) = to.parse::<ConnectionId>() else {
        return Dispatch::Dropped(DropReason::Offline);
    };

    message.stamp_from(sender);

    let Some(target) = registry.lookup(&dest) else {
        return Dispatch::Dropped(DropReason::Offline);
    };

    let text = match message.to_json() {
        Ok(text) => text,
        Err(e) => {
            warn!(peer = %sender, "failed to encode forwarded message: {}", e);
            return Dispatch::Dropped(DropReason::Malformed);
        }
    };

    match target.tx.try_send(text) {
        Ok(()) => Dispatch::Relayed { kind, to: dest },
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(peer = %sender, dest = %dest, "forward error: send queue full");
            Dispatch::Dropped(DropReason::QueueFull)
        }
        // Target is mid-teardown.
        Err(mpsc::error::TrySendError::Closed(_)) => Dispatch::Dropped(DropReason::Offline),
    }
}

fn process_frame(data: &[u8], state: &ServerState, id: &ConnectionId) {
    let start = Instant::now();
    match dispatch_frame(data, &state.registry, id) {
        Dispatch::Relayed { kind, to } => {
            counters::messages_relayed_total(kind);
            histograms::dispatch_latency_seconds(start.elapsed().as_secs_f64());
            tracing::trace!(peer = %id, dest = %to, kind, "relayed");
        }
        Dispatch::Dropped(reason) => {
            counters::messages_dropped_total(reason.as_str());
        }
    }
}

/// Read frames until the socket fails or closes, writing queued outbound
/// messages in between. Frames from this connection are handled in order.
async fn run_relay_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    deliver_rx: &mut mpsc::Receiver<String>,
    state: &ServerState,
    id: &ConnectionId,
) -> Result<(), RelayError> {
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => process_frame(text.as_bytes(), state, id),
                    Some(Ok(Message::Binary(data))) => process_frame(&data, state, id),
                    // Pings are answered by the transport.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(RelayError::WebSocket(e)),
                }
            }
            Some(text) = deliver_rx.recv() => {
                // A dead socket surfaces on the read side; keep reading until it does.
                if let Err(e) = ws_tx.send(Message::Text(text)).await {
                    debug!(peer = %id, "failed to write to client: {}", e);
                }
            }
        }
    }
}

async fn send_my_id(ws_tx: &mut WsSink, id: ConnectionId) -> Result<(), RelayError> {
    let text = ServerMessage::MyId { id }.to_json()?;
    ws_tx.send(Message::Text(text)).await?;
    Ok(())
}

/// Drive one upgraded client connection from registration to teardown.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (deliver_tx, mut deliver_rx) = mpsc::channel::<String>(state.config.send_queue);

    let id = state.registry.register(deliver_tx);
    gauges::inc_connections_active();

    // Written before the outbound queue is drained, so `myId` always comes first.
    if let Err(e) = send_my_id(&mut ws_tx, id).await {
        warn!(peer = %id, "send myId error: {}", e);
    }
    let peers = state.registry.broadcast_peer_count();
    info!(peer = %id, peers, "peer connected");

    if let Err(e) = run_relay_loop(&mut ws_tx, &mut ws_rx, &mut deliver_rx, &state, &id).await {
        debug!(peer = %id, "connection ended: {}", e);
    }

    state.registry.unregister(&id);
    // Already-closed sockets report an error here.
    let _ = ws_tx.close().await;
    let peers = state.registry.broadcast_peer_count();
    gauges::dec_connections_active();
    info!(peer = %id, peers, "peer disconnected");
}
