//! Broadcast socket: one WebSocket connection is one hub subscriber.
//!
//! The hub never writes to the socket directly. Each connection owns a bounded queue that the
//! hub fills through [`Subscriber::send`] and a writer task drains in FIFO order. When the hub
//! drops the subscriber (slow consumer, failed delivery, missed pongs) the queue's sender goes
//! away with it, the writer ends, and the connection is closed.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use relay_core::broadcast::{
    mempool_snapshot, ClientMessage, DeliveryError, Outbound, ServerMessage, Subscriber,
    SubscriberId,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::router::AppState;

/// Hub-facing half of a connection.
pub struct WsSubscriber {
    tx: mpsc::Sender<Outbound>,
}

impl WsSubscriber {
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Subscriber for WsSubscriber {
    fn send(&self, frame: Outbound) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Turns a queued frame into a socket message. `None` when the frame cannot be encoded.
fn encode(frame: Outbound) -> Option<Message> {
    match frame {
        Outbound::Ping => Some(Message::Ping(Vec::new())),
        Outbound::Message(message) => match message.to_json() {
            Ok(text) => Some(Message::Text(text)),
            Err(e) => {
                warn!(kind = message.kind(), error = %e, "failed to encode server message");
                None
            }
        },
    }
}

/// `GET /ws`
pub async fn handle_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (subscriber, mut outbound) = WsSubscriber::channel(state.channel_capacity);

    let id = match state.hub.subscribe(std::sync::Arc::new(subscriber)) {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "initial snapshot did not fit the connection queue");
            return;
        }
    };
    info!(subscriber = id, total = state.hub.subscriber_count(), "websocket client connected");

    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let Some(message) = encode(frame) else { continue };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    let reader_state = state.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(subscriber = id, error = %e, "websocket read failed");
                    break;
                }
            };
            reader_state.hub.touch(id);

            match frame {
                Message::Text(text) => handle_client_message(&reader_state, id, &text).await,
                Message::Close(_) => break,
                Message::Pong(_) | Message::Ping(_) | Message::Binary(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    state.hub.unsubscribe(id);
    info!(subscriber = id, remaining = state.hub.subscriber_count(), "websocket client disconnected");
}

async fn handle_client_message(state: &AppState, id: SubscriberId, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::RequestMempool) => {
            let snapshot = mempool_snapshot(&state.engine, &state.tracker).await;
            if let Err(e) = state.hub.send_to(id, ServerMessage::Mempool(snapshot)) {
                debug!(subscriber = id, error = %e, "mempool reply not delivered");
            }
        }
        Err(e) => debug!(subscriber = id, error = %e, "ignoring unrecognized client message"),
    }
}
