use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use flowwatch_api::{ChangeEvent, ChangeSubscription, ErrorKind, ServiceError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT_TOPIC: &str = "phoenix";

// ═══════════════════════════════════════════════════════════════
//  Protocol types
// ═══════════════════════════════════════════════════════════════

/// Phoenix channel frame (`vsn=1.0.0`, JSON object encoding).
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, rename = "ref")]
    pub reference: Option<Value>,
}

/// What an inbound frame means for the subscriber.
#[derive(Debug)]
pub(crate) enum Inbound {
    Change(ChangeEvent),
    Ignored,
    Closed,
    Failed(ServiceError),
}

/// Decode one text frame received on channel `topic`.
pub(crate) fn decode(text: &str, topic: &str) -> Inbound {
    let msg: PhoenixMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => return Inbound::Failed(e.into()),
    };
    if msg.topic != topic {
        return Inbound::Ignored;
    }
    let status = msg.payload.get("status").and_then(Value::as_str);
    match msg.event.as_str() {
        "postgres_changes" => match msg.payload.get("data") {
            Some(data) => change(data.clone()),
            None => Inbound::Failed(ServiceError::format_err("postgres_changes without data")),
        },
        // pre-v2 servers push the row change as the event itself
        "INSERT" | "UPDATE" | "DELETE" => change(msg.payload),
        "phx_reply" if status == Some("error") => Inbound::Failed(ServiceError::new(format!(
            "channel join rejected: {}",
            msg.payload.get("response").unwrap_or(&Value::Null)
        ))),
        "system" if status == Some("error") => Inbound::Failed(ServiceError::io(format!(
            "realtime: {}",
            msg.payload.get("message").and_then(Value::as_str).unwrap_or("system error")
        ))),
        "phx_error" => Inbound::Failed(ServiceError::io("realtime channel crashed")),
        "phx_close" => Inbound::Closed,
        _ => Inbound::Ignored,
    }
}

fn change(data: Value) -> Inbound {
    match ChangeEvent::from_payload(data) {
        Ok(event) => Inbound::Change(event),
        Err(e) => Inbound::Failed(e),
    }
}

/// `phx_join` payload listening to every change of one table.
pub(crate) fn join_payload(schema: &str, table: &str) -> Value {
    json!({
        "config": {
            "broadcast": {"self": false},
            "presence": {"key": ""},
            "postgres_changes": [{"event": "*", "schema": schema, "table": table}]
        }
    })
}

// ═══════════════════════════════════════════════════════════════
//  RealtimeSubscription
// ═══════════════════════════════════════════════════════════════

/// Change feed of one table over the realtime websocket.
pub struct RealtimeSubscription {
    sink: SplitSink<WsStream, Message>,
    stream: SplitStream<WsStream>,
    topic: String,
    heartbeat: Interval,
    next_ref: u64,
    closed: bool,
}

impl RealtimeSubscription {
    pub(crate) async fn connect(
        url: &str,
        schema: &str,
        table: &str,
        heartbeat: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let (ws, _) = tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(url))
            .await
            .map_err(|_| ServiceError::io(format!("realtime connect: no handshake within {connect_timeout:?}")))?
            .map_err(|e| ServiceError::io(format!("realtime connect: {e}")))?;
        let (sink, stream) = ws.split();

        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let topic = format!("realtime:{schema}:{table}");
        let mut sub = Self { sink, stream, topic: topic.clone(), heartbeat, next_ref: 0, closed: false };
        sub.send(&topic, "phx_join", join_payload(schema, table)).await?;
        tracing::debug!(topic = %topic, "joined realtime channel");
        Ok(sub)
    }

    async fn send(&mut self, topic: &str, event: &str, payload: Value) -> Result<(), ServiceError> {
        self.next_ref += 1;
        let msg = PhoenixMessage {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(Value::String(self.next_ref.to_string())),
        };
        let text = serde_json::to_string(&msg)?;
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ServiceError::io(format!("realtime send: {e}")))
    }
}

impl ChangeSubscription for RealtimeSubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<ChangeEvent, ServiceError>>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return None;
            }
            loop {
                tokio::select! {
                    _ = self.heartbeat.tick() => {
                        if let Err(e) = self.send(HEARTBEAT_TOPIC, "heartbeat", json!({})).await {
                            self.closed = true;
                            return Some(Err(e));
                        }
                    }
                    msg = self.stream.next() => {
                        let text = match msg {
                            Some(Ok(Message::Text(t))) => t,
                            Some(Ok(Message::Close(_))) | None => {
                                self.closed = true;
                                return None;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                self.closed = true;
                                return Some(Err(ServiceError::io(format!("realtime: {e}"))));
                            }
                        };
                        match decode(&text, &self.topic) {
                            Inbound::Change(event) => return Some(Ok(event)),
                            Inbound::Ignored => continue,
                            Inbound::Closed => {
                                self.closed = true;
                                return None;
                            }
                            Inbound::Failed(e) => {
                                if e.kind() != ErrorKind::Format {
                                    self.closed = true;
                                }
                                return Some(Err(e));
                            }
                        }
                    }
                }
            }
        })
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return;
            }
            self.closed = true;
            let topic = self.topic.clone();
            if let Err(e) = self.send(&topic, "phx_leave", json!({})).await {
                tracing::debug!(topic = %topic, error = %e, "leave not delivered");
            }
            let _ = self.sink.close().await;
        })
    }
}
