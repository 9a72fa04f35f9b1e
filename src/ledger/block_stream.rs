//! WebSocket new-block feed
//!
//! Opens an `eth_subscribe("newHeads")` subscription and forwards block
//! numbers into a [`BlockSubscription`]. The connection is not re-established
//! on failure: the receiver sees the feed close and the monitor falls back to
//! polling.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::subscription::BlockSubscription;
use crate::error::{Error, Result};

const SUBSCRIBE_REQUEST_ID: u64 = 1;
const UNSUBSCRIBE_REQUEST_ID: u64 = 2;

/// Configuration for the block feed
#[derive(Debug, Clone)]
pub struct BlockStreamConfig {
    /// WebSocket endpoint (ws:// or wss://)
    pub ws_url: String,
    /// Ping interval in seconds
    pub ping_interval_secs: u64,
    /// Bound on connect + subscribe handshake
    pub connect_timeout_ms: u64,
    /// Buffered notifications before new ones are dropped
    pub channel_capacity: usize,
}

impl BlockStreamConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ping_interval_secs: 30,
            connect_timeout_ms: 10_000,
            channel_capacity: 64,
        }
    }
}

/// JSON-RPC request sent over the socket
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Vec<String>,
}

impl RpcRequest {
    /// Subscribe to new block headers
    pub fn subscribe_new_heads() -> Self {
        Self {
            jsonrpc: "2.0",
            id: SUBSCRIBE_REQUEST_ID,
            method: "eth_subscribe",
            params: vec!["newHeads".to_string()],
        }
    }

    /// Cancel a subscription by id
    pub fn unsubscribe(subscription_id: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id: UNSUBSCRIBE_REQUEST_ID,
            method: "eth_unsubscribe",
            params: vec![subscription_id.to_string()],
        }
    }
}

/// Reply to a request (carries the subscription id on success)
#[derive(Debug, Deserialize)]
struct RpcReply {
    id: u64,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Push notification for an active subscription
#[derive(Debug, Deserialize)]
struct Notification {
    method: String,
    params: NotificationParams,
}

#[derive(Debug, Deserialize)]
struct NotificationParams {
    subscription: String,
    result: HeadPayload,
}

#[derive(Debug, Deserialize)]
struct HeadPayload {
    number: String,
}

/// Parse a `0x`-prefixed quantity
pub fn parse_quantity(hex: &str) -> Result<u64> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::Serialization(format!("Invalid quantity '{}': {}", hex, e)))
}

/// Extract the block number from a `newHeads` notification for `subscription_id`
fn parse_head_notification(text: &str, subscription_id: &str) -> Option<u64> {
    let notification = serde_json::from_str::<Notification>(text).ok()?;
    if notification.method != "eth_subscription"
        || notification.params.subscription != subscription_id
    {
        return None;
    }
    match parse_quantity(&notification.params.result.number) {
        Ok(number) => Some(number),
        Err(e) => {
            warn!("Dropping malformed head notification: {}", e);
            None
        }
    }
}

/// Connect, subscribe and spawn the forwarding task.
///
/// Returns only after the node has acknowledged the subscription, so any
/// setup failure surfaces here.
pub async fn subscribe_new_heads(config: &BlockStreamConfig) -> Result<BlockSubscription> {
    let url = url::Url::parse(&config.ws_url)
        .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

    info!("Connecting to block feed at {}", url.host_str().unwrap_or("?"));

    let handshake_timeout = Duration::from_millis(config.connect_timeout_ms);
    let (ws_stream, _) = timeout(handshake_timeout, connect_async(url))
        .await
        .map_err(|_| Error::Subscription("WebSocket connect timed out".to_string()))?
        .map_err(|e| Error::Subscription(format!("WebSocket connect failed: {}", e)))?;

    let (mut write, mut read) = ws_stream.split();

    let request = serde_json::to_string(&RpcRequest::subscribe_new_heads())?;
    write
        .send(Message::Text(request))
        .await
        .map_err(|e| Error::Subscription(format!("Failed to subscribe: {}", e)))?;

    // Wait for the subscription id
    let subscription_id = timeout(handshake_timeout, async {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Ok(reply) = serde_json::from_str::<RpcReply>(&text) else {
                        continue;
                    };
                    if reply.id != SUBSCRIBE_REQUEST_ID {
                        continue;
                    }
                    if let Some(err) = reply.error {
                        return Err(Error::Subscription(format!(
                            "eth_subscribe rejected ({}): {}",
                            err.code, err.message
                        )));
                    }
                    return match reply.result {
                        Some(serde_json::Value::String(id)) => Ok(id),
                        other => Err(Error::Subscription(format!(
                            "Unexpected eth_subscribe result: {:?}",
                            other
                        ))),
                    };
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(Error::Subscription(format!("WebSocket error: {}", e)));
                }
            }
        }
        Err(Error::Subscription(
            "WebSocket closed before subscription was acknowledged".to_string(),
        ))
    })
    .await
    .map_err(|_| Error::Subscription("eth_subscribe timed out".to_string()))??;

    info!("Subscribed to new blocks (id {})", subscription_id);

    let (block_tx, block_rx) = mpsc::channel(config.channel_capacity.max(1));
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let ping_interval = Duration::from_secs(config.ping_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ping_timer = tokio::time::interval(ping_interval);

        loop {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    if let Ok(json) = serde_json::to_string(&RpcRequest::unsubscribe(&subscription_id)) {
                        let _ = write.send(Message::Text(json)).await;
                    }
                    let _ = write.close().await;
                    debug!("Block feed unsubscribed");
                    break;
                }

                // Ping to keep connection alive
                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!("Failed to send ping: {}", e);
                        break;
                    }
                    debug!("Sent ping");
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Some(number) = parse_head_notification(&text, &subscription_id) else {
                                continue;
                            };
                            match block_tx.try_send(number) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    debug!(block = number, "Block feed backlog full, dropping notification");
                                }
                                Err(TrySendError::Closed(_)) => break,
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Block feed closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!("Block feed error: {}", e);
                            break;
                        }
                        None => {
                            info!("Block feed ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
    });

    Ok(BlockSubscription::new(block_rx, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request() {
        let json = serde_json::to_string(&RpcRequest::subscribe_new_heads()).unwrap();
        assert!(json.contains("eth_subscribe"));
        assert!(json.contains("newHeads"));
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
    }

    #[test]
    fn test_unsubscribe_request() {
        let json = serde_json::to_string(&RpcRequest::unsubscribe("0xabc")).unwrap();
        assert!(json.contains("eth_unsubscribe"));
        assert!(json.contains("0xabc"));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_head_notification() {
        let json = r#"{
            "jsonrpc": "2.0",
            "method": "eth_subscription",
            "params": {
                "subscription": "0x9ce59a13059e417087c02d3236a0b1cc",
                "result": {
                    "number": "0x1b4",
                    "hash": "0xdc0818cf78f21a8e70579cb46a43643f78291264dda342ae31049421c82d21ae"
                }
            }
        }"#;

        assert_eq!(
            parse_head_notification(json, "0x9ce59a13059e417087c02d3236a0b1cc"),
            Some(436)
        );
        assert_eq!(parse_head_notification(json, "0xother"), None);
    }

    #[test]
    fn test_parse_ignores_replies() {
        let json = r#"{"jsonrpc":"2.0","id":1,"result":"0x9ce59a13059e417087c02d3236a0b1cc"}"#;
        assert_eq!(parse_head_notification(json, "0x9ce59a13059e417087c02d3236a0b1cc"), None);

        let reply: RpcReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.id, 1);
        assert!(reply.error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_is_config_error() {
        let config = BlockStreamConfig::new("not a url");
        let result = subscribe_new_heads(&config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
