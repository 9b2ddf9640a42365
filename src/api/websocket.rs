use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use crate::api::rest::{read_currency, CurrencyFilter, CurrencyQuery};
use crate::config::WebSocketConfig;
use crate::context::AppContext;
use crate::error::Result;
use crate::utils::helper::clamp_secs;

#[derive(Debug, Default, Deserialize)]
pub struct ListenerQuery {
    pub exchange: Option<String>,
    pub pair: Option<String>,
    /// Seconds between pushes
    pub frequency_timeout: Option<f64>,
}

/// Push interval for a requested frequency, clamped to the configured bounds.
pub fn push_interval(config: &WebSocketConfig, requested: Option<f64>) -> Duration {
    clamp_secs(requested, config.default_frequency, config.min_frequency, config.max_frequency)
}

/// Same payload as `/currency`, pushed every `frequency_timeout` seconds.
/// Query errors are reported before the upgrade.
pub async fn currency_listener(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(query): Query<ListenerQuery>,
) -> Result<Response> {
    let interval = push_interval(&ctx.config.websocket, query.frequency_timeout);
    let filter = CurrencyQuery { exchange: query.exchange, pair: query.pair }
        .validate(&ctx)
        .await?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, ctx, filter, interval)))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext, filter: CurrencyFilter, interval: Duration) {
    tracing::info!("Accepted new websocket listener (interval {:?})", interval);
    let (mut sender, mut receiver) = socket.split();
    let connected_at = Instant::now();
    let time_limit = ctx.config.websocket.connection_time_limit();

    let mut send_task = tokio::spawn(async move {
        loop {
            if time_limit.is_some_and(|limit| connected_at.elapsed() >= limit) {
                tracing::info!("Websocket listener reached its connection time limit");
                break;
            }

            let payload = match read_currency(&ctx, &filter).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Websocket listener read failed: {}", e);
                    break;
                }
            };
            let msg = match serde_json::to_string(&payload) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::error!("Failed to encode websocket payload: {}", e);
                    break;
                }
            };
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }

            tokio::time::sleep(interval).await;
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // Drain client frames so a close or disconnect is noticed.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                other => tracing::debug!("Ignoring websocket message: {:?}", other),
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    tracing::info!("Websocket listener disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_interval_is_clamped() {
        let config = WebSocketConfig::default();
        assert_eq!(push_interval(&config, None), Duration::from_secs(1));
        assert_eq!(push_interval(&config, Some(0.01)), Duration::from_millis(100));
        assert_eq!(push_interval(&config, Some(600.0)), Duration::from_secs(60));
        assert_eq!(push_interval(&config, Some(2.5)), Duration::from_millis(2500));
    }
}
