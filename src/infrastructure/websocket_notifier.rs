// WebSocket push backend for change notifications
use crate::application::live_updates::{notify, ChangeNotifier, ChangeSubscription};
use crate::domain::error::ChartError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// One connection per subscription; every frame received after subscribing
/// is a change signal.
#[derive(Debug, Clone)]
pub struct WebSocketNotifier {
    url: String,
}

impl WebSocketNotifier {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

fn subscribe_frame(topic: &str) -> String {
    serde_json::json!({ "action": "subscribe", "topic": topic }).to_string()
}

#[async_trait]
impl ChangeNotifier for WebSocketNotifier {
    async fn subscribe(&self, topics: &[String]) -> Result<ChangeSubscription, ChartError> {
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChartError::Subscription(format!("connect to {}: {}", self.url, e)))?;

        for topic in topics {
            socket
                .send(Message::Text(subscribe_frame(topic)))
                .await
                .map_err(|e| ChartError::Subscription(format!("subscribe to {}: {}", topic, e)))?;
        }
        tracing::info!(url = %self.url, topics = topics.len(), "WebSocket subscription established");

        let (tx, rx) = mpsc::channel(1);
        let url = self.url.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = socket.next().await {
                match message {
                    Ok(Message::Text(_)) | Ok(Message::Binary(_)) => {
                        if !notify(&tx) {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!(url = %url, "WebSocket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(url = %url, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(ChangeSubscription::new(rx, Some(task)))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_subscribe_frame() {
        let frame: serde_json::Value = serde_json::from_str(&subscribe_frame("a.b")).unwrap();
        assert_eq!(frame, serde_json::json!({ "action": "subscribe", "topic": "a.b" }));
    }

    #[tokio::test]
    async fn test_frames_signal_changes_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let mut frames = Vec::new();
            for _ in 0..2 {
                if let Some(Ok(Message::Text(text))) = ws.next().await {
                    frames.push(text.to_string());
                }
            }
            ws.send(Message::Text(r#"{"updates":[]}"#.into())).await.unwrap();
            ws.close(None).await.unwrap();
            frames
        });

        let notifier = WebSocketNotifier::new(format!("ws://{}", addr));
        let topics = vec!["a".to_string(), "b".to_string()];
        let mut subscription = notifier.subscribe(&topics).await.unwrap();

        assert!(subscription.changed().await);
        assert!(!subscription.changed().await);

        let frames = server.await.unwrap();
        assert_eq!(frames, vec![subscribe_frame("a"), subscribe_frame("b")]);
    }

    #[tokio::test]
    async fn test_connection_refused_is_subscription_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = WebSocketNotifier::new(format!("ws://{}", addr));
        let error = notifier.subscribe(&["a".to_string()]).await.err().unwrap();
        assert!(matches!(error, ChartError::Subscription(_)));
    }
}
