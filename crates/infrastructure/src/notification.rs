//! HTTP推送通知适配器
//!
//! 把推送负载POST到外部推送网关。网关不可用时返回错误，
//! 由调用方决定是否忽略。

use application::collaborators::{NotificationSender, PushNotification};
use application::errors::{ApplicationError, ApplicationResult};
use async_trait::async_trait;
use tracing::debug;

/// HTTP推送发送器
pub struct HttpNotificationSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpNotificationSender {
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send(&self, notification: PushNotification) -> ApplicationResult<()> {
        let mut request = self.client.post(&self.endpoint).json(&notification);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApplicationError::Notification(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ApplicationError::Notification(format!(
                "push gateway returned {}",
                response.status()
            )));
        }

        debug!(device_id = %notification.device_id, "推送通知已提交");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notification() -> PushNotification {
        PushNotification {
            device_id: "device-1".into(),
            title: "alice".into(),
            body: "Photo".into(),
            room_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_payload_with_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/push"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "device_id": "device-1",
                "title": "alice",
                "body": "Photo",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender =
            HttpNotificationSender::new(format!("{}/push", server.uri()), Some("secret".into()));
        sender.send(notification()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_surfaces_gateway_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let sender = HttpNotificationSender::new(format!("{}/push", server.uri()), None);
        let result = sender.send(notification()).await;
        assert!(matches!(result, Err(ApplicationError::Notification(_))));
    }
}
