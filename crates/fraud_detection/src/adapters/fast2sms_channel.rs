// Rust guideline compliant 2026-10-19

//! Fast2SMS adapter for the `NotificationChannel` port.
//!
//! Sends the plain body of each notice to one phone number through the
//! `bulkV2` endpoint. The API answers HTTP 200 even for refused messages, so
//! the JSON `return` flag decides between success and rejection.

use std::fmt;

use domain::{ChannelError, NotificationChannel, RenderedMessage};
use reqwest::{Client, Request, StatusCode};
use serde_json::Value;

const API_BASE: &str = "https://www.fast2sms.com";

/// Sends notices as SMS to one phone number.
pub struct Fast2SmsChannel {
    client: Client,
    endpoint: String,
    // Kept out of `Debug` and of error messages.
    api_key: String,
    phone: String,
}

impl fmt::Debug for Fast2SmsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fast2SmsChannel")
            .field("endpoint", &self.endpoint)
            .field("phone", &self.phone)
            .finish_non_exhaustive()
    }
}

impl Fast2SmsChannel {
    /// Create a channel sending with `api_key` to `phone`.
    #[must_use]
    pub fn new(api_key: impl Into<String>, phone: impl Into<String>) -> Self {
        Self::with_base(API_BASE, api_key, phone)
    }

    fn with_base(base: &str, api_key: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{base}/dev/bulkV2"),
            api_key: api_key.into(),
            phone: phone.into(),
        }
    }

    fn request(&self, message: &RenderedMessage) -> Result<Request, reqwest::Error> {
        self.client
            .post(&self.endpoint)
            .query(&[
                ("authorization", self.api_key.as_str()),
                ("message", message.plain.as_str()),
                ("numbers", self.phone.as_str()),
            ])
            .build()
    }
}

/// Map a `bulkV2` answer to the channel outcome.
fn interpret(status: StatusCode, body: &str) -> Result<(), ChannelError> {
    if !status.is_success() {
        let excerpt: String = body.chars().take(200).collect();
        return Err(ChannelError::Rejected { reason: format!("{status}: {excerpt}") });
    }
    let data: Value = serde_json::from_str(body)
        .map_err(|e| ChannelError::Rejected { reason: format!("unreadable response: {e}") })?;
    match data.get("return") {
        Some(Value::Bool(true)) => Ok(()),
        Some(Value::Number(n)) if n.as_i64() == Some(1) => Ok(()),
        _ => {
            let reason = match data.get("message") {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
                _ => "unknown error".to_owned(),
            };
            Err(ChannelError::Rejected { reason })
        }
    }
}

impl NotificationChannel for Fast2SmsChannel {
    fn name(&self) -> &str {
        "sms"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
        let transport = |e: reqwest::Error| ChannelError::Transport { reason: e.without_url().to_string() };
        let request = self.request(message).map_err(transport)?;
        let response = self.client.execute(request).await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        interpret(status, &body)?;
        tracing::debug!(transaction_id = %message.transaction_id, "fast2sms_channel.sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use domain::NoticeKind;

    fn message() -> RenderedMessage {
        RenderedMessage {
            kind: NoticeKind::Challenge,
            transaction_id: "TXN050002".to_owned(),
            rich: "<b>Your OTP: <code>042137</code></b>".to_owned(),
            plain: "Sentinel: Your OTP is 042137. Transaction TXN050002. Valid for 5 mins.".to_owned(),
        }
    }

    fn channel() -> Fast2SmsChannel {
        Fast2SmsChannel::new("k3y-secret", "9876543210")
    }

    #[test]
    fn debug_hides_the_api_key() {
        let shown = format!("{:?}", channel());
        assert!(!shown.contains("k3y-secret"), "{shown}");
        assert!(shown.contains("9876543210"));
    }

    #[test]
    fn request_posts_plain_body_to_bulk_endpoint() {
        let request = channel().request(&message()).unwrap();

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().host_str(), Some("www.fast2sms.com"));
        assert_eq!(request.url().path(), "/dev/bulkV2");
        let query: Vec<(String, String)> = request.url().query_pairs().into_owned().collect();
        assert_eq!(
            query,
            vec![
                ("authorization".to_owned(), "k3y-secret".to_owned()),
                ("message".to_owned(), message().plain),
                ("numbers".to_owned(), "9876543210".to_owned()),
            ]
        );
    }

    #[test]
    fn accepted_answers() {
        assert_eq!(interpret(StatusCode::OK, r#"{"return":true,"request_id":"x"}"#), Ok(()));
        assert_eq!(interpret(StatusCode::OK, r#"{"return":1}"#), Ok(()));
    }

    #[test]
    fn refused_answer_is_rejected_with_api_message() {
        let result = interpret(StatusCode::OK, r#"{"return":false,"status_code":412,"message":"Invalid Authentication"}"#);
        assert_eq!(result, Err(ChannelError::Rejected { reason: "Invalid Authentication".to_owned() }));

        let result = interpret(StatusCode::OK, r#"{"return":false,"message":["Invalid numbers","Retry"]}"#);
        assert_eq!(result, Err(ChannelError::Rejected { reason: "Invalid numbers; Retry".to_owned() }));
    }

    #[test]
    fn http_error_and_garbage_are_rejected() {
        let result = interpret(StatusCode::UNAUTHORIZED, "nope");
        assert!(matches!(result, Err(ChannelError::Rejected { reason }) if reason.starts_with("401")));
        assert!(matches!(interpret(StatusCode::OK, "<html>"), Err(ChannelError::Rejected { .. })));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        // Port 9 on loopback refuses connections.
        let channel = Fast2SmsChannel::with_base("http://127.0.0.1:9", "k3y-secret", "9876543210");
        match channel.send(&message()).await {
            Err(ChannelError::Transport { reason }) => assert!(!reason.contains("k3y-secret"), "{reason}"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
