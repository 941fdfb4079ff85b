use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::sites::ListingPayload;

/// Path the remote parser listens on, relative to `webhookBaseUrl`.
pub const PARSE_LISTING_PATH: &str = "/api/parse-listing";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Receiver stored the listing under this id.
    Created(String),
    /// Receiver already had it.
    Skipped,
    Failed(String),
}

#[derive(Debug, Deserialize)]
struct ReceiverReply {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// POSTs one listing at a time to the downstream receiver. No retries.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    /// Dispatcher for the remote parser under `base_url`.
    pub fn parse_listing(client: Client, base_url: &str) -> Self {
        Self::new(client, format!("{}{}", base_url.trim_end_matches('/'), PARSE_LISTING_PATH))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn dispatch(&self, payload: &ListingPayload) -> DispatchOutcome {
        let response = match self.client.post(&self.url).json(payload).send().await {
            Ok(response) => response,
            Err(e) => return DispatchOutcome::Failed(format!("webhook unreachable: {e}")),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return DispatchOutcome::Failed(format!("HTTP {status}, unreadable body: {e}")),
        };
        classify_reply(status.as_u16(), &body)
    }
}

/// `{id}` means created, `{status: "skipped"}` means already known, and
/// anything else (including `{error}`) is a failure.
pub fn classify_reply(http_status: u16, body: &str) -> DispatchOutcome {
    let reply: ReceiverReply = match serde_json::from_str(body) {
        Ok(reply) => reply,
        Err(_) => return DispatchOutcome::Failed(format!("HTTP {http_status}, non-JSON body")),
    };

    match reply.id {
        Some(Value::String(id)) => return DispatchOutcome::Created(id),
        Some(Value::Null) | None => {}
        Some(other) => return DispatchOutcome::Created(other.to_string()),
    }
    if reply.status.as_deref() == Some("skipped") {
        return DispatchOutcome::Skipped;
    }

    let reason = match reply.error {
        Some(Value::String(message)) => message,
        Some(other) => other.to_string(),
        None => format!("HTTP {http_status}, no id in response"),
    };
    DispatchOutcome::Failed(reason)
}
