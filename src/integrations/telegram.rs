//! Telegram Bot API client

use crate::config::IntegrationsConfig;
use crate::constants::INTEGRATION_TELEGRAM;
use crate::error::NetworkError;
use crate::model::{Delivery, RateSnapshot};
use crate::{FlowsmithError, Result, telemetry};
use chrono::{DateTime, Local};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;

/// Result of a `getMe` probe that reached the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotProbe {
    Connected { username: String },
    InvalidToken,
    Rejected { status: u16 },
}

pub struct TelegramClient {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
    send_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &IntegrationsConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| FlowsmithError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.telegram_base_url.trim_end_matches('/').to_string(),
            probe_timeout: Duration::from_secs(config.telegram_probe_timeout_secs),
            send_timeout: Duration::from_secs(config.telegram_send_timeout_secs),
        })
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, token, method)
    }

    /// Probe the bot identity
    ///
    /// Transport failures and timeouts are `Err`; any HTTP answer is a `BotProbe`.
    pub async fn get_me(&self, token: &str) -> Result<BotProbe> {
        let response = self
            .client
            .get(self.method_url(token, "getMe"))
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Ok(BotProbe::Rejected {
                status: status.as_u16(),
            });
        }

        let body: Value = response.json().await?;
        if body["ok"].as_bool() != Some(true) {
            return Ok(BotProbe::InvalidToken);
        }

        Ok(BotProbe::Connected {
            username: body["result"]["username"]
                .as_str()
                .unwrap_or("N/A")
                .to_string(),
        })
    }

    /// Send an HTML-formatted message
    pub async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> Result<Delivery> {
        let result = self.send_message_inner(token, chat_id, text).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        telemetry::record_integration_call(INTEGRATION_TELEGRAM, outcome);
        result
    }

    async fn send_message_inner(&self, token: &str, chat_id: &str, text: &str) -> Result<Delivery> {
        let response = self
            .client
            .post(self.method_url(token, "sendMessage"))
            .timeout(self.send_timeout)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML"
            }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() || body["ok"].as_bool() != Some(true) {
            let description = body["description"]
                .as_str()
                .unwrap_or("Unknown error")
                .to_string();
            return Err(NetworkError::Upstream(description).into());
        }

        Ok(Delivery {
            chat_id: chat_id.to_string(),
            message_id: body["result"]["message_id"].as_i64(),
        })
    }
}

/// ↑, ↓ or → for a percentage change
pub fn trend_arrow(change_pct: f64) -> &'static str {
    if change_pct > 0.0 {
        "↑"
    } else if change_pct < 0.0 {
        "↓"
    } else {
        "→"
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Telegram message summarising one automation run
pub fn format_automation_message(
    name: &str,
    rates: Option<&RateSnapshot>,
    now: DateTime<Local>,
) -> String {
    let mut message = format!("<b>{}</b>\n", escape_html(name));

    if let Some(snapshot) = rates {
        message.push_str("\n<b>Rates:</b>");
        for quote in snapshot.rates.values() {
            message.push_str(&format!(
                "\n• {}: R$ {:.2} ({} {:.2}%)",
                escape_html(&quote.name),
                quote.bid,
                trend_arrow(quote.change_pct),
                quote.change_pct
            ));
        }
    }

    message.push_str(&format!(
        "\n\n<i>Updated at: {}</i>",
        now.format("%d/%m/%Y %H:%M")
    ));
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Quote, RateSource};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TelegramClient {
        TelegramClient::new(&IntegrationsConfig {
            telegram_base_url: server.uri(),
            ..IntegrationsConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_me_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botgood/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"username": "rates_bot"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/botbad/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/botgone/getMe"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.get_me("good").await.unwrap(),
            BotProbe::Connected {
                username: "rates_bot".to_string()
            }
        );
        assert_eq!(client.get_me("bad").await.unwrap(), BotProbe::InvalidToken);
        assert_eq!(
            client.get_me("gone").await.unwrap(),
            BotProbe::Rejected { status: 401 }
        );
    }

    #[tokio::test]
    async fn test_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottoken/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "42", "parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true, "result": {"message_id": 7}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let delivery = client_for(&server)
            .send_message("token", "42", "<b>hi</b>")
            .await
            .unwrap();
        assert_eq!(delivery.message_id, Some(7));
    }

    #[tokio::test]
    async fn test_send_message_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false, "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_message("token", "0", "hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[test]
    fn test_format_automation_message() {
        let mut rates = BTreeMap::new();
        rates.insert(
            "USDBRL".to_string(),
            Quote {
                name: "Dollar".to_string(),
                bid: 5.4321,
                change_pct: -0.5,
                high: 5.5,
                low: 5.4,
                quoted_at: String::new(),
            },
        );
        let snapshot = RateSnapshot {
            rates,
            source: RateSource::AwesomeApi,
            fetched_at: Utc::now(),
        };
        let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 5, 0).unwrap();

        let message = format_automation_message("Daily rates", Some(&snapshot), now);
        assert_eq!(
            message,
            "<b>Daily rates</b>\n\n<b>Rates:</b>\n• Dollar: R$ 5.43 (↓ -0.50%)\n\n<i>Updated at: 17/10/2026 09:05</i>"
        );
    }

    #[test]
    fn test_names_are_escaped_for_html_parse_mode() {
        assert_eq!(escape_html("A<B & C>"), "A&lt;B &amp; C&gt;");
        assert_eq!(escape_html("plain"), "plain");

        let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 5, 0).unwrap();
        let message = format_automation_message("Rates <USD & EUR>", None, now);
        assert!(message.starts_with("<b>Rates &lt;USD &amp; EUR&gt;</b>\n"));
        assert!(!message.contains("<USD"));
    }
}
