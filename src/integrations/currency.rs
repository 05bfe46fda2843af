//! Currency rate provider
//!
//! Two upstream sources behind a single cache slot. The central bank PTAX feed
//! is tried first (today, then yesterday); the multi-pair quote API is the
//! fallback. When both fail, the previous snapshot is served regardless of its
//! age so recurring automations degrade instead of failing.

use crate::config::IntegrationsConfig;
use crate::constants::{DEFAULT_CURRENCY_PAIRS, INTEGRATION_CURRENCY};
use crate::error::NetworkError;
use crate::model::{Quote, RateSnapshot, RateSource};
use crate::{FlowsmithError, Result, telemetry};
use chrono::{Duration as ChronoDuration, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BCB_USD_NAME: &str = "Dólar Americano/Real Brasileiro";

struct CacheEntry {
    key: String,
    snapshot: Arc<RateSnapshot>,
    stored_at: Instant,
}

/// Cached two-tier currency quote provider
pub struct CurrencyProvider {
    client: Client,
    bcb_base_url: String,
    awesome_api_base_url: String,
    ttl: Duration,
    cache: Mutex<Option<CacheEntry>>,
}

impl CurrencyProvider {
    pub fn new(config: &IntegrationsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.currency_timeout_secs))
            .build()
            .map_err(|e| FlowsmithError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bcb_base_url: config.bcb_base_url.trim_end_matches('/').to_string(),
            awesome_api_base_url: config.awesome_api_base_url.trim_end_matches('/').to_string(),
            ttl: Duration::from_secs(config.currency_cache_ttl_secs),
            cache: Mutex::new(None),
        })
    }

    /// Fetch rates for the default pairs
    pub async fn fetch_default(&self) -> Result<Arc<RateSnapshot>> {
        let pairs: Vec<String> = DEFAULT_CURRENCY_PAIRS.iter().map(|p| p.to_string()).collect();
        self.fetch(&pairs).await
    }

    /// Fetch rates for `pairs` (e.g. `USD-BRL`)
    ///
    /// A cache hit needs the same sorted pair set and an entry younger than
    /// the TTL. On a miss where both sources fail, the last snapshot of any
    /// age is returned if one exists.
    pub async fn fetch(&self, pairs: &[String]) -> Result<Arc<RateSnapshot>> {
        let key = cache_key(pairs);

        if let Some(snapshot) = self.fresh_entry(&key) {
            tracing::debug!(key = %key, "Serving currency rates from cache");
            telemetry::record_integration_call(INTEGRATION_CURRENCY, "cached");
            return Ok(snapshot);
        }

        let fetched = match self.fetch_from_bcb().await {
            Ok(snapshot) => Ok(snapshot),
            Err(bcb_err) => {
                tracing::debug!(error = %bcb_err, "Central bank feed unavailable, trying quote API");
                self.fetch_from_awesome_api(pairs).await
            }
        };

        match fetched {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                *self.cache.lock() = Some(CacheEntry {
                    key,
                    snapshot: snapshot.clone(),
                    stored_at: Instant::now(),
                });
                telemetry::record_integration_call(INTEGRATION_CURRENCY, "ok");
                Ok(snapshot)
            }
            Err(err) => {
                if let Some(entry) = self.cache.lock().as_ref() {
                    tracing::warn!(error = %err, "Currency providers failed, serving stale cache");
                    telemetry::record_integration_call(INTEGRATION_CURRENCY, "stale");
                    return Ok(entry.snapshot.clone());
                }
                telemetry::record_integration_call(INTEGRATION_CURRENCY, "error");
                Err(err)
            }
        }
    }

    fn fresh_entry(&self, key: &str) -> Option<Arc<RateSnapshot>> {
        self.cache
            .lock()
            .as_ref()
            .filter(|entry| entry.key == key && entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.snapshot.clone())
    }

    async fn fetch_from_bcb(&self) -> Result<RateSnapshot> {
        let today = Local::now().date_naive();
        let yesterday = today - ChronoDuration::days(1);

        for date in [today, yesterday] {
            if let Some(quote) = self.fetch_bcb_day(date).await? {
                let mut rates = BTreeMap::new();
                rates.insert("USDBRL".to_string(), quote);
                return Ok(RateSnapshot {
                    rates,
                    source: RateSource::CentralBank,
                    fetched_at: Utc::now(),
                });
            }
        }

        Err(NetworkError::Upstream("No data available from the central bank".to_string()).into())
    }

    /// `Ok(None)` when the day has no published rate
    async fn fetch_bcb_day(&self, date: NaiveDate) -> Result<Option<Quote>> {
        let url = format!(
            "{}/CotacaoDolarDia(dataCotacao=@dataCotacao)?@dataCotacao='{}'&$format=json",
            self.bcb_base_url,
            date.format("%m-%d-%Y")
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let body: Value = response.json().await?;
        let Some(entry) = body["value"].as_array().and_then(|values| values.last()) else {
            return Ok(None);
        };

        let buy = lenient_f64(&entry["cotacaoCompra"]);
        Ok(Some(Quote {
            name: BCB_USD_NAME.to_string(),
            bid: buy,
            change_pct: 0.0,
            high: lenient_f64(&entry["cotacaoVenda"]),
            low: buy,
            quoted_at: entry["dataHoraCotacao"].as_str().unwrap_or_default().to_string(),
        }))
    }

    async fn fetch_from_awesome_api(&self, pairs: &[String]) -> Result<RateSnapshot> {
        let url = format!("{}/json/last/{}", self.awesome_api_base_url, pairs.join(","));
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(
                NetworkError::Upstream("Rate APIs temporarily unavailable".to_string()).into(),
            );
        }
        if !status.is_success() {
            return Err(NetworkError::Http {
                status: status.as_u16(),
                message: "quote API error".to_string(),
            }
            .into());
        }

        let body: Value = response.json().await?;
        let quotes = body
            .as_object()
            .ok_or_else(|| NetworkError::Upstream("unexpected quote API payload".to_string()))?;

        let rates = quotes
            .iter()
            .map(|(code, quote)| {
                (
                    code.clone(),
                    Quote {
                        name: quote["name"].as_str().unwrap_or(code).to_string(),
                        bid: lenient_f64(&quote["bid"]),
                        change_pct: lenient_f64(&quote["pctChange"]),
                        high: lenient_f64(&quote["high"]),
                        low: lenient_f64(&quote["low"]),
                        quoted_at: quote["create_date"].as_str().unwrap_or_default().to_string(),
                    },
                )
            })
            .collect();

        Ok(RateSnapshot {
            rates,
            source: RateSource::AwesomeApi,
            fetched_at: Utc::now(),
        })
    }
}

/// Sorted, comma-joined pair list
pub fn cache_key(pairs: &[String]) -> String {
    let mut sorted: Vec<&str> = pairs.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(",")
}

/// Numbers arrive as JSON numbers or numeric strings
fn lenient_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
#[path = "currency_test.rs"]
mod currency_test;
