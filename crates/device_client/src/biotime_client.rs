use crate::config::DeviceClientConfig;
use crate::parse::{format_device_time, parse_page, parse_record, Page};
use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use common::domain::{
    ConnectionProbe, DeviceClient, DeviceCredentials, DeviceError, DeviceTarget, DeviceToken,
    TimeWindow, TransactionBatch,
};
use reqwest::{header, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Error bodies are cut to this many characters
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// A fetched and decoded page with the URL it was served from
struct FetchedPage {
    url: String,
    status_code: u16,
    page: Page,
}

/// DeviceClient for ZKTeco BioTime's REST API
#[derive(Clone)]
pub struct BioTimeClient {
    http: reqwest::Client,
    config: DeviceClientConfig,
}

impl BioTimeClient {
    pub fn new(config: DeviceClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    fn token_url(base_url: &str) -> String {
        format!("{}/api-token-auth/", base_url.trim_end_matches('/'))
    }

    fn transactions_url(base_url: &str) -> String {
        format!("{}/iclock/api/transactions/", base_url.trim_end_matches('/'))
    }

    /// The device filters on inclusive local timestamps, so the half-open
    /// window ends one second early
    fn window_query(&self, window: &TimeWindow, page_size: u32) -> Vec<(&'static str, String)> {
        let offset = self.config.utc_offset;
        vec![
            ("start_time", format_device_time(window.start, offset)),
            (
                "end_time",
                format_device_time(window.end - ChronoDuration::seconds(1), offset),
            ),
            ("page_size", page_size.to_string()),
        ]
    }

    async fn get_page(
        &self,
        url: &str,
        query: Option<&[(&'static str, String)]>,
        token: &str,
    ) -> Result<FetchedPage, DeviceError> {
        let mut request = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json");
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeviceError::Unreachable(e.to_string()))?;

        let url = response.url().to_string();
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeviceError::Unreachable(e.to_string()))?;

        check_status(status, &body)?;

        let json: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| DeviceError::BadResponse {
                status: status.as_u16(),
                body: format!("invalid JSON: {}", e),
            })?;
        let page = parse_page(json).map_err(|reason| DeviceError::BadResponse {
            status: status.as_u16(),
            body: reason,
        })?;

        Ok(FetchedPage {
            url,
            status_code: status.as_u16(),
            page,
        })
    }
}

fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

/// BioTime answers bad credentials with 400 and `non_field_errors`
fn is_rejected_credentials(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .is_some_and(|json| json.get("non_field_errors").is_some())
}

fn check_status(status: StatusCode, body: &str) -> Result<(), DeviceError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(DeviceError::Unauthorized);
    }
    if !status.is_success() {
        return Err(DeviceError::BadResponse {
            status: status.as_u16(),
            body: truncate_body(body),
        });
    }
    Ok(())
}

#[async_trait]
impl DeviceClient for BioTimeClient {
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    async fn register_token(
        &self,
        base_url: &str,
        credentials: &DeviceCredentials,
    ) -> Result<DeviceToken, DeviceError> {
        let response = self
            .http
            .post(Self::token_url(base_url))
            .json(&TokenRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await
            .map_err(|e| DeviceError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeviceError::Unreachable(e.to_string()))?;

        if status == StatusCode::BAD_REQUEST && is_rejected_credentials(&body) {
            return Err(DeviceError::Unauthorized);
        }
        check_status(status, &body)?;

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| DeviceError::BadResponse {
                status: status.as_u16(),
                body: format!("invalid JSON: {}", e),
            })?;

        match parsed.token.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                debug!("Device token registered");
                Ok(DeviceToken { token })
            }
            None => Err(DeviceError::BadResponse {
                status: status.as_u16(),
                body: "token not found in response".to_string(),
            }),
        }
    }

    #[instrument(skip(self, target), fields(base_url = %target.base_url, start = %window.start, end = %window.end))]
    async fn fetch_transactions(
        &self,
        target: &DeviceTarget,
        window: &TimeWindow,
    ) -> Result<TransactionBatch, DeviceError> {
        let query = self.window_query(window, self.config.page_size);
        let first = self
            .get_page(
                &Self::transactions_url(&target.base_url),
                Some(&query),
                &target.token,
            )
            .await?;

        let mut batch = TransactionBatch::new(first.url, first.status_code);
        let mut next = first.page.next.clone();
        let mut pages = 1u32;
        collect_records(&mut batch, first.page, self.config.utc_offset);

        while let Some(next_url) = next.take() {
            if pages >= self.config.max_pages {
                batch.truncated = true;
                warn!(
                    max_pages = self.config.max_pages,
                    "Stopped following device pages at the configured limit"
                );
                break;
            }
            let fetched = self.get_page(&next_url, None, &target.token).await?;
            next = fetched.page.next.clone();
            pages += 1;
            collect_records(&mut batch, fetched.page, self.config.utc_offset);
        }

        debug!(
            pages,
            transactions = batch.transactions.len(),
            malformed = batch.malformed.len(),
            "Fetched device transactions"
        );
        Ok(batch)
    }

    #[instrument(skip(self, target), fields(base_url = %target.base_url))]
    async fn test_connection(
        &self,
        target: &DeviceTarget,
        window: &TimeWindow,
        preview_limit: usize,
    ) -> Result<ConnectionProbe, DeviceError> {
        let query = self.window_query(window, self.config.page_size);
        let fetched = self
            .get_page(
                &Self::transactions_url(&target.base_url),
                Some(&query),
                &target.token,
            )
            .await?;

        let total_count = fetched
            .page
            .count
            .unwrap_or(fetched.page.records.len() as u64);

        let mut preview = Vec::new();
        let mut malformed_count = 0;
        for record in &fetched.page.records {
            match parse_record(record, self.config.utc_offset) {
                Ok(txn) if preview.len() < preview_limit => preview.push(txn),
                Ok(_) => {}
                Err(_) => malformed_count += 1,
            }
        }

        Ok(ConnectionProbe {
            url: fetched.url,
            status_code: fetched.status_code,
            total_count,
            preview,
            malformed_count,
        })
    }
}

fn collect_records(batch: &mut TransactionBatch, page: Page, offset: chrono::FixedOffset) {
    for record in &page.records {
        match parse_record(record, offset) {
            Ok(txn) => batch.transactions.push(txn),
            Err(malformed) => {
                debug!(
                    device_transaction_id = ?malformed.device_transaction_id,
                    reason = %malformed.reason,
                    "Skipping malformed device record"
                );
                batch.malformed.push(malformed);
            }
        }
    }
}
