use async_trait::async_trait;
use ordersync_core::config::HttpConfig;
use ordersync_core::error::AppError;
use ordersync_core::models::{ChannelOrder, DateRange, CAFE24_CHANNEL};
use ordersync_core::ports::ChannelClient;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

/// Cafe24 Admin API version sent with every request unless overridden.
pub const DEFAULT_API_VERSION: &str = "2024-06-01";

/// Largest page the order list endpoint accepts.
const MAX_PAGE_LIMIT: u32 = 1000;

/// The order list endpoint rejects offsets beyond this value.
const MAX_OFFSET: u32 = 15000;

/// Order list envelope.
///
/// Cafe24 API reference: <https://developers.cafe24.com/docs/api/admin/#list-all-orders>
///
/// ```json
/// { "orders": [ { "order_id": "...", "items": [...], "receivers": [...] } ] }
/// ```
#[derive(Deserialize, Debug)]
struct OrdersResponse {
    #[serde(default, deserialize_with = "de_orders")]
    orders: Vec<serde_json::Value>,
}

fn de_orders<'de, D>(deserializer: D) -> Result<Vec<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// HTTP client for the Cafe24 Admin order API.
///
/// The access token is obtained and refreshed elsewhere; this client only
/// presents it.
///
/// # Examples
///
/// ```no_run
/// use ordersync_client::Cafe24Client;
/// use ordersync_core::config::HttpConfig;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Cafe24Client::new("mymall", "access-token", None, &HttpConfig::default())?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Cafe24Client {
    client: Client,
    base_url: Url,
    access_token: String,
    api_version: String,
    max_retries: u32,
    retry_base_delay: Duration,
    timeout_secs: u64,
    max_pages: u32,
}

impl Cafe24Client {
    /// Creates a client for `https://{mall_id}.cafe24api.com`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidUrl` if the mall id does not form a valid host.
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(
        mall_id: &str,
        access_token: &str,
        api_version: Option<&str>,
        http: &HttpConfig,
    ) -> Result<Self, AppError> {
        Self::with_base_url(
            &format!("https://{}.cafe24api.com", mall_id.trim()),
            access_token,
            api_version,
            http,
        )
    }

    /// Creates a client against an explicit API root.
    pub fn with_base_url(
        base_url_str: &str,
        access_token: &str,
        api_version: Option<&str>,
        http: &HttpConfig,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str)
            .map_err(|_| AppError::InvalidUrl(format!("Invalid Cafe24 URL: {}", base_url_str)))?;

        let client = Client::builder()
            .user_agent("ordersync/0.1")
            .timeout(http.timeout())
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            access_token: access_token.to_string(),
            api_version: api_version.unwrap_or(DEFAULT_API_VERSION).to_string(),
            max_retries: http.max_retries.max(1),
            retry_base_delay: http.retry_base_delay(),
            timeout_secs: http.timeout_secs,
            max_pages: u32::MAX,
        })
    }

    /// Caps the number of pages fetched per call.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Builds the order list URL for one page.
    fn orders_url(&self, range: &DateRange, limit: u32, offset: u32) -> Result<Url, AppError> {
        let mut url = self
            .base_url
            .join("api/v2/admin/orders")
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;

        url.query_pairs_mut()
            .append_pair("start_date", &range.start.format("%Y-%m-%d").to_string())
            .append_pair("end_date", &range.end.format("%Y-%m-%d").to_string())
            .append_pair("date_type", "order_date")
            .append_pair("embed", "items,receivers")
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        Ok(url)
    }

    /// Fetches every order in `range`, one page at a time.
    ///
    /// Stops at the first short page, at the API's maximum offset, or after
    /// the configured page cap.
    pub async fn list_orders(
        &self,
        range: &DateRange,
        page_limit: u32,
    ) -> Result<Vec<ChannelOrder>, AppError> {
        let limit = page_limit.clamp(1, MAX_PAGE_LIMIT);
        let mut orders = Vec::new();
        let mut offset = 0;
        let mut pages = 0;

        loop {
            let url = self.orders_url(range, limit, offset)?;
            let resp = self.request_with_retry(&url).await?;

            let page: OrdersResponse = resp
                .json()
                .await
                .map_err(|e| AppError::ClientError(e.to_string()))?;

            let fetched = page.orders.len() as u32;
            debug!(offset, fetched, "Fetched order page");
            orders.extend(parse_orders(page.orders));
            pages += 1;

            match next_page(offset, limit, fetched, pages, self.max_pages) {
                PageStep::Next(next) => offset = next,
                PageStep::Done => break,
                PageStep::PageCap => {
                    warn!(
                        "Stopped after {} pages; narrow the date range to fetch the rest",
                        pages
                    );
                    break;
                }
                PageStep::OffsetLimit => {
                    warn!(
                        "Reached the Cafe24 offset limit ({}); narrow the date range to fetch the rest",
                        MAX_OFFSET
                    );
                    break;
                }
            }
        }

        Ok(orders)
    }

    /// Makes an authenticated GET request with retry on transient failures.
    ///
    /// Retries whatever [`AppError::is_retryable`] accepts (network errors,
    /// timeouts, 5xx and 429) with backoff. Any other non-success status is
    /// returned as `AppError::ChannelError` carrying the response body.
    async fn request_with_retry(&self, url: &Url) -> Result<reqwest::Response, AppError> {
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=self.max_retries {
            let result = self
                .client
                .get(url.clone())
                .bearer_auth(&self.access_token)
                .header("X-Cafe24-Api-Version", &self.api_version)
                .header("Content-Type", "application/json")
                .send()
                .await;

            last_error = match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }

                    let payload = resp.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        AppError::RateLimitExceeded
                    } else {
                        AppError::ChannelError {
                            status: status.as_u16(),
                            payload,
                        }
                    }
                }
                Err(e) if e.is_timeout() => AppError::Timeout(self.timeout_secs),
                Err(e) if e.is_connect() => {
                    AppError::NetworkError(format!("Connection failed: {}", e))
                }
                Err(e) => AppError::ClientError(e.to_string()),
            };

            if !last_error.is_retryable() || attempt == self.max_retries {
                return Err(last_error);
            }

            let rate_limited = matches!(last_error, AppError::RateLimitExceeded);
            let delay = retry_delay(self.retry_base_delay, attempt, rate_limited);
            debug!(attempt, ?delay, error = %last_error, "Retrying Cafe24 request");
            sleep(delay).await;
        }

        Err(last_error)
    }
}

/// Decision after a page has been fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageStep {
    /// Fetch the page starting at this offset.
    Next(u32),
    /// The last page was short; nothing more to fetch.
    Done,
    /// The configured page cap was reached.
    PageCap,
    /// The next offset would exceed what the API accepts.
    OffsetLimit,
}

fn next_page(offset: u32, limit: u32, fetched: u32, pages: u32, max_pages: u32) -> PageStep {
    if fetched < limit {
        return PageStep::Done;
    }
    if pages >= max_pages {
        return PageStep::PageCap;
    }
    match offset.checked_add(limit) {
        Some(next) if next <= MAX_OFFSET => PageStep::Next(next),
        _ => PageStep::OffsetLimit,
    }
}

/// Exponential backoff for rate limits, linear otherwise. Saturates instead
/// of overflowing for large attempt counts.
fn retry_delay(base: Duration, attempt: u32, rate_limited: bool) -> Duration {
    let factor = if rate_limited {
        2_u32.checked_pow(attempt).unwrap_or(u32::MAX)
    } else {
        attempt
    };
    base.saturating_mul(factor)
}

/// Decodes each order on its own so one malformed record does not discard
/// the rest of the page.
fn parse_orders(raw: Vec<serde_json::Value>) -> Vec<ChannelOrder> {
    raw.into_iter()
        .filter_map(|value| {
            let order_id = value
                .get("order_id")
                .and_then(|v| v.as_str())
                .unwrap_or("<unknown>")
                .to_string();
            match serde_json::from_value::<ChannelOrder>(value) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Skipping malformed Cafe24 order");
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl ChannelClient for Cafe24Client {
    fn channel(&self) -> &str {
        CAFE24_CHANNEL
    }

    async fn fetch_orders(
        &self,
        range: &DateRange,
        page_limit: u32,
    ) -> Result<Vec<ChannelOrder>, AppError> {
        self.list_orders(range, page_limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_builds_mall_host() {
        let client = Cafe24Client::new("sundaymall", "token", None, &HttpConfig::default()).unwrap();
        assert_eq!(client.base_url.as_str(), "https://sundaymall.cafe24api.com/");
        assert_eq!(client.api_version, DEFAULT_API_VERSION);
        assert_eq!(client.channel(), "cafe24");
    }

    #[test]
    fn test_new_with_invalid_url() {
        let result = Cafe24Client::with_base_url("not a url", "token", None, &HttpConfig::default());

        match result {
            Err(AppError::InvalidUrl(msg)) => assert!(msg.contains("Invalid Cafe24 URL")),
            _ => panic!("Expected AppError::InvalidUrl"),
        }
    }

    #[test]
    fn test_orders_url_query() {
        let client =
            Cafe24Client::new("mall", "token", Some("2025-03-01"), &HttpConfig::default()).unwrap();
        let url = client.orders_url(&range(), 100, 200).unwrap();

        assert_eq!(url.path(), "/api/v2/admin/orders");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("start_date".to_string(), "2025-01-01".to_string())));
        assert!(pairs.contains(&("end_date".to_string(), "2025-01-07".to_string())));
        assert!(pairs.contains(&("embed".to_string(), "items,receivers".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "100".to_string())));
        assert!(pairs.contains(&("offset".to_string(), "200".to_string())));
        assert_eq!(client.api_version, "2025-03-01");
    }

    #[test]
    fn test_orders_response_deserialization() {
        let json = r#"{
            "orders": [
                {
                    "order_id": "20250101-0000001",
                    "order_date": "2025-01-01T09:30:00+09:00",
                    "buyer_name": "홍길동",
                    "billing_name": "홍길동",
                    "actual_order_amount": {"payment_amount": "49000.00"},
                    "items": [
                        {
                            "order_item_code": "20250101-0000001-01",
                            "product_no": 12,
                            "product_code": "P00000AB",
                            "product_name": "베개",
                            "variant_code": "P00000AB000A",
                            "option_value": "색상=그레이",
                            "product_price": "10000.00",
                            "quantity": 1,
                            "additional_discount_price": "0.00",
                            "order_status": "N20",
                            "shipping_company_code": "0004",
                            "tracking_no": "123456789"
                        }
                    ],
                    "receivers": [{"name": "홍길동", "cellphone": "010-0000-0000"}]
                }
            ]
        }"#;

        let response: OrdersResponse = serde_json::from_str(json).unwrap();
        let orders = parse_orders(response.orders);
        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.items[0].product_price, 10000.0);
        assert_eq!(order.items[0].order_status, "N20");
        assert_eq!(order.receiver().cellphone.as_deref(), Some("010-0000-0000"));
    }

    #[test]
    fn test_empty_orders_response() {
        let response: OrdersResponse = serde_json::from_str("{}").unwrap();
        assert!(response.orders.is_empty());
    }

    #[test]
    fn test_null_orders_response() {
        let response: OrdersResponse = serde_json::from_str(r#"{"orders": null}"#).unwrap();
        assert!(response.orders.is_empty());
    }

    #[test]
    fn test_malformed_order_does_not_drop_page() {
        let json = r#"{
            "orders": [
                {"order_id": "A", "items": "not-a-list"},
                {"order_id": "B", "items": null},
                {
                    "order_id": "C",
                    "items": [{
                        "order_item_code": "C-01",
                        "product_no": 1,
                        "quantity": null,
                        "order_status": null
                    }]
                }
            ]
        }"#;

        let response: OrdersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.orders.len(), 3);

        let orders = parse_orders(response.orders);
        let ids: Vec<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        assert!(orders[0].items.is_empty());
        assert_eq!(orders[1].items[0].order_status, "");
        assert_eq!(orders[1].items[0].quantity, 0);
    }

    #[test]
    fn test_next_page_short_page_stops() {
        assert_eq!(next_page(0, 100, 99, 1, 50), PageStep::Done);
        assert_eq!(next_page(0, 100, 0, 1, 50), PageStep::Done);
    }

    #[test]
    fn test_next_page_full_page_continues() {
        assert_eq!(next_page(0, 100, 100, 1, 50), PageStep::Next(100));
        assert_eq!(next_page(200, 100, 100, 3, 50), PageStep::Next(300));
    }

    #[test]
    fn test_next_page_cap() {
        assert_eq!(next_page(400, 100, 100, 5, 5), PageStep::PageCap);
        // A short last page is still a clean finish, even at the cap.
        assert_eq!(next_page(400, 100, 10, 5, 5), PageStep::Done);
    }

    #[test]
    fn test_next_page_offset_limit_boundary() {
        // Landing exactly on the maximum offset is still allowed.
        assert_eq!(next_page(14900, 100, 100, 150, u32::MAX), PageStep::Next(MAX_OFFSET));
        assert_eq!(next_page(MAX_OFFSET, 100, 100, 151, u32::MAX), PageStep::OffsetLimit);
        assert_eq!(next_page(14500, 1000, 1000, 15, u32::MAX), PageStep::OffsetLimit);
    }

    #[test]
    fn test_retry_delay_backoff() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1, false), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 3, false), Duration::from_millis(1500));
        assert_eq!(retry_delay(base, 1, true), Duration::from_millis(1000));
        assert_eq!(retry_delay(base, 3, true), Duration::from_millis(4000));
    }

    #[test]
    fn test_retry_delay_saturates_for_large_attempts() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 40, true), base.saturating_mul(u32::MAX));
        assert_eq!(retry_delay(Duration::MAX, 2, false), Duration::MAX);
    }
}
