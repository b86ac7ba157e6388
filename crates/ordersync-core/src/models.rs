//! Channel-native and canonical order models.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Channel name used as the `uniq` prefix for Cafe24 orders.
pub const CAFE24_CHANNEL: &str = "cafe24";

// =============================================================================
// Channel-native payloads
// =============================================================================

/// One order as returned by the channel order list.
///
/// The receiver arrives either as a `receiver` object or as a `receivers`
/// array depending on API version and embed flags; use [`ChannelOrder::receiver`]
/// to get a single normalized shape.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelOrder {
    pub order_id: String,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_name: Option<String>,
    #[serde(default)]
    pub order_phone: Option<String>,
    #[serde(default)]
    pub order_email: Option<String>,
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub buyer_phone: Option<String>,
    #[serde(default)]
    pub buyer_cellphone: Option<String>,
    #[serde(default)]
    pub buyer_email: Option<String>,
    #[serde(default)]
    pub billing_name: Option<String>,
    #[serde(default)]
    pub receiver: Option<ReceiverField>,
    #[serde(default)]
    pub receivers: Option<Vec<ChannelReceiver>>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub items: Vec<ChannelOrderItem>,
}

/// Shipping receiver as the channel sends it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ChannelReceiver {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub cellphone: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub shipping_message: Option<String>,
}

/// `receiver` is an object in some API versions and an array in others.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ReceiverField {
    One(ChannelReceiver),
    Many(Vec<ChannelReceiver>),
}

/// One purchased item inside a channel order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelOrderItem {
    #[serde(default, deserialize_with = "de_null_default")]
    pub order_item_code: String,
    #[serde(default, deserialize_with = "de_count")]
    pub product_no: i64,
    #[serde(default)]
    pub product_code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub variant_code: Option<String>,
    #[serde(default)]
    pub option_value: Option<String>,
    #[serde(default, deserialize_with = "de_amount")]
    pub product_price: f64,
    #[serde(default, deserialize_with = "de_count")]
    pub quantity: i64,
    #[serde(default, deserialize_with = "de_amount")]
    pub additional_discount_price: f64,
    /// Blank or null means the channel sent no status; maps to 신규주문.
    #[serde(default, deserialize_with = "de_null_default")]
    pub order_status: String,
    #[serde(default)]
    pub shipping_company_code: Option<String>,
    #[serde(default)]
    pub tracking_no: Option<String>,
}

impl ChannelOrder {
    /// Resolves the shipping receiver: explicit object, then the first entry
    /// of any receivers array, then a receiver holding only the billing name.
    pub fn receiver(&self) -> ChannelReceiver {
        let explicit = match &self.receiver {
            Some(ReceiverField::One(r)) => Some(r.clone()),
            Some(ReceiverField::Many(list)) => list.first().cloned(),
            None => None,
        };

        let mut receiver = explicit
            .or_else(|| self.receivers.as_ref().and_then(|list| list.first().cloned()))
            .unwrap_or_default();

        if is_blank(receiver.name.as_deref()) {
            receiver.name = self.billing_name.clone();
        }
        receiver
    }
}

/// Channel amounts arrive as decimal strings ("15000.00") or plain numbers.
fn de_amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s.trim().parse().unwrap_or(0.0),
        Raw::Null => 0.0,
    })
}

/// Integer fields that may arrive as numbers, numeric strings or null.
fn de_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) => f as i64,
        Raw::Text(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        Raw::Null => 0,
    })
}

/// Treats an explicit `null` like a missing field.
fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).unwrap_or_default().is_empty()
}

// =============================================================================
// Canonical model
// =============================================================================

/// Canonical order status, persisted by its Korean label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    New,
    AwaitingPayment,
    Paid,
    Preparing,
    AwaitingShipment,
    ShipmentOnHold,
    Shipping,
    Delivered,
    Cancelled,
    CancelCompleted,
    Returned,
    ReturnCompleted,
    Exchanged,
    ExchangeCompleted,
    /// Channel code with no translation; stored verbatim.
    Other(String),
}

impl OrderStatus {
    const LABELS: [(OrderStatus, &'static str); 14] = [
        (OrderStatus::New, "신규주문"),
        (OrderStatus::AwaitingPayment, "입금전"),
        (OrderStatus::Paid, "결제완료"),
        (OrderStatus::Preparing, "상품준비중"),
        (OrderStatus::AwaitingShipment, "배송대기"),
        (OrderStatus::ShipmentOnHold, "배송보류"),
        (OrderStatus::Shipping, "배송중"),
        (OrderStatus::Delivered, "배송완료"),
        (OrderStatus::Cancelled, "취소"),
        (OrderStatus::CancelCompleted, "취소완료"),
        (OrderStatus::Returned, "반품"),
        (OrderStatus::ReturnCompleted, "반품완료"),
        (OrderStatus::Exchanged, "교환"),
        (OrderStatus::ExchangeCompleted, "교환완료"),
    ];

    pub fn label(&self) -> &str {
        if let OrderStatus::Other(raw) = self {
            return raw;
        }
        Self::LABELS
            .iter()
            .find(|(status, _)| status == self)
            .map(|(_, label)| *label)
            .unwrap_or_default()
    }

    /// Parses a stored label back into a status.
    pub fn from_label(label: &str) -> Self {
        Self::LABELS
            .iter()
            .find(|(_, l)| *l == label)
            .map(|(status, _)| status.clone())
            .unwrap_or_else(|| OrderStatus::Other(label.to_string()))
    }

    /// Statuses whose arrival triggers an inventory deduction.
    pub fn is_deduct_eligible(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Preparing)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The persisted unit of work: one item of one channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalOrderLine {
    pub uniq: String,
    pub status: OrderStatus,
    pub channel: String,
    pub channel_order_no: String,
    pub channel_product_id: i64,
    pub channel_variant_code: Option<String>,
    /// Channel-native product code, before SKU resolution.
    pub sku_code: Option<String>,
    pub resolved_sku: Option<String>,
    pub product_name: Option<String>,
    pub option_label: Option<String>,
    pub quantity: i64,
    pub sales_amount: f64,
    pub discount_amount: f64,
    pub line_payment_amount: f64,
    pub orderer_name: Option<String>,
    pub orderer_phone: Option<String>,
    pub orderer_email: Option<String>,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_cellphone: Option<String>,
    pub receiver_address1: Option<String>,
    pub receiver_address2: Option<String>,
    pub receiver_zipcode: Option<String>,
    pub shipping_message: Option<String>,
    pub tracking_no: Option<String>,
    pub carrier_name: Option<String>,
    pub ordered_at: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
}

/// Builds the composite natural key of an order line.
///
/// # Examples
///
/// ```
/// use ordersync_core::models::order_line_uniq;
///
/// assert_eq!(
///     order_line_uniq("cafe24", "20250101-001", "20250101-001-01"),
///     "cafe24_20250101-001_20250101-001-01"
/// );
/// ```
pub fn order_line_uniq(channel: &str, order_id: &str, line_item_code: &str) -> String {
    format!("{}_{}_{}", channel, order_id, line_item_code)
}

/// Whether an upsert created the row or overwrote an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// `previous_status` is the status stored before this upsert.
    Updated { previous_status: OrderStatus },
}

impl UpsertOutcome {
    pub fn was_insert(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted)
    }
}

/// What the store hands back after an upsert, enough for downstream steps
/// to avoid re-reading the row.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedLine {
    pub id: Uuid,
    pub uniq: String,
    pub outcome: UpsertOutcome,
    pub status: OrderStatus,
    pub channel: String,
    pub receiver_name: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_cellphone: Option<String>,
    pub line_payment_amount: f64,
    pub ordered_at: Option<DateTime<Utc>>,
}

/// Latest known stock for a SKU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    pub sku: String,
    pub current_stock: i64,
    pub previous_stock: i64,
    pub stock_change: i64,
    pub synced_at: DateTime<Utc>,
}

/// A new inventory snapshot produced by a deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryRecord {
    pub sku: String,
    pub current_stock: i64,
    pub previous_stock: i64,
    pub stock_change: i64,
    pub synced_at: DateTime<Utc>,
    /// Human-readable cause, recorded in the history table.
    pub reason: String,
    /// `uniq` of the order line that caused the change.
    pub reference_id: String,
}

/// (channel product id, channel variant code) → canonical SKU for one run.
#[derive(Debug, Clone, Default)]
pub struct SkuResolutionTable {
    entries: HashMap<(i64, String), String>,
}

impl SkuResolutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, product_id: i64, variant_code: impl Into<String>, sku: impl Into<String>) {
        self.entries
            .insert((product_id, variant_code.into()), sku.into());
    }

    pub fn resolve(&self, product_id: i64, variant_code: &str) -> Option<&str> {
        self.entries
            .get(&(product_id, variant_code.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(i64, String, String)> for SkuResolutionTable {
    fn from_iter<T: IntoIterator<Item = (i64, String, String)>>(iter: T) -> Self {
        let mut table = Self::new();
        for (product_id, variant_code, sku) in iter {
            table.insert(product_id, variant_code, sku);
        }
        table
    }
}

/// Inclusive order-date window for one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::InvalidDateRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Builds a range from optional `YYYY-MM-DD` strings.
    ///
    /// Missing or blank values default to `end = today` and
    /// `start = end - lookback_days`.
    pub fn from_inputs(
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
        lookback_days: i64,
    ) -> Result<Self, AppError> {
        let end = match parse_date(end)? {
            Some(d) => d,
            None => today,
        };
        let start = match parse_date(start)? {
            Some(d) => d,
            None => end - chrono::Duration::days(lookback_days),
        };
        Self::new(start, end)
    }
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::InvalidDateRange(format!("'{}' is not YYYY-MM-DD", s))),
    }
}
