//! Channel order → canonical order line.
//!
//! Everything here is pure: no I/O, no clock reads except through the
//! `synced_at` value carried by [`MappingContext`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{
    is_blank, order_line_uniq, CanonicalOrderLine, ChannelOrder, ChannelOrderItem, OrderStatus,
    SkuResolutionTable,
};

/// Translates a Cafe24 order status code.
///
/// Unknown codes pass through verbatim; an empty code means the order has
/// not been given a status yet.
///
/// # Examples
///
/// ```
/// use ordersync_core::mapper::translate_status;
/// use ordersync_core::models::OrderStatus;
///
/// assert_eq!(translate_status("N10"), OrderStatus::Paid);
/// assert_eq!(translate_status("Z99"), OrderStatus::Other("Z99".to_string()));
/// ```
pub fn translate_status(code: &str) -> OrderStatus {
    match code.trim() {
        "" => OrderStatus::New,
        "N00" => OrderStatus::AwaitingPayment,
        "N10" => OrderStatus::Paid,
        "N20" => OrderStatus::Preparing,
        "N21" => OrderStatus::AwaitingShipment,
        "N22" => OrderStatus::ShipmentOnHold,
        "N30" => OrderStatus::Shipping,
        "N40" => OrderStatus::Delivered,
        "C00" => OrderStatus::Cancelled,
        "C10" => OrderStatus::CancelCompleted,
        "R00" => OrderStatus::Returned,
        "R10" => OrderStatus::ReturnCompleted,
        "E00" => OrderStatus::Exchanged,
        "E10" => OrderStatus::ExchangeCompleted,
        other => OrderStatus::Other(other.to_string()),
    }
}

/// Channel carrier code → carrier display name.
#[derive(Debug, Clone, Default)]
pub struct CarrierTable {
    names: HashMap<String, String>,
}

impl CarrierTable {
    /// Carrier codes used by Cafe24. `0001` is the legacy Hanjin code.
    pub fn cafe24() -> Self {
        let codes = [
            ("0001", "한진택배"),
            ("0004", "CJ대한통운"),
            ("0005", "로젠택배"),
            ("0006", "우체국택배"),
            ("0008", "롯데택배"),
            ("0011", "일양로지스"),
            ("0017", "천일택배"),
            ("0018", "한진택배"),
            ("0022", "대신택배"),
            ("0023", "경동택배"),
            ("0032", "합동택배"),
            ("0046", "CU편의점택배"),
            ("0047", "GS편의점택배"),
            ("0000", "기타"),
        ];
        Self {
            names: codes
                .into_iter()
                .map(|(code, name)| (code.to_string(), name.to_string()))
                .collect(),
        }
    }

    pub fn name_for(&self, code: Option<&str>) -> Option<&str> {
        let code = code.map(str::trim).filter(|c| !c.is_empty())?;
        self.names.get(code).map(String::as_str)
    }
}

/// Lookup tables and clock value shared by every line of one run.
#[derive(Debug, Clone, Copy)]
pub struct MappingContext<'a> {
    pub channel: &'a str,
    pub skus: &'a SkuResolutionTable,
    pub carriers: &'a CarrierTable,
    pub synced_at: DateTime<Utc>,
}

/// Maps one item of a channel order into a canonical line. Never fails.
///
/// The payment amount is derived per line as `price * quantity - discount`;
/// the order-level paid total is never used because it covers every line.
pub fn map_line(
    ctx: &MappingContext<'_>,
    order: &ChannelOrder,
    item: &ChannelOrderItem,
) -> CanonicalOrderLine {
    let receiver = order.receiver();
    let sales_amount = item.product_price * item.quantity as f64;
    let discount_amount = item.additional_discount_price;

    let resolved_sku = item
        .variant_code
        .as_deref()
        .and_then(|variant| ctx.skus.resolve(item.product_no, variant))
        .map(str::to_string);

    CanonicalOrderLine {
        uniq: order_line_uniq(ctx.channel, &order.order_id, &item.order_item_code),
        status: translate_status(&item.order_status),
        channel: ctx.channel.to_string(),
        channel_order_no: order.order_id.clone(),
        channel_product_id: item.product_no,
        channel_variant_code: non_blank(item.variant_code.as_deref()),
        sku_code: non_blank(item.product_code.as_deref()),
        resolved_sku,
        product_name: non_blank(item.product_name.as_deref()),
        option_label: non_blank(item.option_value.as_deref()),
        quantity: item.quantity,
        sales_amount,
        discount_amount,
        line_payment_amount: sales_amount - discount_amount,
        orderer_name: first_present(&[order.order_name.as_deref(), order.buyer_name.as_deref()]),
        orderer_phone: first_present(&[
            order.order_phone.as_deref(),
            order.buyer_cellphone.as_deref(),
            order.buyer_phone.as_deref(),
        ]),
        orderer_email: first_present(&[order.order_email.as_deref(), order.buyer_email.as_deref()]),
        receiver_name: non_blank(receiver.name.as_deref()),
        receiver_phone: non_blank(receiver.phone.as_deref()),
        receiver_cellphone: non_blank(receiver.cellphone.as_deref()),
        receiver_address1: non_blank(receiver.address1.as_deref()),
        receiver_address2: non_blank(receiver.address2.as_deref()),
        receiver_zipcode: non_blank(receiver.zipcode.as_deref()),
        shipping_message: non_blank(receiver.shipping_message.as_deref()),
        tracking_no: non_blank(item.tracking_no.as_deref()),
        carrier_name: ctx
            .carriers
            .name_for(item.shipping_company_code.as_deref())
            .map(str::to_string),
        ordered_at: order.order_date,
        synced_at: ctx.synced_at,
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    if is_blank(value) {
        None
    } else {
        value.map(|v| v.trim().to_string())
    }
}

fn first_present(candidates: &[Option<&str>]) -> Option<String> {
    candidates.iter().find_map(|c| non_blank(*c))
}
