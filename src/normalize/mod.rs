pub mod coerce;

use chrono::Datelike;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::table::{Table, Value};
use self::coerce::{coerce_qty, parse_money, value_to_date};

// Semantic source columns.
pub const COL_ORDER_ID: &str = "order_id";
pub const COL_ORDER_ID_ALT: &str = "id";
pub const COL_ORDER_DATE: &str = "order_date";
pub const COL_CUSTOMER_ID: &str = "customer_id";
pub const COL_SKU_NAME: &str = "sku_name";
pub const COL_CATEGORY: &str = "category";
pub const COL_QTY: &str = "qty_ordered";
pub const COL_BEFORE_DISCOUNT: &str = "before_discount";
pub const COL_AFTER_DISCOUNT: &str = "after_discount";
pub const COL_COGS: &str = "cogs";
pub const COL_PAYMENT_METHOD: &str = "payment_method";
pub const COL_REGISTERED_DATE: &str = "registered_date";

// Derived columns, written once by `normalize`.
pub const COL_REVENUE: &str = "revenue";
pub const COL_PROFIT: &str = "profit";
pub const COL_YEAR: &str = "year";
pub const COL_MONTH_NAME: &str = "month_name";
pub const COL_ORDER_PERIOD: &str = "order_period";
pub const COL_IS_NEW_CUSTOMER: &str = "is_new_customer";

static RECOGNIZED_COLUMNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        COL_ORDER_ID,
        COL_ORDER_ID_ALT,
        COL_ORDER_DATE,
        COL_CUSTOMER_ID,
        COL_SKU_NAME,
        COL_CATEGORY,
        COL_QTY,
        COL_BEFORE_DISCOUNT,
        COL_AFTER_DISCOUNT,
        COL_COGS,
        COL_PAYMENT_METHOD,
        COL_REGISTERED_DATE,
        COL_REVENUE,
        COL_PROFIT,
        COL_YEAR,
        COL_MONTH_NAME,
        COL_ORDER_PERIOD,
        COL_IS_NEW_CUSTOMER,
    ])
});

/// A feature an aggregation may require from the source schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Revenue,
    Profit,
    Dates,
    Quantity,
    Category,
    Product,
    PaymentMethod,
    Customer,
    Orders,
    Segmentation,
}

/// Which optional features the source schema supports, decided once at
/// normalization time. Aggregations consult this instead of probing for
/// columns themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCapabilities {
    pub has_revenue: bool,
    pub has_profit: bool,
    pub has_dates: bool,
    pub has_quantity: bool,
    pub has_category: bool,
    pub has_product: bool,
    pub has_payment_method: bool,
    pub has_customer: bool,
    pub has_orders: bool,
    pub has_segmentation: bool,
}

impl SchemaCapabilities {
    pub fn has(&self, cap: Capability) -> bool {
        match cap {
            Capability::Revenue => self.has_revenue,
            Capability::Profit => self.has_profit,
            Capability::Dates => self.has_dates,
            Capability::Quantity => self.has_quantity,
            Capability::Category => self.has_category,
            Capability::Product => self.has_product,
            Capability::PaymentMethod => self.has_payment_method,
            Capability::Customer => self.has_customer,
            Capability::Orders => self.has_orders,
            Capability::Segmentation => self.has_segmentation,
        }
    }
}

/// The canonical table plus its capability set. Derived once per source
/// load and treated as immutable from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canonical {
    pub table: Table,
    pub caps: SchemaCapabilities,
}

/// Turn a raw string table into the canonical table: drop rows with
/// unparseable order dates, coerce quantities, and add every derived
/// column whose source columns exist. Columns outside the recognized set
/// pass through untouched. Idempotent: re-normalizing a canonical table
/// yields an equal result.
#[tracing::instrument(level = "info", skip(raw), fields(rows_in = raw.len()))]
pub fn normalize(raw: Table) -> Canonical {
    let mut table = raw;
    let rows_in = table.len();

    for col in &table.columns {
        if !RECOGNIZED_COLUMNS.contains(col.as_str()) {
            debug!(column = %col, "passing through unrecognized column");
        }
    }

    // The original export names the order identifier `id`; expose it under
    // the canonical name so downstream code has one spelling to deal with.
    if !table.has_column(COL_ORDER_ID) {
        table.rename_column(COL_ORDER_ID_ALT, COL_ORDER_ID);
    }

    // Row drop: an unparseable order date disqualifies the whole row. Only
    // applies when the column exists at all.
    let mut dates = Vec::new();
    let mut dropped = 0usize;
    if let Some(date_idx) = table.column(COL_ORDER_DATE) {
        let mut kept = Vec::with_capacity(table.len());
        for row in std::mem::take(&mut table.rows) {
            match value_to_date(&row[date_idx]) {
                Some(d) => {
                    dates.push(d);
                    kept.push(row);
                }
                None => dropped += 1,
            }
        }
        table.rows = kept;
    }

    if let Some(qty_idx) = table.column(COL_QTY) {
        for row in table.rows.iter_mut() {
            row[qty_idx] = Value::Int(coerce_qty(&row[qty_idx]));
        }
    }

    // Date-derived columns: every surviving row has all three.
    if table.has_column(COL_ORDER_DATE) {
        let years = dates.iter().map(|d| Value::Int(d.year() as i64)).collect();
        let months = dates
            .iter()
            .map(|d| Value::Str(d.format("%b").to_string()))
            .collect();
        let periods = dates
            .iter()
            .map(|d| Value::Str(format!("{:04}-{:02}", d.year(), d.month())))
            .collect();
        table.set_column(COL_YEAR, years);
        table.set_column(COL_MONTH_NAME, months);
        table.set_column(COL_ORDER_PERIOD, periods);
    }

    // Revenue: after_discount wins whenever that column exists, regardless
    // of its value; before_discount is the fallback. Schema-level choice.
    let revenue_src = [COL_AFTER_DISCOUNT, COL_BEFORE_DISCOUNT]
        .into_iter()
        .find_map(|c| table.column(c));
    if let Some(src_idx) = revenue_src {
        let revenue: Vec<Value> = table
            .rows
            .iter()
            .map(|row| Value::from(parse_money(&row[src_idx])))
            .collect();
        table.set_column(COL_REVENUE, revenue);
    }

    let has_revenue = revenue_src.is_some();
    let has_cogs = table.has_column(COL_COGS);
    if has_revenue && has_cogs {
        let rev_idx = table.column(COL_REVENUE).expect("revenue column just set");
        let cogs_idx = table.column(COL_COGS).expect("cogs column present");
        let profit: Vec<Value> = table
            .rows
            .iter()
            .map(|row| {
                match (row[rev_idx].as_f64(), parse_money(&row[cogs_idx])) {
                    (Some(rev), Some(cogs)) => Value::Float(rev - cogs),
                    _ => Value::Null,
                }
            })
            .collect();
        table.set_column(COL_PROFIT, profit);
    }

    // New/returning classification: registration year equals order year.
    // Missing or unparseable registration date counts as returning.
    let has_dates = table.has_column(COL_ORDER_DATE);
    let has_registered = table.has_column(COL_REGISTERED_DATE);
    if has_dates && has_registered {
        let reg_idx = table
            .column(COL_REGISTERED_DATE)
            .expect("registered_date column present");
        let flags: Vec<Value> = table
            .rows
            .iter()
            .zip(&dates)
            .map(|(row, order_date)| {
                let is_new = value_to_date(&row[reg_idx])
                    .map(|reg| reg.year() == order_date.year())
                    .unwrap_or(false);
                Value::Bool(is_new)
            })
            .collect();
        table.set_column(COL_IS_NEW_CUSTOMER, flags);
    }

    let caps = SchemaCapabilities {
        has_revenue,
        has_profit: has_revenue && has_cogs,
        has_dates,
        has_quantity: table.has_column(COL_QTY),
        has_category: table.has_column(COL_CATEGORY),
        has_product: table.has_column(COL_SKU_NAME),
        has_payment_method: table.has_column(COL_PAYMENT_METHOD),
        has_customer: table.has_column(COL_CUSTOMER_ID),
        has_orders: table.has_column(COL_ORDER_ID),
        has_segmentation: has_dates && has_registered,
    };

    info!(
        rows_in,
        dropped,
        rows_out = table.len(),
        ?caps,
        "normalized table"
    );

    Canonical { table, caps }
}
