//! Scalar summaries and selection helpers: KPI totals, per-customer
//! averages, period-over-period change, and best/worst row lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::aggregate::{select, FilterSelection, Grouped, ViewOutcome};
use crate::normalize::{
    Canonical, Capability, COL_CUSTOMER_ID, COL_ORDER_ID, COL_ORDER_PERIOD, COL_PROFIT,
    COL_REVENUE,
};
use crate::table::{Table, Value};

/// Headline totals over the filtered rows. `None` means the source schema
/// cannot express the measure; `Some(0)` is real, zero data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiTotals {
    pub revenue: Option<f64>,
    pub orders: Option<u64>,
    pub customers: Option<u64>,
    pub profit: Option<f64>,
}

pub fn kpi_totals(canonical: &Canonical, filters: &FilterSelection) -> KpiTotals {
    let caps = canonical.caps;
    let table = &canonical.table;
    let rev_idx = table.column(COL_REVENUE);
    let profit_idx = table.column(COL_PROFIT);
    let oid_idx = table.column(COL_ORDER_ID);
    let cust_idx = table.column(COL_CUSTOMER_ID);

    let mut revenue = 0.0;
    let mut profit = 0.0;
    let mut orders: HashSet<String> = HashSet::new();
    let mut customers: HashSet<String> = HashSet::new();
    for row in select(canonical, filters) {
        if let Some(rev) = rev_idx.and_then(|i| row[i].as_f64()) {
            revenue += rev;
        }
        if let Some(p) = profit_idx.and_then(|i| row[i].as_f64()) {
            profit += p;
        }
        if let Some(oid) = oid_idx.and_then(|i| row[i].id_key()) {
            orders.insert(oid);
        }
        if let Some(cid) = cust_idx.and_then(|i| row[i].id_key()) {
            customers.insert(cid);
        }
    }

    KpiTotals {
        revenue: caps.has_revenue.then_some(revenue),
        orders: caps.has_orders.then_some(orders.len() as u64),
        customers: caps.has_customer.then_some(customers.len() as u64),
        profit: caps.has_profit.then_some(profit),
    }
}

/// Mean distinct orders and mean revenue per customer, over the filtered
/// rows. Zero customers short-circuits both means to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerAverages {
    pub avg_orders_per_customer: f64,
    /// `None` when the schema has no revenue column.
    pub avg_revenue_per_customer: Option<f64>,
}

#[derive(Default)]
struct CustomerAcc {
    orders: HashSet<String>,
    revenue: f64,
}

pub fn per_customer_stats(
    canonical: &Canonical,
    filters: &FilterSelection,
) -> ViewOutcome<CustomerAverages> {
    let caps = canonical.caps;
    if !caps.has_customer {
        return ViewOutcome::Unavailable {
            missing: Capability::Customer,
        };
    }
    if !caps.has_orders {
        return ViewOutcome::Unavailable {
            missing: Capability::Orders,
        };
    }
    let table = &canonical.table;
    let cust_idx = table.column(COL_CUSTOMER_ID).expect("customer capability");
    let oid_idx = table.column(COL_ORDER_ID).expect("orders capability");
    let rev_idx = table.column(COL_REVENUE);

    let mut groups: Grouped<String, CustomerAcc> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(cid) = row[cust_idx].id_key() else {
            continue;
        };
        let acc = groups.entry(cid);
        if let Some(oid) = row[oid_idx].id_key() {
            acc.orders.insert(oid);
        }
        if let Some(rev) = rev_idx.and_then(|i| row[i].as_f64()) {
            acc.revenue += rev;
        }
    }

    let pairs = groups.into_pairs();
    let n = pairs.len();
    if n == 0 {
        return ViewOutcome::Ready(CustomerAverages {
            avg_orders_per_customer: 0.0,
            avg_revenue_per_customer: caps.has_revenue.then_some(0.0),
        });
    }
    let total_orders: usize = pairs.iter().map(|(_, acc)| acc.orders.len()).sum();
    let total_revenue: f64 = pairs.iter().map(|(_, acc)| acc.revenue).sum();
    ViewOutcome::Ready(CustomerAverages {
        avg_orders_per_customer: total_orders as f64 / n as f64,
        avg_revenue_per_customer: caps
            .has_revenue
            .then_some(total_revenue / n as f64),
    })
}

/// Month-over-month revenue change, chronological. The first period's
/// change is null, as is any period following zero revenue. Fewer than two
/// periods is not enough to compare.
pub fn period_over_period(
    canonical: &Canonical,
    filters: &FilterSelection,
) -> ViewOutcome<Table> {
    if !canonical.caps.has_dates {
        return ViewOutcome::Unavailable {
            missing: Capability::Dates,
        };
    }
    if !canonical.caps.has_revenue {
        return ViewOutcome::Unavailable {
            missing: Capability::Revenue,
        };
    }
    let table = &canonical.table;
    let period_idx = table.column(COL_ORDER_PERIOD).expect("dates capability");
    let rev_idx = table.column(COL_REVENUE).expect("revenue capability");

    let mut groups: Grouped<String, f64> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(period) = row[period_idx].as_str() else {
            continue;
        };
        let total = groups.entry(period.to_string());
        if let Some(rev) = row[rev_idx].as_f64() {
            *total += rev;
        }
    }

    let mut pairs = groups.into_pairs();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    if pairs.len() < 2 {
        return ViewOutcome::InsufficientData;
    }

    let mut out = Table::new(vec![COL_ORDER_PERIOD, "revenue", "pct_change"]);
    let mut prev: Option<f64> = None;
    for (period, revenue) in pairs {
        let pct = match prev {
            Some(p) if p != 0.0 => Value::Float((revenue - p) / p * 100.0),
            _ => Value::Null,
        };
        out.push_row(vec![Value::Str(period), Value::Float(revenue), pct]);
        prev = Some(revenue);
    }
    ViewOutcome::Ready(out)
}

/// Row with the largest value in `measure`. First occurrence wins ties;
/// rows whose measure is null never win. `None` on an empty table or a
/// missing column.
pub fn best_by<'a>(table: &'a Table, measure: &str) -> Option<&'a Vec<Value>> {
    extreme_by(table, measure, |candidate, best| candidate > best)
}

/// Row with the smallest value in `measure`, same tie and null rules as
/// [`best_by`].
pub fn worst_by<'a>(table: &'a Table, measure: &str) -> Option<&'a Vec<Value>> {
    extreme_by(table, measure, |candidate, best| candidate < best)
}

fn extreme_by<'a>(
    table: &'a Table,
    measure: &str,
    beats: impl Fn(f64, f64) -> bool,
) -> Option<&'a Vec<Value>> {
    let idx = table.column(measure)?;
    let mut winner: Option<(&'a Vec<Value>, f64)> = None;
    for row in &table.rows {
        let Some(v) = row.get(idx).and_then(Value::as_f64) else {
            continue;
        };
        match winner {
            Some((_, current)) if !beats(v, current) => {}
            _ => winner = Some((row, v)),
        }
    }
    winner.map(|(row, _)| row)
}
