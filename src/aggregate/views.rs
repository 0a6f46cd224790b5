//! Grouped result tables. Every view takes the canonical table and the
//! active filter set, checks its required capabilities up front, and
//! returns a plain [`Table`] for presentation. An empty filtered input
//! produces an empty (but valid) table.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::aggregate::{select, Dimension, EntityPick, FilterSelection, Grouped, ViewOutcome};
use crate::normalize::{
    Canonical, Capability, COL_CATEGORY, COL_IS_NEW_CUSTOMER, COL_ORDER_ID, COL_ORDER_PERIOD,
    COL_PAYMENT_METHOD, COL_QTY, COL_REVENUE, COL_SKU_NAME, COL_PROFIT, COL_CUSTOMER_ID,
};
use crate::table::{Table, Value};

fn col(canonical: &Canonical, name: &str) -> usize {
    canonical
        .table
        .column(name)
        .expect("capability check guarantees column")
}

macro_rules! require {
    ($caps:expr, $cap:expr) => {
        if !$caps.has($cap) {
            return ViewOutcome::Unavailable { missing: $cap };
        }
    };
}

/// Distinct orders per payment method, busiest method first.
pub fn payment_share(canonical: &Canonical, filters: &FilterSelection) -> ViewOutcome<Table> {
    require!(canonical.caps, Capability::PaymentMethod);
    require!(canonical.caps, Capability::Orders);
    let pay_idx = col(canonical, COL_PAYMENT_METHOD);
    let oid_idx = col(canonical, COL_ORDER_ID);

    let mut groups: Grouped<String, HashSet<String>> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(method) = row[pay_idx].as_str() else {
            continue;
        };
        let orders = groups.entry(method.to_string());
        if let Some(oid) = row[oid_idx].id_key() {
            orders.insert(oid);
        }
    }

    let mut pairs = groups.into_pairs();
    pairs.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut out = Table::new(vec![COL_PAYMENT_METHOD, "orders"]);
    for (method, orders) in pairs {
        out.push_row(vec![Value::Str(method), Value::Int(orders.len() as i64)]);
    }
    ViewOutcome::Ready(out)
}

#[derive(Default)]
struct TrendAcc {
    orders: HashSet<String>,
    revenue: f64,
}

/// Orders, revenue and average order value per calendar month, in
/// chronological order. AOV is computed on the aggregated row and is 0
/// for a month without orders.
pub fn monthly_trend(canonical: &Canonical, filters: &FilterSelection) -> ViewOutcome<Table> {
    require!(canonical.caps, Capability::Dates);
    require!(canonical.caps, Capability::Orders);
    require!(canonical.caps, Capability::Revenue);
    let period_idx = col(canonical, COL_ORDER_PERIOD);
    let oid_idx = col(canonical, COL_ORDER_ID);
    let rev_idx = col(canonical, COL_REVENUE);

    let mut groups: Grouped<String, TrendAcc> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(period) = row[period_idx].as_str() else {
            continue;
        };
        let acc = groups.entry(period.to_string());
        if let Some(oid) = row[oid_idx].id_key() {
            acc.orders.insert(oid);
        }
        if let Some(rev) = row[rev_idx].as_f64() {
            acc.revenue += rev;
        }
    }

    let mut pairs = groups.into_pairs();
    // Periods are "YYYY-MM", so lexicographic order is chronological.
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = Table::new(vec![COL_ORDER_PERIOD, "orders", "revenue", "average_order_value"]);
    for (period, acc) in pairs {
        let orders = acc.orders.len() as i64;
        let aov = if orders == 0 {
            0.0
        } else {
            acc.revenue / orders as f64
        };
        out.push_row(vec![
            Value::Str(period),
            Value::Int(orders),
            Value::Float(acc.revenue),
            Value::Float(aov),
        ]);
    }
    ViewOutcome::Ready(out)
}

#[derive(Default)]
struct ProductAcc {
    category: Option<String>,
    revenue: f64,
    profit: f64,
    quantity: i64,
    customers: HashSet<String>,
    orders: HashSet<String>,
}

/// Per-product totals ranked by revenue. Measures whose source column is
/// absent come back as null cells; the ranking itself only needs product,
/// revenue and orders. `top_n` truncates after sorting.
pub fn product_performance(
    canonical: &Canonical,
    filters: &FilterSelection,
    top_n: Option<usize>,
) -> ViewOutcome<Table> {
    require!(canonical.caps, Capability::Product);
    require!(canonical.caps, Capability::Revenue);
    require!(canonical.caps, Capability::Orders);
    let caps = canonical.caps;
    let sku_idx = col(canonical, COL_SKU_NAME);
    let rev_idx = col(canonical, COL_REVENUE);
    let oid_idx = col(canonical, COL_ORDER_ID);
    let cat_idx = canonical.table.column(COL_CATEGORY);
    let profit_idx = canonical.table.column(COL_PROFIT);
    let qty_idx = canonical.table.column(COL_QTY);
    let cust_idx = canonical.table.column(COL_CUSTOMER_ID);

    let mut groups: Grouped<String, ProductAcc> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(sku) = row[sku_idx].as_str() else {
            continue;
        };
        let acc = groups.entry(sku.to_string());
        if acc.category.is_none() {
            acc.category = cat_idx.and_then(|i| row[i].as_str().map(str::to_string));
        }
        if let Some(rev) = row[rev_idx].as_f64() {
            acc.revenue += rev;
        }
        if let Some(p) = profit_idx.and_then(|i| row[i].as_f64()) {
            acc.profit += p;
        }
        if let Some(q) = qty_idx.and_then(|i| row[i].as_i64()) {
            acc.quantity += q;
        }
        if let Some(cid) = cust_idx.and_then(|i| row[i].id_key()) {
            acc.customers.insert(cid);
        }
        if let Some(oid) = row[oid_idx].id_key() {
            acc.orders.insert(oid);
        }
    }

    let mut pairs = groups.into_pairs();
    pairs.sort_by(|a, b| b.1.revenue.total_cmp(&a.1.revenue));

    let mut out = Table::new(vec![
        COL_SKU_NAME,
        COL_CATEGORY,
        "revenue",
        "profit",
        "quantity",
        "customers",
        "orders",
    ]);
    for (sku, acc) in pairs {
        out.push_row(vec![
            Value::Str(sku),
            Value::from(acc.category),
            Value::Float(acc.revenue),
            if caps.has_profit {
                Value::Float(acc.profit)
            } else {
                Value::Null
            },
            if caps.has_quantity {
                Value::Int(acc.quantity)
            } else {
                Value::Null
            },
            if caps.has_customer {
                Value::Int(acc.customers.len() as i64)
            } else {
                Value::Null
            },
            Value::Int(acc.orders.len() as i64),
        ]);
    }
    if let Some(n) = top_n {
        out.truncate(n);
    }
    ViewOutcome::Ready(out)
}

/// Revenue per category, biggest share first. `top_n` truncates after
/// sorting for pie/share display.
pub fn category_revenue_share(
    canonical: &Canonical,
    filters: &FilterSelection,
    top_n: Option<usize>,
) -> ViewOutcome<Table> {
    require!(canonical.caps, Capability::Category);
    require!(canonical.caps, Capability::Revenue);
    let cat_idx = col(canonical, COL_CATEGORY);
    let rev_idx = col(canonical, COL_REVENUE);

    let mut groups: Grouped<String, f64> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(category) = row[cat_idx].as_str() else {
            continue;
        };
        let total = groups.entry(category.to_string());
        if let Some(rev) = row[rev_idx].as_f64() {
            *total += rev;
        }
    }

    let mut pairs = groups.into_pairs();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut out = Table::new(vec![COL_CATEGORY, "revenue"]);
    for (category, revenue) in pairs {
        out.push_row(vec![Value::Str(category), Value::Float(revenue)]);
    }
    if let Some(n) = top_n {
        out.truncate(n);
    }
    ViewOutcome::Ready(out)
}

/// Monthly revenue series for each picked entity, for multi-series
/// display. Periods ascend; within a period, series follow pick order.
pub fn entity_trend(
    canonical: &Canonical,
    filters: &FilterSelection,
    pick: &EntityPick,
) -> ViewOutcome<Table> {
    if pick.is_empty() {
        return ViewOutcome::NothingSelected;
    }
    trend_for_entities(canonical, filters, pick.dimension, &pick.values)
}

/// Head-to-head monthly revenue for exactly two entities. A pick with any
/// other number of distinct entities is treated as an incomplete selection.
pub fn compare_entities(
    canonical: &Canonical,
    filters: &FilterSelection,
    pick: &EntityPick,
) -> ViewOutcome<Table> {
    let mut seen = HashSet::new();
    let distinct: Vec<String> = pick
        .values
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect();
    if distinct.len() != 2 {
        debug!(picked = pick.values.len(), "comparison needs exactly two entities");
        return ViewOutcome::NothingSelected;
    }
    trend_for_entities(canonical, filters, pick.dimension, &distinct)
}

fn trend_for_entities(
    canonical: &Canonical,
    filters: &FilterSelection,
    dimension: Dimension,
    values: &[String],
) -> ViewOutcome<Table> {
    require!(canonical.caps, Capability::Dates);
    require!(canonical.caps, Capability::Revenue);
    require!(canonical.caps, dimension.capability());
    let period_idx = col(canonical, COL_ORDER_PERIOD);
    let rev_idx = col(canonical, COL_REVENUE);
    let dim_idx = col(canonical, dimension.column());

    let wanted: HashMap<&str, usize> = values
        .iter()
        .enumerate()
        .map(|(i, v)| (v.as_str(), i))
        .collect();

    let mut groups: Grouped<(String, String), f64> = Grouped::new();
    for row in select(canonical, filters) {
        let Some(entity) = row[dim_idx].as_str() else {
            continue;
        };
        if !wanted.contains_key(entity) {
            continue;
        }
        let Some(period) = row[period_idx].as_str() else {
            continue;
        };
        let total = groups.entry((period.to_string(), entity.to_string()));
        if let Some(rev) = row[rev_idx].as_f64() {
            *total += rev;
        }
    }

    let mut pairs = groups.into_pairs();
    pairs.sort_by(|a, b| {
        a.0 .0
            .cmp(&b.0 .0)
            .then_with(|| wanted[a.0 .1.as_str()].cmp(&wanted[b.0 .1.as_str()]))
    });

    let mut out = Table::new(vec![COL_ORDER_PERIOD, dimension.column(), "revenue"]);
    for ((period, entity), revenue) in pairs {
        out.push_row(vec![
            Value::Str(period),
            Value::Str(entity),
            Value::Float(revenue),
        ]);
    }
    ViewOutcome::Ready(out)
}

/// New vs returning customer row counts. Both segments are always present,
/// zero counts included, new first.
pub fn customer_segmentation(
    canonical: &Canonical,
    filters: &FilterSelection,
) -> ViewOutcome<Table> {
    require!(canonical.caps, Capability::Segmentation);
    let flag_idx = col(canonical, COL_IS_NEW_CUSTOMER);

    let mut new_rows = 0i64;
    let mut returning_rows = 0i64;
    for row in select(canonical, filters) {
        match row[flag_idx].as_bool() {
            Some(true) => new_rows += 1,
            Some(false) => returning_rows += 1,
            None => {}
        }
    }

    let mut out = Table::new(vec!["segment", "count"]);
    out.push_row(vec![Value::from("new"), Value::Int(new_rows)]);
    out.push_row(vec![Value::from("returning"), Value::Int(returning_rows)]);
    ViewOutcome::Ready(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load_csv;
    use crate::normalize::normalize;
    use std::io::Cursor;

    fn fixture() -> Canonical {
        let csv = "id,order_date,customer_id,sku_name,category,qty_ordered,after_discount,cogs,payment_method,registered_date\n\
                   O1,2022-01-05,C1,Phone,Gadgets,1,100,60,card,2022-01-01\n\
                   O1,2022-01-05,C1,Case,Gadgets,2,20,5,card,2022-01-01\n\
                   O2,2022-01-20,C2,Shirt,Apparel,1,50,20,cash,2021-06-01\n\
                   O3,2022-02-10,C1,Phone,Gadgets,1,100,60,card,2022-01-01\n\
                   O4,2022-03-15,C3,Shirt,Apparel,3,150,90,wallet,2022-02-01\n";
        normalize(load_csv(Cursor::new(csv)).unwrap())
    }

    #[test]
    fn test_payment_share_ordering_and_distinct_orders() {
        let c = fixture();
        let t = payment_share(&c, &FilterSelection::all()).ready().unwrap();
        assert_eq!(t.columns, vec!["payment_method", "orders"]);
        // card covers O1 (two rows) and O3 → 2 distinct orders.
        assert_eq!(t.rows[0], vec![Value::from("card"), Value::Int(2)]);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_payment_share_unavailable_without_column() {
        let c = normalize(load_csv(Cursor::new("id,after_discount\n1,10\n")).unwrap());
        assert_eq!(
            payment_share(&c, &FilterSelection::all()),
            ViewOutcome::Unavailable {
                missing: Capability::PaymentMethod
            }
        );
    }

    #[test]
    fn test_monthly_trend_chronological_with_aov() {
        let c = fixture();
        let t = monthly_trend(&c, &FilterSelection::all()).ready().unwrap();
        assert_eq!(
            t.columns,
            vec!["order_period", "orders", "revenue", "average_order_value"]
        );
        assert_eq!(t.value(0, "order_period"), Some(&Value::Str("2022-01".into())));
        // Jan: orders O1+O2 = 2 distinct, revenue 170, AOV 85.
        assert_eq!(t.value(0, "orders"), Some(&Value::Int(2)));
        assert_eq!(t.value(0, "revenue"), Some(&Value::Float(170.0)));
        assert_eq!(t.value(0, "average_order_value"), Some(&Value::Float(85.0)));
        assert_eq!(t.value(2, "order_period"), Some(&Value::Str("2022-03".into())));
    }

    #[test]
    fn test_monthly_trend_aov_zero_when_no_orders() {
        // Order id cells are empty, so the month groups with 0 distinct
        // orders; AOV must be 0, not a division fault.
        let csv = "id,order_date,after_discount\n,2022-01-05,100\n,2022-01-09,50\n";
        let c = normalize(load_csv(Cursor::new(csv)).unwrap());
        let t = monthly_trend(&c, &FilterSelection::all()).ready().unwrap();
        assert_eq!(t.value(0, "orders"), Some(&Value::Int(0)));
        assert_eq!(t.value(0, "revenue"), Some(&Value::Float(150.0)));
        assert_eq!(t.value(0, "average_order_value"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn test_monthly_trend_empty_filter_result_is_empty_table() {
        let c = fixture();
        let f = FilterSelection::all().with_years([1999]);
        let t = monthly_trend(&c, &f).ready().unwrap();
        assert!(t.is_empty());
    }

    #[test]
    fn test_product_performance_ranking() {
        let c = fixture();
        let t = product_performance(&c, &FilterSelection::all(), None)
            .ready()
            .unwrap();
        // Phone 200, Shirt 200, Case 20 — tie keeps first-occurrence order.
        assert_eq!(t.value(0, "sku_name"), Some(&Value::Str("Phone".into())));
        assert_eq!(t.value(1, "sku_name"), Some(&Value::Str("Shirt".into())));
        assert_eq!(t.value(2, "sku_name"), Some(&Value::Str("Case".into())));
        assert_eq!(t.value(0, "category"), Some(&Value::Str("Gadgets".into())));
        assert_eq!(t.value(0, "revenue"), Some(&Value::Float(200.0)));
        assert_eq!(t.value(0, "profit"), Some(&Value::Float(80.0)));
        assert_eq!(t.value(0, "quantity"), Some(&Value::Int(2)));
        assert_eq!(t.value(0, "customers"), Some(&Value::Int(1)));
        assert_eq!(t.value(0, "orders"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_top_n_is_prefix_of_larger_top_n() {
        let c = fixture();
        let f = FilterSelection::all();
        let top2 = product_performance(&c, &f, Some(2)).ready().unwrap();
        let top3 = product_performance(&c, &f, Some(3)).ready().unwrap();
        assert_eq!(top2.rows.as_slice(), &top3.rows[..2]);
    }

    #[test]
    fn test_product_performance_null_cells_without_optional_caps() {
        let csv = "id,sku_name,after_discount\nO1,Phone,100\n";
        let c = normalize(load_csv(Cursor::new(csv)).unwrap());
        let t = product_performance(&c, &FilterSelection::all(), None)
            .ready()
            .unwrap();
        assert_eq!(t.value(0, "profit"), Some(&Value::Null));
        assert_eq!(t.value(0, "quantity"), Some(&Value::Null));
        assert_eq!(t.value(0, "customers"), Some(&Value::Null));
        assert_eq!(t.value(0, "revenue"), Some(&Value::Float(100.0)));
    }

    #[test]
    fn test_category_revenue_share_top_n() {
        let c = fixture();
        let t = category_revenue_share(&c, &FilterSelection::all(), Some(1))
            .ready()
            .unwrap();
        assert_eq!(t.len(), 1);
        // Gadgets 220 vs Apparel 200.
        assert_eq!(t.value(0, "category"), Some(&Value::Str("Gadgets".into())));
        assert_eq!(t.value(0, "revenue"), Some(&Value::Float(220.0)));
    }

    #[test]
    fn test_entity_trend_empty_pick_prompts() {
        let c = fixture();
        let pick = EntityPick::new(Dimension::Product, Vec::<String>::new());
        assert_eq!(
            entity_trend(&c, &FilterSelection::all(), &pick),
            ViewOutcome::NothingSelected
        );
    }

    #[test]
    fn test_entity_trend_series() {
        let c = fixture();
        let pick = EntityPick::new(Dimension::Product, ["Phone", "Shirt"]);
        let t = entity_trend(&c, &FilterSelection::all(), &pick)
            .ready()
            .unwrap();
        assert_eq!(t.columns, vec!["order_period", "sku_name", "revenue"]);
        // 2022-01: Phone then Shirt (pick order), then later periods.
        assert_eq!(t.rows[0][0], Value::from("2022-01"));
        assert_eq!(t.rows[0][1], Value::from("Phone"));
        assert_eq!(t.rows[1][1], Value::from("Shirt"));
        assert_eq!(t.rows[2][0], Value::from("2022-02"));
    }

    #[test]
    fn test_compare_entities_requires_exactly_two() {
        let c = fixture();
        let f = FilterSelection::all();
        let one = EntityPick::new(Dimension::Category, ["Gadgets"]);
        assert_eq!(compare_entities(&c, &f, &one), ViewOutcome::NothingSelected);

        let two = EntityPick::new(Dimension::Category, ["Gadgets", "Apparel"]);
        let t = compare_entities(&c, &f, &two).ready().unwrap();
        assert_eq!(t.columns, vec!["order_period", "category", "revenue"]);
        assert_eq!(t.rows[0][0], Value::from("2022-01"));
        assert_eq!(t.rows[0][1], Value::from("Gadgets"));
        assert_eq!(t.rows[0][2], Value::Float(120.0));
    }

    #[test]
    fn test_customer_segmentation_counts_rows() {
        let c = fixture();
        let t = customer_segmentation(&c, &FilterSelection::all())
            .ready()
            .unwrap();
        // C1 and C3 registered in 2022 → 4 "new" rows; C2's row is returning.
        assert_eq!(t.rows[0], vec![Value::from("new"), Value::Int(4)]);
        assert_eq!(t.rows[1], vec![Value::from("returning"), Value::Int(1)]);
    }

    #[test]
    fn test_filter_empty_vs_pick_empty_are_different_contracts() {
        let c = fixture();
        // Empty filter set = no filter: full row count flows through.
        let t = customer_segmentation(&c, &FilterSelection::all())
            .ready()
            .unwrap();
        let total: i64 = t.rows.iter().filter_map(|r| r[1].as_i64()).sum();
        assert_eq!(total, 5);
        // Empty entity pick = prompt, never an unfiltered aggregate.
        let pick = EntityPick::new(Dimension::Category, Vec::<String>::new());
        assert_eq!(
            compare_entities(&c, &FilterSelection::all(), &pick),
            ViewOutcome::NothingSelected
        );
    }
}
