pub mod stats;
pub mod views;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::normalize::{
    Canonical, Capability, COL_CATEGORY, COL_IS_NEW_CUSTOMER, COL_PAYMENT_METHOD, COL_SKU_NAME,
    COL_YEAR,
};
use crate::table::Value;

/// Multi-select filters applied before any aggregation. An empty set on a
/// dimension means no filter on that dimension; dimensions combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub years: BTreeSet<i32>,
    pub categories: BTreeSet<String>,
    pub products: BTreeSet<String>,
    pub payment_methods: BTreeSet<String>,
    /// `true` selects new customers, `false` returning ones.
    pub customer_status: BTreeSet<bool>,
}

impl FilterSelection {
    /// No filter on any dimension.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_years<I: IntoIterator<Item = i32>>(mut self, years: I) -> Self {
        self.years = years.into_iter().collect();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_payment_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.payment_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_customer_status<I: IntoIterator<Item = bool>>(mut self, status: I) -> Self {
        self.customer_status = status.into_iter().collect();
        self
    }
}

/// Dimension an [`EntityPick`] selects over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    Category,
    Product,
}

impl Dimension {
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Category => COL_CATEGORY,
            Dimension::Product => COL_SKU_NAME,
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Dimension::Category => Capability::Category,
            Dimension::Product => Capability::Product,
        }
    }
}

/// Caller-chosen entities for comparison and multi-series trend views.
/// Unlike [`FilterSelection`], an empty pick means "nothing selected" and
/// the view prompts instead of aggregating the whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPick {
    pub dimension: Dimension,
    pub values: Vec<String>,
}

impl EntityPick {
    pub fn new<I, S>(dimension: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EntityPick {
            dimension,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Result of a view computation. Soft failure conditions are data, not
/// errors: the presentation layer renders them as messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ViewOutcome<T> {
    Ready(T),
    /// A required source column is absent from the schema.
    Unavailable { missing: Capability },
    /// An entity-selection view received zero (or an unusable number of)
    /// picked entities.
    NothingSelected,
    /// The view needs more periods than the filtered data contains.
    InsufficientData,
}

impl<T> ViewOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, ViewOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            ViewOutcome::Ready(t) => Some(t),
            _ => None,
        }
    }
}

/// Apply the filter set and return the surviving rows.
///
/// A non-empty filter on a dimension whose column is missing matches
/// nothing: filters are built from the dataset's own distinct values, so a
/// selection the schema cannot express excludes every row.
pub(crate) fn select<'a>(canonical: &'a Canonical, filters: &FilterSelection) -> Vec<&'a [Value]> {
    let table = &canonical.table;
    let year_idx = table.column(COL_YEAR);
    let cat_idx = table.column(COL_CATEGORY);
    let sku_idx = table.column(COL_SKU_NAME);
    let pay_idx = table.column(COL_PAYMENT_METHOD);
    let new_idx = table.column(COL_IS_NEW_CUSTOMER);

    let in_str_set = |set: &BTreeSet<String>, idx: Option<usize>, row: &[Value]| -> bool {
        if set.is_empty() {
            return true;
        }
        match idx {
            Some(i) => row[i].as_str().is_some_and(|s| set.contains(s)),
            None => false,
        }
    };

    table
        .rows
        .iter()
        .filter(|row| {
            let row = row.as_slice();
            let year_ok = filters.years.is_empty()
                || year_idx.is_some_and(|i| {
                    row[i]
                        .as_i64()
                        .is_some_and(|y| filters.years.contains(&(y as i32)))
                });
            let status_ok = filters.customer_status.is_empty()
                || new_idx.is_some_and(|i| {
                    row[i]
                        .as_bool()
                        .is_some_and(|b| filters.customer_status.contains(&b))
                });
            year_ok
                && status_ok
                && in_str_set(&filters.categories, cat_idx, row)
                && in_str_set(&filters.products, sku_idx, row)
                && in_str_set(&filters.payment_methods, pay_idx, row)
        })
        .map(|row| row.as_slice())
        .collect()
}

/// Group-by accumulator that remembers first-occurrence order of keys, so
/// downstream stable sorts keep ties in natural order.
pub(crate) struct Grouped<K, A> {
    keys: Vec<K>,
    accs: Vec<A>,
    index: HashMap<K, usize>,
}

impl<K: Eq + Hash + Clone, A: Default> Grouped<K, A> {
    pub fn new() -> Self {
        Grouped {
            keys: Vec::new(),
            accs: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn entry(&mut self, key: K) -> &mut A {
        let idx = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let i = self.keys.len();
                self.index.insert(key.clone(), i);
                self.keys.push(key);
                self.accs.push(A::default());
                i
            }
        };
        &mut self.accs[idx]
    }

    pub fn into_pairs(self) -> Vec<(K, A)> {
        self.keys.into_iter().zip(self.accs).collect()
    }
}
