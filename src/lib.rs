//! Retail sales analytics core: a deterministic pipeline that turns raw
//! transaction rows into a canonical table with derived columns, then
//! serves filterable aggregate views over it.
//!
//! Data flow: CSV → [`load`] → [`normalize`] → ([`aggregate::FilterSelection`])
//! → [`aggregate`] views → presentation (external).

pub mod aggregate;
pub mod load;
pub mod logging;
pub mod normalize;
pub mod table;

pub use aggregate::{Dimension, EntityPick, FilterSelection, ViewOutcome};
pub use load::{load_csv, load_csv_path};
pub use normalize::{normalize, Canonical, Capability, SchemaCapabilities};
pub use table::{Table, Value};
