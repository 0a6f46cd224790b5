use chrono::NaiveDate;

use crate::table::Value;

/// Date layouts seen in retail CSV exports, tried in order. A trailing
/// time-of-day (space or 'T' separated) is ignored.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a calendar date string. Returns `None` on anything unparseable.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let token = s.trim().split([' ', 'T']).next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}

pub fn value_to_date(v: &Value) -> Option<NaiveDate> {
    v.as_str().and_then(parse_date)
}

/// Coerce a quantity cell to a non-negative integer: numeric parse,
/// truncate toward zero, floor at 0; anything non-numeric becomes 0.
pub fn coerce_qty(v: &Value) -> i64 {
    let n = match v {
        Value::Int(n) => *n,
        Value::Float(x) => x.trunc() as i64,
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(|x| x.trunc() as i64)
            .unwrap_or(0),
        _ => 0,
    };
    n.max(0)
}

/// Parse a monetary cell. `None` for empty/unparseable values; the caller
/// keeps the cell as `Null` rather than inventing a zero.
pub fn parse_money(v: &Value) -> Option<f64> {
    match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
