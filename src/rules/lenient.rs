//! Forgiving deserializers for threshold fields.
//!
//! Rules are edited by hand and by a web form that sends blanks, numeric
//! strings and the occasional `"abc"`. A threshold that cannot be read is
//! disabled rather than failing the whole rule.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
    Other(IgnoredAny),
}

fn loose_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Loose::deserialize(deserializer)? {
        Loose::Number(v) => Some(v),
        Loose::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        Loose::Other(_) => None,
    };
    Ok(value.filter(|v| v.is_finite() && *v >= 0.0))
}

/// A non-negative fraction, or `None` (disabled).
pub fn fraction<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    loose_number(deserializer)
}

/// A non-negative count, or `None` (disabled). Fractional input is truncated.
pub fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_number(deserializer)?.map(|v| v.min(u32::MAX as f64) as u32))
}
