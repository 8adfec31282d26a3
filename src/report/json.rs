//! JSON output for scripting and piping.

use serde::Serialize;

use crate::error::Result;

pub fn render<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
