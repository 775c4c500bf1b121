//! CLI parsing helpers for clap value parsers.

use crate::config;
use crate::env::Value;

pub(super) fn parse_define(s: &str) -> Result<(String, Value), String> {
    config::parse_define(s).map_err(|err| err.to_string())
}
