//! Cross-update rewrite.
//!
//! Compiled UPDATE statements carry arithmetic assignments as marker keys
//! (`ADD_credits_SUM=$1`). [`rewrite`] turns every marker into an in-place
//! expression (`credits=credits+$1`) without touching placeholders or
//! argument order.

use crate::schema::Arithmetic;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

fn marker_re() -> &'static Regex {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    MARKER_RE.get_or_init(|| {
        Regex::new(r"\bADD_([A-Za-z0-9_$]+?)_(SUM|SUBTRACT|MULTIPLY|DIVIDE)=")
            .expect("invalid built-in marker regex")
    })
}

/// Whether `sql` still contains arithmetic marker assignments.
pub fn has_arithmetic_markers(sql: &str) -> bool {
    marker_re().is_match(sql)
}

/// Rewrite marker assignments into in-place arithmetic.
///
/// Text without markers is returned unchanged (borrowed).
pub fn rewrite(sql: &str) -> Cow<'_, str> {
    marker_re().replace_all(sql, |caps: &Captures<'_>| {
        let column = &caps[1];
        let op = Arithmetic::from_suffix(&caps[2])
            .and_then(|a| a.sql_operator())
            .unwrap_or('+');
        format!("{column}={column}{op}")
    })
}
