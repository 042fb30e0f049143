// SPDX-License-Identifier: Apache-2.0

//! Bounded call-stack capture for slow-operation records.

use std::backtrace::Backtrace;

/// Frames from these modules are never interesting to the reader of a record
const SKIPPED_PREFIXES: &[&str] = &[
    "std::",
    "core::",
    "alloc::",
    "backtrace::",
    "query_monitor::",
    "tokio::",
    "__rust",
    "_start",
    "<unknown>",
];

/// Whether a frame belongs to the runtime or to the monitor itself.
///
/// Trait-impl frames render as `<Type as Trait>::method`; those are judged
/// by the implementing type's path.
fn is_skipped(symbol: &str) -> bool {
    let path = symbol.trim_start_matches(['<', '&']);
    let path = path.strip_prefix("mut ").unwrap_or(path);
    let path = path.strip_prefix("dyn ").unwrap_or(path);
    SKIPPED_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Captures up to `max_depth` caller frames, innermost first.
/// Returns an empty list when `max_depth` is 0.
pub fn capture(max_depth: usize) -> Vec<String> {
    if max_depth == 0 {
        return Vec::new();
    }

    let rendered = Backtrace::force_capture().to_string();
    frames(&rendered, max_depth)
}

/// Extracts function names from a rendered backtrace.
///
/// Frame lines look like `  12: crate::module::function`; location lines
/// (`at src/lib.rs:10:5`) are folded into the preceding frame.
fn frames(rendered: &str, max_depth: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(max_depth);
    let mut keep_location = false;

    for line in rendered.lines() {
        let trimmed = line.trim();

        if let Some(location) = trimmed.strip_prefix("at ") {
            if keep_location {
                if let Some(last) = out.last_mut() {
                    last.push_str(" (");
                    last.push_str(location);
                    last.push(')');
                }
                keep_location = false;
            }
            continue;
        }

        let Some((index, symbol)) = trimmed.split_once(": ") else {
            continue;
        };
        if index.parse::<usize>().is_err() {
            continue;
        }

        keep_location = false;
        if is_skipped(symbol) {
            continue;
        }
        if out.len() == max_depth {
            break;
        }

        out.push(symbol.to_string());
        keep_location = true;
    }

    out
}
