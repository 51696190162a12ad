//! Compact, human-readable summaries of batch keys for status and error text.

use std::collections::BTreeMap;

/// Summarize derivation paths, collapsing consecutive child indexes.
///
/// `["m/0/0", "m/0/1", "m/0/2", "m/0/7", "m/1/0"]` becomes
/// `"m/0/0-2, m/0/7, m/1/0"`. Keys that are not paths are listed as given.
pub fn path_ranges<'a>(paths: impl IntoIterator<Item = &'a str>) -> String {
    let mut parents: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
    let mut others = Vec::new();

    for path in paths {
        let split = path
            .rsplit_once('/')
            .and_then(|(parent, child)| Some((parent, child.parse().ok()?)));
        match split {
            Some((parent, index)) => parents.entry(parent).or_default().push(index),
            None => others.push(path.to_string()),
        }
    }

    let mut parts = Vec::new();
    for (parent, mut indexes) in parents {
        indexes.sort_unstable();
        indexes.dedup();
        let mut run_start = indexes[0];
        let mut prev = indexes[0];
        for &index in &indexes[1..] {
            if prev.checked_add(1) != Some(index) {
                parts.push(format_run(parent, run_start, prev));
                run_start = index;
            }
            prev = index;
        }
        parts.push(format_run(parent, run_start, prev));
    }
    parts.extend(others);
    parts.join(", ")
}

fn format_run(parent: &str, start: u32, end: u32) -> String {
    if start == end {
        format!("{parent}/{start}")
    } else {
        format!("{parent}/{start}-{end}")
    }
}

/// Abbreviate transaction ids to their first six characters: `[abcdef], [012345]`.
pub fn short_txids<'a>(txids: impl IntoIterator<Item = &'a str>) -> String {
    txids
        .into_iter()
        .map(|txid| format!("[{}]", txid.get(..6).unwrap_or(txid)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-separated `Display` of arbitrary keys.
pub fn list<T: std::fmt::Display>(keys: impl IntoIterator<Item = T>) -> String {
    keys.into_iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
