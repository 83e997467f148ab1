//! JSON output formatting for the scan summary.

use std::collections::HashMap;
use std::path::PathBuf;

use dupcat_core::{DuplicateItem, SubClipMatch};
use serde::Serialize;

#[derive(Serialize)]
struct ScanOutput<'a> {
    total_items: usize,
    group_count: usize,
    items: Vec<&'a DuplicateItem>,
}

/// Print the duplicate-item map as a JSON array, grouped implicitly via
/// each item's `group_id`, sorted for stable output.
pub fn print_json_results(items: &HashMap<PathBuf, DuplicateItem>) {
    let mut sorted: Vec<&DuplicateItem> = items.values().collect();
    sorted.sort_by(|a, b| (a.group_id, &a.path).cmp(&(b.group_id, &b.path)));

    let group_count = sorted.iter().map(|i| i.group_id).collect::<std::collections::HashSet<_>>().len();
    log::info!("{} duplicate items across {} groups", sorted.len(), group_count);

    let output = ScanOutput {
        total_items: sorted.len(),
        group_count,
        items: sorted,
    };

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing scan results: {}", e),
    }
}

/// Print sub-clip matches as a JSON array.
pub fn print_json_subclip_matches(matches: &[SubClipMatch]) {
    log::info!("{} sub-clip matches found", matches.len());
    match serde_json::to_string_pretty(matches) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing sub-clip matches: {}", e),
    }
}
