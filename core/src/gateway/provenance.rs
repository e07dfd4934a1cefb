//! Name-pattern fallback for tool provenance
//!
//! Recorded provenance is authoritative. This heuristic only covers tools
//! whose origin was never recorded: it matches tool names against known
//! provider identifiers and buckets everything else under "other". It is
//! a labeled guess, not a substitute for the recorded map.

use std::collections::HashMap;

/// Bucket for tools no known provider identifier matches
pub const UNCATEGORIZED: &str = "other";

/// Group tool names by the known provider identifier they most plausibly
/// belong to. The longest identifier appearing as a substring of the tool
/// name wins; ties break toward the earlier identifier in `known`.
pub fn infer_provenance(
    tool_names: &[String],
    known: &[String],
) -> HashMap<String, Vec<String>> {
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();

    for tool in tool_names {
        let mut best: Option<&str> = None;
        for candidate in known {
            if candidate.is_empty() || !tool.contains(candidate.as_str()) {
                continue;
            }
            match best {
                Some(current) if candidate.len() <= current.len() => {}
                _ => best = Some(candidate),
            }
        }

        groups
            .entry(best.unwrap_or(UNCATEGORIZED).to_string())
            .or_default()
            .push(tool.clone());
    }

    for names in groups.values_mut() {
        names.sort();
    }
    groups
}
