//! Surface renderer
//!
//! Turns a surface selection into the markdown block injected into the
//! consumer file. Sections follow a fixed taxonomy order; the whole block
//! can be wrapped in sentinel markers for in-place replacement.

use crate::cache::Staleness;
use crate::model::MemoryType;
use crate::ranking::RankedMemory;

/// Opening sentinel for in-place insertion
pub const SENTINEL_START: &str = "<!-- CORTEX_MEMORY_START -->";

/// Closing sentinel
pub const SENTINEL_END: &str = "<!-- CORTEX_MEMORY_END -->";

/// Section order and headings. Raw code is excluded by selection, so it has
/// no section here.
const TAXONOMY: &[(MemoryType, &str)] = &[
    (MemoryType::Architecture, "Architecture"),
    (MemoryType::Decision, "Decision"),
    (MemoryType::Pattern, "Pattern"),
    (MemoryType::Gotcha, "Gotcha"),
    (MemoryType::Context, "Context"),
    (MemoryType::Progress, "Progress"),
    (MemoryType::CodeDescription, "Code Description"),
];

/// Render the surface markdown.
///
/// Returns the empty string when nothing was selected. When a staleness
/// object flags the surface stale, a warning line reports its age.
pub fn render_surface(
    selected: &[RankedMemory],
    branch: &str,
    staleness: Option<&Staleness>,
) -> String {
    if selected.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&format!("# Cortex Memory (branch: {branch})\n"));

    if let Some(staleness) = staleness {
        if staleness.stale {
            out.push_str(&format!(
                "\n> Warning: this surface is {:.0} hours old; run `cortex generate` to refresh.\n",
                staleness.age_hours
            ));
        }
    }

    for (memory_type, heading) in TAXONOMY {
        let members: Vec<&RankedMemory> = selected
            .iter()
            .filter(|r| r.memory.memory_type == *memory_type)
            .collect();
        if members.is_empty() {
            continue;
        }

        out.push_str(&format!("\n## {heading}\n\n"));
        for entry in members {
            out.push_str(&format!("- {}\n", entry.memory.summary));
            if !entry.memory.tags.is_empty() {
                out.push_str(&format!("  tags: {}\n", entry.memory.tags.join(", ")));
            }
        }
    }

    out
}

/// Wrap rendered text in the sentinel marker pair.
pub fn wrap_with_sentinels(surface: &str) -> String {
    format!("{SENTINEL_START}\n{surface}\n{SENTINEL_END}\n")
}
