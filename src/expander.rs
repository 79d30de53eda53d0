use regex::Regex;
use std::collections::HashSet;

/// Expands a scraped synonym carrying parenthesised qualifiers into its variants.
///
/// `"Infection (aiguë) des voies urinaires"` yields the bare form
/// `"Infection des voies urinaires"` plus `"Infection aiguë des voies urinaires"`.
/// Every alternative is combined with the bare form on its own; alternatives
/// coming from different groups are never combined with each other.
pub struct Expander {
    group_regex: Regex,
    whitespace_regex: Regex,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    pub fn new() -> Self {
        Expander {
            // Non-nested "(...)" groups, inner text captured
            group_regex: Regex::new(r"\(([^)]*)\)").expect("group pattern is valid"),
            whitespace_regex: Regex::new(r"\s+").expect("whitespace pattern is valid"),
        }
    }

    /// Callers pass non-blank text; for such input the result is never empty
    /// and falls back to the trimmed input when no usable candidate comes out
    /// of the expansion. Blank input is the one exception and yields nothing.
    pub fn expand(&self, raw: &str) -> Vec<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let groups: Vec<&str> = self
            .group_regex
            .captures_iter(raw)
            .filter_map(|cap| cap.get(1))
            .map(|m| m.as_str())
            .collect();

        if groups.is_empty() {
            return vec![trimmed.to_string()];
        }

        let stripped = self.group_regex.replace_all(raw, " ");
        let base = self
            .whitespace_regex
            .replace_all(&stripped, " ")
            .trim()
            .to_string();

        let alternatives = groups
            .iter()
            .flat_map(|group| group.split(")("))
            .map(str::trim)
            .filter(|option| !option.is_empty());

        let mut candidates = Vec::new();
        if !base.is_empty() {
            candidates.push(base.clone());
        }
        for alternative in alternatives {
            candidates.push(combine(&base, alternative));
        }

        let mut seen = HashSet::new();
        let expanded: Vec<String> = candidates
            .into_iter()
            .filter(|candidate| !candidate.is_empty())
            .filter(|candidate| seen.insert(candidate.clone()))
            .collect();

        if expanded.is_empty() {
            vec![trimmed.to_string()]
        } else {
            expanded
        }
    }
}

// Multi-word base: alternative goes right after the first word.
// Single word (or empty) base: alternative is appended.
fn combine(base: &str, alternative: &str) -> String {
    match base.split_once(' ') {
        Some((first, rest)) => format!("{} {} {}", first, alternative, rest)
            .trim()
            .to_string(),
        None => format!("{} {}", base, alternative).trim().to_string(),
    }
}
