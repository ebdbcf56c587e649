use crate::common::DateRange;

use super::ObservationPoint;

/// Category key matching every categorized point.
pub const ALL_CATEGORIES: &str = "all";

const ALIASES: &[(&str, &[&str])] = &[
    ("ae-albopictus", &["aedes albopictus", "albopictus", "ae. albopictus"]),
    ("ae-aegypti", &["aedes aegypti", "aegypti", "ae. aegypti"]),
    ("ae-japonicus", &["aedes japonicus", "japonicus", "ae. japonicus"]),
    ("ae-koreicus", &["aedes koreicus", "koreicus", "ae. koreicus"]),
    ("culex-pipiens", &["culex pipiens", "pipiens", "cx. pipiens"]),
    ("anopheles", &["anopheles", "an. "]),
];

/// Lowercase substrings a category must contain to match `key`.
///
/// Unknown keys match on the key itself. `all` maps to the empty substring.
pub fn category_aliases(key: &str) -> Vec<String> {
    let key = key.trim().to_lowercase();
    if key == ALL_CATEGORIES { return vec![String::new()] }
    ALIASES.iter()
        .find(|(k, _)| *k == key)
        .map(|(_, aliases)| aliases.iter().map(|a| a.to_string()).collect())
        .unwrap_or_else(|| vec![key])
}

fn matches_category(point: &ObservationPoint, aliases: &[String]) -> bool {
    point.category.as_deref().is_some_and(|category| {
        let category = category.to_lowercase();
        aliases.iter().any(|alias| category.contains(alias.as_str()))
    })
}

/// Points whose category matches `key` and whose date lies in `range` (inclusive).
///
/// Points without a category or a parseable date never match.
pub fn filter_observations(points: &[ObservationPoint], key: &str, range: &DateRange) -> Vec<ObservationPoint> {
    let aliases = category_aliases(key);
    points.iter()
        .filter(|p| p.date.is_some_and(|day| range.contains(day)))
        .filter(|p| matches_category(p, &aliases))
        .cloned()
        .collect()
}

/// Points whose category matches `key`, whatever their date.
pub fn filter_by_category(points: &[ObservationPoint], key: &str) -> Vec<ObservationPoint> {
    let aliases = category_aliases(key);
    points.iter().filter(|p| matches_category(p, &aliases)).cloned().collect()
}
