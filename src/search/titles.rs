//! Title relevance: request-vs-listing matching for general searches, and
//! related-title suggestions for zero-yield recovery.

use std::collections::HashSet;

use crate::utils::text::tokenize_search_text;

/// Curated families of adjacent titles.
const RELATED_TITLE_HINTS: &[(&str, &[&str])] = &[
    (
        "software engineer",
        &[
            "Software Developer",
            "Backend Engineer",
            "Full Stack Engineer",
            "Platform Engineer",
            "Site Reliability Engineer",
            "Application Engineer",
            "Machine Learning Engineer",
        ],
    ),
    (
        "data engineer",
        &[
            "Data Platform Engineer",
            "Analytics Engineer",
            "ETL Engineer",
            "Big Data Engineer",
            "Data Infrastructure Engineer",
        ],
    ),
    (
        "product manager",
        &[
            "Technical Product Manager",
            "Program Manager",
            "Product Owner",
            "Growth Product Manager",
            "Platform Product Manager",
        ],
    ),
];

/// Suggest up to `limit` related job titles for a search that came back
/// empty.
pub fn find_related_titles(job_title: &str, limit: usize) -> Vec<String> {
    let base = job_title.trim();
    if base.is_empty() {
        return Vec::new();
    }
    let normalized = base.to_lowercase();

    let mut related: Vec<String> = Vec::new();
    for (key, values) in RELATED_TITLE_HINTS {
        if normalized.contains(key) || key.contains(&normalized) {
            related.extend(values.iter().map(|v| v.to_string()));
            break;
        }
    }
    if related.is_empty() {
        if normalized.contains("engineer") {
            related.push(base.replace("Engineer", "Developer"));
            related.push(base.replace("engineer", "developer"));
            related.push(base.replace("Engineer", "Platform Engineer"));
        } else if normalized.contains("developer") {
            related.push(base.replace("Developer", "Engineer"));
            related.push(base.replace("developer", "engineer"));
            related.push("Software Engineer".to_string());
        } else if normalized.contains("architect") {
            related.push(base.replace("Architect", "Engineer"));
            related.push(base.replace("architect", "engineer"));
            related.push(format!("Senior {base}"));
            related.push(format!("Lead {base}"));
        } else {
            related.push(format!("Senior {base}"));
            related.push(format!("Lead {base}"));
            related.push(format!("Principal {base}"));
        }
    }

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for item in related {
        let clean = item.trim().to_string();
        if clean.is_empty() {
            continue;
        }
        if !seen.insert(clean.to_lowercase()) {
            continue;
        }
        out.push(clean);
        if out.len() >= limit {
            break;
        }
    }
    out
}

/// Does a listing title match the requested title?
///
/// One long token matches by membership or substring; one short token (≤2
/// chars, "QA", "ML") needs exact membership; two tokens need one overlap;
/// three or more need two.
pub fn job_matches_requested_title(requested_title: &str, job_title: &str) -> bool {
    let requested = tokenize_search_text(requested_title);
    if requested.is_empty() {
        return true;
    }
    let title_tokens = tokenize_search_text(job_title);
    if title_tokens.is_empty() {
        return false;
    }
    let title_set: HashSet<&str> = title_tokens.iter().map(String::as_str).collect();
    let matches = requested
        .iter()
        .filter(|token| title_set.contains(token.as_str()))
        .count();

    if requested.len() == 1 {
        let query = &requested[0];
        if query.chars().count() <= 2 {
            return matches > 0;
        }
        return matches > 0 || job_title.to_lowercase().contains(query);
    }
    let required = if requested.len() >= 3 { 2 } else { 1 };
    matches >= required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_family_lookup() {
        let related = find_related_titles("Senior Software Engineer", 8);
        assert!(related.contains(&"Backend Engineer".to_string()));
        assert!(related.len() <= 8);
    }

    #[test]
    fn test_engineer_heuristic() {
        let related = find_related_titles("Network Engineer", 8);
        assert!(related.iter().any(|t| t.contains("Developer")));
    }

    #[test]
    fn test_fallback_seniority_ladder() {
        let related = find_related_titles("Accountant", 8);
        assert_eq!(
            related,
            vec!["Senior Accountant", "Lead Accountant", "Principal Accountant"]
        );
    }

    #[test]
    fn test_limit_and_dedupe() {
        let related = find_related_titles("software engineer", 2);
        assert_eq!(related.len(), 2);
        assert!(find_related_titles("", 8).is_empty());
    }

    #[test]
    fn test_single_long_token_matches_substring() {
        assert!(job_matches_requested_title("engineer", "Senior Engineering Lead"));
        assert!(job_matches_requested_title("engineer", "Software Engineer"));
        assert!(!job_matches_requested_title("engineer", "Product Designer"));
    }

    #[test]
    fn test_single_short_token_needs_membership() {
        assert!(job_matches_requested_title("QA", "QA Analyst"));
        assert!(!job_matches_requested_title("QA", "Quality Analyst"));
    }

    #[test]
    fn test_two_tokens_need_one_overlap() {
        assert!(job_matches_requested_title("software engineer", "Backend Engineer"));
        assert!(!job_matches_requested_title("software engineer", "Product Designer"));
    }

    #[test]
    fn test_three_tokens_need_two_overlaps() {
        assert!(job_matches_requested_title(
            "senior software engineer",
            "Senior Platform Engineer"
        ));
        assert!(!job_matches_requested_title(
            "senior software engineer",
            "Senior Accountant"
        ));
    }

    #[test]
    fn test_empty_request_matches_everything() {
        assert!(job_matches_requested_title("", "Anything"));
        assert!(!job_matches_requested_title("engineer", ""));
    }
}
