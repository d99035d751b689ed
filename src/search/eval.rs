//! Visa-signal evaluation: description pattern matching, the acceptance
//! predicate, and the deterministic confidence score.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{MatchStrength, Strictness, VisaType};

/// Model version stamped on every accepted job.
pub const CONFIDENCE_MODEL_VERSION: &str = "v1.1.0-rules-rs";

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("signal pattern"))
        .collect()
}

fn positive_regexes() -> &'static Vec<Regex> {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        compile_all(&[
            r"(?i)\bvisa sponsorship\b",
            r"(?i)\bsponsor(?:ship|ed|s)?\b",
            r"(?i)\bh-?1b\b",
            r"(?i)\be-?3\b",
            r"(?i)\bopt\b",
            r"(?i)\bcpt\b",
            r"(?i)\bgreen card\b",
        ])
    })
}

fn negative_regexes() -> &'static Vec<Regex> {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        compile_all(&[
            r"(?i)\bno visa sponsorship\b",
            r"(?i)\bwithout visa sponsorship\b",
            r"(?i)\bdo not sponsor\b",
            r"(?i)\bunable to sponsor\b",
            r"(?i)\bmust be authorized to work\b",
        ])
    })
}

fn mention_regex(source: &'static str, slot: &'static OnceLock<Regex>) -> &'static Regex {
    slot.get_or_init(|| Regex::new(source).expect("mention pattern"))
}

fn h1b_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\bh-?1b\b", &RE)
}

fn h1b1_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\bh-?1b1\b", &RE)
}

fn chile_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\bchile\b", &RE)
}

fn singapore_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\bsingapore\b", &RE)
}

fn e3_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\be-?3\b", &RE)
}

fn green_card_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\bgreen card\b", &RE)
}

fn perm_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    mention_regex(r"(?i)\bperm\b", &RE)
}

/// Signals detected in one job description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptionSignals {
    pub positive: bool,
    pub negative: bool,
    pub mentioned: Vec<VisaType>,
}

/// Scan a description for sponsorship language and per-visa mentions.
pub fn detect_description_signals(description: &str) -> DescriptionSignals {
    let text = description.to_lowercase();
    let positive = positive_regexes().iter().any(|rx| rx.is_match(&text));
    let negative = negative_regexes().iter().any(|rx| rx.is_match(&text));

    let mut mentioned = Vec::new();
    let mut add = |visa: VisaType| {
        if !mentioned.contains(&visa) {
            mentioned.push(visa);
        }
    };
    if h1b_regex().is_match(&text) {
        add(VisaType::H1b);
    }
    if h1b1_regex().is_match(&text) && chile_regex().is_match(&text) {
        add(VisaType::H1b1Chile);
    }
    if h1b1_regex().is_match(&text) && singapore_regex().is_match(&text) {
        add(VisaType::H1b1Singapore);
    }
    if e3_regex().is_match(&text) {
        add(VisaType::E3Australian);
    }
    if green_card_regex().is_match(&text) || perm_regex().is_match(&text) {
        add(VisaType::GreenCard);
    }

    DescriptionSignals {
        positive,
        negative,
        mentioned,
    }
}

/// Does any mentioned visa class belong to the requested set?
pub fn has_desired_mention(mentioned: &[VisaType], desired: &[VisaType]) -> bool {
    mentioned.iter().any(|visa| desired.contains(visa))
}

/// Deterministic confidence in [0, 1], rounded to two decimals.
pub fn confidence_score(
    desired_count: u32,
    total_count: u32,
    description_positive: bool,
    description_negative: bool,
    description_desired_mention: bool,
) -> f64 {
    let mut score = 0.0;
    if desired_count > 0 {
        score += 0.65;
        score += (f64::from(desired_count) / 50.0).min(0.2);
    }
    if description_positive {
        score += 0.1;
    }
    if description_desired_mention {
        score += 0.2;
    }
    if description_negative {
        score -= 0.6;
    }
    if desired_count == 0 && total_count > 0 {
        score += 0.05;
    }
    round2(score.clamp(0.0, 1.0))
}

/// Confidence used when visa filtering is off.
pub fn general_confidence_score(has_company: bool, fetched_description: bool) -> f64 {
    let mut score: f64 = 0.55;
    if has_company {
        score += 0.2;
    }
    if fetched_description {
        score += 0.15;
    }
    round2(score.min(1.0))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Tie-break the evidence into a match strength. Only meaningful when visa
/// filtering is on; callers use `NotRequested` otherwise.
pub fn visa_match_strength(
    desired_count: u32,
    description_desired_mention: bool,
    description_positive: bool,
) -> MatchStrength {
    if desired_count > 0 && description_desired_mention {
        MatchStrength::Strong
    } else if desired_count > 0 {
        MatchStrength::CompanyDataset
    } else if description_desired_mention && description_positive {
        MatchStrength::DescriptionSignal
    } else {
        MatchStrength::Weak
    }
}

/// Human-auditable reasons for accepting (or scoring) a job.
pub fn build_eligibility_reasons(
    desired_count: u32,
    description_positive: bool,
    description_negative: bool,
    description_desired_mention: bool,
    desired: &[VisaType],
) -> Vec<String> {
    let mut reasons = Vec::new();
    if desired_count > 0 {
        let joined = desired
            .iter()
            .map(|visa| visa.as_str())
            .collect::<Vec<_>>()
            .join("_or_");
        reasons.push(format!("company_has_historical_{joined}_sponsorship"));
    }
    if description_desired_mention {
        reasons.push("job_description_mentions_requested_visa".to_string());
    }
    if description_positive {
        reasons.push("job_description_mentions_sponsorship".to_string());
    }
    if description_negative {
        reasons.push("job_description_contains_negative_sponsorship_language".to_string());
    }
    reasons
}

/// Reasons used when visa filtering is off.
pub fn build_general_eligibility_reasons(
    normalized_title: &str,
    has_company: bool,
    fetched_description: bool,
) -> Vec<String> {
    let mut reasons = vec![format!("matches_requested_title_{normalized_title}")];
    if has_company {
        reasons.push("company_found_in_dataset".to_string());
    }
    if fetched_description {
        reasons.push("job_description_fetched".to_string());
    }
    reasons
}

/// The acceptance predicate for visa-filtered searches.
///
/// `Balanced` currently shares the `Strict` rejection of the zero-signal
/// case; the arm is kept separate so the knob keeps its meaning if the
/// predicates ever diverge.
pub fn should_accept_job(
    strictness: Strictness,
    desired_count: u32,
    description_positive: bool,
    description_negative: bool,
    description_desired_mention: bool,
    require_description_signal: bool,
) -> bool {
    if description_negative {
        return false;
    }

    let company_eligible = desired_count > 0;
    let description_eligible = description_positive && description_desired_mention;
    if require_description_signal && !description_eligible {
        return false;
    }
    if company_eligible || description_eligible {
        return true;
    }
    match strictness {
        Strictness::Balanced => false,
        Strictness::Strict => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_and_mention_detection() {
        let signals = detect_description_signals("E-3 visa sponsorship available.");
        assert!(signals.positive);
        assert!(!signals.negative);
        assert_eq!(signals.mentioned, vec![VisaType::E3Australian]);
    }

    #[test]
    fn test_negative_detection() {
        let signals =
            detect_description_signals("We are unable to sponsor visas for this role.");
        assert!(signals.negative);
    }

    #[test]
    fn test_h1b1_requires_country() {
        let chile = detect_description_signals("H-1B1 sponsorship for Chile nationals");
        assert!(chile.mentioned.contains(&VisaType::H1b1Chile));
        assert!(!chile.mentioned.contains(&VisaType::H1b1Singapore));

        let bare = detect_description_signals("H-1B1 available");
        assert!(!bare.mentioned.contains(&VisaType::H1b1Chile));
        // "h-1b1" does not match the plain h1b word-boundary pattern.
        assert!(!bare.mentioned.contains(&VisaType::H1b));
    }

    #[test]
    fn test_perm_counts_as_green_card() {
        let signals = detect_description_signals("PERM processing offered");
        assert!(signals.mentioned.contains(&VisaType::GreenCard));
    }

    #[test]
    fn test_confidence_score_components() {
        // Dataset-backed + positive + desired mention saturates the scale.
        assert_eq!(confidence_score(5, 5, true, false, true), 1.0);
        // Without the desired mention: 0.65 + 5/50 + 0.1.
        assert_eq!(confidence_score(5, 5, true, false, false), 0.85);
        // Negative language dominates.
        assert_eq!(confidence_score(0, 0, true, true, false), 0.0);
        // Totals-only nudge.
        assert_eq!(confidence_score(0, 12, false, false, false), 0.05);
        // Saturated dataset contribution caps at 0.2.
        assert_eq!(confidence_score(500, 500, false, false, false), 0.85);
    }

    #[test]
    fn test_confidence_rounds_to_two_decimals() {
        let score = confidence_score(3, 3, false, false, false);
        assert_eq!(score, 0.71); // 0.65 + 3/50
    }

    #[test]
    fn test_general_confidence() {
        assert_eq!(general_confidence_score(false, false), 0.55);
        assert_eq!(general_confidence_score(true, true), 0.9);
    }

    #[test]
    fn test_match_strength_tie_break() {
        assert_eq!(visa_match_strength(3, true, true), MatchStrength::Strong);
        assert_eq!(visa_match_strength(3, false, false), MatchStrength::CompanyDataset);
        assert_eq!(visa_match_strength(0, true, true), MatchStrength::DescriptionSignal);
        assert_eq!(visa_match_strength(0, true, false), MatchStrength::Weak);
        assert_eq!(visa_match_strength(0, false, false), MatchStrength::Weak);
    }

    #[test]
    fn test_eligibility_reasons() {
        let reasons = build_eligibility_reasons(5, true, false, true, &[VisaType::E3Australian]);
        assert!(reasons
            .contains(&"company_has_historical_e3_australian_sponsorship".to_string()));
        assert!(reasons.contains(&"job_description_mentions_requested_visa".to_string()));
        assert!(reasons.contains(&"job_description_mentions_sponsorship".to_string()));
    }

    #[test]
    fn test_acceptance_predicate() {
        // Negative language rejects outright.
        assert!(!should_accept_job(Strictness::Strict, 9, true, true, true, false));
        // Company evidence alone accepts.
        assert!(should_accept_job(Strictness::Strict, 1, false, false, false, false));
        // Description evidence alone accepts.
        assert!(should_accept_job(Strictness::Strict, 0, true, false, true, false));
        // Zero signal rejects in both modes.
        assert!(!should_accept_job(Strictness::Strict, 0, false, false, false, false));
        assert!(!should_accept_job(Strictness::Balanced, 0, false, false, false, false));
        // require_description_signal demands the description evidence.
        assert!(!should_accept_job(Strictness::Strict, 9, false, false, false, true));
        assert!(should_accept_job(Strictness::Strict, 9, true, false, true, true));
    }
}
