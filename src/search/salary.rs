//! Compensation parsing for listing-card salary text.
//!
//! LinkedIn renders salary as free text ("$120K - $150K/yr"); this extracts
//! currency, interval, and a numeric range when one is present.

use std::sync::OnceLock;

use regex::Regex;

use crate::utils::text::normalize_whitespace;

/// Parsed compensation from a listing card.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobCompensation {
    pub text: String,
    pub currency: String,
    pub interval: String,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
}

fn salary_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)(\s*[kmb])?").expect("salary pattern")
    })
}

/// Parse free-form compensation text. Returns `None` when the text is empty
/// or contains no plausible amounts.
pub fn parse_compensation(raw: &str) -> Option<JobCompensation> {
    let text = normalize_whitespace(raw);
    if text.is_empty() {
        return None;
    }

    let mut out = JobCompensation {
        currency: detect_currency(&text),
        interval: detect_interval(&text),
        text,
        min_amount: None,
        max_amount: None,
    };

    let amounts = parse_amounts(&out.text);
    if amounts.is_empty() {
        return None;
    }

    let lower = out.text.to_lowercase();
    if lower.contains("up to") || lower.contains("maximum") || lower.contains("max") {
        out.max_amount = Some(amounts[0]);
    } else if lower.contains("from ") || lower.contains("minimum") || lower.contains("min") {
        out.min_amount = Some(amounts[0]);
    } else {
        out.min_amount = Some(amounts[0]);
    }

    if amounts.len() > 1 {
        let (low, high) = if amounts[0] > amounts[1] {
            (amounts[1], amounts[0])
        } else {
            (amounts[0], amounts[1])
        };
        out.min_amount = Some(low);
        out.max_amount = Some(high);
    }

    Some(out)
}

fn parse_amounts(text: &str) -> Vec<i64> {
    let mut values = Vec::with_capacity(2);
    for caps in salary_number_regex().captures_iter(text) {
        let number_text = caps
            .get(1)
            .map(|m| m.as_str().replace(',', ""))
            .unwrap_or_default();
        let Ok(mut value) = number_text.parse::<f64>() else {
            continue;
        };
        match caps
            .get(2)
            .map(|m| m.as_str().trim().to_lowercase())
            .unwrap_or_default()
            .as_str()
        {
            "k" => value *= 1_000.0,
            "m" => value *= 1_000_000.0,
            "b" => value *= 1_000_000_000.0,
            _ => {}
        }
        let rounded = value.round() as i64;
        // Tiny numbers are almost always noise ("401k match", "5 days").
        if rounded < 10 {
            continue;
        }
        values.push(rounded);
        if values.len() == 2 {
            break;
        }
    }
    values.sort_unstable();
    values
}

fn detect_currency(text: &str) -> String {
    let lower = text.to_lowercase();
    if text.contains('$') || lower.contains("usd") {
        "USD"
    } else if text.contains('€') || lower.contains("eur") {
        "EUR"
    } else if text.contains('£') || lower.contains("gbp") {
        "GBP"
    } else if text.contains('₹') || lower.contains("inr") {
        "INR"
    } else if lower.contains("aud") {
        "AUD"
    } else if lower.contains("cad") {
        "CAD"
    } else {
        ""
    }
    .to_string()
}

fn detect_interval(text: &str) -> String {
    let lower = text.to_lowercase();
    let interval = if lower.contains("/hr")
        || lower.contains("/hour")
        || lower.contains("per hour")
        || lower.contains("hourly")
    {
        "hourly"
    } else if lower.contains("/day") || lower.contains("per day") || lower.contains("daily") {
        "daily"
    } else if lower.contains("/wk")
        || lower.contains("/week")
        || lower.contains("per week")
        || lower.contains("weekly")
    {
        "weekly"
    } else if lower.contains("/mo")
        || lower.contains("/month")
        || lower.contains("per month")
        || lower.contains("monthly")
    {
        "monthly"
    } else if lower.contains("/yr")
        || lower.contains("/year")
        || lower.contains("per year")
        || lower.contains("yearly")
        || lower.contains("annual")
    {
        "yearly"
    } else {
        ""
    };
    interval.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_with_k_suffix() {
        let comp = parse_compensation("$120K - $150K/yr").unwrap();
        assert_eq!(comp.currency, "USD");
        assert_eq!(comp.interval, "yearly");
        assert_eq!(comp.min_amount, Some(120_000));
        assert_eq!(comp.max_amount, Some(150_000));
    }

    #[test]
    fn test_up_to_sets_max_only() {
        let comp = parse_compensation("Up to $95/hr").unwrap();
        assert_eq!(comp.interval, "hourly");
        assert_eq!(comp.min_amount, None);
        assert_eq!(comp.max_amount, Some(95));
    }

    #[test]
    fn test_from_sets_min_only() {
        let comp = parse_compensation("from €60,000 per year").unwrap();
        assert_eq!(comp.currency, "EUR");
        assert_eq!(comp.min_amount, Some(60_000));
        assert_eq!(comp.max_amount, None);
    }

    #[test]
    fn test_reversed_range_is_reordered() {
        let comp = parse_compensation("$150,000 - $120,000 annual").unwrap();
        assert_eq!(comp.min_amount, Some(120_000));
        assert_eq!(comp.max_amount, Some(150_000));
    }

    #[test]
    fn test_no_amounts_is_none() {
        assert!(parse_compensation("Competitive salary").is_none());
        assert!(parse_compensation("").is_none());
    }

    #[test]
    fn test_tiny_numbers_ignored() {
        assert!(parse_compensation("5 days on site").is_none());
    }
}
