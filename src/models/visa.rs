//! Visa classes tracked by the sponsor dataset and the description signals.

use serde::{Deserialize, Serialize};

/// A visa class a user can request sponsorship for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum VisaType {
    H1b,
    H1b1Chile,
    H1b1Singapore,
    E3Australian,
    GreenCard,
}

impl VisaType {
    /// All visa classes, in dataset column order.
    pub const ALL: [VisaType; 5] = [
        VisaType::H1b,
        VisaType::H1b1Chile,
        VisaType::H1b1Singapore,
        VisaType::E3Australian,
        VisaType::GreenCard,
    ];

    /// The snake_case key used in stored records and reasons.
    pub fn as_str(&self) -> &'static str {
        match self {
            VisaType::H1b => "h1b",
            VisaType::H1b1Chile => "h1b1_chile",
            VisaType::H1b1Singapore => "h1b1_singapore",
            VisaType::E3Australian => "e3_australian",
            VisaType::GreenCard => "green_card",
        }
    }

    /// Human-facing label used in status messages and `visas_sponsored`.
    pub fn label(&self) -> &'static str {
        match self {
            VisaType::H1b => "H-1B",
            VisaType::H1b1Chile => "H-1B1 Chile",
            VisaType::H1b1Singapore => "H-1B1 Singapore",
            VisaType::E3Australian => "E-3 Australian",
            VisaType::GreenCard => "Green Card",
        }
    }

    /// Resolve user-supplied spellings ("E-3", "perm", "h-1b1 chile", ...)
    /// to a visa class.
    pub fn from_alias(value: &str) -> Option<VisaType> {
        match value.trim().to_lowercase().as_str() {
            "h1b" | "h-1b" => Some(VisaType::H1b),
            "h1b1_chile" | "h-1b1 chile" | "h1b1 chile" | "h1b1_chile/singapore" => {
                Some(VisaType::H1b1Chile)
            }
            "h1b1_singapore" | "h-1b1 singapore" | "h1b1 singapore" => {
                Some(VisaType::H1b1Singapore)
            }
            "e3" | "e-3" | "e3_australian" | "e-3 australian" => Some(VisaType::E3Australian),
            "green_card" | "green card" | "perm" => Some(VisaType::GreenCard),
            _ => None,
        }
    }
}

/// Historical sponsorship counts for one employer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisaCounts {
    pub h1b: u32,
    pub h1b1_chile: u32,
    pub h1b1_singapore: u32,
    pub e3_australian: u32,
    pub green_card: u32,
    pub total_visas: u32,
}

impl VisaCounts {
    pub fn get(&self, visa: VisaType) -> u32 {
        match visa {
            VisaType::H1b => self.h1b,
            VisaType::H1b1Chile => self.h1b1_chile,
            VisaType::H1b1Singapore => self.h1b1_singapore,
            VisaType::E3Australian => self.e3_australian,
            VisaType::GreenCard => self.green_card,
        }
    }

    /// Sum of counts for the requested visa classes.
    pub fn desired_total(&self, desired: &[VisaType]) -> u32 {
        desired.iter().map(|visa| self.get(*visa)).sum()
    }

    /// Labels of every visa class with a non-zero count, in column order.
    pub fn sponsored_labels(&self) -> Vec<String> {
        VisaType::ALL
            .iter()
            .filter(|visa| self.get(**visa) > 0)
            .map(|visa| visa.label().to_string())
            .collect()
    }
}

/// Labels for a requested visa set, preserving order.
pub fn labels_for(desired: &[VisaType]) -> Vec<String> {
    desired.iter().map(|visa| visa.label().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolution() {
        assert_eq!(VisaType::from_alias("E-3"), Some(VisaType::E3Australian));
        assert_eq!(VisaType::from_alias("PERM"), Some(VisaType::GreenCard));
        assert_eq!(VisaType::from_alias("h-1b"), Some(VisaType::H1b));
        assert_eq!(VisaType::from_alias("h-1b1 singapore"), Some(VisaType::H1b1Singapore));
        assert_eq!(VisaType::from_alias("b2"), None);
    }

    #[test]
    fn test_serde_names_are_snake_case() {
        let json = serde_json::to_string(&VisaType::E3Australian).unwrap();
        assert_eq!(json, "\"e3_australian\"");
    }

    #[test]
    fn test_desired_total() {
        let counts = VisaCounts {
            h1b: 3,
            e3_australian: 5,
            total_visas: 8,
            ..Default::default()
        };
        assert_eq!(counts.desired_total(&[VisaType::E3Australian]), 5);
        assert_eq!(
            counts.desired_total(&[VisaType::H1b, VisaType::E3Australian]),
            8
        );
        assert_eq!(counts.sponsored_labels(), vec!["H-1B", "E-3 Australian"]);
    }
}
