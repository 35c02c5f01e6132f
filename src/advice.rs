//! Severity labels and their advice text

/// Label reported when the model finds nothing
pub const NO_DETECTION_LABEL: &str = "No";

/// Placeholder advice for labels outside the table
pub const UNKNOWN_ADVICE: Advice = Advice {
    causes: "Unknown",
    remedies: "No advice available.",
};

/// Known severity classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    No,
    Low,
    Moderate,
    High,
}

/// Cause/remedy text for one severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advice {
    pub causes: &'static str,
    pub remedies: &'static str,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::No, Severity::Low, Severity::Moderate, Severity::High];

    /// Match a model label exactly; labels are case sensitive
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "No" => Some(Severity::No),
            "Low" => Some(Severity::Low),
            "Moderate" => Some(Severity::Moderate),
            "High" => Some(Severity::High),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::No => "No",
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::High => "High",
        }
    }

    pub fn advice(&self) -> Advice {
        match self {
            Severity::High => Advice {
                causes: "Lack of sleep, dehydration, genetics, stress.",
                remedies: "• Sleep at least 7-8 hours\n• Stay hydrated\n• Use under-eye creams\n• Manage stress\n• Reduce screen time",
            },
            Severity::Moderate => Advice {
                causes: "Mild sleep issues, stress, slight dehydration.",
                remedies: "• Improve sleep routine\n• Drink more water\n• Gentle eye massage\n• Cold compress therapy",
            },
            Severity::Low => Advice {
                causes: "Minor tiredness or long screen exposure.",
                remedies: "• Take regular screen breaks\n• Maintain hydration\n• Relax eyes frequently",
            },
            Severity::No => Advice {
                causes: "No significant dark circles detected! 👏",
                remedies: "• Maintain healthy habits\n• Keep good sleep and hydration routine",
            },
        }
    }
}

/// Advice for any label the model may emit
pub fn lookup(label: &str) -> Advice {
    Severity::from_label(label)
        .map(|s| s.advice())
        .unwrap_or(UNKNOWN_ADVICE)
}
