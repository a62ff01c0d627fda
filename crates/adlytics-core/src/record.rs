//! Typed campaign log records.
//!
//! Every constructor takes the raw text fields of one log row and always
//! succeeds. A field that fails validation is stored as `None` and logged at
//! debug level; the rest of the record stays usable.

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Male" => Some(Self::Male),
            "Female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBracket {
    #[serde(rename = "<25")]
    Under25,
    #[serde(rename = "25-34")]
    From25To34,
    #[serde(rename = "35-44")]
    From35To44,
    #[serde(rename = "45-54")]
    From45To54,
    #[serde(rename = ">54")]
    Over54,
}

impl AgeBracket {
    pub const ALL: [AgeBracket; 5] = [
        AgeBracket::Under25,
        AgeBracket::From25To34,
        AgeBracket::From35To44,
        AgeBracket::From45To54,
        AgeBracket::Over54,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "<25" => Some(Self::Under25),
            "25-34" => Some(Self::From25To34),
            "35-44" => Some(Self::From35To44),
            "45-54" => Some(Self::From45To54),
            ">54" => Some(Self::Over54),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Under25 => "<25",
            Self::From25To34 => "25-34",
            Self::From35To44 => "35-44",
            Self::From45To54 => "45-54",
            Self::Over54 => ">54",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Income {
    Low,
    Medium,
    High,
}

impl Income {
    pub const ALL: [Income; 3] = [Income::Low, Income::Medium, Income::High];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

/// Site category the ad was shown on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Context {
    News,
    Shopping,
    #[serde(rename = "Social Media")]
    SocialMedia,
    Blog,
    Hobbies,
    Travel,
}

impl Context {
    pub const ALL: [Context; 6] = [
        Context::News,
        Context::Shopping,
        Context::SocialMedia,
        Context::Blog,
        Context::Hobbies,
        Context::Travel,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "News" => Some(Self::News),
            "Shopping" => Some(Self::Shopping),
            "Social Media" => Some(Self::SocialMedia),
            "Blog" => Some(Self::Blog),
            "Hobbies" => Some(Self::Hobbies),
            "Travel" => Some(Self::Travel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "News",
            Self::Shopping => "Shopping",
            Self::SocialMedia => "Social Media",
            Self::Blog => "Blog",
            Self::Hobbies => "Hobbies",
            Self::Travel => "Travel",
        }
    }
}

/// Non-negative, finite decimal cost.
pub fn parse_cost(raw: &str) -> Option<f64> {
    let cost = raw.trim().parse::<f64>().ok()?;
    (cost.is_finite() && cost >= 0.0).then_some(cost)
}

/// Strictly positive whole page count.
pub fn parse_pages_viewed(raw: &str) -> Option<u32> {
    let pages = raw.trim().parse::<i64>().ok()?;
    if pages <= 0 {
        return None;
    }
    u32::try_from(pages).ok()
}

/// `Yes` / `No`, case-sensitive. Anything else is unknown.
pub fn parse_conversion(raw: &str) -> Option<bool> {
    match raw {
        "Yes" => Some(true),
        "No" => Some(false),
        _ => None,
    }
}

fn checked<T>(field: &'static str, raw: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        tracing::debug!(field, raw, "invalid log field");
    }
    parsed
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpressionRecord {
    pub timestamp: Timestamp,
    pub visitor_id: String,
    pub gender: Option<Gender>,
    pub age: Option<AgeBracket>,
    pub income: Option<Income>,
    pub context: Option<Context>,
    pub cost: Option<f64>,
}

impl ImpressionRecord {
    /// Build from the seven raw fields of an impression row, in file order.
    pub fn from_fields(
        date: &str,
        visitor_id: &str,
        gender: &str,
        age: &str,
        income: &str,
        context: &str,
        cost: &str,
    ) -> Self {
        Self {
            timestamp: Timestamp::parse(date),
            visitor_id: visitor_id.to_string(),
            gender: checked("gender", gender, Gender::parse(gender)),
            age: checked("age", age, AgeBracket::parse(age)),
            income: checked("income", income, Income::parse(income)),
            context: checked("context", context, Context::parse(context)),
            cost: checked("impression_cost", cost, parse_cost(cost)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClickRecord {
    pub timestamp: Timestamp,
    pub visitor_id: String,
    pub cost: Option<f64>,
}

impl ClickRecord {
    pub fn from_fields(date: &str, visitor_id: &str, cost: &str) -> Self {
        Self {
            timestamp: Timestamp::parse(date),
            visitor_id: visitor_id.to_string(),
            cost: checked("click_cost", cost, parse_cost(cost)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerVisitRecord {
    pub entry: Timestamp,
    pub visitor_id: String,
    /// May be absent (`n/a`) when the exit was never logged.
    pub exit: Timestamp,
    pub pages_viewed: Option<u32>,
    /// `None` when the log held neither `Yes` nor `No`.
    pub conversion: Option<bool>,
}

impl ServerVisitRecord {
    pub fn from_fields(
        entry: &str,
        visitor_id: &str,
        exit: &str,
        pages_viewed: &str,
        conversion: &str,
    ) -> Self {
        Self {
            entry: Timestamp::parse(entry),
            visitor_id: visitor_id.to_string(),
            exit: Timestamp::parse(exit),
            pages_viewed: checked("pages_viewed", pages_viewed, parse_pages_viewed(pages_viewed)),
            conversion: checked("conversion", conversion, parse_conversion(conversion)),
        }
    }

    /// Seconds between entry and exit, when both are usable.
    pub fn duration_seconds(&self) -> Option<i64> {
        let entry = self.entry.to_naive()?;
        let exit = self.exit.to_naive()?;
        Some((exit - entry).num_seconds())
    }

    pub fn is_conversion(&self) -> bool {
        self.conversion == Some(true)
    }
}
