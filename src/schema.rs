//! Field schemas and validation policy
//!
//! Each sub-domain (flight parameters, traveler identity, derived location
//! data, itinerary preference) declares an ordered, immutable set of field
//! descriptors. Required fields are collected in declaration order.

use serde::{Deserialize, Serialize};

/// Semantic type of one field; drives validation only, format is prompt policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Date,
    Integer,
    LocationCode,
    Email,
    Phone,
}

/// One field of a schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub description: String,
    pub required: bool,
    pub kind: FieldKind,
    /// Fallback used in batch mode and by ask-once sessions
    pub default: Option<String>,
}

impl FieldDescriptor {
    fn new(name: &str, description: &str, required: bool, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required,
            kind,
            default: None,
        }
    }

    fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }
}

/// Ordered, immutable set of field descriptors for one sub-domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    fields: Vec<FieldDescriptor>,
}

impl FieldSchema {
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Required fields in declaration order (not discovery order)
    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Top-level flight booking parameters
    pub fn flight() -> Self {
        Self {
            name: "flight".to_string(),
            fields: vec![
                FieldDescriptor::new(
                    "originLocationCode",
                    "City/airport IATA code from which the traveler will depart (e.g., JFK for New York)",
                    true,
                    FieldKind::LocationCode,
                ),
                FieldDescriptor::new(
                    "destinationLocationCode",
                    "City/airport IATA code to which the traveler is going (e.g., DEL for Delhi)",
                    true,
                    FieldKind::LocationCode,
                ),
                FieldDescriptor::new(
                    "departureDate",
                    "Date of departure in ISO 8601 YYYY-MM-DD format (e.g., 2024-12-30)",
                    true,
                    FieldKind::Date,
                ),
                FieldDescriptor::new(
                    "returnDate",
                    "Date of return in ISO 8601 YYYY-MM-DD format (e.g., 2025-01-05)",
                    true,
                    FieldKind::Date,
                ),
                FieldDescriptor::new(
                    "adults",
                    "Number of adult travelers (age 12 or older)",
                    false,
                    FieldKind::Integer,
                )
                .with_default("1"),
                FieldDescriptor::new(
                    "max",
                    "Maximum number of flight offers to return (must be >= 1)",
                    false,
                    FieldKind::Integer,
                )
                .with_default("5"),
            ],
        }
    }

    /// Per-traveler identity fields
    pub fn traveler() -> Self {
        Self {
            name: "traveler".to_string(),
            fields: vec![
                FieldDescriptor::new("firstName", "Traveler's first name", true, FieldKind::Text),
                FieldDescriptor::new("lastName", "Traveler's last name", true, FieldKind::Text),
                FieldDescriptor::new(
                    "dateOfBirth",
                    "Traveler's date of birth in YYYY-MM-DD format",
                    true,
                    FieldKind::Date,
                ),
                FieldDescriptor::new("gender", "Traveler's gender (MALE or FEMALE)", true, FieldKind::Text),
                FieldDescriptor::new("emailAddress", "Traveler's email address", true, FieldKind::Email),
                FieldDescriptor::new(
                    "phone",
                    "Traveler's phone number with country code",
                    true,
                    FieldKind::Phone,
                ),
            ],
        }
    }

    /// Location data inferred from the collected IATA codes; filled by one
    /// non-interactive extraction, never prompted for.
    pub fn derived() -> Self {
        Self {
            name: "derived".to_string(),
            fields: vec![
                FieldDescriptor::new(
                    "country",
                    "Country code of the destination location (e.g., US for New York)",
                    true,
                    FieldKind::Text,
                ),
                FieldDescriptor::new(
                    "city",
                    "Full city name of the destination (e.g., New York City for JFK)",
                    true,
                    FieldKind::Text,
                ),
                FieldDescriptor::new(
                    "currencyCode",
                    "Currency of the origin location (e.g., USD for New York)",
                    true,
                    FieldKind::Text,
                ),
            ],
        }
    }

    /// Single-field itinerary preference, asked once with a fallback
    pub fn itinerary() -> Self {
        Self {
            name: "itinerary".to_string(),
            fields: vec![FieldDescriptor::new(
                "travelPlanPreference",
                "Preference for the trip itinerary (e.g., tourism, food, adventure)",
                true,
                FieldKind::Text,
            )
            .with_default("tourism")],
        }
    }
}

/// Literal values the extractor emits when it found nothing
const EMPTY_MARKERS: [&str; 5] = ["", "null", "none", "unknown", "n/a"];

/// Validation policy: pure predicate deciding whether an extracted value is
/// acceptable for a field kind. Presence checks only; formats are enforced
/// by the extraction prompts.
pub fn is_acceptable(kind: FieldKind, value: &str) -> bool {
    let trimmed = value.trim();
    if EMPTY_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
        return false;
    }
    match kind {
        FieldKind::Email => trimmed.contains('@') && trimmed.contains('.'),
        FieldKind::Phone => trimmed.chars().any(|c| c.is_ascii_digit()),
        FieldKind::Text | FieldKind::Date | FieldKind::Integer | FieldKind::LocationCode => true,
    }
}
