//! # Tripflow
//!
//! A conversational travel-booking assistant. Free-text requests are turned
//! into structured booking parameters through LLM extraction, missing fields
//! are collected over a resumable multi-turn dialogue, and the assembled
//! request is dispatched to flight, hotel, and itinerary legs.

pub mod amadeus;
pub mod config;
pub mod extract;
pub mod llm;
pub mod orchestrator;
pub mod schema;
pub mod server;
pub mod session;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

// Re-export main types for convenience
pub use amadeus::{AmadeusClient, LegReport, TravelVendor};
pub use config::Config;
pub use llm::{ChatModel, LlmError, OpenAiClient};
pub use orchestrator::{BookingFlow, BookingOutcome, FlowStep, LegResult};
pub use schema::{FieldDescriptor, FieldKind, FieldSchema};
pub use session::{CollectionSession, Mode, NextStep, SuspensionPoint, TravelerCollector};

/// Error types for the tripflow library
#[derive(Error, Debug)]
pub enum TravelError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("LLM call failed: {0}")]
    LlmError(#[from] LlmError),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Vendor returned no usable data: {0}")]
    EmptyVendorResponse(String),

    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session is not awaiting input")]
    NotSuspended,
}

/// Traveler name, stored uppercase as the booking vendor expects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelerName {
    pub first_name: String,
    pub last_name: String,
}

/// Phone contact with the country calling code split out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phone {
    pub device_type: String,
    pub country_calling_code: String,
    pub number: String,
}

impl Default for Phone {
    fn default() -> Self {
        Self {
            device_type: "MOBILE".to_string(),
            country_calling_code: String::new(),
            number: String::new(),
        }
    }
}

impl Phone {
    /// Split a raw phone string into calling code and a 10-digit number.
    ///
    /// Digits beyond the last ten become the country code; shorter input
    /// defaults the country code to "1".
    pub fn from_raw(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        let (code, number) = if digits.len() > 10 {
            let split = digits.len() - 10;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("1".to_string(), digits)
        };
        Self {
            device_type: "MOBILE".to_string(),
            country_calling_code: code,
            number,
        }
    }
}

/// One traveler on a booking. Built incrementally by a collection session,
/// frozen once complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelerProfile {
    pub id: String,
    pub name: TravelerName,
    pub date_of_birth: String,
    pub gender: String,
    pub email_address: String,
    pub phone: Phone,
}

impl TravelerProfile {
    /// Assemble a profile from a collected field map and a sequential id
    pub fn from_fields(fields: &BTreeMap<String, String>, id: u32) -> Self {
        let get = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Self {
            id: id.to_string(),
            name: TravelerName {
                first_name: get("firstName").to_uppercase(),
                last_name: get("lastName").to_uppercase(),
            },
            date_of_birth: get("dateOfBirth"),
            gender: get("gender").to_uppercase(),
            email_address: get("emailAddress"),
            phone: Phone::from_raw(&get("phone")),
        }
    }

    /// Serialize into the nested shape the booking vendor expects
    pub fn to_vendor(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "dateOfBirth": self.date_of_birth,
            "name": {
                "firstName": self.name.first_name,
                "lastName": self.name.last_name,
            },
            "gender": self.gender,
            "contact": {
                "emailAddress": self.email_address,
                "phones": [{
                    "deviceType": self.phone.device_type,
                    "countryCallingCode": self.phone.country_calling_code,
                    "number": self.phone.number,
                }]
            }
        })
    }
}

/// Detected intent of one booking conversation, used to filter which legs run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripIntent {
    Flight,
    Hotel,
    Itinerary,
    Trip,
}

impl TripIntent {
    pub fn wants_flight(&self) -> bool {
        matches!(self, TripIntent::Flight | TripIntent::Trip)
    }

    pub fn wants_hotel(&self) -> bool {
        matches!(self, TripIntent::Hotel | TripIntent::Trip)
    }

    pub fn wants_itinerary(&self) -> bool {
        matches!(self, TripIntent::Itinerary | TripIntent::Trip)
    }
}

impl FromStr for TripIntent {
    type Err = std::convert::Infallible;

    /// Lenient parse of classifier output; anything unrecognized means a
    /// full trip so no leg is silently skipped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Ok(if lower.contains("trip") {
            TripIntent::Trip
        } else if lower.contains("flight") {
            TripIntent::Flight
        } else if lower.contains("hotel") {
            TripIntent::Hotel
        } else if lower.contains("itinerary") {
            TripIntent::Itinerary
        } else {
            TripIntent::Trip
        })
    }
}

/// Fully assembled parameters for one booking request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub origin_location_code: String,
    pub destination_location_code: String,
    pub departure_date: String,
    pub return_date: String,
    pub adults: u32,
    pub max: u32,
    pub country: String,
    pub city: String,
    pub currency_code: String,
    pub travel_plan_preference: String,
    pub travelers: Vec<TravelerProfile>,
}

impl BookingRequest {
    /// Merge collected flight, derived, and preference field maps with the
    /// traveler list. Missing fields stay empty (batch runs proceed anyway).
    pub fn assemble(
        flight: &BTreeMap<String, String>,
        derived: &BTreeMap<String, String>,
        preference: &BTreeMap<String, String>,
        travelers: Vec<TravelerProfile>,
    ) -> Self {
        let get = |map: &BTreeMap<String, String>, name: &str| map.get(name).cloned().unwrap_or_default();
        let adults = travelers.len().max(1) as u32;
        let max = get(flight, "max").parse().unwrap_or(5);
        Self {
            origin_location_code: get(flight, "originLocationCode"),
            destination_location_code: get(flight, "destinationLocationCode"),
            departure_date: get(flight, "departureDate"),
            return_date: get(flight, "returnDate"),
            adults,
            max,
            country: get(derived, "country"),
            city: get(derived, "city"),
            currency_code: get(derived, "currencyCode"),
            travel_plan_preference: get(preference, "travelPlanPreference"),
            travelers,
        }
    }
}

/// Run one booking in batch mode using configuration from the environment.
///
/// Convenience wrapper over [`BookingFlow`]; batch mode never suspends, so
/// the flow finishes in a single call.
pub async fn book_trip(query: &str) -> Result<BookingOutcome, TravelError> {
    let config = Config::from_env();
    config.validate()?;
    let llm = OpenAiClient::from_config(&config.llm)?;
    let vendor = AmadeusClient::from_config(&config.amadeus)?;

    let mut flow = BookingFlow::new(query, Mode::Batch);
    match flow.begin(&llm, &vendor).await? {
        FlowStep::Finished(outcome) => Ok(*outcome),
        FlowStep::Suspended(_) => Err(TravelError::NotSuspended),
    }
}
