//! Field extraction over the text-understanding service
//!
//! Every function here is a single-shot call with no retry logic. An
//! unreachable service or malformed output is treated as "nothing
//! extracted"; callers re-prompt (interactive) or leave the field absent
//! (batch) rather than crash.

use crate::llm::{ChatModel, LlmError};
use crate::schema::{is_acceptable, FieldDescriptor, FieldSchema};
use crate::{BookingRequest, TripIntent};
use chrono::{Datelike, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Parse an LLM reply into a JSON object, tolerating code fences and
/// surrounding prose. Returns None for anything that is not an object.
pub fn parse_json_object(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &text[start..=end];
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn schema_details(schema: &FieldSchema) -> String {
    schema
        .fields()
        .iter()
        .map(|f| {
            format!(
                "- {}: {} (Type: {:?}, Required: {})",
                f.name,
                f.description,
                f.kind,
                if f.required { "Yes" } else { "No" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One-shot extraction of as many schema fields as possible from free text.
///
/// Values the model reports as null or empty are dropped, never stored.
/// Errors degrade to an empty map.
pub async fn extract_fields(
    llm: &dyn ChatModel,
    schema: &FieldSchema,
    text: &str,
) -> BTreeMap<String, String> {
    let system = format!(
        "You are an expert at extracting structured parameters for a travel booking API. \
         Extract the values of the parameters from the given user input and strictly do not \
         make up any information.\n\n\
         Parameters:\n{}\n\n\
         Extraction Guidelines:\n\
         1. Carefully analyze the user input to extract values for each parameter\n\
         2. Use exact IATA codes for locations; if city names are given, use the main airport code\n\
         3. Use YYYY-MM-DD format for dates; if the year is not given, assume the current year ({})\n\
         4. Do not make up any information; omit parameters you are unsure about\n\n\
         Output Instructions:\n\
         - Return a valid JSON object with the extracted parameters\n\
         - Only include parameters you can confidently extract",
        schema_details(schema),
        Utc::now().year(),
    );

    let reply = match llm.complete(&system, text).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(schema = %schema.name, error = %e, "extraction call failed, treating as empty");
            return BTreeMap::new();
        }
    };

    let Some(object) = parse_json_object(&reply) else {
        warn!(schema = %schema.name, "extractor output was not a JSON object");
        return BTreeMap::new();
    };

    let mut fields = BTreeMap::new();
    if let Some(map) = object.as_object() {
        for (name, value) in map {
            let Some(descriptor) = schema.get(name) else {
                continue;
            };
            if let Some(text) = scalar_to_string(value) {
                if is_acceptable(descriptor.kind, &text) {
                    fields.insert(name.clone(), text.trim().to_string());
                }
            }
        }
    }

    debug!(schema = %schema.name, extracted = fields.len(), "one-shot extraction finished");
    fields
}

/// Re-extract a single field from the user's latest answer.
///
/// Returns an empty string when nothing usable was extracted.
pub async fn extract_field(llm: &dyn ChatModel, descriptor: &FieldDescriptor, answer: &str) -> String {
    let system = format!(
        "You are an expert at extracting structured parameters for a travel booking API. \
         Extract the value of the parameter '{}' from the given user input.\n\
         Parameter description: {}\n\n\
         Extraction Guidelines:\n\
         1. Use exact IATA codes for locations; if a city name is given, use the main airport code\n\
         2. Use YYYY-MM-DD format for dates; if the year is not given, assume the current year ({})\n\n\
         Output Instructions:\n\
         - Return only the extracted parameter value as a plain string\n\
         - If unsure, return an empty string",
        descriptor.name,
        descriptor.description,
        Utc::now().year(),
    );

    match llm.complete(&system, answer).await {
        Ok(reply) => reply.trim().trim_matches('"').to_string(),
        Err(e) => {
            warn!(field = %descriptor.name, error = %e, "single-field extraction failed");
            String::new()
        }
    }
}

/// Classify the booking intent of a query. Unclassifiable output defaults
/// to a full trip so every leg is attempted.
pub async fn classify_intent(llm: &dyn ChatModel, query: &str) -> TripIntent {
    let system = "You are an expert at classifying travel booking requests. \
                  Classify the user request as exactly one of: flight, hotel, itinerary, trip. \
                  Use 'trip' when the user wants a complete booking or the request is ambiguous. \
                  Respond with the single word only.";

    match llm.complete(system, query).await {
        Ok(reply) => reply.parse().unwrap_or(TripIntent::Trip),
        Err(e) => {
            warn!(error = %e, "intent classification failed, defaulting to trip");
            TripIntent::Trip
        }
    }
}

/// Second normalization pass over an assembled traveler field map:
/// uppercase names, MALE/FEMALE genders, ISO dates. Returns None on any
/// failure so the caller keeps the original values.
pub async fn refine_traveler(
    llm: &dyn ChatModel,
    fields: &BTreeMap<String, String>,
) -> Option<BTreeMap<String, String>> {
    let system = "You are an expert at normalizing structured traveler details. \
                  Parse and convert the traveler detail values to the required format.\n\n\
                  Guidelines:\n\
                  - Use uppercase for names\n\
                  - Convert M/F to MALE/FEMALE for gender\n\
                  - Use YYYY-MM-DD format for the date of birth\n\
                  - Keep the phone number digits and country code as given\n\
                  - If any detail is missing, leave it as is in the input\n\
                  - Do not make up information\n\
                  - The output must be a JSON object with the same keys as the input";

    let input = serde_json::to_string(fields).ok()?;
    let reply = match llm.complete(system, &input).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "traveler refinement failed, keeping raw values");
            return None;
        }
    };

    let object = parse_json_object(&reply)?;
    let map = object.as_object()?;
    let mut refined = BTreeMap::new();
    for (name, value) in map {
        refined.insert(name.clone(), scalar_to_string(value)?);
    }
    Some(refined)
}

/// Generate an optimized itinerary for the booked destination.
pub async fn generate_itinerary(
    llm: &dyn ChatModel,
    request: &BookingRequest,
) -> Result<serde_json::Value, LlmError> {
    let system = "You are an expert at planning trips in the most optimized way with the best \
                  suggestions for the given city.\n\n\
                  Guidelines:\n\
                  - Suggest top restaurants\n\
                  - Tourist places\n\
                  - Activities\n\
                  - Optimized travel plan\n\n\
                  Return valid JSON of the entire itinerary with a field optimized_travel_plan.";

    let destination = if request.city.is_empty() {
        &request.destination_location_code
    } else {
        &request.city
    };
    let query = format!(
        "Plan an optimized trip itinerary for {} adults in {} from {} to {}, focused on {}.",
        request.adults, destination, request.departure_date, request.return_date, request.travel_plan_preference,
    );

    let reply = llm.complete(system, &query).await?;
    parse_json_object(&reply)
        .ok_or_else(|| LlmError::InvalidResponse("itinerary output was not a JSON object".to_string()))
}

/// Render the per-leg results into one human-readable sentence plus the
/// travel plan. Summarizer failure degrades to a plain fallback line.
pub async fn summarize(
    llm: &dyn ChatModel,
    flight: &serde_json::Value,
    hotel: &serde_json::Value,
    travel_plan: &str,
) -> String {
    let system = "You are an expert at converting structured booking results into human-readable \
                  format. You have the results from flight and hotel bookings. Extract only the \
                  relevant details and output them concisely in a single sentence.";

    let user = format!("{} {}", flight, hotel);
    match llm.complete(system, &user).await {
        Ok(reply) => {
            if travel_plan.is_empty() {
                reply
            } else {
                format!("{}\nTravel Plan:\n{}", reply, travel_plan)
            }
        }
        Err(e) => {
            warn!(error = %e, "summary call failed, using fallback");
            format!("Booking processed. Travel Plan:\n{}", travel_plan)
        }
    }
}
