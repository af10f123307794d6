//! Booking flow orchestration
//!
//! A [`BookingFlow`] chains the collection stages (flight parameters,
//! travelers, itinerary preference) and then dispatches the applicable
//! legs to the vendor. Suspensions bubble up from whichever stage is
//! active; `resume` routes the answer back down to it.

use crate::amadeus::{LegReport, TravelVendor};
use crate::extract;
use crate::llm::ChatModel;
use crate::schema::FieldSchema;
use crate::session::{CollectionSession, Mode, NextStep, SuspensionPoint, TravelerCollector};
use crate::{BookingRequest, TravelError, TripIntent};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Outcome of one booking leg
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LegResult {
    Completed {
        data: serde_json::Value,
        report: LegReport,
    },
    Failed {
        error: String,
        report: LegReport,
    },
    Skipped,
}

impl LegResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, LegResult::Completed { .. })
    }

    fn data(&self) -> serde_json::Value {
        match self {
            LegResult::Completed { data, .. } => data.clone(),
            _ => serde_json::Value::Null,
        }
    }
}

/// Everything one finished booking produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingOutcome {
    pub intent: TripIntent,
    pub request: BookingRequest,
    pub flight: LegResult,
    pub hotel: LegResult,
    pub itinerary: LegResult,
    pub summary: String,
    pub llm_calls: u32,
}

/// Outcome of driving a flow one turn forward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowStep {
    Suspended(SuspensionPoint),
    Finished(Box<BookingOutcome>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Stage {
    Pending,
    FlightParams,
    Travelers,
    Preference,
    Dispatched,
}

/// One booking conversation from free-text request to dispatched legs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingFlow {
    query: String,
    mode: Mode,
    intent: Option<TripIntent>,
    stage: Stage,
    flight: CollectionSession,
    travelers: TravelerCollector,
    preference: CollectionSession,
    llm_calls: u32,
}

impl BookingFlow {
    pub fn new(query: &str, mode: Mode) -> Self {
        Self {
            query: query.to_string(),
            mode,
            intent: None,
            stage: Stage::Pending,
            flight: CollectionSession::new(FieldSchema::flight(), mode),
            travelers: TravelerCollector::new(mode),
            preference: CollectionSession::new(FieldSchema::itinerary(), mode),
            llm_calls: 0,
        }
    }

    pub fn intent(&self) -> Option<TripIntent> {
        self.intent
    }

    /// Classify the intent and drive the flow until it suspends or finishes.
    /// In batch mode nothing ever suspends, so this returns `Finished`.
    #[instrument(skip(self, llm, vendor))]
    pub async fn begin(
        &mut self,
        llm: &dyn ChatModel,
        vendor: &dyn TravelVendor,
    ) -> Result<FlowStep, TravelError> {
        if self.stage != Stage::Pending {
            return Err(TravelError::NotSuspended);
        }

        self.llm_calls += 1;
        let intent = extract::classify_intent(llm, &self.query).await;
        self.intent = Some(intent);
        info!(?intent, "intent classified");

        self.stage = Stage::FlightParams;
        let step = self.flight.start(llm, &self.query).await?;
        self.drive(llm, vendor, step).await
    }

    /// Feed an answer to the stage the flow is suspended on, then keep
    /// driving forward.
    pub async fn resume(
        &mut self,
        llm: &dyn ChatModel,
        vendor: &dyn TravelVendor,
        answer: &str,
    ) -> Result<FlowStep, TravelError> {
        let step = match self.stage {
            Stage::FlightParams => self.flight.resume(llm, answer).await?,
            Stage::Travelers => self.travelers.resume(llm, answer).await?,
            Stage::Preference => self.preference.resume(llm, answer).await?,
            Stage::Pending | Stage::Dispatched => return Err(TravelError::NotSuspended),
        };
        self.drive(llm, vendor, step).await
    }

    async fn drive(
        &mut self,
        llm: &dyn ChatModel,
        vendor: &dyn TravelVendor,
        mut step: NextStep,
    ) -> Result<FlowStep, TravelError> {
        loop {
            match step {
                NextStep::Suspended(point) => return Ok(FlowStep::Suspended(point)),
                NextStep::Done => match self.next_stage() {
                    Some(Stage::Travelers) => {
                        step = self.travelers.start(llm, &self.query).await?;
                    }
                    Some(Stage::Preference) => {
                        step = self.preference.start(llm, &self.query).await?;
                    }
                    _ => {
                        let outcome = self.dispatch(llm, vendor).await?;
                        return Ok(FlowStep::Finished(Box::new(outcome)));
                    }
                },
            }
        }
    }

    /// Advance the stage cursor, skipping stages the intent does not need
    fn next_stage(&mut self) -> Option<Stage> {
        let intent = self.intent.unwrap_or(TripIntent::Trip);
        loop {
            self.stage = match self.stage {
                Stage::Pending => Stage::FlightParams,
                Stage::FlightParams => Stage::Travelers,
                Stage::Travelers => Stage::Preference,
                Stage::Preference | Stage::Dispatched => Stage::Dispatched,
            };
            match self.stage {
                Stage::Travelers if !(intent.wants_flight() || intent.wants_hotel()) => continue,
                Stage::Preference if !intent.wants_itinerary() => continue,
                Stage::Dispatched => return None,
                stage => return Some(stage),
            }
        }
    }

    /// Derive location data, assemble the request, and run the legs the
    /// intent asks for. A failed leg is recorded, never propagated; the
    /// other legs still run.
    async fn dispatch(
        &mut self,
        llm: &dyn ChatModel,
        vendor: &dyn TravelVendor,
    ) -> Result<BookingOutcome, TravelError> {
        let intent = self.intent.unwrap_or(TripIntent::Trip);

        // Country, city, and currency come from one non-interactive pass
        // over the collected location codes.
        let mut derived = CollectionSession::new(FieldSchema::derived(), Mode::Batch);
        let origin = self.flight.collected().get("originLocationCode").cloned().unwrap_or_default();
        let destination = self
            .flight
            .collected()
            .get("destinationLocationCode")
            .cloned()
            .unwrap_or_default();
        let hint = format!(
            "Origin airport code: {}. Destination airport code: {}.",
            origin, destination
        );
        derived.start(llm, &hint).await?;

        let request = BookingRequest::assemble(
            self.flight.collected(),
            derived.collected(),
            self.preference.collected(),
            self.travelers.travelers().to_vec(),
        );
        info!(
            origin = %request.origin_location_code,
            destination = %request.destination_location_code,
            adults = request.adults,
            "dispatching booking legs"
        );

        let flight = if intent.wants_flight() {
            let mut report = LegReport::default();
            match vendor.book_flight(&request, &mut report).await {
                Ok(data) => LegResult::Completed { data, report },
                Err(e) => {
                    warn!(error = %e, "flight leg failed");
                    LegResult::Failed {
                        error: e.to_string(),
                        report,
                    }
                }
            }
        } else {
            LegResult::Skipped
        };

        let hotel = if intent.wants_hotel() {
            let mut report = LegReport::default();
            match vendor.book_hotel(&request, &mut report).await {
                Ok(data) => LegResult::Completed { data, report },
                Err(e) => {
                    warn!(error = %e, "hotel leg failed");
                    LegResult::Failed {
                        error: e.to_string(),
                        report,
                    }
                }
            }
        } else {
            LegResult::Skipped
        };

        let (itinerary, travel_plan) = if intent.wants_itinerary() {
            self.llm_calls += 1;
            match extract::generate_itinerary(llm, &request).await {
                Ok(data) => {
                    let plan = render_travel_plan(&data);
                    (
                        LegResult::Completed {
                            data,
                            report: LegReport::default(),
                        },
                        plan,
                    )
                }
                Err(e) => {
                    warn!(error = %e, "itinerary leg failed");
                    (
                        LegResult::Failed {
                            error: e.to_string(),
                            report: LegReport::default(),
                        },
                        String::new(),
                    )
                }
            }
        } else {
            (LegResult::Skipped, String::new())
        };

        let summary = if intent.wants_flight() || intent.wants_hotel() {
            self.llm_calls += 1;
            extract::summarize(llm, &flight.data(), &hotel.data(), &travel_plan).await
        } else if travel_plan.is_empty() {
            String::new()
        } else {
            format!("Travel Plan:\n{}", travel_plan)
        };

        self.llm_calls += self.flight.llm_calls()
            + self.travelers.llm_calls()
            + self.preference.llm_calls()
            + derived.llm_calls();

        Ok(BookingOutcome {
            intent,
            request,
            flight,
            hotel,
            itinerary,
            summary,
            llm_calls: self.llm_calls,
        })
    }
}

fn render_travel_plan(itinerary: &serde_json::Value) -> String {
    match itinerary.get("optimized_travel_plan") {
        Some(serde_json::Value::String(plan)) => plan.clone(),
        Some(other) => other.to_string(),
        None => itinerary.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))
        }
    }

    /// Stub vendor that books everything unless told to fail a leg
    struct StubVendor {
        fail_hotel: bool,
    }

    #[async_trait]
    impl TravelVendor for StubVendor {
        async fn book_flight(
            &self,
            _request: &BookingRequest,
            report: &mut LegReport,
        ) -> Result<serde_json::Value, TravelError> {
            report.record(true);
            report.record(true);
            Ok(serde_json::json!({"data": {"id": "FLIGHT-ORDER-1"}}))
        }

        async fn book_hotel(
            &self,
            _request: &BookingRequest,
            report: &mut LegReport,
        ) -> Result<serde_json::Value, TravelError> {
            report.record(true);
            if self.fail_hotel {
                report.record(false);
                return Err(TravelError::EmptyVendorResponse("no hotel offers found".to_string()));
            }
            report.record(true);
            Ok(serde_json::json!({"data": {"id": "HOTEL-ORDER-1"}}))
        }
    }

    const FLIGHT_JSON: &str = r#"{"originLocationCode": "DEL", "destinationLocationCode": "JFK",
        "departureDate": "2024-12-20", "returnDate": "2024-12-28"}"#;
    const TRAVELER_JSON: &str = r#"{"firstName": "John", "lastName": "Doe",
        "dateOfBirth": "1998-03-07", "gender": "MALE",
        "emailAddress": "john@x.com", "phone": "+1 5550001234"}"#;
    const DERIVED_JSON: &str = r#"{"country": "US", "city": "New York City", "currencyCode": "INR"}"#;

    #[tokio::test]
    async fn test_batch_trip_runs_every_leg() {
        let llm = ScriptedModel::new(&[
            "trip",
            FLIGHT_JSON,
            TRAVELER_JSON,
            TRAVELER_JSON, // refinement echo
            "{}",          // preference extraction finds nothing, default applies
            DERIVED_JSON,
            r#"{"optimized_travel_plan": "Day 1: Central Park."}"#,
            "Flight and hotel booked for John Doe.",
        ]);
        let vendor = StubVendor { fail_hotel: false };
        let mut flow = BookingFlow::new("Book a trip from Delhi to New York, Dec 20-28", Mode::Batch);

        let FlowStep::Finished(outcome) = flow.begin(&llm, &vendor).await.unwrap() else {
            panic!("batch flow must not suspend");
        };

        assert_eq!(outcome.intent, TripIntent::Trip);
        assert!(outcome.flight.is_completed());
        assert!(outcome.hotel.is_completed());
        assert!(outcome.itinerary.is_completed());
        assert_eq!(outcome.request.travel_plan_preference, "tourism");
        assert_eq!(outcome.request.currency_code, "INR");
        assert_eq!(outcome.request.adults, 1);
        assert!(outcome.summary.contains("Travel Plan:"));
        assert!(outcome.summary.contains("Central Park"));
        assert_eq!(outcome.llm_calls, 8);
    }

    #[tokio::test]
    async fn test_flight_intent_skips_other_legs() {
        let llm = ScriptedModel::new(&[
            "flight",
            FLIGHT_JSON,
            TRAVELER_JSON,
            TRAVELER_JSON, // refinement echo
            DERIVED_JSON,
            "Flight booked for John Doe.",
        ]);
        let vendor = StubVendor { fail_hotel: false };
        let mut flow = BookingFlow::new("Just a flight Delhi to NYC", Mode::Batch);

        let FlowStep::Finished(outcome) = flow.begin(&llm, &vendor).await.unwrap() else {
            panic!("batch flow must not suspend");
        };

        assert_eq!(outcome.intent, TripIntent::Flight);
        assert!(outcome.flight.is_completed());
        assert!(matches!(outcome.hotel, LegResult::Skipped));
        assert!(matches!(outcome.itinerary, LegResult::Skipped));
        // Preference was never collected, so the assembled request is empty there
        assert_eq!(outcome.request.travel_plan_preference, "");
        assert_eq!(outcome.llm_calls, 6);
    }

    #[tokio::test]
    async fn test_failed_leg_does_not_abort_the_flow() {
        let llm = ScriptedModel::new(&[
            "trip",
            FLIGHT_JSON,
            TRAVELER_JSON,
            TRAVELER_JSON,
            "{}",
            DERIVED_JSON,
            r#"{"optimized_travel_plan": "Day 1: Times Square."}"#,
            "Flight booked; hotel unavailable.",
        ]);
        let vendor = StubVendor { fail_hotel: true };
        let mut flow = BookingFlow::new("Trip to New York", Mode::Batch);

        let FlowStep::Finished(outcome) = flow.begin(&llm, &vendor).await.unwrap() else {
            panic!("batch flow must not suspend");
        };

        assert!(outcome.flight.is_completed());
        let LegResult::Failed { error, report } = &outcome.hotel else {
            panic!("hotel leg should fail");
        };
        assert!(error.contains("no hotel offers"));
        assert_eq!(report.calls, 2);
        assert_eq!(report.succeeded, 1);
        assert!(outcome.itinerary.is_completed());
    }

    #[tokio::test]
    async fn test_interactive_flow_suspends_and_resumes() {
        let llm = ScriptedModel::new(&[
            "flight",
            r#"{"originLocationCode": "DEL", "destinationLocationCode": "JFK",
                "departureDate": "2024-12-20"}"#,
            "2024-12-28", // returnDate answer
            TRAVELER_JSON,
            TRAVELER_JSON, // refinement echo
            DERIVED_JSON,
            "Flight booked.",
        ]);
        let vendor = StubVendor { fail_hotel: false };
        let mut flow = BookingFlow::new("Flight Delhi to NYC on Dec 20", Mode::Interactive);

        let FlowStep::Suspended(point) = flow.begin(&llm, &vendor).await.unwrap() else {
            panic!("expected suspension on returnDate");
        };
        assert_eq!(point.field, "returnDate");

        // Traveler extraction fills everything, so the next question is
        // the add-another one.
        let FlowStep::Suspended(point) = flow.resume(&llm, &vendor, "back on the 28th").await.unwrap()
        else {
            panic!("expected add-another question");
        };
        assert_eq!(point.field, "addAnother");

        let FlowStep::Finished(outcome) = flow.resume(&llm, &vendor, "no").await.unwrap() else {
            panic!("expected flow to finish");
        };
        assert_eq!(outcome.request.return_date, "2024-12-28");
        assert_eq!(outcome.request.travelers.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_before_begin_errors() {
        let llm = ScriptedModel::new(&[]);
        let vendor = StubVendor { fail_hotel: false };
        let mut flow = BookingFlow::new("hi", Mode::Interactive);
        let err = flow.resume(&llm, &vendor, "DEL").await.unwrap_err();
        assert!(matches!(err, TravelError::NotSuspended));
    }
}
