//! Amadeus self-service API client
//!
//! Flight legs run the search -> price -> order chain; hotel legs run
//! hotel-list -> offers -> order. Both sides thread a [`LegReport`] so the
//! orchestrator can show how many vendor calls a leg made and how many
//! came back successful.

use crate::config::AmadeusConfig;
use crate::{BookingRequest, TravelError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Vendor call counters for one booking leg
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegReport {
    pub calls: u32,
    pub succeeded: u32,
}

impl LegReport {
    pub fn record(&mut self, ok: bool) {
        self.calls += 1;
        if ok {
            self.succeeded += 1;
        }
    }
}

/// The two bookable legs, behind a trait so flows can run against a stub
#[async_trait]
pub trait TravelVendor: Send + Sync {
    async fn book_flight(
        &self,
        request: &BookingRequest,
        report: &mut LegReport,
    ) -> Result<serde_json::Value, TravelError>;

    async fn book_hotel(
        &self,
        request: &BookingRequest,
        report: &mut LegReport,
    ) -> Result<serde_json::Value, TravelError>;
}

/// Client for the Amadeus test environment
pub struct AmadeusClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// The Amadeus sandbox only accepts its published test card.
const TEST_CARD_NUMBER: &str = "4151289722471370";
const TEST_CARD_EXPIRY: &str = "2027-08";

impl AmadeusClient {
    /// Create a client from configuration; credentials are resolved up front.
    pub fn from_config(config: &AmadeusConfig) -> Result<Self, TravelError> {
        let (client_id, client_secret) = config.credentials()?;
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            client_id,
            client_secret,
            http,
        })
    }

    async fn access_token(&self, report: &mut LegReport) -> Result<String, TravelError> {
        let url = format!("{}/v1/security/oauth2/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;

        let ok = response.status().is_success();
        report.record(ok);
        if !ok {
            return Err(TravelError::EmptyVendorResponse(format!(
                "token request failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn get_json(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, String)],
        report: &mut LegReport,
    ) -> Result<serde_json::Value, TravelError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        report.record(status.is_success());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, %status, "vendor GET failed");
            return Err(TravelError::EmptyVendorResponse(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }
        Ok(response.json().await?)
    }

    async fn post_json(
        &self,
        token: &str,
        url: &str,
        body: &serde_json::Value,
        report: &mut LegReport,
    ) -> Result<serde_json::Value, TravelError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        report.record(status.is_success());
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, %status, "vendor POST failed");
            return Err(TravelError::EmptyVendorResponse(format!(
                "{} returned {}: {}",
                url, status, body
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TravelVendor for AmadeusClient {
    /// Search offers, confirm the price of the first one, then place the
    /// order with the collected travelers.
    #[instrument(skip(self, request, report), fields(origin = %request.origin_location_code, destination = %request.destination_location_code))]
    async fn book_flight(
        &self,
        request: &BookingRequest,
        report: &mut LegReport,
    ) -> Result<serde_json::Value, TravelError> {
        let token = self.access_token(report).await?;

        let search_url = format!("{}/v2/shopping/flight-offers", self.base_url);
        let mut query = vec![
            ("originLocationCode", request.origin_location_code.clone()),
            ("destinationLocationCode", request.destination_location_code.clone()),
            ("departureDate", request.departure_date.clone()),
            ("adults", request.adults.to_string()),
            ("max", request.max.to_string()),
        ];
        if !request.return_date.is_empty() {
            query.push(("returnDate", request.return_date.clone()));
        }
        if !request.currency_code.is_empty() {
            query.push(("currencyCode", request.currency_code.clone()));
        }
        let search = self.get_json(&token, &search_url, &query, report).await?;

        let offer = search["data"]
            .get(0)
            .cloned()
            .ok_or_else(|| TravelError::EmptyVendorResponse("no flight offers found".to_string()))?;
        debug!("flight offer selected");

        let pricing_url = format!("{}/v1/shopping/flight-offers/pricing", self.base_url);
        let pricing_body = serde_json::json!({
            "data": {
                "type": "flight-offers-pricing",
                "flightOffers": [offer],
            }
        });
        let priced = self.post_json(&token, &pricing_url, &pricing_body, report).await?;

        let priced_offer = priced["data"]["flightOffers"]
            .get(0)
            .cloned()
            .ok_or_else(|| TravelError::EmptyVendorResponse("pricing returned no offers".to_string()))?;

        let order_url = format!("{}/v1/booking/flight-orders", self.base_url);
        let travelers: Vec<serde_json::Value> =
            request.travelers.iter().map(|t| t.to_vendor()).collect();
        let order_body = serde_json::json!({
            "data": {
                "type": "flight-order",
                "flightOffers": [priced_offer],
                "travelers": travelers,
            }
        });
        self.post_json(&token, &order_url, &order_body, report).await
    }

    /// List hotels in the destination city, fetch offers for the first
    /// thirty, then order the first offer.
    #[instrument(skip(self, request, report), fields(city = %request.destination_location_code))]
    async fn book_hotel(
        &self,
        request: &BookingRequest,
        report: &mut LegReport,
    ) -> Result<serde_json::Value, TravelError> {
        let token = self.access_token(report).await?;

        let list_url = format!("{}/v1/reference-data/locations/hotels/by-city", self.base_url);
        let list = self
            .get_json(
                &token,
                &list_url,
                &[("cityCode", request.destination_location_code.clone())],
                report,
            )
            .await?;

        let hotel_ids: Vec<String> = list["data"]
            .as_array()
            .map(|hotels| {
                hotels
                    .iter()
                    .take(30)
                    .filter_map(|h| h["hotelId"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        if hotel_ids.is_empty() {
            return Err(TravelError::EmptyVendorResponse(format!(
                "no hotels found in {}",
                request.destination_location_code
            )));
        }
        debug!(hotels = hotel_ids.len(), "hotel list fetched");

        let offers_url = format!("{}/v3/shopping/hotel-offers", self.base_url);
        let offers = self
            .get_json(
                &token,
                &offers_url,
                &[
                    ("hotelIds", hotel_ids.join(",")),
                    ("adults", request.adults.to_string()),
                    ("checkInDate", request.departure_date.clone()),
                    ("checkOutDate", request.return_date.clone()),
                ],
                report,
            )
            .await?;

        let offer_id = offers["data"]
            .get(0)
            .and_then(|entry| entry["offers"].get(0))
            .and_then(|offer| offer["id"].as_str())
            .map(String::from)
            .ok_or_else(|| TravelError::EmptyVendorResponse("no hotel offers found".to_string()))?;

        let order_url = format!("{}/v2/booking/hotel-orders", self.base_url);
        let order_body = hotel_order_body(request, &offer_id);
        self.post_json(&token, &order_url, &order_body, report).await
    }
}

/// Build the hotel order payload: guest references for every traveler, the
/// first traveler as the travel agent contact, and the sandbox test card.
fn hotel_order_body(request: &BookingRequest, offer_id: &str) -> serde_json::Value {
    let guests: Vec<serde_json::Value> = request
        .travelers
        .iter()
        .enumerate()
        .map(|(index, traveler)| {
            let title = if traveler.gender == "FEMALE" { "MS" } else { "MR" };
            serde_json::json!({
                "tid": index + 1,
                "title": title,
                "firstName": traveler.name.first_name,
                "lastName": traveler.name.last_name,
                "phone": format!(
                    "+{}{}",
                    traveler.phone.country_calling_code, traveler.phone.number
                ),
                "email": traveler.email_address,
            })
        })
        .collect();

    let lead = request.travelers.first();
    let agent_email = lead.map(|t| t.email_address.clone()).unwrap_or_default();
    let holder_name = lead
        .map(|t| format!("{} {}", t.name.first_name, t.name.last_name))
        .unwrap_or_default();
    let guest_references: Vec<serde_json::Value> = (1..=guests.len().max(1))
        .map(|tid| serde_json::json!({ "guestReference": tid.to_string() }))
        .collect();

    serde_json::json!({
        "data": {
            "type": "hotel-order",
            "guests": guests,
            "travelAgent": {
                "contact": { "email": agent_email }
            },
            "roomAssociations": [{
                "guestReferences": guest_references,
                "hotelOfferId": offer_id,
            }],
            "payment": {
                "method": "CREDIT_CARD",
                "paymentCard": {
                    "paymentCardInfo": {
                        "vendorCode": "VI",
                        "cardNumber": TEST_CARD_NUMBER,
                        "expiryDate": TEST_CARD_EXPIRY,
                        "holderName": holder_name,
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TravelerProfile;
    use std::collections::BTreeMap;

    fn traveler(first: &str, last: &str, gender: &str, id: u32) -> TravelerProfile {
        let mut fields = BTreeMap::new();
        fields.insert("firstName".to_string(), first.to_string());
        fields.insert("lastName".to_string(), last.to_string());
        fields.insert("gender".to_string(), gender.to_string());
        fields.insert("emailAddress".to_string(), "lead@x.com".to_string());
        fields.insert("phone".to_string(), "+1 5550001234".to_string());
        TravelerProfile::from_fields(&fields, id)
    }

    #[test]
    fn test_leg_report_counts() {
        let mut report = LegReport::default();
        report.record(true);
        report.record(false);
        report.record(true);
        assert_eq!(report.calls, 3);
        assert_eq!(report.succeeded, 2);
    }

    #[test]
    fn test_hotel_order_body_shape() {
        let mut request = BookingRequest::default();
        request.travelers = vec![traveler("John", "Doe", "male", 1), traveler("Jane", "Doe", "female", 2)];

        let body = hotel_order_body(&request, "OFFER123");
        let data = &body["data"];
        assert_eq!(data["type"], "hotel-order");
        assert_eq!(data["guests"][0]["title"], "MR");
        assert_eq!(data["guests"][1]["title"], "MS");
        assert_eq!(data["guests"][0]["phone"], "+15550001234");
        assert_eq!(data["roomAssociations"][0]["hotelOfferId"], "OFFER123");
        assert_eq!(data["roomAssociations"][0]["guestReferences"][1]["guestReference"], "2");
        assert_eq!(data["travelAgent"]["contact"]["email"], "lead@x.com");
        assert_eq!(
            data["payment"]["paymentCard"]["paymentCardInfo"]["holderName"],
            "JOHN DOE"
        );
    }

    #[test]
    fn test_hotel_order_body_without_travelers() {
        let request = BookingRequest::default();
        let body = hotel_order_body(&request, "OFFER1");
        assert_eq!(body["data"]["guests"].as_array().unwrap().len(), 0);
        assert_eq!(body["data"]["roomAssociations"][0]["guestReferences"][0]["guestReference"], "1");
    }
}
