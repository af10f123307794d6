//! Resumable multi-turn parameter collection
//!
//! A [`CollectionSession`] walks one field schema: a one-shot extraction
//! over the opening text, then one suspension per missing required field.
//! The session holds no client handles, so it can be parked in a session
//! table between turns and serialized as plain data.
//!
//! Retry policy per field:
//! - interactive, no default: re-ask until an acceptable value arrives
//! - interactive, with default: ask once, then fall back to the default
//! - batch: never ask; use the default when one exists, else leave absent

use crate::extract;
use crate::llm::ChatModel;
use crate::schema::{is_acceptable, FieldSchema};
use crate::{TravelError, TravelerProfile};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Whether missing fields may be asked for over further turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Interactive,
    Batch,
}

/// A paused session waiting for one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspensionPoint {
    /// Which collection the question belongs to
    pub session: String,
    /// The field the answer will be extracted into
    pub field: String,
    /// Question to show the user verbatim
    pub prompt: String,
}

/// Outcome of driving a session one step forward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NextStep {
    Suspended(SuspensionPoint),
    Done,
}

/// Collects the fields of one schema over one or more turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSession {
    schema: FieldSchema,
    mode: Mode,
    collected: BTreeMap<String, String>,
    inherited: BTreeMap<String, String>,
    /// Field the session is currently suspended on
    awaiting: Option<String>,
    /// Fields already asked once, for the ask-once-then-default policy
    asked: BTreeSet<String>,
    llm_calls: u32,
}

impl CollectionSession {
    pub fn new(schema: FieldSchema, mode: Mode) -> Self {
        Self {
            schema,
            mode,
            collected: BTreeMap::new(),
            inherited: BTreeMap::new(),
            awaiting: None,
            asked: BTreeSet::new(),
            llm_calls: 0,
        }
    }

    /// Seed values carried over from an earlier session. They fill gaps the
    /// opening extraction leaves; extracted values always win.
    pub fn prefill(&mut self, fields: BTreeMap<String, String>) {
        self.inherited = fields;
    }

    pub fn collected(&self) -> &BTreeMap<String, String> {
        &self.collected
    }

    pub fn into_collected(self) -> BTreeMap<String, String> {
        self.collected
    }

    pub fn llm_calls(&self) -> u32 {
        self.llm_calls
    }

    /// Run the opening extraction over free text and advance to the first
    /// suspension point, or finish immediately when nothing is missing.
    pub async fn start(&mut self, llm: &dyn ChatModel, text: &str) -> Result<NextStep, TravelError> {
        // Nothing to mine from an empty seed; go straight to asking.
        if text.trim().is_empty() {
            self.collected = self.inherited.clone();
            debug!(schema = %self.schema.name, "session started without seed text");
            return Ok(self.advance());
        }

        self.llm_calls += 1;
        self.collected = extract::extract_fields(llm, &self.schema, text).await;
        for (name, value) in &self.inherited {
            if !self.collected.contains_key(name) {
                self.collected.insert(name.clone(), value.clone());
            }
        }
        debug!(
            schema = %self.schema.name,
            extracted = self.collected.len(),
            "session started"
        );
        Ok(self.advance())
    }

    /// Feed the user's answer to the field the session is suspended on.
    ///
    /// Returns [`TravelError::NotSuspended`] when the session is not waiting
    /// for input.
    pub async fn resume(&mut self, llm: &dyn ChatModel, answer: &str) -> Result<NextStep, TravelError> {
        let field = self.awaiting.take().ok_or(TravelError::NotSuspended)?;
        let descriptor = self
            .schema
            .get(&field)
            .ok_or(TravelError::NotSuspended)?
            .clone();

        // An empty answer is never a field value; re-ask without spending
        // an extraction call.
        if answer.trim().is_empty() {
            self.awaiting = Some(field);
            return Ok(NextStep::Suspended(SuspensionPoint {
                session: self.schema.name.clone(),
                field: descriptor.name.clone(),
                prompt: format!("Please provide {} ({}).", descriptor.name, descriptor.description),
            }));
        }

        self.llm_calls += 1;
        let value = extract::extract_field(llm, &descriptor, answer).await;
        if is_acceptable(descriptor.kind, &value) {
            self.collected.insert(field, value);
        } else if let Some(default) = &descriptor.default {
            debug!(field = %field, "answer unusable, falling back to default");
            self.collected.insert(field, default.clone());
        }
        // Fields with no default stay missing and get asked again by advance.
        Ok(self.advance())
    }

    fn advance(&mut self) -> NextStep {
        if self.mode == Mode::Interactive {
            for descriptor in self.schema.required_fields() {
                if self.collected.contains_key(&descriptor.name) {
                    continue;
                }
                if self.asked.contains(&descriptor.name) {
                    if let Some(default) = &descriptor.default {
                        self.collected.insert(descriptor.name.clone(), default.clone());
                        continue;
                    }
                }
                self.asked.insert(descriptor.name.clone());
                self.awaiting = Some(descriptor.name.clone());
                return NextStep::Suspended(SuspensionPoint {
                    session: self.schema.name.clone(),
                    field: descriptor.name.clone(),
                    prompt: format!("Please provide {} ({}).", descriptor.name, descriptor.description),
                });
            }
        }

        // Finished (or batch): fill remaining defaults, leave the rest absent.
        for descriptor in self.schema.fields() {
            if !self.collected.contains_key(&descriptor.name) {
                if let Some(default) = &descriptor.default {
                    self.collected.insert(descriptor.name.clone(), default.clone());
                }
            }
        }
        info!(schema = %self.schema.name, fields = self.collected.len(), "collection complete");
        NextStep::Done
    }
}

/// Drives traveler collection: one inner session per traveler, an
/// add-another question between travelers, and a normalization pass over
/// each finished field map. Later travelers inherit the first traveler's
/// contact details as gap fillers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelerCollector {
    mode: Mode,
    current: Option<CollectionSession>,
    travelers: Vec<TravelerProfile>,
    /// Suspended on the add-another question rather than a field
    asking_another: bool,
    shared_contact: BTreeMap<String, String>,
    llm_calls: u32,
}

const ADD_ANOTHER_PROMPT: &str = "Do you want to add another traveler? (yes/no)";

impl TravelerCollector {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            current: None,
            travelers: Vec::new(),
            asking_another: false,
            shared_contact: BTreeMap::new(),
            llm_calls: 0,
        }
    }

    pub fn travelers(&self) -> &[TravelerProfile] {
        &self.travelers
    }

    pub fn into_travelers(self) -> Vec<TravelerProfile> {
        self.travelers
    }

    pub fn llm_calls(&self) -> u32 {
        self.llm_calls
    }

    /// Begin collecting the first traveler, seeding the extraction with the
    /// original request text.
    pub async fn start(&mut self, llm: &dyn ChatModel, text: &str) -> Result<NextStep, TravelError> {
        let mut session = CollectionSession::new(FieldSchema::traveler(), self.mode);
        match session.start(llm, text).await? {
            NextStep::Done => {
                self.llm_calls += session.llm_calls();
                self.finish_traveler(llm, session).await
            }
            step => {
                self.current = Some(session);
                Ok(step)
            }
        }
    }

    /// Feed an answer to whatever the collector is suspended on: a traveler
    /// field or the add-another question.
    pub async fn resume(&mut self, llm: &dyn ChatModel, answer: &str) -> Result<NextStep, TravelError> {
        if self.asking_another {
            self.asking_another = false;
            let wants_more = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
            if !wants_more {
                info!(travelers = self.travelers.len(), "traveler collection complete");
                return Ok(NextStep::Done);
            }

            let mut session = CollectionSession::new(FieldSchema::traveler(), self.mode);
            session.prefill(self.shared_contact.clone());
            // Subsequent travelers have no opening text to mine.
            return match session.start(llm, "").await? {
                NextStep::Done => {
                    self.llm_calls += session.llm_calls();
                    self.finish_traveler(llm, session).await
                }
                step => {
                    self.current = Some(session);
                    Ok(step)
                }
            };
        }

        let mut session = self.current.take().ok_or(TravelError::NotSuspended)?;
        match session.resume(llm, answer).await? {
            NextStep::Done => {
                self.llm_calls += session.llm_calls();
                self.finish_traveler(llm, session).await
            }
            step => {
                self.current = Some(session);
                Ok(step)
            }
        }
    }

    async fn finish_traveler(
        &mut self,
        llm: &dyn ChatModel,
        session: CollectionSession,
    ) -> Result<NextStep, TravelError> {
        let mut fields = session.into_collected();

        self.llm_calls += 1;
        if let Some(refined) = extract::refine_traveler(llm, &fields).await {
            fields = refined;
        }

        if self.travelers.is_empty() {
            for name in ["emailAddress", "phone"] {
                if let Some(value) = fields.get(name) {
                    self.shared_contact.insert(name.to_string(), value.clone());
                }
            }
        }

        let id = self.travelers.len() as u32 + 1;
        let profile = TravelerProfile::from_fields(&fields, id);
        debug!(id, "traveler assembled");
        self.travelers.push(profile);

        if self.mode == Mode::Batch {
            return Ok(NextStep::Done);
        }

        self.asking_another = true;
        Ok(NextStep::Suspended(SuspensionPoint {
            session: "traveler".to_string(),
            field: "addAnother".to_string(),
            prompt: ADD_ANOTHER_PROMPT.to_string(),
        }))
    }
}
