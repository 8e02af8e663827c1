use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::api::IssueFetcher;
use crate::errors::{CommsError, Result};

const INCIDENT_PROJECT: &str = "OPS";
const INCIDENT_ISSUE_TYPE: &str = "Incident";

/// Where the incident-only values live in a Jira record and how its
/// timestamps are written.
#[derive(Debug, Clone)]
pub struct FieldOptions {
    pub priority_field: String,
    pub start_time_field: String,
    pub end_time_field: String,
    pub datetime_format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Generic,
    Incident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncidentFields {
    pub priority: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TicketKind {
    Generic,
    Incident(IncidentFields),
}

impl TicketKind {
    pub fn variant(&self) -> Variant {
        match self {
            TicketKind::Generic => Variant::Generic,
            TicketKind::Incident(_) => Variant::Incident,
        }
    }
}

/// A Jira ticket as fetched at resolve time.
///
/// Only [`Ticket::resolve`] creates one. The variant is fixed at that point;
/// [`Ticket::refresh`] swaps in fresh raw fields but never reclassifies.
#[derive(Debug, Clone)]
pub struct Ticket {
    reference: String,
    project: String,
    api_location: Url,
    ui_location: Url,
    status: String,
    raw_fields: Map<String, Value>,
    kind: TicketKind,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(rename = "self")]
    self_url: Option<String>,
    fields: Map<String, Value>,
}

impl RawIssue {
    fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| CommsError::MalformedResponse(format!("Failed to parse Jira response: {}", e)))
    }

    fn status(&self) -> Result<String> {
        self.fields
            .get("status")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                CommsError::MalformedResponse(format!("Ticket {} has no status name", self.key))
            })
    }

    fn issue_type(&self) -> Option<&str> {
        self.fields
            .get("issuetype")
            .and_then(|t| t.get("name"))
            .and_then(Value::as_str)
    }
}

/// Project key of a ticket reference: everything before the first `-`.
pub fn project_of(reference: &str) -> &str {
    reference.split('-').next().unwrap_or(reference)
}

/// The one place a ticket's variant is decided.
pub fn classify(project: &str, issue_type: Option<&str>) -> Variant {
    if project == INCIDENT_PROJECT && issue_type == Some(INCIDENT_ISSUE_TYPE) {
        Variant::Incident
    } else {
        Variant::Generic
    }
}

/// Jira does not report a browse link, so derive it from the API link.
pub fn ui_location_for(api_location: &Url, reference: &str) -> Url {
    let mut url = api_location.clone();
    url.set_path(&format!("browse/{}", reference));
    url
}

impl Ticket {
    /// Fetches `{api_base}issue/{reference}` and builds the matching variant.
    pub async fn resolve(
        fetcher: &dyn IssueFetcher,
        reference: &str,
        api_base: &Url,
        options: &FieldOptions,
    ) -> Result<Self> {
        let raw = format!("{}issue/{}", api_base, reference);
        let fetch_url = Url::parse(&raw)
            .map_err(|e| CommsError::Other(format!("Invalid ticket URL '{}': {}", raw, e)))?;

        let response = fetcher.fetch(&fetch_url).await?;
        let ticket = Self::from_body(&response.body, &fetch_url, options)?;

        tracing::info!(
            project = %ticket.project,
            api_url = %ticket.api_location,
            ui_url = %ticket.ui_location,
            variant = ?ticket.kind.variant(),
            "resolved ticket {}",
            ticket.reference
        );

        Ok(ticket)
    }

    pub(crate) fn from_body(body: &str, fetch_url: &Url, options: &FieldOptions) -> Result<Self> {
        let raw = RawIssue::parse(body)?;

        let api_location = match &raw.self_url {
            Some(link) => Url::parse(link).map_err(|e| {
                CommsError::MalformedResponse(format!("Invalid self link '{}': {}", link, e))
            })?,
            None => fetch_url.clone(),
        };

        let project = project_of(&raw.key).to_string();
        let status = raw.status()?;

        let kind = match classify(&project, raw.issue_type()) {
            Variant::Incident => TicketKind::Incident(extract_incident(&raw.fields, options)?),
            Variant::Generic => TicketKind::Generic,
        };

        Ok(Self {
            ui_location: ui_location_for(&api_location, &raw.key),
            reference: raw.key,
            project,
            api_location,
            status,
            raw_fields: raw.fields,
            kind,
        })
    }

    /// Re-fetches the record and replaces the raw fields and UI locator.
    ///
    /// Fails with `ProjectMismatch` if Jira now files the ticket under another
    /// project; the ticket is left untouched and must be resolved again.
    pub async fn refresh(&mut self, fetcher: &dyn IssueFetcher) -> Result<()> {
        let response = fetcher.fetch(&self.api_location).await?;
        let raw = RawIssue::parse(&response.body)?;

        let found = project_of(&raw.key);
        if found != self.project {
            tracing::warn!(
                expected = %self.project,
                found = %found,
                "ticket {} moved project",
                self.reference
            );
            return Err(CommsError::ProjectMismatch {
                reference: self.reference.clone(),
                expected: self.project.clone(),
                found: found.to_string(),
            });
        }

        self.ui_location = ui_location_for(&self.api_location, &raw.key);
        self.raw_fields = raw.fields;

        tracing::debug!(ui_url = %self.ui_location, "refreshed ticket {}", self.reference);
        Ok(())
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn api_location(&self) -> &Url {
        &self.api_location
    }

    pub fn ui_location(&self) -> &Url {
        &self.ui_location
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn raw_fields(&self) -> &Map<String, Value> {
        &self.raw_fields
    }

    pub fn kind(&self) -> &TicketKind {
        &self.kind
    }

    pub fn incident(&self) -> Option<&IncidentFields> {
        match &self.kind {
            TicketKind::Incident(fields) => Some(fields),
            TicketKind::Generic => None,
        }
    }

    /// A string-valued raw field; `None` when absent, null, or not a string.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.raw_fields.get(name).and_then(Value::as_str)
    }

    pub fn summary(&self) -> Option<&str> {
        self.text_field("summary")
    }

    pub fn description(&self) -> Option<&str> {
        self.text_field("description")
    }
}

fn extract_incident(fields: &Map<String, Value>, options: &FieldOptions) -> Result<IncidentFields> {
    let priority = match fields.get(&options.priority_field) {
        Some(Value::Object(option)) => option.get("value").and_then(Value::as_str),
        Some(Value::String(value)) => Some(value.as_str()),
        _ => None,
    }
    .filter(|p| !p.is_empty())
    .ok_or_else(|| CommsError::field(&options.priority_field, "incident priority is missing"))?
    .to_string();

    let start_raw = fields
        .get(&options.start_time_field)
        .and_then(Value::as_str)
        .ok_or_else(|| CommsError::field(&options.start_time_field, "incident start time is missing"))?;
    let start_time = parse_time(start_raw, &options.start_time_field, &options.datetime_format)?;

    // Unset end time is normal for an open incident; anything else must parse.
    let end_time = match fields.get(&options.end_time_field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(parse_time(s, &options.end_time_field, &options.datetime_format)?),
        Some(other) => {
            return Err(CommsError::field(
                &options.end_time_field,
                format!("expected a timestamp string, got {}", other),
            ))
        }
    };

    Ok(IncidentFields {
        priority,
        start_time,
        end_time,
    })
}

fn parse_time(value: &str, field: &str, format: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(value, format).map_err(|e| {
        CommsError::field(field, format!("'{}' does not match '{}': {}", value, format, e))
    })
}
