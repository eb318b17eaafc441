use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::MailgraphError;
use crate::graph::client::GraphClient;
use crate::graph::mail::parse_graph_shape;

#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    /// How many days ahead to include, starting now.
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventParams {
    pub subject: String,
    /// Local wall-clock timestamp, e.g. "2026-08-12T14:00:00".
    pub start: String,
    pub end: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteEventParams {
    pub id: String,
}

fn default_days() -> u32 {
    7
}

fn default_count() -> u32 {
    10
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    value: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    start: Option<EventTime>,
    #[serde(default)]
    end: Option<EventTime>,
    #[serde(default)]
    location: Option<Location>,
    #[serde(default)]
    organizer: Option<Organizer>,
    #[serde(default)]
    is_all_day: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    #[serde(default)]
    date_time: Option<String>,
    #[serde(default)]
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organizer {
    #[serde(default)]
    email_address: Option<OrganizerAddress>,
}

#[derive(Debug, Deserialize)]
struct OrganizerAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

pub async fn list_events(
    client: &GraphClient,
    params: ListEventsParams,
) -> Result<serde_json::Value, MailgraphError> {
    let start = Utc::now();
    let end = start + Duration::days(i64::from(params.days));
    let raw = client
        .get(
            "/me/calendarView",
            &[
                ("startDateTime", start.to_rfc3339()),
                ("endDateTime", end.to_rfc3339()),
                ("$orderby", "start/dateTime".to_string()),
                ("$top", params.count.to_string()),
                (
                    "$select",
                    "id,subject,start,end,location,organizer,isAllDay".to_string(),
                ),
            ],
        )
        .await?;
    let list: EventList = parse_graph_shape(raw)?;
    let events: Vec<_> = list
        .value
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "subject": e.subject,
                "start": e.start.as_ref().map(format_event_time),
                "end": e.end.as_ref().map(format_event_time),
                "location": e.location.as_ref().and_then(|l| l.display_name.clone()),
                "organizer": e.organizer.as_ref().map(format_organizer),
                "isAllDay": e.is_all_day,
            })
        })
        .collect();
    Ok(json!({ "events": events }))
}

pub async fn create_event(
    client: &GraphClient,
    params: CreateEventParams,
) -> Result<serde_json::Value, MailgraphError> {
    let mut payload = json!({
        "subject": params.subject,
        "start": { "dateTime": params.start, "timeZone": params.timezone },
        "end": { "dateTime": params.end, "timeZone": params.timezone },
        "attendees": params
            .attendees
            .iter()
            .map(|a| json!({ "emailAddress": { "address": a }, "type": "required" }))
            .collect::<Vec<_>>(),
    });
    if let Some(location) = params.location {
        payload["location"] = json!({ "displayName": location });
    }
    if let Some(body) = params.body {
        payload["body"] = json!({ "contentType": "Text", "content": body });
    }

    let created = client.post("/me/events", payload).await?;
    Ok(json!({
        "id": created.get("id").cloned().unwrap_or(serde_json::Value::Null),
        "status": "created",
    }))
}

pub async fn delete_event(
    client: &GraphClient,
    params: DeleteEventParams,
) -> Result<serde_json::Value, MailgraphError> {
    let path = format!("/me/events/{}", params.id);
    client.delete(&path).await?;
    Ok(json!({ "id": params.id, "status": "deleted" }))
}

fn format_event_time(time: &EventTime) -> String {
    match (&time.date_time, &time.time_zone) {
        (Some(dt), Some(tz)) => format!("{dt} ({tz})"),
        (Some(dt), None) => dt.clone(),
        _ => String::new(),
    }
}

fn format_organizer(organizer: &Organizer) -> String {
    let Some(email) = &organizer.email_address else {
        return String::new();
    };
    match (&email.name, &email.address) {
        (Some(name), _) => name.clone(),
        (None, Some(address)) => address.clone(),
        (None, None) => String::new(),
    }
}
