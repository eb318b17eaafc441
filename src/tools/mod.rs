use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::MailgraphError;
use crate::graph::{calendar, contacts, mail, GraphClient};

/// A tool exposed over MCP: name, description, and a JSON-Schema for its
/// arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

fn tool(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Every tool the server advertises, in a stable order.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "authenticate",
            "Start interactive sign-in. Returns a URL the operator must visit in a browser.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "auth-status",
            "Report the current sign-in state without any network call.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "list-emails",
            "List recent emails in a mail folder (default: inbox).",
            json!({
                "type": "object",
                "properties": {
                    "folder": { "type": "string", "description": "Well-known folder name or folder id" },
                    "count": { "type": "integer", "description": "Number of emails to return (default 10)" }
                }
            }),
        ),
        tool(
            "search-emails",
            "Full-text search across emails.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "count": { "type": "integer", "description": "Number of emails to return (default 10)" }
                },
                "required": ["query"]
            }),
        ),
        tool(
            "read-email",
            "Read a single email including its body.",
            json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }),
        ),
        tool(
            "send-email",
            "Send an email from the signed-in account.",
            json!({
                "type": "object",
                "properties": {
                    "to": { "type": "array", "items": { "type": "string" } },
                    "cc": { "type": "array", "items": { "type": "string" } },
                    "bcc": { "type": "array", "items": { "type": "string" } },
                    "subject": { "type": "string" },
                    "body": { "type": "string" }
                },
                "required": ["to", "subject", "body"]
            }),
        ),
        tool(
            "mark-email-read",
            "Mark an email as read or unread.",
            json!({
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "read": { "type": "boolean", "description": "Defaults to true" }
                },
                "required": ["id"]
            }),
        ),
        tool(
            "list-folders",
            "List mail folders with unread counts.",
            json!({ "type": "object", "properties": {} }),
        ),
        tool(
            "list-events",
            "List upcoming calendar events.",
            json!({
                "type": "object",
                "properties": {
                    "days": { "type": "integer", "description": "Days ahead to include (default 7)" },
                    "count": { "type": "integer", "description": "Number of events to return (default 10)" }
                }
            }),
        ),
        tool(
            "create-event",
            "Create a calendar event.",
            json!({
                "type": "object",
                "properties": {
                    "subject": { "type": "string" },
                    "start": { "type": "string", "description": "Local timestamp, e.g. 2026-08-12T14:00:00" },
                    "end": { "type": "string" },
                    "timezone": { "type": "string", "description": "IANA or Windows timezone (default UTC)" },
                    "location": { "type": "string" },
                    "attendees": { "type": "array", "items": { "type": "string" } },
                    "body": { "type": "string" }
                },
                "required": ["subject", "start", "end"]
            }),
        ),
        tool(
            "delete-event",
            "Delete a calendar event.",
            json!({
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"]
            }),
        ),
        tool(
            "list-contacts",
            "List contacts, ordered by display name.",
            json!({
                "type": "object",
                "properties": {
                    "count": { "type": "integer", "description": "Number of contacts to return (default 25)" }
                }
            }),
        ),
        tool(
            "search-contacts",
            "Find contacts whose display name starts with a prefix.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "count": { "type": "integer", "description": "Number of contacts to return (default 25)" }
                },
                "required": ["query"]
            }),
        ),
    ]
}

/// Dispatch one tool call against Graph. Argument deserialization is the
/// parameter validation: anything serde rejects comes back as
/// `InvalidArguments` without a network call.
pub async fn dispatch(
    client: &GraphClient,
    name: &str,
    arguments: serde_json::Value,
) -> Result<serde_json::Value, MailgraphError> {
    let args = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };

    match name {
        "authenticate" => {
            let url = client.tokens().begin_interactive_authorization().await;
            Ok(json!({
                "url": url,
                "instructions": "Visit this URL in a browser to sign in, then finish with: mailgraph auth",
            }))
        }
        "auth-status" => {
            let status = client.tokens().status().await;
            Ok(json!({ "status": status.describe() }))
        }
        "list-emails" => mail::list_emails(client, parse_params(name, args)?).await,
        "search-emails" => mail::search_emails(client, parse_params(name, args)?).await,
        "read-email" => mail::read_email(client, parse_params(name, args)?).await,
        "send-email" => mail::send_email(client, parse_params(name, args)?).await,
        "mark-email-read" => mail::mark_email_read(client, parse_params(name, args)?).await,
        "list-folders" => mail::list_folders(client).await,
        "list-events" => calendar::list_events(client, parse_params(name, args)?).await,
        "create-event" => calendar::create_event(client, parse_params(name, args)?).await,
        "delete-event" => calendar::delete_event(client, parse_params(name, args)?).await,
        "list-contacts" => contacts::list_contacts(client, parse_params(name, args)?).await,
        "search-contacts" => contacts::search_contacts(client, parse_params(name, args)?).await,
        unknown => Err(MailgraphError::UnknownTool {
            name: unknown.to_string(),
            suggestion: suggest_tool_name(unknown),
        }),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    tool: &str,
    args: serde_json::Value,
) -> Result<T, MailgraphError> {
    serde_json::from_value(args).map_err(|e| MailgraphError::InvalidArguments {
        tool: tool.to_string(),
        detail: e.to_string(),
    })
}

/// Closest known tool name, if it is close enough to be a plausible typo.
fn suggest_tool_name(name: &str) -> Option<String> {
    definitions()
        .into_iter()
        .map(|t| t.name)
        .map(|candidate| (strsim::levenshtein(name, &candidate), candidate))
        .filter(|(distance, _)| *distance <= 3)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}
