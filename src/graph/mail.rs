use serde::Deserialize;
use serde_json::json;

use crate::error::MailgraphError;
use crate::graph::client::GraphClient;

const MESSAGE_FIELDS: &str = "id,subject,from,receivedDateTime,isRead,hasAttachments,bodyPreview";

#[derive(Debug, Deserialize)]
pub struct ListEmailsParams {
    /// Well-known folder name (inbox, drafts, sentitems, ...) or folder id.
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchEmailsParams {
    pub query: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReadEmailParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct SendEmailParams {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MarkEmailReadParams {
    pub id: String,
    #[serde(default = "default_true")]
    pub read: bool,
}

fn default_count() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    value: Vec<Message>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Message {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<Recipient>,
    #[serde(default)]
    to_recipients: Vec<Recipient>,
    #[serde(default)]
    cc_recipients: Vec<Recipient>,
    #[serde(default)]
    received_date_time: Option<String>,
    #[serde(default)]
    is_read: Option<bool>,
    #[serde(default)]
    has_attachments: Option<bool>,
    #[serde(default)]
    body_preview: Option<String>,
    #[serde(default)]
    body: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody {
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recipient {
    #[serde(default)]
    email_address: Option<EmailAddress>,
}

#[derive(Debug, Deserialize)]
struct EmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

pub async fn list_emails(
    client: &GraphClient,
    params: ListEmailsParams,
) -> Result<serde_json::Value, MailgraphError> {
    let folder = params.folder.as_deref().unwrap_or("inbox");
    let path = format!("/me/mailFolders/{folder}/messages");
    let raw = client
        .get(
            &path,
            &[
                ("$top", params.count.to_string()),
                ("$orderby", "receivedDateTime desc".to_string()),
                ("$select", MESSAGE_FIELDS.to_string()),
            ],
        )
        .await?;
    summarize_message_list(raw)
}

pub async fn search_emails(
    client: &GraphClient,
    params: SearchEmailsParams,
) -> Result<serde_json::Value, MailgraphError> {
    let raw = client
        .get(
            "/me/messages",
            &[
                ("$search", format!("\"{}\"", params.query)),
                ("$top", params.count.to_string()),
                ("$select", MESSAGE_FIELDS.to_string()),
            ],
        )
        .await?;
    summarize_message_list(raw)
}

pub async fn read_email(
    client: &GraphClient,
    params: ReadEmailParams,
) -> Result<serde_json::Value, MailgraphError> {
    let path = format!("/me/messages/{}", params.id);
    let raw = client
        .get(
            &path,
            &[(
                "$select",
                "id,subject,from,toRecipients,ccRecipients,receivedDateTime,isRead,hasAttachments,body"
                    .to_string(),
            )],
        )
        .await?;
    let message: Message = parse_graph_shape(raw)?;
    Ok(json!({
        "id": message.id,
        "subject": message.subject,
        "from": message.from.as_ref().map(format_recipient),
        "to": message.to_recipients.iter().map(format_recipient).collect::<Vec<_>>(),
        "cc": message.cc_recipients.iter().map(format_recipient).collect::<Vec<_>>(),
        "received": message.received_date_time,
        "isRead": message.is_read,
        "hasAttachments": message.has_attachments,
        "bodyType": message.body.as_ref().and_then(|b| b.content_type.clone()),
        "body": message.body.and_then(|b| b.content),
    }))
}

pub async fn send_email(
    client: &GraphClient,
    params: SendEmailParams,
) -> Result<serde_json::Value, MailgraphError> {
    let payload = json!({
        "message": {
            "subject": params.subject,
            "body": { "contentType": "Text", "content": params.body },
            "toRecipients": recipients_json(&params.to),
            "ccRecipients": recipients_json(&params.cc),
            "bccRecipients": recipients_json(&params.bcc),
        },
        "saveToSentItems": true,
    });
    client.post("/me/sendMail", payload).await?;
    Ok(json!({ "status": "sent" }))
}

pub async fn mark_email_read(
    client: &GraphClient,
    params: MarkEmailReadParams,
) -> Result<serde_json::Value, MailgraphError> {
    let path = format!("/me/messages/{}", params.id);
    client.patch(&path, json!({ "isRead": params.read })).await?;
    Ok(json!({ "id": params.id, "isRead": params.read }))
}

pub async fn list_folders(client: &GraphClient) -> Result<serde_json::Value, MailgraphError> {
    #[derive(Debug, Deserialize)]
    struct FolderList {
        #[serde(default)]
        value: Vec<Folder>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Folder {
        id: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        unread_item_count: Option<u64>,
        #[serde(default)]
        total_item_count: Option<u64>,
    }

    let raw = client
        .get(
            "/me/mailFolders",
            &[
                ("$top", "50".to_string()),
                (
                    "$select",
                    "id,displayName,unreadItemCount,totalItemCount".to_string(),
                ),
            ],
        )
        .await?;
    let list: FolderList = parse_graph_shape(raw)?;
    let folders: Vec<_> = list
        .value
        .into_iter()
        .map(|f| {
            json!({
                "id": f.id,
                "name": f.display_name,
                "unread": f.unread_item_count,
                "total": f.total_item_count,
            })
        })
        .collect();
    Ok(json!({ "folders": folders }))
}

fn summarize_message_list(raw: serde_json::Value) -> Result<serde_json::Value, MailgraphError> {
    let list: MessageList = parse_graph_shape(raw)?;
    let emails: Vec<_> = list
        .value
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "subject": m.subject,
                "from": m.from.as_ref().map(format_recipient),
                "received": m.received_date_time,
                "isRead": m.is_read,
                "hasAttachments": m.has_attachments,
                "preview": m.body_preview,
            })
        })
        .collect();
    Ok(json!({ "emails": emails }))
}

fn recipients_json(addresses: &[String]) -> serde_json::Value {
    json!(addresses
        .iter()
        .map(|a| json!({ "emailAddress": { "address": a } }))
        .collect::<Vec<_>>())
}

fn format_recipient(recipient: &Recipient) -> String {
    let Some(email) = &recipient.email_address else {
        return String::new();
    };
    match (&email.name, &email.address) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (Some(name), None) => name.clone(),
        (None, Some(address)) => address.clone(),
        (None, None) => String::new(),
    }
}

pub(crate) fn parse_graph_shape<T: serde::de::DeserializeOwned>(
    raw: serde_json::Value,
) -> Result<T, MailgraphError> {
    serde_json::from_value(raw)
        .map_err(|e| MailgraphError::Protocol(format!("unexpected Graph response shape: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_reshapes_graph_messages() {
        let raw = json!({
            "value": [{
                "id": "AAMkAD=",
                "subject": "Quarterly numbers",
                "from": { "emailAddress": { "name": "Ada", "address": "ada@example.com" } },
                "receivedDateTime": "2026-08-01T09:30:00Z",
                "isRead": false,
                "hasAttachments": true,
                "bodyPreview": "Attached are..."
            }]
        });
        let out = summarize_message_list(raw).unwrap();
        let email = &out["emails"][0];
        assert_eq!(email["id"], "AAMkAD=");
        assert_eq!(email["from"], "Ada <ada@example.com>");
        assert_eq!(email["isRead"], false);
        assert_eq!(email["preview"], "Attached are...");
    }

    #[test]
    fn summarize_tolerates_sparse_messages() {
        let raw = json!({ "value": [{ "id": "x" }] });
        let out = summarize_message_list(raw).unwrap();
        assert_eq!(out["emails"][0]["id"], "x");
        assert!(out["emails"][0]["subject"].is_null());
    }

    #[test]
    fn summarize_rejects_wrong_shape() {
        let raw = json!({ "value": "not a list" });
        assert!(summarize_message_list(raw).is_err());
    }

    #[test]
    fn recipient_formatting_variants() {
        let both: Recipient = serde_json::from_value(json!({
            "emailAddress": { "name": "Ada", "address": "ada@example.com" }
        }))
        .unwrap();
        assert_eq!(format_recipient(&both), "Ada <ada@example.com>");

        let address_only: Recipient = serde_json::from_value(json!({
            "emailAddress": { "address": "ada@example.com" }
        }))
        .unwrap();
        assert_eq!(format_recipient(&address_only), "ada@example.com");

        let empty: Recipient = serde_json::from_value(json!({})).unwrap();
        assert_eq!(format_recipient(&empty), "");
    }

    #[test]
    fn list_params_default_folder_and_count() {
        let params: ListEmailsParams = serde_json::from_value(json!({})).unwrap();
        assert!(params.folder.is_none());
        assert_eq!(params.count, 10);
    }

    #[test]
    fn send_params_require_to_subject_body() {
        let err = serde_json::from_value::<SendEmailParams>(json!({ "subject": "hi" }));
        assert!(err.is_err());

        let ok: SendEmailParams = serde_json::from_value(json!({
            "to": ["a@example.com"],
            "subject": "hi",
            "body": "hello"
        }))
        .unwrap();
        assert!(ok.cc.is_empty());
        assert!(ok.bcc.is_empty());
    }

    #[test]
    fn recipients_json_shape() {
        let value = recipients_json(&["a@example.com".into()]);
        assert_eq!(value[0]["emailAddress"]["address"], "a@example.com");
    }
}
