use serde::Deserialize;
use serde_json::json;

use crate::error::MailgraphError;
use crate::graph::client::GraphClient;
use crate::graph::mail::parse_graph_shape;

const CONTACT_FIELDS: &str = "id,displayName,emailAddresses,companyName,mobilePhone";

#[derive(Debug, Deserialize)]
pub struct ListContactsParams {
    #[serde(default = "default_count")]
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchContactsParams {
    pub query: String,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    25
}

#[derive(Debug, Deserialize)]
struct ContactList {
    #[serde(default)]
    value: Vec<Contact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Contact {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<ContactEmail>,
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    mobile_phone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContactEmail {
    #[serde(default)]
    address: Option<String>,
}

pub async fn list_contacts(
    client: &GraphClient,
    params: ListContactsParams,
) -> Result<serde_json::Value, MailgraphError> {
    let raw = client
        .get(
            "/me/contacts",
            &[
                ("$top", params.count.to_string()),
                ("$orderby", "displayName".to_string()),
                ("$select", CONTACT_FIELDS.to_string()),
            ],
        )
        .await?;
    summarize_contact_list(raw)
}

pub async fn search_contacts(
    client: &GraphClient,
    params: SearchContactsParams,
) -> Result<serde_json::Value, MailgraphError> {
    // OData string literals escape single quotes by doubling them.
    let escaped = params.query.replace('\'', "''");
    let raw = client
        .get(
            "/me/contacts",
            &[
                ("$filter", format!("startswith(displayName,'{escaped}')")),
                ("$top", params.count.to_string()),
                ("$select", CONTACT_FIELDS.to_string()),
            ],
        )
        .await?;
    summarize_contact_list(raw)
}

fn summarize_contact_list(raw: serde_json::Value) -> Result<serde_json::Value, MailgraphError> {
    let list: ContactList = parse_graph_shape(raw)?;
    let contacts: Vec<_> = list
        .value
        .into_iter()
        .map(|c| {
            let emails: Vec<String> = c
                .email_addresses
                .into_iter()
                .filter_map(|e| e.address)
                .collect();
            json!({
                "id": c.id,
                "name": c.display_name,
                "emails": emails,
                "company": c.company_name,
                "mobile": c.mobile_phone,
            })
        })
        .collect();
    Ok(json!({ "contacts": contacts }))
}
