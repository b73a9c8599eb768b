//! Minimal HubSpot CRM client.
//!
//! Only what lead forwarding needs: creating a contact and telling a fresh
//! create apart from HubSpot's own duplicate detection.

pub mod error;
pub mod types;

pub use error::{HubSpotError, Result};
pub use types::{split_name, ContactProperties, CreateOutcome};

use reqwest::StatusCode;
use types::{existing_id_from_message, CreateContactRequest, CreatedContact, ErrorBody};

const BASE_URL: &str = "https://api.hubapi.com";

pub struct HubSpotClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl HubSpotClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at a different host (sandbox portals, local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a contact. A 409 conflict is reported as `AlreadyExists`, not as an error.
    pub async fn create_contact(&self, contact: &ContactProperties) -> Result<CreateOutcome> {
        let url = format!("{}/crm/v3/objects/contacts", self.base_url);
        let body = CreateContactRequest {
            properties: contact.to_properties(),
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT {
            let text = resp.text().await.unwrap_or_default();
            let existing_id = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .and_then(|m| existing_id_from_message(&m));
            tracing::debug!(linkedin_url = %contact.linkedin_url, ?existing_id, "HubSpot contact already exists");
            return Ok(CreateOutcome::AlreadyExists { existing_id });
        }

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .map(|b| {
                    format!(
                        "{}: {}",
                        b.category.unwrap_or_default(),
                        b.message.unwrap_or_default()
                    )
                })
                .unwrap_or(text);
            return Err(HubSpotError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let created: CreatedContact = resp.json().await?;
        tracing::info!(linkedin_url = %contact.linkedin_url, id = %created.id, "Created HubSpot contact");
        Ok(CreateOutcome::Created { id: created.id })
    }
}
