use async_trait::async_trait;
use hubspot_client::{ContactProperties, CreateOutcome, HubSpotClient, HubSpotError};

use leadscout_common::{LeadCandidate, LeadScoutError, PushOutcome, Result};

use crate::traits::CrmPusher;

fn classify(err: HubSpotError) -> LeadScoutError {
    if err.is_transient() {
        LeadScoutError::TransientExternal(err.to_string())
    } else {
        LeadScoutError::PermanentExternal(err.to_string())
    }
}

pub fn contact_for(lead: &LeadCandidate) -> ContactProperties {
    ContactProperties {
        linkedin_url: lead.profile_url.clone(),
        full_name: lead.name.clone(),
        headline: lead.headline.clone(),
        post_name: lead.post_name.clone(),
        company: lead.company.clone(),
        job_title: lead.title.clone(),
        audience: lead.audience.clone(),
    }
}

/// Leads become HubSpot contacts.
pub struct HubSpotCrm {
    client: HubSpotClient,
}

impl HubSpotCrm {
    pub fn new(client: HubSpotClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CrmPusher for HubSpotCrm {
    async fn push(&self, lead: &LeadCandidate) -> Result<PushOutcome> {
        match self.client.create_contact(&contact_for(lead)).await.map_err(classify)? {
            CreateOutcome::Created { .. } => Ok(PushOutcome::Created),
            CreateOutcome::AlreadyExists { .. } => Ok(PushOutcome::Duplicate),
        }
    }
}
