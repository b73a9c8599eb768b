use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Contact attributes pushed for one lead.
#[derive(Debug, Clone, Default)]
pub struct ContactProperties {
    pub linkedin_url: String,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub post_name: Option<String>,
    pub company: Option<String>,
    pub job_title: Option<String>,
    pub audience: Option<String>,
}

impl ContactProperties {
    /// Map onto HubSpot internal property names. Empty values are omitted.
    pub fn to_properties(&self) -> BTreeMap<&'static str, String> {
        let (first, last) = split_name(self.full_name.as_deref().unwrap_or(""));
        let mut props = BTreeMap::new();
        props.insert("hs_linkedin_url", self.linkedin_url.clone());

        let optional = [
            ("firstname", Some(first)),
            ("lastname", Some(last)),
            ("phantombuster_linkedin_headline", self.headline.clone()),
            ("post_name", self.post_name.clone()),
            ("company", self.company.clone()),
            ("jobtitle", self.job_title.clone()),
            ("engager_audience", self.audience.clone()),
        ];
        for (key, value) in optional {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                props.insert(key, v);
            }
        }
        props
    }
}

/// Split a display name into first name and the remainder.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateContactRequest<'a> {
    pub properties: BTreeMap<&'a str, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedContact {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
    pub category: Option<String>,
}

/// What HubSpot did with a create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { id: String },
    /// HubSpot matched an existing contact (409 CONFLICT).
    AlreadyExists { existing_id: Option<String> },
}

/// Pull the contact id out of a conflict message like
/// `Contact already exists. Existing ID: 12345`.
pub(crate) fn existing_id_from_message(message: &str) -> Option<String> {
    let (_, tail) = message.split_once("Existing ID:")?;
    let id: String = tail.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_name_keeps_multi_part_surnames() {
        assert_eq!(split_name("Ada King Lovelace"), ("Ada".into(), "King Lovelace".into()));
        assert_eq!(split_name("Cher"), ("Cher".into(), String::new()));
        assert_eq!(split_name("  "), (String::new(), String::new()));
    }

    #[test]
    fn properties_omit_blank_values() {
        let contact = ContactProperties {
            linkedin_url: "https://www.linkedin.com/in/ada".into(),
            full_name: Some("Ada Lovelace".into()),
            company: Some("".into()),
            job_title: Some("Partner".into()),
            ..Default::default()
        };
        let props = contact.to_properties();
        assert_eq!(props["firstname"], "Ada");
        assert_eq!(props["lastname"], "Lovelace");
        assert_eq!(props["jobtitle"], "Partner");
        assert!(!props.contains_key("company"));
        assert!(!props.contains_key("post_name"));
    }

    #[test]
    fn conflict_message_yields_existing_id() {
        assert_eq!(
            existing_id_from_message("Contact already exists. Existing ID: 98765"),
            Some("98765".to_string())
        );
        assert_eq!(existing_id_from_message("Conflict"), None);
    }
}
