use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{mailchimp_error, ProviderError};
use crate::{http_client, join_url};

/// Tag applied when a sign-up carries none of its own.
pub const DEFAULT_TAG: &str = "fundraiser-donor";

/// A newsletter sign-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMember {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub tags: Vec<String>,
}

impl NewMember {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    /// Tags sent upstream, falling back to [`DEFAULT_TAG`].
    pub fn effective_tags(&self) -> Vec<String> {
        if self.tags.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            self.tags.clone()
        }
    }

    /// JSON body of a Mailchimp "add list member" call.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "email_address": self.email,
            "status": "subscribed",
            "merge_fields": {
                "FNAME": self.first_name.as_deref().unwrap_or_default(),
                "LNAME": self.last_name.as_deref().unwrap_or_default(),
            },
            "tags": self.effective_tags(),
        })
    }
}

/// The stored list member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Membership {
    pub id: String,
}

pub trait MailingList: Send + Sync {
    /// Adds `member` to `list_id`. A duplicate address yields
    /// [`ProviderError::MemberExists`].
    fn add_member(&self, list_id: &str, member: &NewMember) -> Result<Membership, ProviderError>;
}

/// Mailchimp Marketing API, authenticated with HTTP basic auth.
#[derive(Debug, Clone)]
pub struct MailchimpList {
    http: Client,
    api_key: String,
    api_base: String,
}

impl MailchimpList {
    pub fn new(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("mailchimp api key"));
        }
        Ok(Self {
            http: http_client(timeout)?,
            api_key,
            api_base: api_base.into(),
        })
    }
}

impl MailingList for MailchimpList {
    fn add_member(&self, list_id: &str, member: &NewMember) -> Result<Membership, ProviderError> {
        if list_id.trim().is_empty() {
            return Err(ProviderError::NotConfigured("mailchimp list id"));
        }
        if member.email.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("email is required".into()));
        }
        let url = join_url(&self.api_base, &format!("3.0/lists/{list_id}/members"));
        debug!(%url, tags = ?member.effective_tags(), "adding list member");
        let response = self
            .http
            .post(&url)
            .basic_auth("fundraiser", Some(&self.api_key))
            .json(&member.to_json())
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(mailchimp_error(status.as_u16(), &body));
        }
        let membership: Membership =
            serde_json::from_str(&body).map_err(|err| ProviderError::Decode {
                provider: "mailchimp",
                detail: err.to_string(),
            })?;
        info!(member = %membership.id, "newsletter member added");
        Ok(membership)
    }
}
