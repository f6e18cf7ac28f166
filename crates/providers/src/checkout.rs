use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{stripe_error, ProviderError};
use crate::{http_client, join_url};

pub const DEFAULT_CURRENCY: &str = "usd";
pub const PRODUCT_NAME: &str = "Everybody's Cool Fundraiser Donation";
pub const PRODUCT_DESCRIPTION: &str = "Thank you for your generous donation!";

/// Donor details collected by the donation form. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DonorInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A one-off donation to be paid through a hosted checkout page.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    /// Amount in major currency units, e.g. dollars.
    pub amount: f64,
    pub currency: String,
    pub donor: DonorInfo,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Builds the request with redirect URLs under `base_url`.
    pub fn donation(amount: f64, currency: &str, base_url: &str, donor: DonorInfo) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            amount,
            currency: currency.to_ascii_lowercase(),
            donor,
            success_url: format!("{base}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/cancel"),
        }
    }

    /// Amount in minor units (cents), rounded half away from zero.
    pub fn unit_amount(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }

    /// Stripe's bracketed form encoding of a single-line-item payment session.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let donor = &self.donor;
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                PRODUCT_NAME.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]".to_string(),
                PRODUCT_DESCRIPTION.to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                self.unit_amount().to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
        ];
        if let Some(email) = donor.email.as_deref().filter(|email| !email.is_empty()) {
            fields.push(("customer_email".to_string(), email.to_string()));
        }
        for (key, value) in [
            ("donorName", &donor.name),
            ("donorEmail", &donor.email),
            ("donorMessage", &donor.message),
        ] {
            fields.push((
                format!("metadata[{key}]"),
                value.clone().unwrap_or_default(),
            ));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

pub trait PaymentProvider: Send + Sync {
    fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError>;
}

/// Stripe Checkout over its form-encoded REST API.
#[derive(Debug, Clone)]
pub struct StripeCheckout {
    http: Client,
    secret_key: String,
    api_base: String,
}

impl StripeCheckout {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let secret_key = secret_key.into();
        if secret_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("stripe secret key"));
        }
        Ok(Self {
            http: http_client(timeout)?,
            secret_key,
            api_base: api_base.into(),
        })
    }
}

impl PaymentProvider for StripeCheckout {
    fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        let url = join_url(&self.api_base, "v1/checkout/sessions");
        debug!(
            %url,
            unit_amount = request.unit_amount(),
            currency = %request.currency,
            "creating checkout session"
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&request.form_fields())
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(stripe_error(status.as_u16(), &body));
        }
        let session: CheckoutSession =
            serde_json::from_str(&body).map_err(|err| ProviderError::Decode {
                provider: "stripe",
                detail: err.to_string(),
            })?;
        info!(session = %session.id, "checkout session created");
        Ok(session)
    }
}
