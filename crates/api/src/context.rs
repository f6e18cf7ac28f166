use std::sync::Arc;

use providers::{MailchimpList, MailingList, PaymentProvider, StripeCheckout};
use siteconfig::SiteConfig;
use tracing::{info, warn};

/// Request-independent settings the handlers consult.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    /// Base for checkout redirects; the request `Origin` is used when unset.
    pub app_url: Option<String>,
    pub list_id: Option<String>,
    /// Expose upstream error detail in 500 responses.
    pub development: bool,
}

/// Everything a handler needs: optional provider clients plus settings.
///
/// A provider is `None` when its credentials are missing; the matching route
/// then answers 500 instead of the server refusing to start.
#[derive(Clone, Default)]
pub struct ApiContext {
    pub payments: Option<Arc<dyn PaymentProvider>>,
    pub mailing: Option<Arc<dyn MailingList>>,
    pub settings: ApiSettings,
}

impl ApiContext {
    pub fn new(
        payments: Option<Arc<dyn PaymentProvider>>,
        mailing: Option<Arc<dyn MailingList>>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            payments,
            mailing,
            settings,
        }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        let payments = config.stripe.secret_key.as_deref().and_then(|key| {
            match StripeCheckout::new(key, config.stripe.api_base.as_str(), config.stripe.timeout) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn PaymentProvider>),
                Err(err) => {
                    warn!(error = %err, "checkout disabled");
                    None
                }
            }
        });
        if payments.is_none() {
            warn!("STRIPE_SECRET_KEY not set; checkout requests will fail");
        }

        let mailing = config.mailchimp.api_key.as_deref().and_then(|key| {
            match MailchimpList::new(key, config.mailchimp.api_base(), config.mailchimp.timeout) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn MailingList>),
                Err(err) => {
                    warn!(error = %err, "newsletter sign-up disabled");
                    None
                }
            }
        });
        if mailing.is_none() {
            warn!("MAILCHIMP_API_KEY not set; subscribe requests will fail");
        }

        let settings = ApiSettings {
            app_url: config.app_url.clone(),
            list_id: config
                .mailchimp
                .list_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            development: config.environment.is_development(),
        };
        info!(
            environment = %config.environment,
            app_url = settings.app_url.as_deref().unwrap_or("<request origin>"),
            "api context ready"
        );
        Self::new(payments, mailing, settings)
    }
}

impl std::fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiContext")
            .field("payments", &self.payments.is_some())
            .field("mailing", &self.mailing.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}
