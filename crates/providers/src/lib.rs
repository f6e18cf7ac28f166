//! Clients for the third-party services behind the donation API: a payment
//! provider that creates hosted checkout sessions (Stripe) and a mailing
//! list that collects newsletter sign-ups (Mailchimp).
//!
//! Both sit behind traits so the HTTP handlers can be exercised with fakes.

mod checkout;
mod error;
mod mailing;

pub use checkout::{
    CheckoutRequest, CheckoutSession, DonorInfo, PaymentProvider, StripeCheckout,
    DEFAULT_CURRENCY, PRODUCT_DESCRIPTION, PRODUCT_NAME,
};
pub use error::ProviderError;
pub use mailing::{MailchimpList, MailingList, Membership, NewMember, DEFAULT_TAG};

use std::time::Duration;

use reqwest::blocking::Client;

pub(crate) fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("fundraiser/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_without_doubled_slashes() {
        assert_eq!(
            join_url("https://api.stripe.com/", "/v1/checkout/sessions"),
            "https://api.stripe.com/v1/checkout/sessions"
        );
        assert_eq!(join_url("http://127.0.0.1:9", "3.0/lists"), "http://127.0.0.1:9/3.0/lists");
    }
}
