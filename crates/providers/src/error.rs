use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The mailing list already holds this address.
    #[error("member already exists")]
    MemberExists,
    #[error("{provider} returned {status}: {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
    },
    #[error("unexpected {provider} response: {detail}")]
    Decode {
        provider: &'static str,
        detail: String,
    },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MailchimpErrorBody {
    title: Option<String>,
    detail: Option<String>,
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".into();
    }
    trimmed.chars().take(200).collect()
}

pub(crate) fn stripe_error(status: u16, body: &str) -> ProviderError {
    let message = match serde_json::from_str::<StripeErrorBody>(body) {
        Ok(StripeErrorBody { error }) => match (error.message, error.kind) {
            (Some(message), _) => message,
            (None, Some(kind)) => kind,
            (None, None) => snippet(body),
        },
        Err(_) => snippet(body),
    };
    ProviderError::Upstream {
        provider: "stripe",
        status,
        message,
    }
}

pub(crate) fn mailchimp_error(status: u16, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<MailchimpErrorBody>(body).ok();
    if status == 400
        && parsed
            .as_ref()
            .and_then(|body| body.title.as_deref())
            .is_some_and(|title| title == "Member Exists")
    {
        return ProviderError::MemberExists;
    }
    let message = parsed
        .and_then(|body| body.detail.or(body.title))
        .unwrap_or_else(|| snippet(body));
    ProviderError::Upstream {
        provider: "mailchimp",
        status,
        message,
    }
}
