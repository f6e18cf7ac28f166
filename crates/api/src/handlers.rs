//! Request handlers. They take already-read request parts and return an
//! [`ApiResponse`], so they run without a socket.

use chrono::{DateTime, SecondsFormat, Utc};
use providers::{CheckoutRequest, DonorInfo, NewMember, ProviderError, DEFAULT_CURRENCY};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::context::ApiContext;

pub const SERVICE_NAME: &str = "Everybody's Cool Fundraiser API";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Other,
}

impl Method {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            _ => Self::Other,
        }
    }
}

/// The parts of an HTTP request the handlers look at.
#[derive(Debug, Clone, Copy)]
pub struct ApiRequest<'a> {
    pub method: Method,
    /// Path plus optional query string, e.g. `/api/health?x=1`.
    pub url: &'a str,
    pub origin: Option<&'a str>,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn message(status: u16, message: &str) -> Self {
        Self::new(status, json!({ "message": message }))
    }

    pub fn not_found() -> Self {
        Self::message(404, "Not found")
    }

    pub fn method_not_allowed() -> Self {
        Self::message(405, "Method not allowed")
    }

    pub fn invalid_json() -> Self {
        Self::message(400, "Invalid JSON body")
    }

    pub fn payload_too_large() -> Self {
        Self::message(413, "Payload too large")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    CreateCheckoutSession,
    Subscribe,
    Health,
}

/// Maps a request URL onto a route. The `/api` prefix, a trailing slash and
/// the query string are ignored.
fn resolve(url: &str) -> Option<Route> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let path = path.strip_prefix("/api").unwrap_or(path);
    match path.trim_end_matches('/') {
        "/create-checkout-session" => Some(Route::CreateCheckoutSession),
        "/subscribe" => Some(Route::Subscribe),
        "/health" => Some(Route::Health),
        _ => None,
    }
}

/// Dispatches one request.
pub fn route(context: &ApiContext, request: &ApiRequest<'_>, now: DateTime<Utc>) -> ApiResponse {
    match resolve(request.url) {
        Some(Route::CreateCheckoutSession) => create_checkout_session(context, request),
        Some(Route::Subscribe) => subscribe(context, request),
        Some(Route::Health) => health(now),
        None => ApiResponse::not_found(),
    }
}

/// Parses a POST body. An empty body counts as `{}`.
fn json_body(body: &[u8]) -> Result<Value, ApiResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(value) if value.is_object() => Ok(value),
        _ => Err(ApiResponse::invalid_json()),
    }
}

fn optional_string(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Reads each donor field on its own so one malformed field does not
/// discard the rest.
fn donor_info(value: &Value) -> DonorInfo {
    DonorInfo {
        name: optional_string(value, "name"),
        email: optional_string(value, "email"),
        message: optional_string(value, "message"),
    }
}

/// Upstream detail is only exposed in development.
fn failure(context: &ApiContext, message: &str, err: &ProviderError) -> ApiResponse {
    let detail = if context.settings.development {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };
    ApiResponse::new(500, json!({ "message": message, "error": detail }))
}

pub fn create_checkout_session(context: &ApiContext, request: &ApiRequest<'_>) -> ApiResponse {
    const FAILED: &str = "Error creating checkout session";

    if request.method != Method::Post {
        return ApiResponse::method_not_allowed();
    }
    let body = match json_body(request.body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let amount = match body.get("amount").and_then(Value::as_f64) {
        Some(amount) if amount.is_finite() && amount >= 1.0 => amount,
        _ => return ApiResponse::message(400, "Invalid amount"),
    };
    let currency = match body.get("currency") {
        None | Some(Value::Null) => DEFAULT_CURRENCY.to_string(),
        Some(Value::String(code))
            if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) =>
        {
            code.to_ascii_lowercase()
        }
        Some(_) => return ApiResponse::message(400, "Invalid currency"),
    };
    let donor = body.get("donorInfo").map(donor_info).unwrap_or_default();

    let Some(base_url) = context
        .settings
        .app_url
        .as_deref()
        .or(request.origin)
        .filter(|base| !base.is_empty())
    else {
        warn!("checkout requested without an app URL or Origin header");
        return failure(
            context,
            FAILED,
            &ProviderError::InvalidRequest("no app URL configured and no Origin header".into()),
        );
    };
    let Some(payments) = context.payments.as_deref() else {
        error!("checkout requested but no payment provider is configured");
        return failure(
            context,
            FAILED,
            &ProviderError::NotConfigured("stripe secret key"),
        );
    };

    let checkout = CheckoutRequest::donation(amount, &currency, base_url, donor);
    match payments.create_checkout_session(&checkout) {
        Ok(session) => {
            info!(
                session = %session.id,
                unit_amount = checkout.unit_amount(),
                %currency,
                "donation checkout started"
            );
            ApiResponse::new(200, json!({ "sessionId": session.id, "url": session.url }))
        }
        Err(err) => {
            error!(error = %err, "payment provider error");
            failure(context, FAILED, &err)
        }
    }
}

pub fn subscribe(context: &ApiContext, request: &ApiRequest<'_>) -> ApiResponse {
    const FAILED: &str = "Error subscribing to newsletter";

    if request.method != Method::Post {
        return ApiResponse::method_not_allowed();
    }
    let body = match json_body(request.body) {
        Ok(body) => body,
        Err(response) => return response,
    };

    let Some(email) = optional_string(&body, "email") else {
        return ApiResponse::message(400, "Email is required");
    };
    let tags = body
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let member = NewMember {
        email,
        first_name: optional_string(&body, "firstName"),
        last_name: optional_string(&body, "lastName"),
        tags,
    };

    let Some(list_id) = context.settings.list_id.as_deref() else {
        return ApiResponse::message(500, "Mailchimp list ID not configured");
    };
    let Some(mailing) = context.mailing.as_deref() else {
        error!("subscription requested but no mailing list is configured");
        return failure(
            context,
            FAILED,
            &ProviderError::NotConfigured("mailchimp api key"),
        );
    };

    match mailing.add_member(list_id, &member) {
        Ok(membership) => ApiResponse::new(
            200,
            json!({
                "success": true,
                "message": "Successfully subscribed to newsletter",
                "id": membership.id,
            }),
        ),
        Err(ProviderError::MemberExists) => {
            info!("newsletter sign-up for an existing member");
            ApiResponse::new(
                200,
                json!({
                    "success": true,
                    "message": "Email already subscribed",
                    "alreadyExists": true,
                }),
            )
        }
        Err(err) => {
            error!(error = %err, "mailing list error");
            failure(context, FAILED, &err)
        }
    }
}

pub fn health(now: DateTime<Utc>) -> ApiResponse {
    ApiResponse::new(
        200,
        json!({
            "status": "ok",
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
            "service": SERVICE_NAME,
        }),
    )
}
