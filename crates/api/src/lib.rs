//! JSON HTTP API behind the donation page.
//!
//! | Route                           | Purpose                                  |
//! |---------------------------------|------------------------------------------|
//! | `POST /create-checkout-session` | start a hosted card checkout             |
//! | `POST /subscribe`               | add an address to the newsletter list    |
//! | `GET /health`                   | liveness check                           |
//!
//! Every route is also served under `/api`. Handlers are plain functions over
//! [`ApiRequest`] so they can be tested without a socket; [`ApiServer`] wires
//! them to `tiny_http`.

mod context;
mod error;
mod handlers;
mod server;

pub use context::{ApiContext, ApiSettings};
pub use error::ApiError;
pub use handlers::{
    create_checkout_session, health, route, subscribe, ApiRequest, ApiResponse, Method,
    SERVICE_NAME,
};
pub use server::{ApiServer, Clock, RunningServer, MAX_BODY_BYTES};
