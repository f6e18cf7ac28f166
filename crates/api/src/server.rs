//! Blocking HTTP front end over `tiny_http`.

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, info, warn};

use crate::context::ApiContext;
use crate::error::ApiError;
use crate::handlers::{route, ApiRequest, ApiResponse, Method};

/// Largest request body accepted; anything bigger gets a 413.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub type Clock = fn() -> DateTime<Utc>;

/// A bound listener plus the context its handlers run against.
///
/// Requests are handled one at a time on the serving thread.
pub struct ApiServer {
    server: Arc<Server>,
    addr: SocketAddr,
    context: Arc<ApiContext>,
    clock: Clock,
}

impl ApiServer {
    pub fn bind(addr: SocketAddr, context: ApiContext) -> Result<Self, ApiError> {
        let server = Server::http(addr).map_err(|err| ApiError::Bind {
            addr,
            reason: err.to_string(),
        })?;
        let addr = server.server_addr().to_ip().ok_or(ApiError::NotIp)?;
        info!(%addr, "api listening");
        Ok(Self {
            server: Arc::new(server),
            addr,
            context: Arc::new(context),
            clock: Utc::now,
        })
    }

    /// Replaces the time source used for health timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The actual address, useful after binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serves until the listener is unblocked.
    pub fn serve(self) {
        for request in self.server.incoming_requests() {
            respond(&self.context, request, (self.clock)());
        }
        debug!(addr = %self.addr, "api stopped accepting requests");
    }

    /// Serves on a background thread.
    pub fn spawn(self) -> Result<RunningServer, ApiError> {
        let server = Arc::clone(&self.server);
        let addr = self.addr;
        let handle = thread::Builder::new()
            .name("fundraiser-api".into())
            .spawn(move || self.serve())?;
        Ok(RunningServer {
            server,
            addr,
            handle: Some(handle),
        })
    }
}

/// Handle to a server started with [`ApiServer::spawn`].
pub struct RunningServer {
    server: Arc<Server>,
    addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting requests and waits for the serving thread.
    pub fn shutdown(mut self) -> Result<(), ApiError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(), ApiError> {
        self.server.unblock();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ApiError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "api thread ended abnormally");
        }
    }
}

fn header_value<'a>(request: &'a Request, name: &'static str) -> Option<&'a str> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str())
}

fn read_body(request: &mut Request) -> Result<Vec<u8>, ApiResponse> {
    if request
        .body_length()
        .is_some_and(|length| length > MAX_BODY_BYTES)
    {
        return Err(ApiResponse::payload_too_large());
    }
    let mut body = Vec::new();
    let limit = MAX_BODY_BYTES as u64 + 1;
    if let Err(err) = request.as_reader().take(limit).read_to_end(&mut body) {
        debug!(error = %err, "failed to read request body");
        return Err(ApiResponse::invalid_json());
    }
    if body.len() > MAX_BODY_BYTES {
        return Err(ApiResponse::payload_too_large());
    }
    Ok(body)
}

fn to_http(response: &ApiResponse) -> Response<Cursor<Vec<u8>>> {
    let mut http =
        Response::from_string(response.body.to_string()).with_status_code(response.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        http.add_header(header);
    }
    http
}

fn respond(context: &ApiContext, mut request: Request, now: DateTime<Utc>) {
    let started = Instant::now();
    let method = Method::parse(&request.method().to_string());
    let url = request.url().to_string();

    let response = match read_body(&mut request) {
        Ok(body) => {
            let origin = header_value(&request, "Origin").map(str::to_string);
            let api_request = ApiRequest {
                method,
                url: &url,
                origin: origin.as_deref(),
                body: &body,
            };
            route(context, &api_request, now)
        }
        Err(response) => response,
    };

    info!(
        method = %request.method(),
        path = %url,
        status = response.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    if let Err(err) = request.respond(to_http(&response)) {
        warn!(error = %err, path = %url, "failed to write response");
    }
}
