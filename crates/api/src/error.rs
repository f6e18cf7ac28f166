use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },
    #[error("server is not listening on an IP address")]
    NotIp,
    #[error("server thread panicked")]
    ThreadPanic,
    #[error("failed to spawn server thread: {0}")]
    Spawn(#[from] std::io::Error),
}
