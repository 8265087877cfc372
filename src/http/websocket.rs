//! Protocol upgrade (WebSocket) tunnelling.
//!
//! # Responsibilities
//! - Detect upgrade requests
//! - Let the upstream answer the handshake
//! - Splice the two upgraded connections together
//!
//! # Data Flow
//! ```text
//! Client ←──── raw bytes ────→ Proxy ←──── raw bytes ────→ Backend
//! ```
//!
//! # Design Decisions
//! - Byte-level forwarding; frames are never parsed
//! - The tunnel outlives the request handler and ends when either side closes

use axum::http::{header, Request};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;

/// True for HTTP/1.1 requests asking to switch protocols.
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    let connection_upgrade = req
        .headers()
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    connection_upgrade && req.headers().contains_key(header::UPGRADE)
}

/// Join the client and upstream connections once both sides upgraded.
pub fn spawn_tunnel(client: OnUpgrade, upstream: OnUpgrade, server: String) {
    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client, upstream) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(server = %server, error = %e, "Protocol upgrade failed");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((sent, received)) => {
                tracing::debug!(server = %server, sent, received, "Tunnel closed");
            }
            Err(e) => {
                tracing::debug!(server = %server, error = %e, "Tunnel closed with error");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_upgrade() {
        let req = Request::builder()
            .header("connection", "keep-alive, Upgrade")
            .header("upgrade", "websocket")
            .body(())
            .unwrap();
        assert!(is_upgrade_request(&req));

        let req = Request::builder()
            .header("upgrade", "websocket")
            .body(())
            .unwrap();
        assert!(!is_upgrade_request(&req));

        let req = Request::builder()
            .header("connection", "upgrade")
            .body(())
            .unwrap();
        assert!(!is_upgrade_request(&req));
    }
}
