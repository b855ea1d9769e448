//! Port acquisition for the mirror listener.
//!
//! The configured port is tried first. If it is taken, the failed attempt is
//! dropped and the bind is retried on port 0 so the OS picks a free port.
//! Retrying is unbounded unless a limit is configured; any error other than
//! "address in use" ends the attempt immediately.

use std::io;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::mirror::MirrorError;

/// Binds `host:configured_port`, falling back to an ephemeral port on conflict.
///
/// `on_conflict` is called with the attempt number before every rebind.
/// `rebind_limit` caps the number of rebinds; `None` retries until a bind
/// succeeds.
pub async fn acquire_listener<F>(
    host: &str,
    configured_port: u16,
    rebind_limit: Option<u32>,
    mut on_conflict: F,
) -> Result<TcpListener, MirrorError>
where
    F: FnMut(u32),
{
    let mut port = configured_port;
    let mut rebinds = 0u32;

    loop {
        let addr = format!("{}:{}", host, port);
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                if rebinds > 0 {
                    info!("Mirror listener fell back to {}", describe(&listener, &addr));
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if rebind_limit.is_some_and(|limit| rebinds >= limit) {
                    return Err(MirrorError::RebindExhausted { attempts: rebinds });
                }
                rebinds += 1;
                warn!("Port {} in use, retrying with an ephemeral port", port);
                on_conflict(rebinds);
                port = 0;
            }
            Err(source) => return Err(MirrorError::Bind { addr, source }),
        }
    }
}

fn describe(listener: &TcpListener, fallback: &str) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_free_port_binds_directly() {
        let mut conflicts = 0;
        let listener = acquire_listener("127.0.0.1", 0, None, |_| conflicts += 1)
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
        assert_eq!(conflicts, 0);
    }

    #[tokio::test]
    async fn test_occupied_port_falls_back() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut conflicts = Vec::new();
        let listener = acquire_listener("127.0.0.1", port, None, |n| conflicts.push(n))
            .await
            .unwrap();

        let bound = listener.local_addr().unwrap().port();
        assert_ne!(bound, port);
        assert_ne!(bound, 0);
        assert_eq!(conflicts, vec![1]);
    }

    #[tokio::test]
    async fn test_zero_rebind_limit_fails_on_conflict() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let result = acquire_listener("127.0.0.1", port, Some(0), |_| {}).await;
        assert!(matches!(
            result,
            Err(MirrorError::RebindExhausted { attempts: 0 })
        ));
    }

    #[tokio::test]
    async fn test_other_bind_errors_are_fatal() {
        // TEST-NET-1 is never assigned to a local interface.
        let mut conflicts = 0;
        let result = acquire_listener("192.0.2.1", 0, None, |_| conflicts += 1).await;
        assert!(matches!(result, Err(MirrorError::Bind { .. })));
        assert_eq!(conflicts, 0);
    }
}
