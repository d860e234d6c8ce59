use std::io;
use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("failed to allocate a free port on {address}: {source}")]
    Allocate {
        address: String,
        #[source]
        source: io::Error,
    },
}

async fn try_bind(address: &str, port: u16) -> io::Result<TcpListener> {
    let host = address.trim_start_matches('[').trim_end_matches(']');
    TcpListener::bind((host, port)).await
}

/// Finds `count` free TCP ports on `address`.
///
/// Ports from `preferred` are tried first, in order; unavailable ones are
/// skipped. When they run out, the OS assigns an ephemeral port. Every
/// probing listener stays open until all ports are picked, so the result
/// never contains duplicates. The ports are free only at the time of the
/// check, nothing prevents another process from taking them afterwards.
pub async fn allocate_ports(
    address: &str,
    count: usize,
    preferred: &[u16],
) -> Result<Vec<u16>, PortError> {
    let mut ports = Vec::with_capacity(count);
    let mut listeners = Vec::with_capacity(count);
    let mut candidates = preferred.iter().copied();

    while ports.len() < count {
        let mut chosen = None;
        for port in candidates.by_ref() {
            if port == 0 || ports.contains(&port) {
                continue;
            }
            if let Ok(listener) = try_bind(address, port).await {
                chosen = Some((port, listener));
                break;
            }
        }

        let (port, listener) = match chosen {
            Some(found) => found,
            None => {
                let listener =
                    try_bind(address, 0)
                        .await
                        .map_err(|source| PortError::Allocate {
                            address: address.to_string(),
                            source,
                        })?;
                let port = listener
                    .local_addr()
                    .map_err(|source| PortError::Allocate {
                        address: address.to_string(),
                        source,
                    })?
                    .port();
                (port, listener)
            }
        };

        ports.push(port);
        listeners.push(listener);
    }

    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocates_requested_count_without_duplicates() {
        let ports = allocate_ports("127.0.0.1", 5, &[]).await.unwrap();
        assert_eq!(ports.len(), 5);
        let mut unique = ports.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert!(ports.iter().all(|&p| p > 0));
    }

    #[tokio::test]
    async fn test_zero_count() {
        assert!(allocate_ports("127.0.0.1", 0, &[1234]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_uses_preferred_port_when_free() {
        // Find a free port first, release it, then prefer it.
        let free = allocate_ports("127.0.0.1", 1, &[]).await.unwrap()[0];
        let ports = allocate_ports("127.0.0.1", 1, &[free]).await.unwrap();
        assert_eq!(ports, vec![free]);
    }

    #[tokio::test]
    async fn test_skips_busy_preferred_port() {
        let busy = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let busy_port = busy.local_addr().unwrap().port();

        let ports = allocate_ports("127.0.0.1", 1, &[busy_port]).await.unwrap();
        assert_eq!(ports.len(), 1);
        assert_ne!(ports[0], busy_port);
    }

    #[tokio::test]
    async fn test_duplicate_preferred_ports_used_once() {
        let free = allocate_ports("127.0.0.1", 1, &[]).await.unwrap()[0];
        let ports = allocate_ports("127.0.0.1", 2, &[free, free]).await.unwrap();
        assert_eq!(ports[0], free);
        assert_ne!(ports[1], free);
    }

    #[tokio::test]
    async fn test_invalid_address_errors() {
        let err = allocate_ports("256.0.0.1", 1, &[]).await.unwrap_err();
        assert!(err.to_string().contains("256.0.0.1"));
    }
}
