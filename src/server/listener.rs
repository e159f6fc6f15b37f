//! Listening sockets shared between server instances.

use std::io;
use std::net::SocketAddr;

use tokio::net::{lookup_host, TcpListener, TcpSocket};
use tracing::debug;

use crate::config::server::LISTEN_BACKLOG;
use crate::error::{AppError, Result};

/// Resolve `bind_address` (`host:port`, host may be a name) and bind the
/// first address that accepts a shared listener.
pub async fn bind_resolved(bind_address: &str) -> Result<TcpListener> {
    let addrs: Vec<SocketAddr> = match bind_address.parse() {
        Ok(addr) => vec![addr],
        Err(_) => lookup_host(bind_address)
            .await
            .map_err(|e| {
                AppError::Configuration(format!(
                    "Invalid bind address '{}': {}",
                    bind_address, e
                ))
            })?
            .collect(),
    };

    let mut last_error = None;
    for addr in addrs {
        match bind_shared(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!("Could not bind {}: {}", addr, e);
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => e.into(),
        None => AppError::Configuration(format!(
            "Bind address '{}' did not resolve to any address",
            bind_address
        )),
    })
}

/// Bind `addr` so that several instances can listen on the same port.
///
/// The kernel balances incoming connections between the sockets.
pub fn bind_shared(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}
