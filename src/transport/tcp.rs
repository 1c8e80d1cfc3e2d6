//! TCP connection to the local service.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpStream;

use crate::error::{EnsembleError, Result};
use crate::protocol::DEFAULT_PORT;

/// Address of the service on this host.
pub fn default_service_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

/// Open a TCP stream to the service.
///
/// Failures surface as [`EnsembleError::Connect`]; there is no retry.
pub async fn connect(addr: SocketAddr, nodelay: bool) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(EnsembleError::Connect)?;
    stream.set_nodelay(nodelay).map_err(EnsembleError::Connect)?;
    tracing::debug!("Connected to service at {}", addr);
    Ok(stream)
}
