//! One request/reply exchange over UDP

use super::error::{RadiusError, RadiusResult};
use radius_proto::{AccessRequest, Packet};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{self, Instant};
use tracing::debug;

/// Send `request` to `address` and wait up to `timeout` for its reply.
///
/// Each exchange uses its own ephemeral socket. Datagrams from any other
/// address, or carrying another identifier, are dropped and the wait goes on.
pub async fn exchange(
    address: SocketAddr,
    request: &AccessRequest,
    timeout: Duration,
) -> RadiusResult<Vec<u8>> {
    let bind: SocketAddr = if address.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind).await?;
    let deadline = Instant::now() + timeout;

    socket.send_to(&request.datagram, address).await?;
    debug!(
        host = %address,
        identifier = request.identifier,
        "Sent Access-Request"
    );

    let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
    loop {
        let (len, from) = match time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(received) => received?,
            Err(_) => return Err(RadiusError::Timeout(address)),
        };

        if from != address {
            debug!(expected = %address, from = %from, "Dropping reply from unexpected address");
            continue;
        }
        if !request.matches(&buf[..len]) {
            debug!(host = %address, "Dropping reply with mismatched identifier");
            continue;
        }

        debug!(host = %address, bytes = len, "Received reply");
        return Ok(buf[..len].to_vec());
    }
}
