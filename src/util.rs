//! Internal utilities.

use std::hash::{Hash, Hasher};
use std::io;
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Create and bind a UDP socket with optional receive buffer size.
///
/// For IPv6 addresses, sets `IPV6_V6ONLY = false` to enable dual-stack mode,
/// allowing both IPv4 and IPv6 traps on a single socket.
///
/// # Arguments
///
/// * `addr` - The socket address to bind to. For dual-stack, use `[::]:162`.
/// * `recv_buffer_size` - Optional receive buffer size. The kernel may cap this
///   at `net.core.rmem_max`. Trap storms after a link flap are bursty, so a
///   larger buffer trades memory for fewer kernel-level drops.
pub(crate) async fn bind_udp_socket(
    addr: SocketAddr,
    recv_buffer_size: Option<usize>,
) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    // Quick restarts on the well-known port
    socket.set_reuse_address(true)?;

    if let Some(size) = recv_buffer_size {
        // Kernel caps at rmem_max; a smaller buffer is not fatal
        if let Err(e) = socket.set_recv_buffer_size(size) {
            tracing::debug!(target: "snmp_trapd::dispatch", error = %e, size, "could not set receive buffer size");
        }
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Pick the worker responsible for a source address.
///
/// Only the IP takes part: a device sends from ephemeral ports, and all of
/// its traps must land on the same worker to keep them in order.
pub(crate) fn worker_index(ip: IpAddr, workers: usize) -> usize {
    if workers <= 1 {
        return 0;
    }
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    ip.hash(&mut hasher);
    (hasher.finish() % workers as u64) as usize
}

/// Lowercase hex rendering of a byte slice for logs and error messages.
pub struct HexDisplay<'a>(pub &'a [u8]);

impl std::fmt::Display for HexDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for b in self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for HexDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Encode bytes as a lowercase hex string.
pub fn encode_hex(bytes: &[u8]) -> String {
    HexDisplay(bytes).to_string()
}

/// Decode a hex string, accepting an optional `0x` prefix and `:` separators.
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let digits: Vec<u8> = s.bytes().filter(|b| *b != b':').collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}
