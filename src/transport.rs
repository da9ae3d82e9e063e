use std::io;
use std::net::SocketAddr;

/// Write side of a channel's UDP socket, handed to the engines that emit
/// datagrams without owning the socket.
pub trait DatagramSink: Send + Sync {
    /// Sends one datagram to `to` without blocking. A full socket buffer may
    /// queue the datagram; `WouldBlock` is only returned when it does not.
    fn send_to(&self, data: &[u8], to: SocketAddr) -> io::Result<usize>;

    /// The peer address learned by ICE, `None` until a candidate is selected.
    fn remote_addr(&self) -> Option<SocketAddr>;
}
