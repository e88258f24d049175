/*!
Isolation of DHCPv6 server messages from UDP datagrams.

Only the UDP header is looked at; the enclosing IPv6 header is left to
the caller.
 */
use byteorder::{ByteOrder, NetworkEndian};

use crate::dhcpv6::{CLIENT_PORT, SERVER_PORT};
use crate::Error;

/// The length of the UDP header.
pub const HEADER_LEN: usize = 8;

/// Returns the payload of a UDP datagram sent from a DHCPv6 server
/// port to a client port.
///
/// The payload ends where the UDP length field says, so bytes trailing
/// the datagram are dropped. The checksum is not verified.
pub fn dhcpv6_payload(datagram: &[u8]) -> Result<&[u8], Error> {
    let header = datagram.get(..HEADER_LEN).ok_or(Error::TooShort)?;
    let source = NetworkEndian::read_u16(header);
    let destination = NetworkEndian::read_u16(&header[2..]);
    if source != SERVER_PORT || destination != CLIENT_PORT {
        return Err(Error::NotServerToClient {
            source,
            destination,
        });
    }
    let len = NetworkEndian::read_u16(&header[4..]);
    datagram
        .get(HEADER_LEN..usize::from(len))
        .ok_or(Error::BadUdpLength(len))
}
