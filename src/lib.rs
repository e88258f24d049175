/*!
A zero-copy inspector for DHCPv6 Reply messages.

The crate picks the configuration a DHCPv6 server hands to a client
out of a Reply message: delegated prefixes (IA_PD) and the softwire
Mapping of Address and Port options (MAP-E/MAP-T rules, DMR and port
parameters). Nothing is acted upon; decoded records are returned to
the caller.

# Examples

```
use dhcp6snoop::dhcpv6::{parse_reply, s46, DhcpOption};

const REPLY: [u8; 18] = [
    /* msg-type */ 7, /* transaction-id */ 0x12, 0x34, 0x56,
    /* S46_CONT_MAPT */ 0, 95, /* len */ 0, 10,
    /* S46_DMR */ 0, 91, /* len */ 0, 6,
    /* dmr-prefix6-len */ 40, /* dmr-ipv6-prefix */ 0x20, 0x01, 0x0d, 0xb8, 0x05,
];

let reply = parse_reply(&REPLY)?;
assert_eq!(reply.transaction_id(), [0x12, 0x34, 0x56]);

let mut options = reply.scan();
assert_eq!(
    options.next(),
    Some(Ok(DhcpOption::MapContainer(s46::Container::MapT)))
);
match options.next() {
    Some(Ok(DhcpOption::MapDmr(dmr))) => assert_eq!(dmr.prefix_len, 40),
    other => panic!("expected a DMR, got {:?}", other),
}
assert_eq!(options.next(), None);
# Ok::<(), dhcp6snoop::Error>(())
```

See:
 * [RFC8415]: Dynamic Host Configuration Protocol for IPv6 (DHCPv6)
 * [RFC3633]: IPv6 Prefix Options for DHCPv6
 * [RFC7598]: DHCPv6 Options for Configuration of Softwire Address and Port-Mapped Clients

[RFC8415]: https://datatracker.ietf.org/doc/html/rfc8415
[RFC3633]: https://datatracker.ietf.org/doc/html/rfc3633
[RFC7598]: https://datatracker.ietf.org/doc/html/rfc7598
 */

#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

#[macro_use]
mod macros;

pub mod dhcpv6;
pub mod udp;

/// The type of errors that may be produced by this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Source buffer is shorter than the fixed header.
    TooShort,
    /// The message is not a Reply and carries nothing to decode.
    NotAReply,
    /// Fewer than four bytes remain for the next option header.
    TruncatedHeader,
    /// The option length runs past the end of the enclosing data.
    TruncatedPayload { code: u16, length: u16 },
    /// A prefix length is out of range for its address family.
    InvalidPrefixLength { code: u16, value: u8 },
    /// The option data is shorter than its fixed fields require.
    DecoderPayloadTooShort {
        code: u16,
        required: usize,
        actual: usize,
    },
    /// Container options are nested deeper than
    /// [`MAX_NESTING`](dhcpv6::MAX_NESTING).
    NestingTooDeep { code: u16 },
    /// The UDP ports are not those of a server-to-client message.
    NotServerToClient { source: u16, destination: u16 },
    /// The UDP length field disagrees with the datagram.
    BadUdpLength(u16),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::TooShort => f.write_str("buffer is shorter than the fixed header"),
            Error::NotAReply => f.write_str("message is not a reply"),
            Error::TruncatedHeader => f.write_str("option header ended too soon"),
            Error::TruncatedPayload { code, length } => {
                write!(f, "option {} claims {} bytes past the end of data", code, length)
            }
            Error::InvalidPrefixLength { code, value } => {
                write!(f, "option {} has invalid prefix length {}", code, value)
            }
            Error::DecoderPayloadTooShort {
                code,
                required,
                actual,
            } => write!(
                f,
                "option {} needs {} bytes of data but has {}",
                code, required, actual
            ),
            Error::NestingTooDeep { code } => write!(f, "option {} is nested too deep", code),
            Error::NotServerToClient {
                source,
                destination,
            } => write!(
                f,
                "udp ports {} -> {} are not server to client",
                source, destination
            ),
            Error::BadUdpLength(len) => write!(f, "bad udp length {}", len),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
