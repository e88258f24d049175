/*!
DHCPv6 definitions, the Reply gate and the option scanner.

Options are walked in a single forward pass. Options that encapsulate
further options (IA_PD, the MAP containers and the options trailing a
MAP rule) are not skipped over: their nested options are yielded in
line, after the record of the enclosing option, and each enclosing
option bounds the bytes its nested options may occupy.

See:
 * [RFC8415]: Dynamic Host Configuration Protocol for IPv6 (DHCPv6)
 * [RFC3633]: IPv6 Prefix Options for DHCPv6

[RFC8415]: https://datatracker.ietf.org/doc/html/rfc8415
[RFC3633]: https://datatracker.ietf.org/doc/html/rfc3633
 */

use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;
use core::iter::FusedIterator;
use ref_cast::RefCast;

use crate::Error;

pub mod s46;

/// The UDP port where clients listen for messages.
pub const CLIENT_PORT: u16 = 546;
/// The UDP port where servers and relay agents listen for messages.
pub const SERVER_PORT: u16 = 547;
/// The length of the fixed message header (msg-type and transaction-id).
pub const HEADER_LEN: usize = 4;
/// The length of an option header (option-code and option-len).
pub const OPTION_HEADER_LEN: usize = 4;
/// The number of nested option scopes the scanner keeps track of.
pub const MAX_NESTING: usize = 3;

/// An IPv6 address or left-aligned IPv6 prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, RefCast, Debug)]
#[repr(transparent)]
pub struct Addr(pub [u8; 16]);

impl<'a> TryFrom<&'a [u8]> for &'a Addr {
    type Error = Error;

    #[inline]
    fn try_from(b: &'a [u8]) -> Result<Self, Self::Error> {
        b.get(..16)
            .and_then(|b| b.try_into().ok())
            .map(Addr::ref_cast)
            .ok_or(Error::TooShort)
    }
}

impl Addr {
    /// Returns the minimal wire form of the first `len` bits.
    ///
    /// Lengths above 128 are treated as 128.
    pub fn prefix_bytes(&self, len: u8) -> &[u8] {
        &self.0[..prefix_octets(len.min(128))]
    }
}

#[cfg(feature = "std")]
impl From<Addr> for std::net::Ipv6Addr {
    #[inline]
    fn from(Addr(x): Addr) -> Self {
        x.into()
    }
}

#[cfg(feature = "std")]
impl From<std::net::Ipv6Addr> for Addr {
    #[inline]
    fn from(x: std::net::Ipv6Addr) -> Addr {
        Addr(x.octets())
    }
}

/// Returns the number of octets holding a prefix of `len` bits.
#[inline]
pub fn prefix_octets(len: u8) -> usize {
    (usize::from(len) + 7) / 8
}

/// Reads a variable-length IPv6 prefix of `len` bits starting at
/// byte offset `at` of `data`.
///
/// Returns the prefix, zero-padded past `len` bits, and the offset of
/// the first byte after it.
pub(crate) fn read_prefix(
    code: u16,
    data: &[u8],
    at: usize,
    len: u8,
) -> Result<(Addr, usize), Error> {
    if len > 128 {
        return Err(Error::InvalidPrefixLength { code, value: len });
    }
    let n = prefix_octets(len);
    let bits = data
        .get(at..at + n)
        .ok_or(Error::DecoderPayloadTooShort {
            code,
            required: at + n,
            actual: data.len(),
        })?;
    let mut prefix = [0; 16];
    prefix[..n].copy_from_slice(bits);
    if len % 8 != 0 {
        prefix[n - 1] &= 0xff << (8 - len % 8);
    }
    Ok((Addr(prefix), at + n))
}

/// DHCPv6 message type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum MessageType {
    Solicit,
    Advertise,
    Request,
    Confirm,
    Renew,
    Rebind,
    Reply,
    Release,
    Decline,
    Reconfigure,
    InformationRequest,
    RelayForward,
    RelayReply,
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(x: u8) -> Self {
        use MessageType::*;
        match x {
            1 => Solicit,
            2 => Advertise,
            3 => Request,
            4 => Confirm,
            5 => Renew,
            6 => Rebind,
            7 => Reply,
            8 => Release,
            9 => Decline,
            10 => Reconfigure,
            11 => InformationRequest,
            12 => RelayForward,
            13 => RelayReply,
            _ => Other(x),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(x: MessageType) -> u8 {
        use MessageType::*;
        match x {
            Solicit => 1,
            Advertise => 2,
            Request => 3,
            Confirm => 4,
            Renew => 5,
            Rebind => 6,
            Reply => 7,
            Release => 8,
            Decline => 9,
            Reconfigure => 10,
            InformationRequest => 11,
            RelayForward => 12,
            RelayReply => 13,
            Other(x) => x,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use MessageType::*;
        match *self {
            Solicit => f.write_str("solicit"),
            Advertise => f.write_str("advertise"),
            Request => f.write_str("request"),
            Confirm => f.write_str("confirm"),
            Renew => f.write_str("renew"),
            Rebind => f.write_str("rebind"),
            Reply => f.write_str("reply"),
            Release => f.write_str("release"),
            Decline => f.write_str("decline"),
            Reconfigure => f.write_str("reconfigure"),
            InformationRequest => f.write_str("information-request"),
            RelayForward => f.write_str("relay-forw"),
            RelayReply => f.write_str("relay-repl"),
            Other(x) => write!(f, "unknown({})", x),
        }
    }
}

/// The DHCP option codes identifiying the specific option types.
#[allow(missing_docs)]
pub mod option_code {
    pub const OPTION_CLIENTID: u16 = 1;
    pub const OPTION_SERVERID: u16 = 2;
    pub const OPTION_IA_NA: u16 = 3;
    pub const OPTION_IA_TA: u16 = 4;
    pub const OPTION_IAADDR: u16 = 5;
    pub const OPTION_ORO: u16 = 6;
    pub const OPTION_PREFERENCE: u16 = 7;
    pub const OPTION_ELAPSED_TIME: u16 = 8;
    pub const OPTION_RELAY_MSG: u16 = 9;
    pub const OPTION_AUTH: u16 = 11;
    pub const OPTION_UNICAST: u16 = 12;
    pub const OPTION_STATUS_CODE: u16 = 13;
    pub const OPTION_RAPID_COMMIT: u16 = 14;
    pub const OPTION_USER_CLASS: u16 = 15;
    pub const OPTION_INTERFACE_ID: u16 = 18;
    pub const OPTION_RECONF_MSG: u16 = 19;
    pub const OPTION_RECONF_ACCEPT: u16 = 20;
    pub const OPTION_DNS_SERVERS: u16 = 23;
    pub const OPTION_DOMAIN_LIST: u16 = 24;
    pub const OPTION_IA_PD: u16 = 25;
    pub const OPTION_IAPREFIX: u16 = 26;
    pub const OPTION_INFORMATION_REFRESH_TIME: u16 = 32;
    pub const OPTION_CLIENT_FQDN: u16 = 39;
    pub const OPTION_SOL_MAX_RT: u16 = 82;
    pub const OPTION_INF_MAX_RT: u16 = 83;
    pub const OPTION_S46_RULE: u16 = 89;
    pub const OPTION_S46_BR: u16 = 90;
    pub const OPTION_S46_DMR: u16 = 91;
    pub const OPTION_S46_V4V6BIND: u16 = 92;
    pub const OPTION_S46_PORTPARAMS: u16 = 93;
    pub const OPTION_S46_CONT_MAPE: u16 = 94;
    pub const OPTION_S46_CONT_MAPT: u16 = 95;
    pub const OPTION_S46_CONT_LW: u16 = 96;
}

/// The fixed fields of an Identity Association for Prefix Delegation
/// (IA_PD).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IaPd {
    pub iaid: u32,
    /// Seconds until the client contacts the delegating server to
    /// extend the lifetimes.
    pub t1: u32,
    /// Seconds until the client contacts any available server.
    pub t2: u32,
}

impl IaPd {
    const LEN: usize = 12;

    pub fn new(b: &[u8]) -> Result<Self, Error> {
        if b.len() < Self::LEN {
            return Err(Error::DecoderPayloadTooShort {
                code: option_code::OPTION_IA_PD,
                required: Self::LEN,
                actual: b.len(),
            });
        }
        Ok(IaPd {
            iaid: NetworkEndian::read_u32(b),
            t1: NetworkEndian::read_u32(&b[4..]),
            t2: NetworkEndian::read_u32(&b[8..]),
        })
    }
}

/// The IA Prefix option, carrying a prefix delegated through an
/// [IA_PD](IaPd).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IaPrefix {
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub prefix_length: u8,
    pub prefix: Addr,
}

impl IaPrefix {
    const LEN: usize = 25;

    pub fn new(b: &[u8]) -> Result<Self, Error> {
        const CODE: u16 = option_code::OPTION_IAPREFIX;
        if b.len() < Self::LEN {
            return Err(Error::DecoderPayloadTooShort {
                code: CODE,
                required: Self::LEN,
                actual: b.len(),
            });
        }
        let prefix_length = b[8];
        if prefix_length > 128 {
            return Err(Error::InvalidPrefixLength {
                code: CODE,
                value: prefix_length,
            });
        }
        let prefix: &Addr = b[9..].try_into()?;
        Ok(IaPrefix {
            preferred_lifetime: NetworkEndian::read_u32(b),
            valid_lifetime: NetworkEndian::read_u32(&b[4..]),
            prefix_length,
            prefix: *prefix,
        })
    }
}

/// A delegated prefix together with the IA_PD it was delegated in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PrefixDelegation {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub prefix_length: u8,
    pub prefix: Addr,
}

impl PrefixDelegation {
    pub fn new(ia: IaPd, prefix: IaPrefix) -> Self {
        PrefixDelegation {
            iaid: ia.iaid,
            t1: ia.t1,
            t2: ia.t2,
            preferred_lifetime: prefix.preferred_lifetime,
            valid_lifetime: prefix.valid_lifetime,
            prefix_length: prefix.prefix_length,
            prefix: prefix.prefix,
        }
    }
}

/// A decoded DHCPv6 option.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DhcpOption {
    /// 25 Identity Association for Prefix Delegation
    ///
    /// One record per IA Prefix option found inside the IA_PD.
    PrefixDelegation(PrefixDelegation),
    /// 25 Identity Association for Prefix Delegation
    ///
    /// Yielded after the nested options of an IA_PD that carried no IA
    /// Prefix option, e.g. one holding only a status code.
    IaPdWithoutPrefix(IaPd),
    /// 89 S46 Rule
    MapRule(s46::Rule),
    /// 91 S46 Default Mapping Rule
    MapDmr(s46::Dmr),
    /// 93 S46 Port Parameters
    MapPortParams(s46::PortParams),
    /// 94/95 S46 MAP-E or MAP-T container
    ///
    /// The options inside the container follow as separate records.
    MapContainer(s46::Container),
    /// Option that is not decoded.
    Unrecognized { code: u16, length: u16 },
}

impl DhcpOption {
    /// Returns the code of the option the record was decoded from.
    pub fn code(&self) -> u16 {
        use option_code::*;
        use DhcpOption::*;
        match *self {
            PrefixDelegation(_) | IaPdWithoutPrefix(_) => OPTION_IA_PD,
            MapRule(_) => OPTION_S46_RULE,
            MapDmr(_) => OPTION_S46_DMR,
            MapPortParams(_) => OPTION_S46_PORTPARAMS,
            MapContainer(x) => x.code(),
            Unrecognized { code, .. } => code,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum ScopeKind {
    Container,
    IaPd { ia: IaPd, has_prefix: bool },
    RuleOptions,
}

/// An open encapsulating option.
#[derive(Clone, Copy, Debug)]
struct Scope {
    /// Offset one past the last byte of the encapsulating option.
    end: usize,
    kind: ScopeKind,
}

/// Iterator over the options of a message.
///
/// Iteration ends after the first error that leaves the position of
/// the next option unknown ([`Error::TruncatedHeader`] and
/// [`Error::TruncatedPayload`]). Errors about the contents of a single
/// option are yielded in its place and iteration continues.
#[derive(Clone, Debug)]
pub struct Options<'a> {
    b: &'a [u8],
    /// The current position in `b`.
    cursor: usize,
    scopes: [Option<Scope>; MAX_NESTING],
    depth: usize,
    done: bool,
}

impl<'a> Options<'a> {
    fn new(b: &'a [u8]) -> Self {
        Options {
            b,
            cursor: 0,
            scopes: [None; MAX_NESTING],
            depth: 0,
            done: false,
        }
    }

    /// Returns the number of bytes walked so far.
    ///
    /// Once the iterator is exhausted without error this is the length
    /// of the options region.
    pub fn consumed(&self) -> usize {
        self.cursor
    }

    fn innermost(&self) -> Option<Scope> {
        self.depth.checked_sub(1).and_then(|i| self.scopes[i])
    }

    fn innermost_mut(&mut self) -> Option<&mut Scope> {
        let i = self.depth.checked_sub(1)?;
        self.scopes[i].as_mut()
    }

    fn end(&self) -> usize {
        self.innermost().map_or(self.b.len(), |scope| scope.end)
    }

    /// Moves the cursor to `from` and makes `end` the bound of the
    /// following options until the cursor reaches it.
    fn descend(&mut self, code: u16, from: usize, end: usize, kind: ScopeKind) -> Result<(), Error> {
        if self.depth == MAX_NESTING {
            net_debug!("DHCPv6 option {} nested too deep, skipping it", code);
            return Err(Error::NestingTooDeep { code });
        }
        self.scopes[self.depth] = Some(Scope { end, kind });
        self.depth += 1;
        self.cursor = from;
        Ok(())
    }

    /// Decodes the option with header at `start`.
    ///
    /// The cursor has already been moved past the option; options that
    /// encapsulate others move it back inside. Returns `None` when the
    /// option itself yields no record.
    fn dispatch(
        &mut self,
        code: u16,
        length: u16,
        data: &'a [u8],
        start: usize,
    ) -> Option<Result<DhcpOption, Error>> {
        use option_code::*;
        let body = start + OPTION_HEADER_LEN;
        let end = body + data.len();
        if length == 0
            && matches!(
                code,
                OPTION_IA_PD
                    | OPTION_IAPREFIX
                    | OPTION_S46_RULE
                    | OPTION_S46_DMR
                    | OPTION_S46_PORTPARAMS
            )
        {
            // An empty option carries no fields to check.
            return Some(Ok(DhcpOption::Unrecognized { code, length }));
        }
        Some(match code {
            OPTION_IA_PD => match IaPd::new(data) {
                Ok(ia) => {
                    let kind = ScopeKind::IaPd {
                        ia,
                        has_prefix: false,
                    };
                    return self.descend(code, body + IaPd::LEN, end, kind).err().map(Err);
                }
                Err(e) => Err(e),
            },
            OPTION_IAPREFIX => match self.innermost_mut() {
                Some(Scope {
                    kind: ScopeKind::IaPd { ia, has_prefix },
                    ..
                }) => {
                    let ia = *ia;
                    IaPrefix::new(data).map(|prefix| {
                        *has_prefix = true;
                        DhcpOption::PrefixDelegation(PrefixDelegation::new(ia, prefix))
                    })
                }
                _ => Ok(DhcpOption::Unrecognized { code, length }),
            },
            OPTION_S46_RULE => s46::Rule::new(data).map(|(rule, options)| {
                if options < data.len()
                    && self
                        .descend(code, body + options, end, ScopeKind::RuleOptions)
                        .is_err()
                {
                    net_debug!("DHCPv6 skipping {} bytes of S46 rule options", data.len() - options);
                }
                DhcpOption::MapRule(rule)
            }),
            OPTION_S46_DMR => s46::Dmr::new(data).map(DhcpOption::MapDmr),
            OPTION_S46_PORTPARAMS => s46::PortParams::new(data).map(DhcpOption::MapPortParams),
            OPTION_S46_CONT_MAPE => self
                .descend(code, body, end, ScopeKind::Container)
                .map(|()| DhcpOption::MapContainer(s46::Container::MapE)),
            OPTION_S46_CONT_MAPT => self
                .descend(code, body, end, ScopeKind::Container)
                .map(|()| DhcpOption::MapContainer(s46::Container::MapT)),
            _ => Ok(DhcpOption::Unrecognized { code, length }),
        })
    }
}

impl<'a> Iterator for Options<'a> {
    type Item = Result<DhcpOption, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let b = self.b;
        loop {
            if self.done {
                return None;
            }
            if let Some(scope) = self.innermost() {
                if self.cursor >= scope.end {
                    self.depth -= 1;
                    self.scopes[self.depth] = None;
                    if let ScopeKind::IaPd {
                        ia,
                        has_prefix: false,
                    } = scope.kind
                    {
                        return Some(Ok(DhcpOption::IaPdWithoutPrefix(ia)));
                    }
                    continue;
                }
            }

            let rest = &b[self.cursor..self.end()];
            let (code, length) = match *rest {
                [] => {
                    self.done = true;
                    return None;
                }
                [c0, c1, l0, l1, ..] => (
                    NetworkEndian::read_u16(&[c0, c1]),
                    NetworkEndian::read_u16(&[l0, l1]),
                ),
                _ => {
                    net_debug!("DHCPv6 option header truncated at {}", self.cursor);
                    self.done = true;
                    return Some(Err(Error::TruncatedHeader));
                }
            };
            net_trace!("DHCPv6 option {} len {} at {}", code, length, self.cursor);

            let data = match rest[OPTION_HEADER_LEN..].get(..usize::from(length)) {
                Some(data) => data,
                None => {
                    net_debug!("DHCPv6 option {} len {} truncated", code, length);
                    self.done = true;
                    return Some(Err(Error::TruncatedPayload { code, length }));
                }
            };
            let start = self.cursor;
            self.cursor += OPTION_HEADER_LEN + data.len();
            if let Some(item) = self.dispatch(code, length, data, start) {
                return Some(item);
            }
        }
    }
}

impl FusedIterator for Options<'_> {}

/// The options of a Reply message.
#[derive(Clone, Copy, Debug)]
pub struct OptionsRegion<'a> {
    transaction_id: [u8; 3],
    b: &'a [u8],
}

impl<'a> OptionsRegion<'a> {
    /// Gets the transaction ID of the Reply.
    pub fn transaction_id(&self) -> [u8; 3] {
        self.transaction_id
    }

    /// Returns the raw options.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.b
    }

    /// Returns the length of the options in bytes.
    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Returns an iterator decoding the options.
    pub fn scan(&self) -> Options<'a> {
        Options::new(self.b)
    }
}

/// A read wrapper around a Dynamic Host Configuration Protocol for
/// IPv6 message buffer.
#[derive(Debug)]
pub struct Message<T>(T);

impl<T: AsRef<[u8]>> AsRef<[u8]> for Message<T> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<T> Message<T> {
    /// Consumes the view and returns the underlying buffer.
    #[inline]
    pub fn into_inner(self) -> T {
        let Self(inner) = self;
        inner
    }
}

impl<T: AsRef<[u8]>> Message<T> {
    pub fn new(b: T) -> Result<Self, Error> {
        if b.as_ref().len() < HEADER_LEN {
            return Err(Error::TooShort);
        }
        Ok(Self(b))
    }

    /// Gets the DHCP message type.
    pub fn msg_type(&self) -> MessageType {
        self.as_ref()[0].into()
    }

    /// Gets the transaction ID for this message exchange.
    pub fn transaction_id(&self) -> [u8; 3] {
        let b = self.as_ref();
        [b[1], b[2], b[3]]
    }

    /// Returns an iterator of the options, whatever the message type.
    ///
    /// This is a raw view: no Reply check is made and relay messages
    /// are not unwrapped. Use [`parse_reply`] to only decode Replies.
    pub fn options(&self) -> Options<'_> {
        Options::new(&self.as_ref()[HEADER_LEN..])
    }
}

/// Checks that `b`, the payload of a UDP datagram from a server, is a
/// Reply and returns its options.
///
/// Any other message type gives [`Error::NotAReply`].
pub fn parse_reply(b: &[u8]) -> Result<OptionsRegion<'_>, Error> {
    let msg = Message::new(b)?;
    let msg_type = msg.msg_type();
    if msg_type != MessageType::Reply {
        net_debug!("DHCPv6 ignoring {} message", msg_type);
        return Err(Error::NotAReply);
    }
    Ok(OptionsRegion {
        transaction_id: msg.transaction_id(),
        b: &msg.into_inner()[HEADER_LEN..],
    })
}

/// Decodes all options of a Reply, failing on the first error.
#[cfg(feature = "std")]
pub fn decode_reply(b: &[u8]) -> Result<Vec<DhcpOption>, Error> {
    parse_reply(b)?.scan().collect()
}
