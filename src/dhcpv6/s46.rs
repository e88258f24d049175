/*!
Definitions and decoders for the softwire Mapping of Address and Port
(MAP) options.

See: [RFC7598] DHCPv6 Options for Configuration of Softwire Address and
Port-Mapped Clients

[RFC7598]: https://datatracker.ietf.org/doc/html/rfc7598
 */
use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};

use super::{option_code, read_prefix, Addr};
use crate::Error;

bitflags! {
    /// The flags of an [S46 Rule](Rule).
    ///
    /// Reserved bits are ignored on reception.
    #[repr(transparent)]
    pub struct RuleFlags: u8 {
        /// The rule is also used as a Forwarding Mapping Rule.
        const FMR = 0x01;
    }
}

/// The S46 Rule option, a Basic or Forwarding Mapping Rule.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rule {
    pub flags: RuleFlags,
    /// Length of the Embedded Address bits.
    pub ea_len: u8,
    pub ipv4_prefix_len: u8,
    /// The rule IPv4 prefix in host byte order.
    pub ipv4_prefix: u32,
    pub ipv6_prefix_len: u8,
    /// The rule IPv6 prefix, zero past `ipv6_prefix_len` bits.
    pub ipv6_prefix: Addr,
}

impl Rule {
    const FIXED_LEN: usize = 8;

    /// Decodes the option data of an S46 Rule.
    ///
    /// Also returns the offset in `b` where the options encapsulated in
    /// the rule begin.
    pub fn new(b: &[u8]) -> Result<(Self, usize), Error> {
        const CODE: u16 = option_code::OPTION_S46_RULE;
        let (flags, ea_len, ipv4_prefix_len, ipv4_prefix, ipv6_prefix_len) = match *b {
            [flags, ea_len, prefix4_len, a0, a1, a2, a3, prefix6_len, ..] => (
                flags,
                ea_len,
                prefix4_len,
                NetworkEndian::read_u32(&[a0, a1, a2, a3]),
                prefix6_len,
            ),
            _ => {
                return Err(Error::DecoderPayloadTooShort {
                    code: CODE,
                    required: Self::FIXED_LEN,
                    actual: b.len(),
                })
            }
        };
        if ipv4_prefix_len > 32 {
            return Err(Error::InvalidPrefixLength {
                code: CODE,
                value: ipv4_prefix_len,
            });
        }
        let (ipv6_prefix, options) = read_prefix(CODE, b, Self::FIXED_LEN, ipv6_prefix_len)?;
        Ok((
            Rule {
                flags: RuleFlags::from_bits_truncate(flags),
                ea_len,
                ipv4_prefix_len,
                ipv4_prefix,
                ipv6_prefix_len,
                ipv6_prefix,
            },
            options,
        ))
    }

    #[cfg(feature = "std")]
    pub fn ipv4_prefix_addr(&self) -> std::net::Ipv4Addr {
        self.ipv4_prefix.into()
    }
}

/// The S46 Default Mapping Rule option.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Dmr {
    pub prefix_len: u8,
    pub prefix: Addr,
}

impl Dmr {
    pub fn new(b: &[u8]) -> Result<Self, Error> {
        const CODE: u16 = option_code::OPTION_S46_DMR;
        let prefix_len = *b.first().ok_or(Error::DecoderPayloadTooShort {
            code: CODE,
            required: 1,
            actual: 0,
        })?;
        let (prefix, _) = read_prefix(CODE, b, 1, prefix_len)?;
        Ok(Dmr { prefix_len, prefix })
    }
}

/// The S46 Port Parameters option.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PortParams {
    /// Number of leading port bits excluded from the port set.
    pub offset: u8,
    pub psid_len: u8,
    /// The PSID field as sent, significant bits on the left.
    pub psid: u16,
}

impl PortParams {
    pub fn new(b: &[u8]) -> Result<Self, Error> {
        match *b {
            [offset, psid_len, p0, p1, ..] => Ok(PortParams {
                offset,
                psid_len,
                psid: NetworkEndian::read_u16(&[p0, p1]),
            }),
            _ => Err(Error::DecoderPayloadTooShort {
                code: option_code::OPTION_S46_PORTPARAMS,
                required: 4,
                actual: b.len(),
            }),
        }
    }

    /// Returns the Port Set Identifier, the `psid_len` leftmost bits of
    /// the field.
    ///
    /// `None` if `psid_len` exceeds 16.
    pub fn psid_value(&self) -> Option<u16> {
        match self.psid_len {
            0 => Some(0),
            n @ 1..=16 => Some(self.psid >> (16 - n)),
            _ => None,
        }
    }
}

/// The kind of a MAP container option.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Container {
    /// 94 S46 MAP-E Container
    MapE,
    /// 95 S46 MAP-T Container
    MapT,
}

impl Container {
    pub fn code(&self) -> u16 {
        match self {
            Container::MapE => option_code::OPTION_S46_CONT_MAPE,
            Container::MapT => option_code::OPTION_S46_CONT_MAPT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcpv6::{parse_reply, DhcpOption};
    use std::net::{Ipv4Addr, Ipv6Addr};

    const EX_RULE: [u8; 13] = [
        /* flags */ 0, /* ea-len */ 6, /* prefix4-len */ 24,
        /* ipv4-prefix */ 192, 0, 2, 0, /* prefix6-len */ 40,
        /* ipv6-prefix */ 0x20, 0x01, 0x0d, 0xb8, 0x05,
    ];

    #[test]
    fn rule() -> Result<(), Error> {
        let (rule, options) = Rule::new(&EX_RULE)?;
        assert_eq!(options, EX_RULE.len());
        assert_eq!(rule.flags, RuleFlags::empty());
        assert_eq!(rule.ea_len, 6);
        assert_eq!(rule.ipv4_prefix_len, 24);
        assert_eq!(rule.ipv4_prefix, 0xc000_0200);
        assert_eq!(rule.ipv4_prefix_addr(), Ipv4Addr::new(192, 0, 2, 0));
        assert_eq!(rule.ipv6_prefix_len, 40);
        assert_eq!(
            rule.ipv6_prefix,
            Ipv6Addr::new(0x2001, 0xdb8, 0x0500, 0, 0, 0, 0, 0).into()
        );
        Ok(())
    }

    #[test]
    fn rule_in_reply() -> Result<(), Error> {
        let mut msg = vec![/* msg-type */ 7, 0, 0, 1, /* S46_RULE */ 0, 89, /* len */ 0, 13];
        msg.extend_from_slice(&EX_RULE);
        let options = parse_reply(&msg)?.scan().collect::<Result<Vec<_>, _>>()?;
        assert_eq!(options, [DhcpOption::MapRule(Rule::new(&EX_RULE)?.0)]);
        Ok(())
    }

    #[test]
    fn rule_prefix_boundaries() -> Result<(), Error> {
        let mut b = vec![0, 0, 0, 0, 0, 0, 0, /* prefix6-len */ 128];
        b.extend_from_slice(&[0xff; 16]);
        let (rule, options) = Rule::new(&b)?;
        assert_eq!(options, 24);
        assert_eq!(rule.ipv6_prefix, Addr([0xff; 16]));

        let (rule, options) = Rule::new(&[0, 0, 0, 0, 0, 0, 0, /* prefix6-len */ 1, 0xff])?;
        assert_eq!(options, 9);
        assert_eq!(rule.ipv6_prefix.0[0], 0x80);
        assert_eq!(rule.ipv6_prefix.0[1..], [0; 15]);

        let (rule, options) = Rule::new(&[0, 0, 0, 0, 0, 0, 0, /* prefix6-len */ 0])?;
        assert_eq!(options, 8);
        assert_eq!(rule.ipv6_prefix, Addr::default());
        Ok(())
    }

    #[test]
    fn rule_bad_lengths() {
        assert_eq!(
            Rule::new(&[0, 0, 33, 0, 0, 0, 0, 0]).err(),
            Some(Error::InvalidPrefixLength { code: 89, value: 33 })
        );
        assert_eq!(
            Rule::new(&[0, 0, 0, 0, 0, 0, 0, 129]).err(),
            Some(Error::InvalidPrefixLength { code: 89, value: 129 })
        );
        assert_eq!(
            Rule::new(&EX_RULE[..11]).err(),
            Some(Error::DecoderPayloadTooShort {
                code: 89,
                required: 13,
                actual: 11,
            })
        );
        assert_eq!(
            Rule::new(&EX_RULE[..7]).err(),
            Some(Error::DecoderPayloadTooShort {
                code: 89,
                required: 8,
                actual: 7,
            })
        );
    }

    #[test]
    fn rule_flags_ignore_reserved_bits() -> Result<(), Error> {
        let (rule, _) = Rule::new(&[0x81, 0, 0, 0, 0, 0, 0, 0])?;
        assert_eq!(rule.flags, RuleFlags::FMR);
        Ok(())
    }

    #[test]
    fn rule_options_follow_the_rule() -> Result<(), Error> {
        let msg = [
            /* msg-type */ 7, 0, 0, 1,
            /* S46_CONT_MAPT */ 0, 95, /* len */ 0, 24,
            /* S46_RULE */ 0, 89, /* len */ 0, 20,
            /* flags */ 1, /* ea-len */ 14, /* prefix4-len */ 24,
            /* ipv4-prefix */ 198, 51, 100, 0,
            /* prefix6-len */ 32, /* ipv6-prefix */ 0x20, 0x01, 0x0d, 0xb8,
            /* S46_PORTPARAMS */ 0, 93, /* len */ 0, 4,
            /* offset */ 0, /* psid-len */ 6, /* psid */ 0, 0,
        ];
        let reply = parse_reply(&msg)?;
        let mut options = reply.scan();
        assert_eq!(options.next(), Some(Ok(DhcpOption::MapContainer(Container::MapT))));
        match options.next() {
            Some(Ok(DhcpOption::MapRule(rule))) => {
                assert_eq!(rule.flags, RuleFlags::FMR);
                assert_eq!(rule.ipv4_prefix_addr(), Ipv4Addr::new(198, 51, 100, 0));
                assert_eq!(rule.ipv6_prefix_len, 32);
            }
            x => panic!("unexpected {:?}", x),
        }
        assert_eq!(
            options.next(),
            Some(Ok(DhcpOption::MapPortParams(PortParams {
                offset: 0,
                psid_len: 6,
                psid: 0,
            })))
        );
        assert_eq!(options.next(), None);
        assert_eq!(options.consumed(), reply.len());
        Ok(())
    }

    #[test]
    fn dmr() -> Result<(), Error> {
        let dmr = Dmr::new(&[/* prefix6-len */ 64, 0x20, 0x01, 0x0d, 0xb8, 0, 1, 0xff, 0xff])?;
        assert_eq!(dmr.prefix_len, 64);
        assert_eq!(
            dmr.prefix,
            Ipv6Addr::new(0x2001, 0xdb8, 1, 0xffff, 0, 0, 0, 0).into()
        );

        let dmr = Dmr::new(&[/* prefix6-len */ 12, 0x20, 0x1f])?;
        assert_eq!(dmr.prefix.prefix_bytes(12), [0x20, 0x10]);

        assert_eq!(
            Dmr::new(&[]).err(),
            Some(Error::DecoderPayloadTooShort {
                code: 91,
                required: 1,
                actual: 0,
            })
        );
        assert_eq!(
            Dmr::new(&[200]).err(),
            Some(Error::InvalidPrefixLength { code: 91, value: 200 })
        );
        Ok(())
    }

    #[test]
    fn prefix_reencodes_to_same_rule() -> Result<(), Error> {
        let (rule, _) = Rule::new(&EX_RULE)?;
        let mut b = EX_RULE[..8].to_vec();
        b.extend_from_slice(rule.ipv6_prefix.prefix_bytes(rule.ipv6_prefix_len));
        let (again, _) = Rule::new(&b)?;
        assert_eq!(again.ipv6_prefix_len, rule.ipv6_prefix_len);
        assert_eq!(again.ipv6_prefix, rule.ipv6_prefix);
        Ok(())
    }

    #[test]
    fn port_params() -> Result<(), Error> {
        let params = PortParams::new(&[6, 8, 0x34, 0x00])?;
        assert_eq!(params.psid, 0x3400);
        assert_eq!(params.psid_value(), Some(0x34));

        let params = PortParams::new(&[0, 0, 0, 0])?;
        assert_eq!(params.psid_value(), Some(0));

        let params = PortParams::new(&[0, 17, 0xff, 0xff])?;
        assert_eq!(params.psid_value(), None);

        assert_eq!(
            PortParams::new(&[6, 8, 0x34]).err(),
            Some(Error::DecoderPayloadTooShort {
                code: 93,
                required: 4,
                actual: 3,
            })
        );
        Ok(())
    }
}
