//! CIDR parsing and containment

use std::fmt;
use std::net::IpAddr;

/// An address block, normalized to its network address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Parse `address/prefix`. The reason string describes what is wrong.
    pub fn parse(value: &str) -> Result<Self, String> {
        let (addr, prefix) = value
            .split_once('/')
            .ok_or_else(|| "missing prefix length".to_string())?;
        let addr: IpAddr = addr
            .trim()
            .parse()
            .map_err(|_| format!("invalid address '{}'", addr))?;
        let prefix: u8 = prefix
            .trim()
            .parse()
            .map_err(|_| format!("invalid prefix length '{}'", prefix))?;
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return Err(format!("prefix length {} exceeds {}", prefix, max));
        }
        Ok(Self {
            network: mask(addr, prefix),
            prefix,
        })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask(addr, self.prefix) == self.network
            }
            _ => false,
        }
    }

    /// True when `other` lies entirely within this block
    pub fn covers(&self, other: &Cidr) -> bool {
        self.prefix <= other.prefix && self.contains(other.network)
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.covers(other) || other.covers(self)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn mask(addr: IpAddr, prefix: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let m = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
            IpAddr::V4((bits & m).into())
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let m = if prefix == 0 { 0 } else { u128::MAX << (128 - u32::from(prefix)) };
            IpAddr::V6((bits & m).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v4_normalizes_network() {
        let cidr = Cidr::parse("10.100.10.7/16").unwrap();
        assert_eq!(cidr.to_string(), "10.100.0.0/16");
        assert_eq!(cidr.prefix(), 16);
    }

    #[test]
    fn test_parse_v6() {
        let cidr = Cidr::parse("fd00:10::/64").unwrap();
        assert!(cidr.contains("fd00:10::1".parse().unwrap()));
        assert!(!cidr.contains("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Cidr::parse("10.0.0.0").is_err());
        assert!(Cidr::parse("10.0.0/8").is_err());
        assert!(Cidr::parse("10.0.0.0/33").is_err());
        assert!(Cidr::parse("::/129").is_err());
        assert!(Cidr::parse("abc/8").is_err());
        assert!(Cidr::parse("10.0.0.0/x").is_err());
    }

    #[test]
    fn test_zero_prefix_covers_family() {
        let all = Cidr::parse("0.0.0.0/0").unwrap();
        assert!(all.covers(&Cidr::parse("192.168.1.0/24").unwrap()));
        assert!(!all.covers(&Cidr::parse("::1/128").unwrap()));
    }

    #[test]
    fn test_overlap_directions() {
        let wide = Cidr::parse("10.100.0.0/16").unwrap();
        let narrow = Cidr::parse("10.100.10.0/24").unwrap();
        let other = Cidr::parse("10.200.0.0/16").unwrap();
        assert!(wide.covers(&narrow));
        assert!(!narrow.covers(&wide));
        assert!(narrow.overlaps(&wide));
        assert!(!wide.overlaps(&other));
    }
}
