// Copyright 2015-2018 Benjamin Fry <benjaminfry -@- me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::fmt;

/// Label under which the zone apex is stored in the zone hash
pub const APEX_LABEL: &str = "@";

/// The layout of zone data in the store
///
/// Every key is wrapped in a configurable prefix and suffix so several deployments can share one
/// store:
///
/// * `{prefix}zones{suffix}` - set of all zone names
/// * `{prefix}{zone}{suffix}` - hash of location label to record set
/// * `{prefix}{zone}:config{suffix}` - zone configuration
/// * `{prefix}{zone}:{zsk|ksk}:{pub|priv}{suffix}` - DNSSEC key material
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
    suffix: String,
}

impl StoreKeys {
    /// Creates a key layout with the given prefix and suffix
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Key of the set of all zone names
    pub fn zone_set(&self) -> String {
        format!("{}zones{}", self.prefix, self.suffix)
    }

    /// Key of the hash holding the locations of `zone`
    pub fn zone(&self, zone: &str) -> String {
        format!("{}{zone}{}", self.prefix, self.suffix)
    }

    /// Key of the configuration of `zone`
    pub fn zone_config(&self, zone: &str) -> String {
        format!("{}{zone}:config{}", self.prefix, self.suffix)
    }

    /// Key of one half of a DNSSEC key of `zone`
    pub fn zone_key(&self, zone: &str, role: KeyRole, half: KeyHalf) -> String {
        format!("{}{zone}:{role}:{half}{}", self.prefix, self.suffix)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new("kvdns:", "")
    }
}

/// The role of a DNSSEC key in a zone
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyRole {
    /// zone signing key
    Zsk,
    /// key signing key
    Ksk,
}

impl KeyRole {
    /// DNSKEY flags for keys in this role
    pub fn flags(self) -> u16 {
        match self {
            Self::Zsk => 256,
            Self::Ksk => 257,
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Zsk => "zsk",
            Self::Ksk => "ksk",
        })
    }
}

/// Which half of a key pair a stored value holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyHalf {
    /// DNSKEY presentation record
    Public,
    /// BIND private key document
    Private,
}

impl fmt::Display for KeyHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Public => "pub",
            Self::Private => "priv",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let keys = StoreKeys::new("kvdns:", ":v1");
        assert_eq!(keys.zone_set(), "kvdns:zones:v1");
        assert_eq!(keys.zone("example.com."), "kvdns:example.com.:v1");
        assert_eq!(keys.zone_config("example.com."), "kvdns:example.com.:config:v1");
        assert_eq!(
            keys.zone_key("example.com.", KeyRole::Ksk, KeyHalf::Private),
            "kvdns:example.com.:ksk:priv:v1"
        );
    }
}
