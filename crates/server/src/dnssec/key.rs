// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Stored DNSSEC key material and the ring signing keys built from it

use std::fmt;

use data_encoding::BASE64;
use ring::{
    rand::SystemRandom,
    signature::{
        EcdsaKeyPair, Ed25519KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
        ECDSA_P384_SHA384_FIXED_SIGNING,
    },
};

use crate::error::{DnssecErrorKind, DnssecResult};
use crate::proto::rr::{DNSClass, Name};

/// DNSKEY protocol field, always 3 (RFC 4034 §2.1.2)
pub const DNSKEY_PROTOCOL: u8 = 3;

/// The signing algorithms keys may use
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// ECDSA P-256 with SHA-256, RFC 6605
    ECDSAP256SHA256,
    /// ECDSA P-384 with SHA-384, RFC 6605
    ECDSAP384SHA384,
    /// Ed25519, RFC 8080
    ED25519,
}

impl Algorithm {
    /// Returns the algorithm with the given number
    pub fn from_u8(value: u8) -> DnssecResult<Self> {
        match value {
            13 => Ok(Self::ECDSAP256SHA256),
            14 => Ok(Self::ECDSAP384SHA384),
            15 => Ok(Self::ED25519),
            _ => Err(DnssecErrorKind::UnsupportedAlgorithm(value).into()),
        }
    }

    /// The IANA algorithm number
    pub fn as_u8(self) -> u8 {
        match self {
            Self::ECDSAP256SHA256 => 13,
            Self::ECDSAP384SHA384 => 14,
            Self::ED25519 => 15,
        }
    }

    /// Length in bytes of the public key in DNSKEY wire format
    fn public_key_len(self) -> usize {
        match self {
            Self::ECDSAP256SHA256 => 64,
            Self::ECDSAP384SHA384 => 96,
            Self::ED25519 => 32,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ECDSAP256SHA256 => "ECDSAP256SHA256",
            Self::ECDSAP384SHA384 => "ECDSAP384SHA384",
            Self::ED25519 => "ED25519",
        })
    }
}

/// A DNSKEY record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dnskey {
    owner: Name,
    ttl: u32,
    flags: u16,
    algorithm: Algorithm,
    public_key: Vec<u8>,
}

impl Dnskey {
    /// Creates a DNSKEY record
    pub fn new(
        owner: Name,
        ttl: u32,
        flags: u16,
        algorithm: Algorithm,
        public_key: Vec<u8>,
    ) -> Self {
        Self {
            owner,
            ttl,
            flags,
            algorithm,
            public_key,
        }
    }

    /// Parses a DNSKEY record in presentation format.
    ///
    /// ```text
    /// example.com. 3600 IN DNSKEY 257 3 15 base64...
    /// ```
    ///
    /// TTL and class are optional and may appear in either order. The key may be split over
    /// several whitespace separated chunks, and parentheses are ignored. A missing TTL is 0.
    pub fn parse(key: &str, text: &str) -> DnssecResult<Self> {
        let malformed = |reason: &str| DnssecErrorKind::Malformed {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let text = text
            .lines()
            .map(|line| line.split(';').next().unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" ");
        let mut tokens = text
            .split_whitespace()
            .filter(|token| *token != "(" && *token != ")");

        let owner = tokens.next().ok_or_else(|| malformed("empty record"))?;
        let owner = Name::from_ascii(owner)?;

        let mut ttl = 0;
        loop {
            let token = tokens
                .next()
                .ok_or_else(|| malformed("missing record type"))?;
            if token.eq_ignore_ascii_case("DNSKEY") {
                break;
            } else if let Ok(value) = token.parse::<u32>() {
                ttl = value;
            } else if token.parse::<DNSClass>().is_err() {
                return Err(malformed(&format!("unexpected token {token}")).into());
            }
        }

        let flags = tokens
            .next()
            .and_then(|t| t.parse::<u16>().ok())
            .ok_or_else(|| malformed("invalid flags"))?;
        let protocol = tokens
            .next()
            .and_then(|t| t.parse::<u8>().ok())
            .ok_or_else(|| malformed("invalid protocol"))?;
        if protocol != DNSKEY_PROTOCOL {
            return Err(malformed(&format!("protocol must be 3, found {protocol}")).into());
        }
        let algorithm = tokens
            .next()
            .and_then(|t| t.parse::<u8>().ok())
            .ok_or_else(|| malformed("invalid algorithm"))?;
        let algorithm = Algorithm::from_u8(algorithm)?;

        let encoded = tokens.collect::<String>();
        if encoded.is_empty() {
            return Err(malformed("missing public key").into());
        }
        let public_key = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| malformed(&format!("invalid base64 public key: {e}")))?;
        if public_key.len() != algorithm.public_key_len() {
            return Err(malformed(&format!(
                "{algorithm} public key must be {} bytes, found {}",
                algorithm.public_key_len(),
                public_key.len()
            ))
            .into());
        }

        Ok(Self::new(owner, ttl, flags, algorithm, public_key))
    }

    /// The owner name
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// Time to live of the record
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// The flags field, 256 for a zone signing key and 257 for a key signing key
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// The algorithm of the key
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The public key in DNSKEY wire format
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub(crate) fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    pub(crate) fn set_flags(&mut self, flags: u16) {
        self.flags = flags;
    }

    /// The RDATA of this record in wire format
    pub fn rdata(&self) -> Vec<u8> {
        let mut rdata = Vec::with_capacity(4 + self.public_key.len());
        rdata.extend_from_slice(&self.flags.to_be_bytes());
        rdata.push(DNSKEY_PROTOCOL);
        rdata.push(self.algorithm.as_u8());
        rdata.extend_from_slice(&self.public_key);
        rdata
    }

    /// The key tag, [RFC 4034 Appendix B](https://tools.ietf.org/html/rfc4034#appendix-B)
    pub fn key_tag(&self) -> u16 {
        let mut ac: u32 = 0;
        for (i, b) in self.rdata().iter().enumerate() {
            if i & 1 == 0 {
                ac += u32::from(*b) << 8;
            } else {
                ac += u32::from(*b);
            }
        }
        ac += (ac >> 16) & 0xFFFF;
        (ac & 0xFFFF) as u16
    }
}

impl fmt::Display for Dnskey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN DNSKEY {} {DNSKEY_PROTOCOL} {} {}",
            self.owner,
            self.ttl,
            self.flags,
            self.algorithm.as_u8(),
            BASE64.encode(&self.public_key)
        )
    }
}

/// The private half of a key, as stored in BIND's `Private-key-format: v1.x`
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    algorithm: u8,
    key: Vec<u8>,
}

impl PrivateKey {
    /// Parses a BIND private key document:
    ///
    /// ```text
    /// Private-key-format: v1.3
    /// Algorithm: 15 (ED25519)
    /// PrivateKey: base64...
    /// ```
    pub fn parse(key: &str, text: &str) -> DnssecResult<Self> {
        let malformed = |reason: &str| DnssecErrorKind::Malformed {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let mut format = None;
        let mut algorithm = None;
        let mut private_key = None;
        for line in text.lines() {
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match field.trim() {
                "Private-key-format" => format = Some(value),
                "Algorithm" => {
                    let number = value.split_whitespace().next().unwrap_or_default();
                    algorithm = Some(
                        number
                            .parse::<u8>()
                            .map_err(|_| malformed(&format!("invalid algorithm {value}")))?,
                    );
                }
                "PrivateKey" => {
                    let encoded = value.split_whitespace().collect::<String>();
                    private_key = Some(
                        BASE64
                            .decode(encoded.as_bytes())
                            .map_err(|e| malformed(&format!("invalid base64 private key: {e}")))?,
                    );
                }
                _ => {}
            }
        }

        match format {
            Some(format) if format.starts_with("v1.") => {}
            Some(format) => {
                return Err(malformed(&format!("unsupported private key format {format}")).into())
            }
            None => return Err(malformed("missing Private-key-format").into()),
        }

        Ok(Self {
            algorithm: algorithm.ok_or_else(|| malformed("missing Algorithm"))?,
            key: private_key.ok_or_else(|| malformed("missing PrivateKey"))?,
        })
    }

    /// The algorithm number stated in the document
    pub fn algorithm(&self) -> u8 {
        self.algorithm
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A key pair that can produce DNSSEC signatures
pub enum SigningKey {
    /// ECDSA P-256 or P-384
    Ecdsa {
        /// which curve
        algorithm: Algorithm,
        /// the ring key pair
        inner: EcdsaKeyPair,
    },
    /// Ed25519
    Ed25519(Ed25519KeyPair),
}

impl SigningKey {
    /// Builds a signing key from both halves of a stored key.
    ///
    /// The private key must match the public key in the DNSKEY record.
    pub fn from_parts(public: &Dnskey, private: &PrivateKey) -> DnssecResult<Self> {
        let algorithm = public.algorithm();
        if algorithm.as_u8() != private.algorithm() {
            return Err(DnssecErrorKind::AlgorithmMismatch {
                public: algorithm.as_u8(),
                private: private.algorithm(),
            }
            .into());
        }

        let rejected = |e: ring::error::KeyRejected| DnssecErrorKind::KeyRejected(e.to_string());
        match algorithm {
            Algorithm::ECDSAP256SHA256 | Algorithm::ECDSAP384SHA384 => {
                let signing = if algorithm == Algorithm::ECDSAP256SHA256 {
                    &ECDSA_P256_SHA256_FIXED_SIGNING
                } else {
                    &ECDSA_P384_SHA384_FIXED_SIGNING
                };

                // ring expects the uncompressed SEC1 point, DNSKEY omits the 0x04 tag
                let mut point = Vec::with_capacity(public.public_key().len() + 1);
                point.push(0x04);
                point.extend_from_slice(public.public_key());

                let rng = SystemRandom::new();
                let inner = EcdsaKeyPair::from_private_key_and_public_key(
                    signing,
                    &private.key,
                    &point,
                    &rng,
                )
                .map_err(rejected)?;
                Ok(Self::Ecdsa { algorithm, inner })
            }
            Algorithm::ED25519 => {
                let inner =
                    Ed25519KeyPair::from_seed_and_public_key(&private.key, public.public_key())
                        .map_err(rejected)?;
                Ok(Self::Ed25519(inner))
            }
        }
    }

    /// The algorithm of this key
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ecdsa { algorithm, .. } => *algorithm,
            Self::Ed25519(_) => Algorithm::ED25519,
        }
    }

    /// Signs `message`, returning the signature in DNSSEC wire format
    pub fn sign(&self, message: &[u8]) -> DnssecResult<Vec<u8>> {
        match self {
            Self::Ecdsa { inner, .. } => {
                let rng = SystemRandom::new();
                let signature = inner
                    .sign(&rng, message)
                    .map_err(|e| DnssecErrorKind::Signing(e.to_string()))?;
                Ok(signature.as_ref().to_vec())
            }
            Self::Ed25519(inner) => Ok(inner.sign(message).as_ref().to_vec()),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ring::signature::KeyPair;

    use super::*;

    pub(crate) const SEED: [u8; 32] = [7; 32];

    pub(crate) fn ed25519_pair(
        owner: &str,
        ttl: u32,
        flags: u16,
        seed: [u8; 32],
    ) -> (String, String) {
        let pair = Ed25519KeyPair::from_seed_unchecked(&seed).unwrap();
        let public = format!(
            "{owner} {ttl} IN DNSKEY {flags} 3 15 {}",
            BASE64.encode(pair.public_key().as_ref())
        );
        let private = format!(
            "Private-key-format: v1.3\nAlgorithm: 15 (ED25519)\nPrivateKey: {}\n",
            BASE64.encode(&seed)
        );
        (public, private)
    }

    #[test]
    fn test_parse_dnskey() {
        let (public, _) = ed25519_pair("example.com.", 3600, 257, SEED);
        let key = Dnskey::parse("k", &public).unwrap();
        assert_eq!(key.owner(), &Name::from_ascii("example.com.").unwrap());
        assert_eq!(key.ttl(), 3600);
        assert_eq!(key.flags(), 257);
        assert_eq!(key.algorithm(), Algorithm::ED25519);
        assert_eq!(key.public_key().len(), 32);
        assert_eq!(Dnskey::parse("k", &key.to_string()).unwrap(), key);
    }

    #[test]
    fn test_parse_dnskey_class_before_ttl_and_split_key() {
        let pair = Ed25519KeyPair::from_seed_unchecked(&SEED).unwrap();
        let encoded = BASE64.encode(pair.public_key().as_ref());
        let (head, tail) = encoded.split_at(20);
        let text = format!("example.com. IN 300 DNSKEY 256 3 15 ( {head}\n {tail} ) ; zsk");
        let key = Dnskey::parse("k", &text).unwrap();
        assert_eq!(key.ttl(), 300);
        assert_eq!(key.public_key(), pair.public_key().as_ref());
    }

    #[test]
    fn test_parse_dnskey_rejects_garbage() {
        assert!(Dnskey::parse("k", "").is_err());
        assert!(Dnskey::parse("k", "example.com. 300 IN A 1.2.3.4").is_err());
        assert!(Dnskey::parse("k", "example.com. DNSKEY 257 3 8 AwEAAa==").is_err());
        assert!(Dnskey::parse("k", "example.com. DNSKEY 257 3 15 !!!").is_err());
        assert!(Dnskey::parse("k", "example.com. DNSKEY 257 3 15 AAAA").is_err());
    }

    #[test]
    fn test_key_tag() {
        // RFC 8080 section 6.1 test vector
        let key = Dnskey::parse(
            "k",
            "example.com. 3600 IN DNSKEY 257 3 15 l02Woi0iS8Aa25FQkUd9RMzZHJpBoRQwAQEX1SxZJA4=",
        )
        .unwrap();
        assert_eq!(key.key_tag(), 3613);
    }

    #[test]
    fn test_parse_private_key() {
        let (_, private) = ed25519_pair("example.com.", 3600, 257, SEED);
        let key = PrivateKey::parse("k", &private).unwrap();
        assert_eq!(key.algorithm(), 15);
        assert_eq!(key.key, SEED.to_vec());

        assert!(PrivateKey::parse("k", "Algorithm: 15\nPrivateKey: AAAA").is_err());
        assert!(PrivateKey::parse("k", "Private-key-format: v1.3\nAlgorithm: 15\n").is_err());
        let unknown_format = "Private-key-format: v2.0\nAlgorithm: 15\nPrivateKey: AAAA";
        assert!(PrivateKey::parse("k", unknown_format).is_err());
    }

    #[test]
    fn test_signing_key_from_parts() {
        let (public, private) = ed25519_pair("example.com.", 3600, 257, SEED);
        let public = Dnskey::parse("k", &public).unwrap();
        let parsed = PrivateKey::parse("k", &private).unwrap();
        let key = SigningKey::from_parts(&public, &parsed).unwrap();
        assert_eq!(key.algorithm(), Algorithm::ED25519);
        assert_eq!(key.sign(b"data").unwrap().len(), 64);

        let (_, other) = ed25519_pair("example.com.", 3600, 257, [9; 32]);
        let other = PrivateKey::parse("k", &other).unwrap();
        let error = SigningKey::from_parts(&public, &other).unwrap_err();
        assert!(matches!(error.kind(), DnssecErrorKind::KeyRejected(_)));

        let mismatched = private.replace("Algorithm: 15 (ED25519)", "Algorithm: 13");
        let mismatched = PrivateKey::parse("k", &mismatched).unwrap();
        let error = SigningKey::from_parts(&public, &mismatched).unwrap_err();
        assert!(matches!(
            error.kind(),
            DnssecErrorKind::AlgorithmMismatch { public: 15, private: 13 }
        ));
    }

    #[test]
    fn test_ecdsa_rejects_mismatched_scalar() {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
        let pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .unwrap();
        let public = Dnskey::new(
            Name::from_ascii("example.com.").unwrap(),
            300,
            256,
            Algorithm::ECDSAP256SHA256,
            pair.public_key().as_ref()[1..].to_vec(),
        );
        let private = PrivateKey::parse(
            "k",
            &format!(
                "Private-key-format: v1.3\nAlgorithm: 13 (ECDSAP256SHA256)\nPrivateKey: {}\n",
                BASE64.encode(&[1; 32])
            ),
        )
        .unwrap();
        assert!(SigningKey::from_parts(&public, &private).is_err());
    }
}
