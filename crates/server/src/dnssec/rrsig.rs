// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! RRSIG records and the canonical data they sign

use std::fmt;

use data_encoding::BASE64;

use super::key::{Algorithm, SigningKey};
use crate::error::DnssecResult;
use crate::proto::error::ProtoError;
use crate::proto::rr::{DNSClass, Name, RecordType};
use crate::proto::serialize::binary::BinEncoder;

/// An RRSIG record covering one record set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rrsig {
    owner: Name,
    type_covered: RecordType,
    algorithm: Algorithm,
    labels: u8,
    original_ttl: u32,
    expiration: u32,
    inception: u32,
    key_tag: u16,
    signer_name: Name,
    signature: Vec<u8>,
}

impl Rrsig {
    /// Signs the record set of type `type_covered` at `owner`.
    ///
    /// `rdatas` are the wire format RDATA of the records in the set, with any embedded names
    /// already in canonical form. Validity times are epoch seconds.
    #[allow(clippy::too_many_arguments)]
    pub fn sign(
        key: &SigningKey,
        key_tag: u16,
        signer_name: &Name,
        owner: &Name,
        type_covered: RecordType,
        ttl: u32,
        rdatas: &[Vec<u8>],
        inception: u64,
        expiration: u64,
    ) -> DnssecResult<Self> {
        let mut rrsig = Self {
            owner: owner.to_lowercase(),
            type_covered,
            algorithm: key.algorithm(),
            labels: owner.num_labels(),
            original_ttl: ttl,
            expiration: serial(expiration),
            inception: serial(inception),
            key_tag,
            signer_name: signer_name.to_lowercase(),
            signature: Vec::new(),
        };

        let data = rrsig.signed_data(rdatas)?;
        rrsig.signature = key.sign(&data)?;
        Ok(rrsig)
    }

    /// The data covered by the signature, see
    /// [RFC 4034 §3.1.8.1](https://tools.ietf.org/html/rfc4034#section-3.1.8.1)
    ///
    /// ```text
    /// signature = sign(RRSIG_RDATA | RR(1) | RR(2)... )
    /// ```
    ///
    /// where RRSIG_RDATA excludes the signature and the RRs are in canonical order.
    pub fn signed_data(&self, rdatas: &[Vec<u8>]) -> DnssecResult<Vec<u8>> {
        let mut rdatas = rdatas.iter().collect::<Vec<_>>();
        rdatas.sort();
        rdatas.dedup();

        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        self.emit_unsigned_rdata(&mut encoder)?;

        for rdata in rdatas {
            self.owner.emit_as_canonical(&mut encoder, true)?;
            encoder.emit_u16(self.type_covered.into())?;
            encoder.emit_u16(DNSClass::IN.into())?;
            encoder.emit_u32(self.original_ttl)?;
            let len = u16::try_from(rdata.len())
                .map_err(|_| ProtoError::from("RDATA length exceeds u16::MAX"))?;
            encoder.emit_u16(len)?;
            encoder.emit_vec(rdata)?;
        }

        Ok(buf)
    }

    fn emit_unsigned_rdata(&self, encoder: &mut BinEncoder<'_>) -> DnssecResult<()> {
        encoder.emit_u16(self.type_covered.into())?;
        encoder.emit(self.algorithm.as_u8())?;
        encoder.emit(self.labels)?;
        encoder.emit_u32(self.original_ttl)?;
        encoder.emit_u32(self.expiration)?;
        encoder.emit_u32(self.inception)?;
        encoder.emit_u16(self.key_tag)?;
        self.signer_name.emit_as_canonical(encoder, true)?;
        Ok(())
    }

    /// The RDATA of this record in wire format
    pub fn rdata(&self) -> DnssecResult<Vec<u8>> {
        let mut buf = Vec::new();
        let mut encoder = BinEncoder::new(&mut buf);
        self.emit_unsigned_rdata(&mut encoder)?;
        encoder.emit_vec(&self.signature)?;
        Ok(buf)
    }

    /// The owner name of the covered record set
    pub fn owner(&self) -> &Name {
        &self.owner
    }

    /// The record type covered
    pub fn type_covered(&self) -> RecordType {
        self.type_covered
    }

    /// The algorithm of the signing key
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Number of labels in the owner name
    pub fn labels(&self) -> u8 {
        self.labels
    }

    /// TTL of the covered records
    pub fn original_ttl(&self) -> u32 {
        self.original_ttl
    }

    /// Signature expiration in serial number arithmetic
    pub fn expiration(&self) -> u32 {
        self.expiration
    }

    /// Signature inception in serial number arithmetic
    pub fn inception(&self) -> u32 {
        self.inception
    }

    /// Key tag of the signing key
    pub fn key_tag(&self) -> u16 {
        self.key_tag
    }

    /// The zone the signing key belongs to
    pub fn signer_name(&self) -> &Name {
        &self.signer_name
    }

    /// The signature
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl fmt::Display for Rrsig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN RRSIG {} {} {} {} {} {} {} {} {}",
            self.owner,
            self.original_ttl,
            self.type_covered,
            self.algorithm.as_u8(),
            self.labels,
            self.original_ttl,
            self.expiration,
            self.inception,
            self.key_tag,
            self.signer_name,
            BASE64.encode(&self.signature)
        )
    }
}

/// Signature times are 32 bit serial numbers, RFC 4034 §3.1.5
fn serial(time: u64) -> u32 {
    (time & u64::from(u32::MAX)) as u32
}
