// Copyright 2015-2023 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! DNSSEC key materialization and signing
//!
//! Each zone with DNSSEC enabled has a zone signing key (ZSK) and a key signing key (KSK) in the
//! store. Loading a zone turns them into [`ZoneKey`]s and signs the zone's DNSKEY set with the
//! KSK.

mod key;
mod rrsig;

use tracing::debug;

pub use self::key::{Algorithm, Dnskey, PrivateKey, SigningKey};
pub use self::rrsig::Rrsig;
use crate::error::{DnssecErrorKind, DnssecResult};
use crate::proto::rr::{Name, RecordType};
use crate::store::{BackingStore, KeyHalf, KeyRole, StoreKeys};

/// Signatures are valid from this many seconds before the zone was loaded
pub const INCEPTION_OFFSET: u64 = 3 * 60 * 60;

/// Signatures are valid until this many seconds after the zone was loaded
pub const EXPIRATION_OFFSET: u64 = 8 * 24 * 60 * 60;

/// A key of a zone together with the validity window of the signatures it makes
#[derive(Debug)]
pub struct ZoneKey {
    dnskey: Dnskey,
    signer: SigningKey,
    inception: u64,
    expiration: u64,
}

impl ZoneKey {
    /// Combines a DNSKEY record with its signing key.
    ///
    /// Signatures will be valid from `now` - 3 hours until `now` + 8 days.
    pub fn new(dnskey: Dnskey, signer: SigningKey, now: u64) -> Self {
        Self {
            dnskey,
            signer,
            inception: now.saturating_sub(INCEPTION_OFFSET),
            expiration: now.saturating_add(EXPIRATION_OFFSET),
        }
    }

    /// The public key record
    pub fn dnskey(&self) -> &Dnskey {
        &self.dnskey
    }

    /// Start of the validity window, epoch seconds
    pub fn inception(&self) -> u64 {
        self.inception
    }

    /// End of the validity window, epoch seconds
    pub fn expiration(&self) -> u64 {
        self.expiration
    }

    /// Signs the record set of type `record_type` at `owner`, see [`Rrsig::sign`]
    pub fn sign_rrset(
        &self,
        owner: &Name,
        record_type: RecordType,
        ttl: u32,
        rdatas: &[Vec<u8>],
    ) -> DnssecResult<Rrsig> {
        Rrsig::sign(
            &self.signer,
            self.dnskey.key_tag(),
            self.dnskey.owner(),
            owner,
            record_type,
            ttl,
            rdatas,
            self.inception,
            self.expiration,
        )
    }
}

/// The DNSKEY set of a zone with its signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedKeySet {
    /// the zone signing and key signing key records
    pub keys: Vec<Dnskey>,
    /// signature over `keys` made with the key signing key
    pub rrsig: Rrsig,
}

/// Everything a zone needs to answer with signatures
#[derive(Debug)]
pub struct ZoneSigning {
    /// zone signing key
    pub zsk: ZoneKey,
    /// key signing key
    pub ksk: ZoneKey,
    /// the signed DNSKEY set
    pub key_set: SignedKeySet,
}

/// Loads both keys of `zone` and signs its DNSKEY set.
///
/// The flags of the stored DNSKEY records are replaced by 256 for the ZSK and 257 for the KSK,
/// and the ZSK takes the TTL of the KSK.
pub async fn materialize(
    store: &dyn BackingStore,
    keys: &StoreKeys,
    zone: &str,
    now: u64,
) -> DnssecResult<ZoneSigning> {
    let zone_name = Name::from_ascii(zone)?.to_lowercase();

    let (mut zsk_public, zsk_private) = load_pair(store, keys, zone, KeyRole::Zsk).await?;
    let (mut ksk_public, ksk_private) = load_pair(store, keys, zone, KeyRole::Ksk).await?;

    // Name equality ignores case
    for public in [&zsk_public, &ksk_public] {
        if public.owner() != &zone_name {
            return Err(DnssecErrorKind::Malformed {
                key: zone.to_string(),
                reason: format!("key owner {} is not the zone apex", public.owner()),
            }
            .into());
        }
    }

    zsk_public.set_flags(KeyRole::Zsk.flags());
    ksk_public.set_flags(KeyRole::Ksk.flags());
    zsk_public.set_ttl(ksk_public.ttl());

    let zsk_signer = SigningKey::from_parts(&zsk_public, &zsk_private)?;
    let ksk_signer = SigningKey::from_parts(&ksk_public, &ksk_private)?;
    let zsk = ZoneKey::new(zsk_public.clone(), zsk_signer, now);
    let ksk = ZoneKey::new(ksk_public.clone(), ksk_signer, now);

    let key_set = vec![zsk_public, ksk_public];
    let rdatas = key_set.iter().map(Dnskey::rdata).collect::<Vec<_>>();
    let rrsig = ksk.sign_rrset(&zone_name, RecordType::DNSKEY, ksk.dnskey().ttl(), &rdatas)?;
    debug!(
        "signed DNSKEY set of {zone} with KSK {} (ZSK {})",
        ksk.dnskey().key_tag(),
        zsk.dnskey().key_tag()
    );

    Ok(ZoneSigning {
        zsk,
        ksk,
        key_set: SignedKeySet {
            keys: key_set,
            rrsig,
        },
    })
}

async fn load_pair(
    store: &dyn BackingStore,
    keys: &StoreKeys,
    zone: &str,
    role: KeyRole,
) -> DnssecResult<(Dnskey, PrivateKey)> {
    let public_key = keys.zone_key(zone, role, KeyHalf::Public);
    let private_key = keys.zone_key(zone, role, KeyHalf::Private);

    let public = store
        .get(&public_key)
        .await?
        .ok_or_else(|| DnssecErrorKind::MissingKey(public_key.clone()))?;
    let private = store
        .get(&private_key)
        .await?
        .ok_or_else(|| DnssecErrorKind::MissingKey(private_key.clone()))?;

    Ok((
        Dnskey::parse(&public_key, &public)?,
        PrivateKey::parse(&private_key, &private)?,
    ))
}
