// Copyright 2015-2021 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// https://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// https://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::BTreeMap;

use tracing::warn;

use crate::proto::rr::Name;

/// An immutable index from domain names to the zones that contain them.
///
/// Names are keyed by their lower-cased labels in reverse order, so the zone `example.com.` is
/// stored as `[com, example]` and finding the zone of a name becomes a longest prefix match over
/// whole labels. Labels are kept as raw bytes, so a label containing an escaped `.` never
/// collides with two separate labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZoneIndex {
    zones: BTreeMap<Vec<Vec<u8>>, String>,
}

impl ZoneIndex {
    /// Builds an index of `zones`, skipping names that do not parse
    pub fn new<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = BTreeMap::new();
        for zone in zones {
            let zone = zone.into();
            match Name::from_ascii(&zone) {
                Ok(name) => {
                    index.insert(reversed_labels(&name), zone);
                }
                Err(error) => warn!("skipping invalid zone name {zone:?}: {error}"),
            }
        }

        Self { zones: index }
    }

    /// Returns the most specific zone containing `qname`, matching case-insensitively.
    ///
    /// The zone is returned as it was given to [`ZoneIndex::new`].
    pub fn find(&self, qname: &str) -> Option<&str> {
        let name = Name::from_ascii(qname).ok()?;
        self.find_name(&name)
    }

    /// Returns the most specific zone containing `name`
    pub fn find_name(&self, name: &Name) -> Option<&str> {
        let labels = reversed_labels(name);
        (0..=labels.len())
            .rev()
            .find_map(|len| self.zones.get(&labels[..len]))
            .map(String::as_str)
    }

    /// Number of zones in the index
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Returns true if the index holds no zones
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// All zones, ordered by their reversed names
    pub fn zones(&self) -> impl Iterator<Item = &str> + '_ {
        self.zones.values().map(String::as_str)
    }
}

fn reversed_labels(name: &Name) -> Vec<Vec<u8>> {
    let mut labels = name
        .iter()
        .map(<[u8]>::to_ascii_lowercase)
        .collect::<Vec<_>>();
    labels.reverse();
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reversed_labels() {
        let name = Name::from_ascii("WWW.Example.com.").unwrap();
        assert_eq!(
            reversed_labels(&name),
            vec![b"com".to_vec(), b"example".to_vec(), b"www".to_vec()]
        );
        assert!(reversed_labels(&Name::root()).is_empty());
    }

    #[test]
    fn test_escaped_dot_is_one_label() {
        let index = ZoneIndex::new([r"a\.b.com."]);
        assert_eq!(index.find("x.b.a.com."), None);
        assert_eq!(index.find("b.a.com."), None);
        assert_eq!(index.find(r"www.a\.b.com."), Some(r"a\.b.com."));

        let index = ZoneIndex::new(["b.a.com.", r"a\.b.com."]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.find("x.b.a.com."), Some("b.a.com."));
    }

    #[test]
    fn test_longest_suffix() {
        let index = ZoneIndex::new(["com.", "example.com.", "a.example.com."]);
        assert_eq!(index.find("x.a.example.com."), Some("a.example.com."));
        assert_eq!(index.find("a.example.com."), Some("a.example.com."));
        assert_eq!(index.find("b.example.com."), Some("example.com."));
        assert_eq!(index.find("example.org."), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_label_aligned() {
        let index = ZoneIndex::new(["example.com."]);
        assert_eq!(index.find("badexample.com."), None);
        assert_eq!(index.find("com."), None);
    }

    #[test]
    fn test_case_insensitive() {
        let index = ZoneIndex::new(["Example.COM."]);
        assert_eq!(index.find("www.EXAMPLE.com."), Some("Example.COM."));
    }

    #[test]
    fn test_root_zone_matches_everything() {
        let index = ZoneIndex::new([".", "example.com."]);
        assert_eq!(index.find("example.org."), Some("."));
        assert_eq!(index.find("www.example.com."), Some("example.com."));
    }

    #[test]
    fn test_invalid_names_are_skipped() {
        let index = ZoneIndex::new(["example.com.", "bad name.com."]);
        assert_eq!(index.len(), 1);
        assert!(ZoneIndex::default().is_empty());
    }
}
