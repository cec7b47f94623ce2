// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Coalesced relay-level subscriptions

use std::collections::HashMap;

use plover::{Event, Filter, SubscriptionId};

/// A relay-level subscription: one wire REQ serving one or more logical
/// subscriptions with compatible filters.
#[derive(Debug)]
pub(crate) struct RelayGroup {
    /// Relay-scoped wire subscription id
    pub(crate) wire_id: SubscriptionId,
    /// Merged filter set sent to the relay
    pub(crate) filters: Vec<Filter>,
    /// Member logical subscriptions with their merged-filter bitmaps
    pub(crate) members: HashMap<SubscriptionId, u64>,
    /// Whether the relay already reported EOSE for this group
    pub(crate) eose: bool,
}

impl RelayGroup {
    /// New group seeded by a single member
    pub(crate) fn new(wire_id: SubscriptionId, member: SubscriptionId, filters: Vec<Filter>) -> Self {
        let bitmap: u64 = mask_below(filters.len());
        let mut members: HashMap<SubscriptionId, u64> = HashMap::new();
        members.insert(member, bitmap);
        Self {
            wire_id,
            filters,
            members,
            eose: false,
        }
    }

    /// Try to merge a logical subscription into this group.
    ///
    /// Compatibility requires [`Filter::union_on_same_shape`] to succeed for
    /// every candidate filter against some group filter, and the result to
    /// stay within `max_filters`. Returns the merged filter set and the member
    /// bitmap without mutating the group.
    pub(crate) fn try_merge(
        &self,
        filters: &[Filter],
        max_filters: usize,
    ) -> Option<(Vec<Filter>, u64)> {
        if self.eose || self.filters.len() > max_filters || self.filters.len() > 64 {
            return None;
        }

        let mut merged: Vec<Filter> = self.filters.clone();
        let mut bitmap: u64 = 0;

        for filter in filters.iter() {
            let index: usize = merged.iter().position(|existing| {
                existing.union_on_same_shape(filter).is_some()
            })?;
            // Position found above, union can't fail
            merged[index] = merged[index]
                .union_on_same_shape(filter)
                .expect("union succeeds");
            bitmap |= 1 << index;
        }

        Some((merged, bitmap))
    }

    /// Commit a merge produced by [`Self::try_merge`]
    pub(crate) fn commit(
        &mut self,
        member: SubscriptionId,
        filters: Vec<Filter>,
        bitmap: u64,
    ) {
        self.filters = filters;
        *self.members.entry(member).or_insert(0) |= bitmap;
    }

    /// Bitmap of merged filters matching the event
    pub(crate) fn match_mask(&self, event: &Event) -> u64 {
        let mut mask: u64 = 0;
        for (index, filter) in self.filters.iter().enumerate().take(64) {
            if filter.match_event(event) {
                mask |= 1 << index;
            }
        }
        mask
    }

    /// Check if the group contains a member
    #[inline]
    pub(crate) fn contains(&self, member: &SubscriptionId) -> bool {
        self.members.contains_key(member)
    }
}

/// Bitmap with the lowest `len` bits set (capped at 64)
fn mask_below(len: usize) -> u64 {
    if len >= 64 {
        u64::MAX
    } else {
        (1u64 << len) - 1
    }
}

/// Rebuild a group's merged filters from its remaining members.
///
/// Returns the merged filter set and fresh bitmaps, or `None` if the members
/// no longer coalesce (callers then split them into separate groups).
pub(crate) fn rebuild(
    members: &[(SubscriptionId, Vec<Filter>)],
) -> Option<(Vec<Filter>, HashMap<SubscriptionId, u64>)> {
    let mut iter = members.iter();
    let (first_id, first_filters) = iter.next()?;

    let mut merged: Vec<Filter> = first_filters.clone();
    let mut bitmaps: HashMap<SubscriptionId, u64> = HashMap::new();
    bitmaps.insert(first_id.clone(), mask_below(merged.len()));

    for (member_id, filters) in iter {
        let mut bitmap: u64 = 0;
        for filter in filters.iter() {
            let index: usize = merged
                .iter()
                .position(|existing| existing.union_on_same_shape(filter).is_some())?;
            merged[index] = merged[index]
                .union_on_same_shape(filter)
                .expect("union succeeds");
            bitmap |= 1 << index;
        }
        bitmaps.insert(member_id.clone(), bitmap);
    }

    Some((merged, bitmaps))
}

#[cfg(test)]
mod tests {
    use plover::{Kind, PublicKey};

    use super::*;

    const PK_A: &str = "f79a99714c761c0e0fea6777a70103d71d75fb7900b0894bfe6c64054807b573";
    const PK_B: &str = "379e863e8357163b5bce5d2688dc4f1dcc2d505222fb8d74db600f30535dfdfe";

    fn author_filter(pk: &str) -> Filter {
        Filter::new()
            .author(PublicKey::from_hex(pk).unwrap())
            .kind(Kind::TEXT_NOTE)
    }

    #[test]
    fn test_merge_compatible() {
        let group = RelayGroup::new(
            SubscriptionId::new("g1"),
            SubscriptionId::new("l1"),
            vec![author_filter(PK_A)],
        );

        let (merged, bitmap) = group.try_merge(&[author_filter(PK_B)], 10).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(bitmap, 0b1);
        assert_eq!(
            merged[0],
            Filter::new()
                .authors([
                    PublicKey::from_hex(PK_A).unwrap(),
                    PublicKey::from_hex(PK_B).unwrap()
                ])
                .kind(Kind::TEXT_NOTE)
        );
    }

    #[test]
    fn test_merge_incompatible_shape() {
        let group = RelayGroup::new(
            SubscriptionId::new("g1"),
            SubscriptionId::new("l1"),
            vec![author_filter(PK_A)],
        );

        // Different shape: no authors field
        let incompatible = Filter::new().kind(Kind::METADATA);
        assert!(group.try_merge(&[incompatible], 10).is_none());
    }

    #[test]
    fn test_merge_refused_after_eose() {
        let mut group = RelayGroup::new(
            SubscriptionId::new("g1"),
            SubscriptionId::new("l1"),
            vec![author_filter(PK_A)],
        );
        group.eose = true;
        assert!(group.try_merge(&[author_filter(PK_B)], 10).is_none());
    }

    #[test]
    fn test_rebuild_after_member_removal() {
        let members = vec![
            (SubscriptionId::new("l1"), vec![author_filter(PK_A)]),
            (SubscriptionId::new("l2"), vec![author_filter(PK_B)]),
        ];
        let (merged, bitmaps) = rebuild(&members).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(bitmaps.len(), 2);

        // Dropping one member shrinks the union
        let (merged, _) = rebuild(&members[..1]).unwrap();
        assert_eq!(merged[0], author_filter(PK_A));
    }
}
