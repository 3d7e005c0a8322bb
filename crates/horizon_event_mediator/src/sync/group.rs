//! Synchronization group: the scope buckets live in.

use super::bucket::{SweepContext, SyncBucket};
use super::entry::SyncEntry;
use crate::types::PlayerId;
use compact_str::CompactString;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Buckets of the global scope or of one player.
#[derive(Debug, Default)]
pub(crate) struct SyncGroup {
    owner: Option<PlayerId>,
    tag_buckets: HashMap<CompactString, SyncBucket>,
    type_buckets: HashMap<TypeId, SyncBucket>,
}

impl SyncGroup {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn for_player(player: PlayerId) -> Self {
        Self {
            owner: Some(player),
            ..Self::default()
        }
    }

    pub fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    pub fn is_empty(&self) -> bool {
        self.tag_buckets.is_empty() && self.type_buckets.is_empty()
    }

    /// Inserts `entry` into every bucket its policy names: one per tag, or
    /// the bucket of its type when it declares no tags. Returns `true` if
    /// it became current in all of them.
    pub fn enter(&mut self, entry: &Arc<SyncEntry>, cx: &mut SweepContext) -> bool {
        let policy = entry.policy();
        if policy.tags.is_empty() {
            return self
                .type_buckets
                .entry(policy.type_key)
                .or_default()
                .enter_event(entry, cx);
        }

        let mut current = true;
        for tag in &policy.tags {
            current &= self.tag_buckets.entry(tag.clone()).or_default().enter_event(entry, cx);
        }
        current
    }

    /// Removes `entry` from every bucket it occupies or waits in, dropping
    /// buckets that end up empty. Returns whether the group is now empty.
    pub fn exit(&mut self, entry: &SyncEntry, cx: &mut SweepContext) -> bool {
        let policy = entry.policy();
        if policy.tags.is_empty() {
            release(&mut self.type_buckets, &policy.type_key, entry, cx);
        } else {
            for tag in &policy.tags {
                release(&mut self.tag_buckets, tag, entry, cx);
            }
        }
        self.is_empty()
    }

    /// Runs the timeout check over every bucket of the group.
    pub fn sweep(&mut self, cx: &mut SweepContext) {
        for bucket in self.tag_buckets.values_mut().chain(self.type_buckets.values_mut()) {
            bucket.check_for_timeout(None, cx);
        }
    }

    pub fn is_current(&self, entry: &SyncEntry) -> bool {
        self.buckets_of(entry).all(|bucket| bucket.is_some_and(|b| b.is_current(entry)))
    }

    pub fn is_queued(&self, entry: &SyncEntry) -> bool {
        self.buckets_of(entry).any(|bucket| bucket.is_some_and(|b| b.is_queued(entry)))
    }

    /// Every entry still referenced by the group, leaving it empty.
    pub fn drain(&mut self) -> Vec<Arc<SyncEntry>> {
        let mut entries = Vec::new();
        for (_, mut bucket) in self.tag_buckets.drain() {
            entries.extend(bucket.drain());
        }
        for (_, mut bucket) in self.type_buckets.drain() {
            entries.extend(bucket.drain());
        }
        entries
    }

    fn buckets_of<'a>(&'a self, entry: &'a SyncEntry) -> Box<dyn Iterator<Item = Option<&'a SyncBucket>> + 'a> {
        let policy = entry.policy();
        if policy.tags.is_empty() {
            Box::new(std::iter::once(self.type_buckets.get(&policy.type_key)))
        } else {
            Box::new(policy.tags.iter().map(move |tag| self.tag_buckets.get(tag)))
        }
    }
}

fn release<K, Q>(buckets: &mut HashMap<K, SyncBucket>, key: &Q, entry: &SyncEntry, cx: &mut SweepContext)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    let Some(bucket) = buckets.get_mut(key) else {
        return;
    };
    bucket.withdraw(entry);
    if bucket.exit_event(entry, cx) {
        buckets.remove(key);
    }
}
