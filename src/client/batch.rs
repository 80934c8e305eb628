//! Multi-key batching
//!
//! Groups keys by destination server and runs one exchange per server.
//! Exchanges share no mutable state, so with more than one server they run
//! on scoped worker threads.

use std::collections::{BTreeMap, HashMap};

use crate::error::Result;
use crate::network::{ServerId, ServerPool};

use super::WireKey;

/// One distinct key in a server group and every output slot it fills
#[derive(Debug, Clone)]
pub(crate) struct GroupedKey {
    pub wire: String,
    pub positions: Vec<usize>,
}

/// The keys bound for one server, in first-seen order
#[derive(Debug, Clone)]
pub(crate) struct KeyGroup {
    pub server: ServerId,
    pub keys: Vec<GroupedKey>,
    index: HashMap<String, usize>,
}

impl KeyGroup {
    fn new(server: ServerId) -> Self {
        Self {
            server,
            keys: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, wire: &str, position: usize) {
        match self.index.get(wire) {
            Some(&i) => self.keys[i].positions.push(position),
            None => {
                self.index.insert(wire.to_string(), self.keys.len());
                self.keys.push(GroupedKey {
                    wire: wire.to_string(),
                    positions: vec![position],
                });
            }
        }
    }

    /// Index into `keys` for a wire key
    pub fn find(&self, wire: &str) -> Option<usize> {
        self.index.get(wire).copied()
    }
}

/// Partition `keys` by the server their hash routes to
pub(crate) fn partition(pool: &ServerPool, keys: &[WireKey]) -> Vec<KeyGroup> {
    let mut groups: BTreeMap<ServerId, KeyGroup> = BTreeMap::new();
    for (position, key) in keys.iter().enumerate() {
        let server = pool.server_for(key.hash);
        groups
            .entry(server)
            .or_insert_with(|| KeyGroup::new(server))
            .push(&key.wire, position);
    }
    groups.into_values().collect()
}

/// Run `exchange(group_index, group)` once per group; results are aligned
/// with `groups`.
///
/// The first error wins once every exchange has finished.
pub(crate) fn for_each_server<T, F>(groups: &[KeyGroup], exchange: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize, &KeyGroup) -> Result<T> + Sync,
{
    if groups.len() <= 1 {
        return groups
            .iter()
            .enumerate()
            .map(|(i, group)| exchange(i, group))
            .collect();
    }

    let exchange = &exchange;
    let outcome = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = groups
            .iter()
            .enumerate()
            .map(|(i, group)| scope.spawn(move |_| exchange(i, group)))
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect::<Vec<_>>()
    });

    match outcome {
        Ok(results) => results.into_iter().collect(),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
