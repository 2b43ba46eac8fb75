//! Aggregate store holding the latest result per host
//!
//! The store is the single point of truth between the pollers and the
//! render/broadcast path. It is partitioned by host: each host has its own
//! slot with its own lock, so pollers writing different hosts never contend.
//! A global generation counter marks distinguishable states; it only moves
//! when some host's observable content actually changed, so a fleet of idle
//! hosts does not force needless re-renders.
//!
//! Readers obtain a consistent snapshot without blocking writers: the
//! generation is sampled before and after the slot scan and the scan is
//! retried on the rare interleaved change.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::trace;

use crate::HostResult;

/// What happened to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored and the generation was bumped.
    Applied,

    /// Stored (newer sequence) but content was identical; generation kept.
    Unchanged,

    /// Discarded: an equal or newer sequence was already visible.
    Stale,

    /// Discarded: host is not part of the configured set.
    UnknownHost,
}

struct Slot {
    host: String,
    result: RwLock<Option<HostResult>>,
}

/// Point-in-time view of all hosts, in configured order.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub generation: u64,
    pub entries: Vec<AggregateEntry>,
}

#[derive(Debug, Clone)]
pub struct AggregateEntry {
    pub host: String,
    /// `None` until the first poll completes.
    pub result: Option<HostResult>,
}

pub struct AggregateStore {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    generation: AtomicU64,
    gen_tx: watch::Sender<u64>,
}

impl AggregateStore {
    /// Create a store for a fixed, ordered host set.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let slots: Vec<Slot> = hosts
            .into_iter()
            .map(|host| Slot {
                host: host.into(),
                result: RwLock::new(None),
            })
            .collect();

        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.host.clone(), i))
            .collect();

        let (gen_tx, _) = watch::channel(0);

        Self {
            slots,
            index,
            generation: AtomicU64::new(0),
            gen_tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Receiver that wakes whenever the generation moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.gen_tx.subscribe()
    }

    /// Store a poll result for one host.
    ///
    /// Safe to call concurrently from any poller; only the target host's
    /// slot is locked. Results arriving out of order (a slow earlier cycle
    /// finishing after a later one) are discarded by the sequence guard.
    pub fn write(&self, host: &str, result: HostResult) -> WriteOutcome {
        let Some(&idx) = self.index.get(host) else {
            trace!(host, "write for unconfigured host discarded");
            return WriteOutcome::UnknownHost;
        };

        let changed = {
            let mut slot = self.slots[idx]
                .result
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            match slot.as_ref() {
                Some(current) if result.sequence <= current.sequence => {
                    trace!(
                        host,
                        current = current.sequence,
                        incoming = result.sequence,
                        "stale write discarded"
                    );
                    return WriteOutcome::Stale;
                }
                Some(current) => {
                    let changed = !current.same_observation(&result);
                    *slot = Some(result);
                    changed
                }
                None => {
                    *slot = Some(result);
                    true
                }
            }
        };

        if !changed {
            return WriteOutcome::Unchanged;
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        // Concurrent writers may race to publish; keep the watch monotonic.
        self.gen_tx.send_if_modified(|current| {
            if generation > *current {
                *current = generation;
                true
            } else {
                false
            }
        });

        trace!(host, generation, "aggregate updated");
        WriteOutcome::Applied
    }

    /// Consistent snapshot of every host's current result.
    ///
    /// Lock-free with respect to writers beyond the per-slot copy; the scan
    /// retries if the generation moved underneath it, so a given generation
    /// always maps to one content.
    pub fn read(&self) -> Aggregate {
        loop {
            let generation = self.generation.load(Ordering::Acquire);

            let entries: Vec<AggregateEntry> = self
                .slots
                .iter()
                .map(|slot| AggregateEntry {
                    host: slot.host.clone(),
                    result: slot
                        .result
                        .read()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .clone(),
                })
                .collect();

            if self.generation.load(Ordering::Acquire) == generation {
                return Aggregate {
                    generation,
                    entries,
                };
            }
        }
    }
}
