//! Registry of known remote workers.
//!
//! Upsert-by-key on every contact; counters use atomics because the
//! dispatch path and the result path update them concurrently. Clients are
//! never deleted here (staleness pruning is an external policy).

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::{ClientInfo, ClientSnapshot};

#[derive(Debug)]
struct ClientRecord {
    name: String,
    last_contact: DateTime<Utc>,
    jobs_in_progress: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
}

#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<Uuid, ClientRecord>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a contact from a client, creating the record on first sight.
    pub fn touch(&self, info: &ClientInfo) {
        let now = Utc::now();
        match self.clients.get_mut(&info.id) {
            Some(mut record) => {
                record.name = info.name.clone();
                record.last_contact = now;
            }
            None => {
                debug!(client_id = %info.id, name = %info.name, "New client registered");
                self.clients.insert(
                    info.id,
                    ClientRecord {
                        name: info.name.clone(),
                        last_contact: now,
                        jobs_in_progress: AtomicU64::new(0),
                        total_processed: AtomicU64::new(0),
                        total_failed: AtomicU64::new(0),
                    },
                );
            }
        }
    }

    /// Bump the last-contact timestamp without changing the name. Creates a
    /// placeholder record for clients that skipped registration.
    pub fn touch_id(&self, id: Uuid) {
        self.touch(&ClientInfo {
            id,
            name: self
                .clients
                .get(&id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| id.to_string()),
        });
    }

    pub fn job_dispatched(&self, id: Uuid) {
        if let Some(record) = self.clients.get(&id) {
            record.jobs_in_progress.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Account for a received result. `counted` is false for late/duplicate
    /// results that no handler recognized.
    pub fn result_received(&self, id: Uuid, success: bool, counted: bool) {
        let Some(record) = self.clients.get(&id) else {
            return;
        };
        // Saturating: a late result may arrive after the in-progress count
        // was already released by a timeout requeue.
        let _ = record
            .jobs_in_progress
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        if !counted {
            return;
        }
        if success {
            record.total_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            record.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> Vec<ClientSnapshot> {
        let mut clients: Vec<ClientSnapshot> = self
            .clients
            .iter()
            .map(|entry| ClientSnapshot {
                id: *entry.key(),
                name: entry.name.clone(),
                last_contact: entry.last_contact,
                jobs_in_progress: entry.jobs_in_progress.load(Ordering::Relaxed),
                total_processed: entry.total_processed.load(Ordering::Relaxed),
                total_failed: entry.total_failed.load(Ordering::Relaxed),
            })
            .collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: Uuid, name: &str) -> ClientInfo {
        ClientInfo {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn touch_creates_then_updates() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();

        registry.touch(&info(id, "worker-1"));
        assert_eq!(registry.len(), 1);
        let first_contact = registry.snapshot()[0].last_contact;

        registry.touch(&info(id, "worker-1-renamed"));
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "worker-1-renamed");
        assert!(snapshot[0].last_contact >= first_contact);
    }

    #[test]
    fn counters_follow_dispatch_and_results() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.touch(&info(id, "worker"));

        registry.job_dispatched(id);
        registry.job_dispatched(id);
        assert_eq!(registry.snapshot()[0].jobs_in_progress, 2);

        registry.result_received(id, true, true);
        registry.result_received(id, false, true);
        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.jobs_in_progress, 0);
        assert_eq!(snapshot.total_processed, 1);
        assert_eq!(snapshot.total_failed, 1);
    }

    #[test]
    fn uncounted_result_only_releases_in_progress() {
        let registry = ClientRegistry::new();
        let id = Uuid::new_v4();
        registry.touch(&info(id, "worker"));
        registry.job_dispatched(id);

        registry.result_received(id, true, false);
        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.jobs_in_progress, 0);
        assert_eq!(snapshot.total_processed, 0);

        // Underflow is clamped at zero
        registry.result_received(id, true, false);
        assert_eq!(registry.snapshot()[0].jobs_in_progress, 0);
    }
}
