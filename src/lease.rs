//! Shard leases
//!
//! A lease is an advisory, time-bounded exclusive claim on one shard, held by
//! a `(zone, locker)` pair. Zones take a lease before trimming a shard so that
//! peers do not trim or sync it at the same time. Nothing here stops a caller
//! from trimming without one.
//!
//! Expiry is checked only when a lease is acquired or released. A lease whose
//! deadline has passed stays in the table until the next such call on its
//! shard reclaims it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::error::{Result, Error};
use crate::metrics::MetricsCollector;
use crate::shard::ShardKey;
use crate::time::{Clock, SystemClock};

/// Identity of a lease holder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseOwner {
    /// Zone taking the lease
    pub zone_id: String,
    /// Worker within the zone
    pub locker_id: String,
}

impl LeaseOwner {
    /// Create a new lease owner
    pub fn new(zone_id: impl Into<String>, locker_id: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            locker_id: locker_id.into(),
        }
    }

    fn matches(&self, zone_id: &str, locker_id: &str) -> bool {
        self.zone_id == zone_id && self.locker_id == locker_id
    }
}

/// A lease record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Leased shard
    pub key: ShardKey,
    /// Holder of the lease
    pub owner: LeaseOwner,
    /// Time the lease was granted
    pub acquired_at: DateTime<Utc>,
    /// Time the lease lapses
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Check if the lease has expired at the given time
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left on the lease, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

type LeaseSlot = Arc<Mutex<Option<Lease>>>;

/// Lease table for every shard of every family
#[derive(Debug)]
pub struct LeaseManager {
    /// One slot per shard with a lease or a caller waiting on one. The outer
    /// lock is held only to find, create or prune a slot.
    slots: Mutex<HashMap<ShardKey, LeaseSlot>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
}

impl Default for LeaseManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(MetricsCollector::new()))
    }
}

impl LeaseManager {
    /// Create a lease manager using `clock` for expiry
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
            metrics,
        }
    }

    fn slot(&self, key: ShardKey) -> LeaseSlot {
        self.slots.lock().entry(key).or_default().clone()
    }

    fn existing_slot(&self, key: &ShardKey) -> Option<LeaseSlot> {
        self.slots.lock().get(key).cloned()
    }

    /// Drop an empty slot that no caller still holds.
    ///
    /// Slot handles are only cloned under the outer lock, so a strong count of
    /// one means nobody can be waiting to write into it.
    fn prune(&self, key: &ShardKey) {
        let mut slots = self.slots.lock();
        let idle = slots
            .get(key)
            .map_or(false, |slot| Arc::strong_count(slot) == 1 && slot.lock().is_none());
        if idle {
            slots.remove(key);
        }
    }

    /// Number of shards currently holding a lease slot
    pub fn slot_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Take an exclusive lease on a shard for `duration`.
    ///
    /// Fails with `Busy` while any unexpired lease exists, including one held
    /// by the same owner.
    pub fn acquire(
        &self,
        key: ShardKey,
        zone_id: &str,
        locker_id: &str,
        duration: Duration,
    ) -> Result<Lease> {
        if duration.is_zero() {
            return Err(Error::invalid_argument("Lease duration must be positive"));
        }
        if zone_id.is_empty() || locker_id.is_empty() {
            return Err(Error::invalid_argument("Lease requires a zone id and a locker id"));
        }
        let length = chrono::Duration::from_std(duration)
            .map_err(|_| Error::invalid_argument(format!("Lease duration too long: {:?}", duration)))?;

        let slot = self.slot(key);
        let result = self.acquire_slot(&slot, key, zone_id, locker_id, duration, length);
        if result.is_err() {
            drop(slot);
            self.prune(&key);
        }

        result
    }

    fn acquire_slot(
        &self,
        slot: &LeaseSlot,
        key: ShardKey,
        zone_id: &str,
        locker_id: &str,
        duration: Duration,
        length: chrono::Duration,
    ) -> Result<Lease> {
        let mut state = slot.lock();
        let now = self.clock.now();

        if let Some(current) = state.as_ref() {
            if !current.is_expired_at(now) {
                self.metrics.record_lock_conflict();
                debug!(
                    shard = %key,
                    holder_zone = %current.owner.zone_id,
                    holder_locker = %current.owner.locker_id,
                    "shard already leased"
                );
                return Err(Error::busy(format!(
                    "{} is leased by {}/{} until {}",
                    key,
                    current.owner.zone_id,
                    current.owner.locker_id,
                    current.expires_at.to_rfc3339()
                )));
            }
            self.metrics.record_lease_expired();
            debug!(shard = %key, "reclaiming expired lease");
        }

        let expires_at = now
            .checked_add_signed(length)
            .ok_or_else(|| Error::invalid_argument(format!("Lease duration too long: {:?}", duration)))?;

        let lease = Lease {
            key,
            owner: LeaseOwner::new(zone_id, locker_id),
            acquired_at: now,
            expires_at,
        };
        *state = Some(lease.clone());

        self.metrics.record_lock_granted();
        info!(shard = %key, zone_id, locker_id, secs = duration.as_secs(), "lease granted");

        Ok(lease)
    }

    /// Release a lease held by `(zone_id, locker_id)`.
    ///
    /// Fails with `NotFound` if the shard is not leased or the lease has
    /// expired, and with `NotOwner` if someone else holds it.
    pub fn release(&self, key: ShardKey, zone_id: &str, locker_id: &str) -> Result<()> {
        let Some(slot) = self.existing_slot(&key) else {
            self.metrics.record_unlock_rejected();
            return Err(Error::not_found(format!("{} is not leased", key)));
        };

        let result = self.release_slot(&slot, key, zone_id, locker_id);
        drop(slot);
        self.prune(&key);

        result
    }

    fn release_slot(&self, slot: &LeaseSlot, key: ShardKey, zone_id: &str, locker_id: &str) -> Result<()> {
        let mut state = slot.lock();
        let now = self.clock.now();

        let (expired, holder) = match state.as_ref() {
            None => {
                self.metrics.record_unlock_rejected();
                return Err(Error::not_found(format!("{} is not leased", key)));
            }
            Some(current) => (current.is_expired_at(now), current.owner.clone()),
        };

        if expired {
            *state = None;
            self.metrics.record_lease_expired();
            self.metrics.record_unlock_rejected();
            debug!(shard = %key, "unlock of expired lease");
            return Err(Error::not_found(format!("Lease on {} has expired", key)));
        }

        if !holder.matches(zone_id, locker_id) {
            self.metrics.record_unlock_rejected();
            debug!(shard = %key, zone_id, locker_id, "unlock by non-owner");
            return Err(Error::not_owner(format!(
                "{} is leased by {}/{}",
                key, holder.zone_id, holder.locker_id
            )));
        }

        *state = None;
        self.metrics.record_unlock();
        info!(shard = %key, zone_id, locker_id, "lease released");

        Ok(())
    }

    /// The lease record currently stored for a shard.
    ///
    /// The record is returned as last written, so it may already have expired.
    pub fn current(&self, key: &ShardKey) -> Option<Lease> {
        self.existing_slot(key).and_then(|slot| slot.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::family::LogFamily;
    use crate::time::ManualClock;

    fn manager() -> (LeaseManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        let manager = LeaseManager::new(clock.clone(), Arc::new(MetricsCollector::new()));
        (manager, clock)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_lease_exclusion() {
        let (leases, clock) = manager();
        let key = ShardKey::new(LogFamily::Metadata, 4);

        let lease = leases.acquire(key, "zone-a", "worker-1", MINUTE).unwrap();
        assert_eq!(lease.expires_at - lease.acquired_at, chrono::Duration::seconds(60));

        assert!(leases.acquire(key, "zone-b", "worker-1", MINUTE).unwrap_err().is_busy());
        // Same owner is not re-entrant
        assert!(leases.acquire(key, "zone-a", "worker-1", MINUTE).unwrap_err().is_busy());

        clock.advance(chrono::Duration::seconds(59));
        assert!(leases.acquire(key, "zone-b", "worker-1", MINUTE).is_err());

        clock.advance(chrono::Duration::seconds(1));
        let lease = leases.acquire(key, "zone-b", "worker-1", MINUTE).unwrap();
        assert_eq!(lease.owner, LeaseOwner::new("zone-b", "worker-1"));
        assert_eq!(leases.metrics.get_leases_expired(), 1);
    }

    #[test]
    fn test_lease_keys_are_independent() {
        let (leases, _) = manager();
        leases.acquire(ShardKey::new(LogFamily::Metadata, 1), "a", "l", MINUTE).unwrap();
        leases.acquire(ShardKey::new(LogFamily::Metadata, 2), "b", "l", MINUTE).unwrap();
        leases.acquire(ShardKey::new(LogFamily::Data, 1), "c", "l", MINUTE).unwrap();
    }

    #[test]
    fn test_acquire_validation() {
        let (leases, _) = manager();
        let key = ShardKey::new(LogFamily::Data, 0);

        assert!(leases.acquire(key, "zone", "locker", Duration::ZERO).unwrap_err().is_invalid_argument());
        assert!(leases.acquire(key, "", "locker", MINUTE).unwrap_err().is_invalid_argument());
        assert!(leases.acquire(key, "zone", "", MINUTE).unwrap_err().is_invalid_argument());
        assert!(leases.current(&key).is_none());
    }

    #[test]
    fn test_release() {
        let (leases, _) = manager();
        let key = ShardKey::new(LogFamily::Data, 9);

        assert!(leases.release(key, "zone-a", "l1").unwrap_err().is_not_found());

        leases.acquire(key, "zone-a", "l1", MINUTE).unwrap();
        assert!(leases.release(key, "zone-b", "l1").unwrap_err().is_not_owner());
        assert!(leases.release(key, "zone-a", "l2").unwrap_err().is_not_owner());

        leases.release(key, "zone-a", "l1").unwrap();
        assert!(leases.release(key, "zone-a", "l1").unwrap_err().is_not_found());
        leases.acquire(key, "zone-b", "l1", MINUTE).unwrap();
    }

    #[test]
    fn test_released_slots_are_pruned() {
        let (leases, clock) = manager();

        for shard_id in 0..100 {
            let key = ShardKey::new(LogFamily::Data, shard_id);
            leases.acquire(key, "zone-a", "l1", MINUTE).unwrap();
            leases.release(key, "zone-a", "l1").unwrap();
        }
        assert_eq!(leases.slot_count(), 0);

        // A rejected unlock keeps the holder's slot
        let key = ShardKey::new(LogFamily::Data, 1);
        leases.acquire(key, "zone-a", "l1", MINUTE).unwrap();
        assert!(leases.release(key, "zone-b", "l1").is_err());
        assert_eq!(leases.slot_count(), 1);

        // Releasing an expired lease clears it too
        clock.advance(chrono::Duration::minutes(2));
        assert!(leases.release(key, "zone-a", "l1").unwrap_err().is_not_found());
        assert_eq!(leases.slot_count(), 0);

        // So does an acquire that fails after the slot was created: the
        // length converts but runs past the latest representable time
        let huge = Duration::from_secs(9_000_000_000_000);
        assert!(leases.acquire(key, "zone-a", "l1", huge).is_err());
        assert_eq!(leases.slot_count(), 0);
    }

    #[test]
    fn test_expiry_is_lazy() {
        let (leases, clock) = manager();
        let key = ShardKey::new(LogFamily::Metadata, 0);

        leases.acquire(key, "zone-a", "l1", MINUTE).unwrap();
        clock.advance(chrono::Duration::minutes(5));

        // The stale record is only reclaimed by the next acquire or release
        let stale = leases.current(&key).unwrap();
        assert!(stale.is_expired_at(clock.now()));
        assert_eq!(stale.remaining_at(clock.now()), Duration::ZERO);

        assert!(leases.release(key, "zone-a", "l1").unwrap_err().is_not_found());
        assert!(leases.current(&key).is_none());
    }

    #[test]
    fn test_concurrent_acquire() {
        let leases = Arc::new(LeaseManager::default());
        let key = ShardKey::new(LogFamily::Metadata, 7);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let leases = leases.clone();
                std::thread::spawn(move || leases.acquire(key, &format!("zone-{}", i), "l", MINUTE).is_ok())
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 1);
    }
}
