use crate::error::IngestError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Condvar, Mutex};

pub type FlightResult = Result<Arc<Vec<u8>>, IngestError>;

/// One in-progress computation that late arrivals can wait on.
pub struct Flight {
    result: Mutex<Option<FlightResult>>,
    ready: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Block until the leader publishes, then hand back a clone of its result.
    pub fn wait(&self) -> FlightResult {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            slot = self.ready.wait(slot).unwrap_or_else(|e| e.into_inner());
        }
    }

    fn publish(&self, result: FlightResult) {
        let mut slot = self.result.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(result);
        self.ready.notify_all();
    }
}

pub enum Join<'a> {
    Leader(LeaderGuard<'a>),
    Follower(Arc<Flight>),
}

/// Deduplicates concurrent computations per key.
#[derive(Default)]
pub struct SingleFlight {
    inflight: DashMap<String, Arc<Flight>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first caller for `key` becomes the leader; everyone arriving before
    /// the leader finishes becomes a follower of the same flight.
    pub fn join(&self, key: &str) -> Join<'_> {
        match self.inflight.entry(key.to_string()) {
            Entry::Occupied(occupied) => Join::Follower(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let flight = Arc::new(Flight::new());
                vacant.insert(flight.clone());
                Join::Leader(LeaderGuard {
                    owner: self,
                    key: key.to_string(),
                    flight,
                    finished: false,
                })
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

/// Held by the computing caller. Dropping it without `finish` (a panic while
/// computing) releases followers with `JobPanicked`.
pub struct LeaderGuard<'a> {
    owner: &'a SingleFlight,
    key: String,
    flight: Arc<Flight>,
    finished: bool,
}

impl LeaderGuard<'_> {
    pub fn finish(mut self, result: FlightResult) {
        self.complete(result);
    }

    fn complete(&mut self, result: FlightResult) {
        self.finished = true;
        // Unregister first so a caller arriving after this point starts a new
        // flight instead of waiting on a finished one.
        self.owner.inflight.remove(&self.key);
        self.flight.publish(result);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let key = self.key.clone();
            self.complete(Err(IngestError::JobPanicked(format!(
                "computation for {} did not complete",
                key
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_followers_receive_leader_result() {
        let flights = SingleFlight::new();
        let leader = match flights.join("k") {
            Join::Leader(guard) => guard,
            Join::Follower(_) => panic!("first caller must lead"),
        };
        let follower = match flights.join("k") {
            Join::Follower(flight) => flight,
            Join::Leader(_) => panic!("second caller must follow"),
        };

        let waiter = thread::spawn(move || follower.wait());
        thread::sleep(Duration::from_millis(20));
        leader.finish(Ok(Arc::new(vec![1, 2, 3])));

        assert_eq!(*waiter.join().unwrap().unwrap(), vec![1, 2, 3]);
        assert_eq!(flights.in_flight(), 0);
        assert!(matches!(flights.join("k"), Join::Leader(_)));
    }

    #[test]
    fn test_abandoned_leader_releases_followers() {
        let flights = SingleFlight::new();
        let follower = thread::scope(|s| {
            let guard = match flights.join("k") {
                Join::Leader(guard) => guard,
                Join::Follower(_) => unreachable!(),
            };
            let follower = match flights.join("k") {
                Join::Follower(flight) => flight,
                Join::Leader(_) => unreachable!(),
            };
            let handle = s.spawn(move || {
                let _guard = guard;
                panic!("parser blew up");
            });
            assert!(handle.join().is_err());
            follower
        });

        assert!(matches!(follower.wait(), Err(IngestError::JobPanicked(_))));
        assert_eq!(flights.in_flight(), 0);
    }
}
