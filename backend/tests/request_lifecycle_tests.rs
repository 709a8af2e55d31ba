//! Purchase request lifecycle tests
//!
//! Exercises the accept protocol (validate on a snapshot, then re-check and
//! decrement under the ledger lock) against an in-memory ledger:
//! - Scenario: FEFO default accepted
//! - Scenario: incomplete draft leaves request pending
//! - Scenario: two concurrent accepts race for one batch

use std::collections::HashMap;
use std::sync::{Barrier, Mutex};
use std::thread;

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use shared::{
    allocation::{apply_reservations, plan_for_accept, reserve},
    AllocationError, Batch, BatchAssignment, LineItem, RequestStatus, TransitionError,
};
use uuid::Uuid;

// ============================================================================
// Integration Helpers
// ============================================================================

#[derive(Debug, PartialEq)]
enum AcceptError {
    Transition(TransitionError),
    Allocation(AllocationError),
}

impl From<TransitionError> for AcceptError {
    fn from(err: TransitionError) -> Self {
        AcceptError::Transition(err)
    }
}

impl From<AllocationError> for AcceptError {
    fn from(err: AllocationError) -> Self {
        AcceptError::Allocation(err)
    }
}

/// In-memory stand-in for the ledger and request tables
struct Engine {
    ledger: Mutex<Vec<Batch>>,
    requests: Mutex<HashMap<Uuid, (RequestStatus, Vec<LineItem>)>>,
}

impl Engine {
    fn new(batches: Vec<Batch>) -> Self {
        Self {
            ledger: Mutex::new(batches),
            requests: Mutex::new(HashMap::new()),
        }
    }

    fn submit(&self, request_id: Uuid, items: Vec<LineItem>) {
        self.requests
            .lock()
            .unwrap()
            .insert(request_id, (RequestStatus::Pending, items));
    }

    fn status(&self, request_id: Uuid) -> RequestStatus {
        self.requests.lock().unwrap()[&request_id].0
    }

    fn stock(&self) -> Vec<i32> {
        self.ledger
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.quantity_available)
            .collect()
    }

    /// Accept with a reviewer draft, empty for the default. `after_snapshot`
    /// runs once the pre-commit snapshot is taken, before validation and the
    /// ledger lock
    fn accept(
        &self,
        request_id: Uuid,
        draft: &[BatchAssignment],
        after_snapshot: impl FnOnce(),
    ) -> Result<(), AcceptError> {
        let (status, items) = self.requests.lock().unwrap()[&request_id].clone();
        status.transition(RequestStatus::Accepted)?;

        let snapshot = self.ledger.lock().unwrap().clone();
        after_snapshot();

        let plan = plan_for_accept(&items, &snapshot, draft)?;

        let mut locked = self.ledger.lock().unwrap();
        let mut requests = self.requests.lock().unwrap();
        let entry = requests.get_mut(&request_id).unwrap();
        entry.0.transition(RequestStatus::Accepted)?;

        let reservations = reserve(&locked, &plan)?;
        apply_reservations(&mut locked, &reservations)?;
        entry.0 = RequestStatus::Accepted;
        Ok(())
    }

    fn deny(&self, request_id: Uuid) -> Result<(), AcceptError> {
        let mut requests = self.requests.lock().unwrap();
        let entry = requests.get_mut(&request_id).unwrap();
        entry.0 = entry.0.transition(RequestStatus::Denied)?;
        Ok(())
    }
}

fn item(id: u128, quantity: i32) -> LineItem {
    LineItem {
        item_id: Uuid::from_u128(id),
        product_id: Uuid::from_u128(0xA),
        product_name: "Sourdough loaf".to_string(),
        quantity_requested: quantity,
    }
}

fn batch(id: u128, quantity: i32, expiration: Option<(i32, u32, u32)>) -> Batch {
    Batch {
        id: Uuid::from_u128(id),
        product_id: Uuid::from_u128(0xA),
        quantity_available: quantity,
        expiration_date: expiration.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
        delivery_id: None,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn two_batch_engine() -> Engine {
        Engine::new(vec![
            batch(100, 3, Some((2024, 1, 1))),
            batch(101, 10, Some((2024, 2, 1))),
        ])
    }

    #[test]
    fn test_accept_default_proposal() {
        let engine = two_batch_engine();
        let request = Uuid::from_u128(1);
        engine.submit(request, vec![item(10, 5)]);

        assert_eq!(engine.accept(request, &[], || {}), Ok(()));
        assert_eq!(engine.stock(), vec![0, 8]);
        assert_eq!(engine.status(request), RequestStatus::Accepted);
    }

    #[test]
    fn test_incomplete_draft_keeps_request_pending() {
        let engine = two_batch_engine();
        let request = Uuid::from_u128(1);
        engine.submit(request, vec![item(10, 5)]);

        let draft = [
            BatchAssignment {
                item_id: Uuid::from_u128(10),
                batch_id: Uuid::from_u128(100),
                quantity: 2,
            },
            BatchAssignment {
                item_id: Uuid::from_u128(10),
                batch_id: Uuid::from_u128(101),
                quantity: 2,
            },
        ];

        let result = engine.accept(request, &draft, || {});
        assert!(matches!(
            result,
            Err(AcceptError::Allocation(AllocationError::Incomplete { requested: 5, assigned: 4, .. }))
        ));
        assert_eq!(engine.status(request), RequestStatus::Pending);
        assert_eq!(engine.stock(), vec![3, 10]);
    }

    #[test]
    fn test_concurrent_accepts_on_one_batch() {
        let engine = Engine::new(vec![batch(100, 5, None)]);
        let first = Uuid::from_u128(1);
        let second = Uuid::from_u128(2);
        engine.submit(first, vec![item(10, 5)]);
        engine.submit(second, vec![item(20, 5)]);

        let barrier = Barrier::new(2);
        let (a, b) = thread::scope(|s| {
            let a = s.spawn(|| engine.accept(first, &[], || {
                barrier.wait();
            }));
            let b = s.spawn(|| engine.accept(second, &[], || {
                barrier.wait();
            }));
            (a.join().unwrap(), b.join().unwrap())
        });

        let results = [(first, a), (second, b)];
        let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
        let losers: Vec<_> = results.iter().filter(|(_, r)| r.is_err()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(losers.len(), 1);

        let (loser, err) = losers[0];
        assert!(matches!(
            err,
            Err(AcceptError::Allocation(AllocationError::InsufficientStock { requested: 5, available: 0, .. }))
        ));
        assert_eq!(engine.status(*loser), RequestStatus::Pending);
        assert_eq!(engine.status(winners[0].0), RequestStatus::Accepted);
        assert_eq!(engine.stock(), vec![0]);
    }

    #[test]
    fn test_second_accept_is_already_resolved() {
        let engine = two_batch_engine();
        let request = Uuid::from_u128(1);
        engine.submit(request, vec![item(10, 1)]);

        engine.accept(request, &[], || {}).unwrap();
        match engine.accept(request, &[], || {}) {
            Err(AcceptError::Transition(err)) => {
                assert_eq!(err.from, "accepted");
                assert!(err.to_string().contains("already resolved"));
            }
            other => panic!("expected transition error, got {:?}", other),
        }
        assert_eq!(engine.stock(), vec![2, 10]);
    }

    #[test]
    fn test_deny_leaves_ledger_untouched() {
        let engine = two_batch_engine();
        let request = Uuid::from_u128(1);
        engine.submit(request, vec![item(10, 5)]);

        engine.deny(request).unwrap();
        assert_eq!(engine.status(request), RequestStatus::Denied);
        assert_eq!(engine.stock(), vec![3, 10]);
        assert!(matches!(
            engine.accept(request, &[], || {}),
            Err(AcceptError::Transition(_))
        ));
        assert!(matches!(engine.deny(request), Err(AcceptError::Transition(_))));
    }

    #[test]
    fn test_status_strings_round_trip() {
        for status in [RequestStatus::Pending, RequestStatus::Accepted, RequestStatus::Denied] {
            assert_eq!(RequestStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::from_str("shipped"), None);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        /// However many requests race for a batch, the batch never goes
        /// negative and only the requests it can cover are accepted
        #[test]
        fn test_racing_accepts_never_oversell(
            stock in 0i32..30,
            demands in prop::collection::vec(1i32..10, 1..6),
        ) {
            let engine = Engine::new(vec![batch(100, stock, None)]);
            for (i, demand) in demands.iter().enumerate() {
                engine.submit(Uuid::from_u128(i as u128 + 1), vec![item(1000 + i as u128, *demand)]);
            }

            let barrier = Barrier::new(demands.len());
            let results: Vec<_> = thread::scope(|s| {
                let handles: Vec<_> = (0..demands.len())
                    .map(|i| {
                        let engine = &engine;
                        let barrier = &barrier;
                        s.spawn(move || {
                            engine.accept(Uuid::from_u128(i as u128 + 1), &[], || {
                                barrier.wait();
                            })
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let accepted: i32 = results
                .iter()
                .zip(&demands)
                .filter(|(r, _)| r.is_ok())
                .map(|(_, d)| *d)
                .sum();
            let remaining = engine.stock()[0];

            prop_assert!(remaining >= 0);
            prop_assert_eq!(remaining, stock - accepted);
            for (i, result) in results.iter().enumerate() {
                let status = engine.status(Uuid::from_u128(i as u128 + 1));
                prop_assert_eq!(result.is_ok(), status == RequestStatus::Accepted);
            }
        }
    }
}
