use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colonnade::engine::borrow::{BorrowGuard, BorrowTracker};
use colonnade::engine::error::ExecutionError;
use colonnade::engine::types::AccessSets;

fn access(reads: &[u16], writes: &[u16]) -> AccessSets {
    let mut sets = AccessSets::default();
    for &id in reads {
        sets.read.set(id);
    }
    for &id in writes {
        sets.write.set(id);
    }
    sets
}

#[test]
fn readers_share_and_writers_exclude() {
    let tracker = BorrowTracker::new();

    assert!(tracker.try_acquire_read(3));
    assert!(tracker.try_acquire_read(3));
    assert!(!tracker.try_acquire_write(3));

    tracker.release_read(3);
    tracker.release_read(3);
    assert!(tracker.try_acquire_write(3));
    assert!(!tracker.try_acquire_read(3));
    assert!(!tracker.try_acquire_write(3));

    tracker.release_write(3);
    assert!(tracker.is_idle());
}

#[test]
fn guard_releases_everything_on_drop() {
    let tracker = BorrowTracker::new();
    {
        let _guard = BorrowGuard::new(&tracker, &access(&[1, 2], &[5])).unwrap();
        assert!(!tracker.is_idle());
        assert!(tracker.try_acquire_read(1));
        tracker.release_read(1);
        assert!(!tracker.try_acquire_read(5));
    }
    assert!(tracker.is_idle());
}

#[test]
fn guard_rejects_read_and_write_of_one_component() {
    let tracker = BorrowTracker::new();
    let result = BorrowGuard::new(&tracker, &access(&[4], &[4]));
    assert!(matches!(result, Err(ExecutionError::InvalidQueryAccess { component_id: 4, .. })));
    assert!(tracker.is_idle());
}

#[test]
fn conflicting_guard_waits_for_the_holder() {
    let tracker = BorrowTracker::new();
    let released = AtomicBool::new(false);

    std::thread::scope(|scope| {
        let holder = BorrowGuard::new(&tracker, &access(&[], &[7])).unwrap();

        scope.spawn(|| {
            let _waiter = BorrowGuard::new(&tracker, &access(&[0, 7], &[])).unwrap();
            assert!(released.load(Ordering::SeqCst));
        });

        std::thread::sleep(Duration::from_millis(20));
        released.store(true, Ordering::SeqCst);
        drop(holder);
    });

    assert!(tracker.is_idle());
}
