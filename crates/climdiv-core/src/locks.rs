//! Per-output-path write lock registry.
//!
//! Multiple comparison runs inside one process may target the same store;
//! writes to a given store must be serialized while runs against different
//! stores proceed independently. The registry maps an output path to its
//! own mutex so unrelated stores never contend with each other.
//!
//! The guard returned by [`acquire`] is scoped: it is released on every
//! exit path, including panics and early returns. A poisoned lock is
//! recovered rather than propagated, since a writer that panicked mid-run
//! leaves at worst a partially written row and subsequent writers overwrite
//! whole rows.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();

/// Look up (or create) the write lock for the given output path.
///
/// The same path always yields the same lock within one process; distinct
/// paths yield distinct locks.
pub fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    map.entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Acquire a path lock, recovering from poisoning.
pub fn acquire(lock: &Arc<Mutex<()>>) -> MutexGuard<'_, ()> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn same_path_yields_same_lock() {
        let a = path_lock(Path::new("/tmp/store_a"));
        let b = path_lock(Path::new("/tmp/store_a"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_paths_do_not_contend() {
        let a = path_lock(Path::new("/tmp/store_left"));
        let b = path_lock(Path::new("/tmp/store_right"));
        assert!(!Arc::ptr_eq(&a, &b));

        // Holding one must not block acquiring the other.
        let _guard_a = acquire(&a);
        let _guard_b = acquire(&b);
    }

    #[test]
    fn lock_serializes_writers_on_one_path() {
        let lock = path_lock(Path::new("/tmp/store_serial"));
        let counter = Arc::new(Mutex::new(0u32));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    let _guard = acquire(&lock);
                    let mut c = match counter.lock() {
                        Ok(g) => g,
                        Err(p) => p.into_inner(),
                    };
                    *c += 1;
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("writer thread panicked");
        }
        let c = match counter.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        assert_eq!(*c, 8);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = path_lock(Path::new("/tmp/store_poison"));
        {
            let lock = Arc::clone(&lock);
            let _ = thread::spawn(move || {
                let _guard = acquire(&lock);
                panic!("poison the lock");
            })
            .join();
        }

        // Must not deadlock or panic.
        let _guard = acquire(&lock);
    }
}
