use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) trait MutexExt<T> {
    fn lock_unpoisoned(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn lock_unpoisoned(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn mutex_ext_recovers_from_poison() {
        let lock = Arc::new(Mutex::new(1u32));
        let lock_clone = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = lock_clone.lock().unwrap();
            panic!("poison mutex");
        })
        .join();

        let mut guard = lock.lock_unpoisoned();
        *guard += 1;
        assert_eq!(*guard, 2);
    }
}
