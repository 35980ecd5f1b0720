//! In-memory list store for tests/dev.
//!
//! Every primitive runs under one mutex, so each is trivially atomic. Blocking
//! moves park on a condvar that is signalled whenever something is pushed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{ListStore, ListStoreError};

#[derive(Debug, Default)]
pub struct InMemoryListStore {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Condvar,
}

impl InMemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lists(&self) -> MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_locked(lists: &mut HashMap<String, VecDeque<String>>, key: &str, value: String) {
        lists.entry(key.to_string()).or_default().push_front(value);
    }

    fn pop_tail_locked(lists: &mut HashMap<String, VecDeque<String>>, key: &str) -> Option<String> {
        let list = lists.get_mut(key)?;
        let value = list.pop_back();
        // Missing and empty lists are the same thing.
        if list.is_empty() {
            lists.remove(key);
        }
        value
    }
}

impl ListStore for InMemoryListStore {
    fn push(&self, key: &str, value: &str) -> Result<(), ListStoreError> {
        let mut lists = self.lists();
        Self::push_locked(&mut lists, key, value.to_string());
        self.pushed.notify_all();
        Ok(())
    }

    fn move_tail_to_head(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ListStoreError> {
        // `None` when the timeout is past what `Instant` can represent: wait
        // without a deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut lists = self.lists();

        loop {
            if let Some(value) = Self::pop_tail_locked(&mut lists, src) {
                Self::push_locked(&mut lists, dst, value.clone());
                self.pushed.notify_all();
                return Ok(Some(value));
            }

            lists = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.pushed
                        .wait_timeout(lists, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .pushed
                    .wait(lists)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn remove_and_push(
        &self,
        src: &str,
        value: &str,
        dst: &str,
        replacement: &str,
    ) -> Result<bool, ListStoreError> {
        let mut lists = self.lists();

        let Some(list) = lists.get_mut(src) else {
            return Ok(false);
        };
        let Some(pos) = list.iter().position(|v| v == value) else {
            return Ok(false);
        };
        list.remove(pos);
        if list.is_empty() {
            lists.remove(src);
        }

        Self::push_locked(&mut lists, dst, replacement.to_string());
        self.pushed.notify_all();
        Ok(true)
    }

    fn len(&self, key: &str) -> Result<usize, ListStoreError> {
        Ok(self.lists().get(key).map_or(0, VecDeque::len))
    }

    fn range(&self, key: &str, limit: Option<usize>) -> Result<Vec<String>, ListStoreError> {
        let lists = self.lists();
        let Some(list) = lists.get(key) else {
            return Ok(Vec::new());
        };
        let take = limit.unwrap_or(list.len());
        Ok(list.iter().take(take).cloned().collect())
    }

    fn delete(&self, key: &str) -> Result<usize, ListStoreError> {
        Ok(self.lists().remove(key).map_or(0, |list| list.len()))
    }

    fn ping(&self) -> Result<(), ListStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn push_and_move_is_fifo() {
        let store = InMemoryListStore::new();
        store.push("q", "a").unwrap();
        store.push("q", "b").unwrap();

        let first = store.move_tail_to_head("q", "q:processing", Duration::ZERO).unwrap();
        assert_eq!(first.as_deref(), Some("a"));
        assert_eq!(store.range("q", None).unwrap(), vec!["b".to_string()]);
        assert_eq!(store.range("q:processing", None).unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn move_times_out_on_empty_list() {
        let store = InMemoryListStore::new();
        let started = Instant::now();
        let moved = store
            .move_tail_to_head("q", "q:processing", Duration::from_millis(30))
            .unwrap();

        assert!(moved.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn blocked_move_wakes_on_push() {
        let store = InMemoryListStore::arc();
        let consumer = {
            let store = store.clone();
            thread::spawn(move || {
                store.move_tail_to_head("q", "q:processing", Duration::from_secs(5))
            })
        };

        thread::sleep(Duration::from_millis(20));
        store.push("q", "late").unwrap();

        let moved = consumer.join().unwrap().unwrap();
        assert_eq!(moved.as_deref(), Some("late"));
    }

    #[test]
    fn unrepresentable_timeout_does_not_panic() {
        let store = InMemoryListStore::new();
        store.push("q", "a").unwrap();

        let moved = store
            .move_tail_to_head("q", "q:processing", Duration::MAX)
            .unwrap();
        assert_eq!(moved.as_deref(), Some("a"));
    }

    #[test]
    fn unbounded_wait_still_wakes_on_push() {
        let store = InMemoryListStore::arc();
        let consumer = {
            let store = store.clone();
            thread::spawn(move || store.move_tail_to_head("q", "q:processing", Duration::MAX))
        };

        thread::sleep(Duration::from_millis(20));
        store.push("q", "late").unwrap();

        let moved = consumer.join().unwrap().unwrap();
        assert_eq!(moved.as_deref(), Some("late"));
    }

    #[test]
    fn remove_and_push_only_pushes_when_found() {
        let store = InMemoryListStore::new();
        store.push("src", "x").unwrap();
        store.push("src", "x").unwrap();

        assert!(store.remove_and_push("src", "x", "dst", "y").unwrap());
        assert_eq!(store.len("src").unwrap(), 1);
        assert_eq!(store.range("dst", None).unwrap(), vec!["y".to_string()]);

        assert!(!store.remove_and_push("src", "missing", "dst", "z").unwrap());
        assert_eq!(store.len("dst").unwrap(), 1);
    }

    #[test]
    fn delete_reports_prior_length() {
        let store = InMemoryListStore::new();
        for v in ["a", "b", "c"] {
            store.push("q", v).unwrap();
        }

        assert_eq!(store.delete("q").unwrap(), 3);
        assert_eq!(store.delete("q").unwrap(), 0);
        assert_eq!(store.len("q").unwrap(), 0);
    }

    #[test]
    fn range_is_newest_first_and_limited() {
        let store = InMemoryListStore::new();
        for v in ["a", "b", "c"] {
            store.push("q", v).unwrap();
        }

        assert_eq!(
            store.range("q", Some(2)).unwrap(),
            vec!["c".to_string(), "b".to_string()]
        );
    }
}
