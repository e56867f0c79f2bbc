//! A small least-recently-written handle table, generic over the key and
//! value the caller wants to keep open. The Archive multiplexer (spec.md
//! §5) is the only user today, but the eviction policy itself — "close the
//! group that hasn't been touched the longest" — doesn't know anything
//! about paths or files, so it lives here rather than inline in
//! `archive.rs`.

use rustc_hash::FxHashMap;
use std::hash::Hash;

struct Entry<V> {
    value: V,
    last_touched: u64,
}

pub struct FdTable<K, V> {
    entries: FxHashMap<K, Entry<V>>,
    cap: usize,
    clock: u64,
}

impl<K: Eq + Hash + Clone, V> FdTable<K, V> {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            entries: FxHashMap::default(),
            cap: cap.max(1),
            clock: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Touches `key`, refreshing its recency, and returns its value.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.clock += 1;
        let clock = self.clock;
        self.entries.get_mut(key).map(|e| {
            e.last_touched = clock;
            &mut e.value
        })
    }

    /// Inserts `value` under `key`, evicting the least-recently-touched
    /// entry first if the table is at capacity and `key` is not already
    /// present. The evicted `(key, value)` pair, if any, is handed to
    /// `on_evict` so the caller can flush/close it before it's dropped.
    pub fn insert(&mut self, key: K, value: V, mut on_evict: impl FnMut(K, V)) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.cap {
            if let Some(lru_key) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_touched)
                .map(|(k, _)| k.clone())
            {
                if let Some(entry) = self.entries.remove(&lru_key) {
                    on_evict(lru_key, entry.value);
                }
            }
        }
        self.clock += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                last_touched: self.clock,
            },
        );
    }

    /// Drains every remaining entry, handing each to `on_close` in
    /// arbitrary order. Used to flush/close everything still open at
    /// program end.
    pub fn drain(&mut self, mut on_close: impl FnMut(K, V)) {
        for (key, entry) in self.entries.drain() {
            on_close(key, entry.value);
        }
    }
}

/// Raises the process's soft `RLIMIT_NOFILE` toward `target`, never above
/// the hard limit, and returns the resulting soft limit (spec.md §5: "the
/// process's soft RLIMIT_NOFILE is raised toward (input_file_count +
/// archive_cap + headroom)"). A no-op returning `target` on non-unix
/// targets, where the concept doesn't exist.
#[cfg(unix)]
pub fn raise_nofile_limit(target: u64) -> crate::Result<u64> {
    let mut lim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `lim` is a valid, fully-initialized `libc::rlimit` and
    // `RLIMIT_NOFILE` is a resource every POSIX target recognizes.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) } != 0 {
        return Err(crate::Error::ResourceExhaustion(
            "getrlimit(RLIMIT_NOFILE) failed".into(),
        ));
    }

    if lim.rlim_cur >= target as libc::rlim_t {
        return Ok(lim.rlim_cur as u64);
    }

    let desired = (target as libc::rlim_t).min(lim.rlim_max);
    let mut raised = lim;
    raised.rlim_cur = desired;
    // SAFETY: same as above; `raised` keeps `rlim_max` unchanged and only
    // lowers/raises `rlim_cur` within it.
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &raised) } != 0 {
        log::warn!("setrlimit(RLIMIT_NOFILE, {desired}) failed, continuing with {}", lim.rlim_cur);
        return Ok(lim.rlim_cur as u64);
    }
    Ok(desired as u64)
}

#[cfg(not(unix))]
pub fn raise_nofile_limit(target: u64) -> crate::Result<u64> {
    Ok(target)
}
