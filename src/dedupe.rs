//! Sliding-window duplicate suppression.
//!
//! Remembers the fingerprint of recent frames with the time each was last
//! seen. A frame whose fingerprint was seen less than `dedupe_ms` ago is
//! suppressed, and every sighting (suppressed or not) restarts its window.
//! The next copy is therefore allowed only `dedupe_ms` after the most recent
//! one, not after the first.
//!
//! Staleness is always decided by comparing timestamps, so evicting an entry
//! can at worst let a duplicate through; it never suppresses a new frame.

use heapless::Vec;

use crate::config::SnifferConfig;
use crate::frame::Frame;

#[derive(Debug, Clone, Copy)]
struct Entry {
    fingerprint: u64,
    last_seen_us: u64,
}

/// Fixed-size recent frame cache holding up to `N` fingerprints.
pub struct Deduplicator<const N: usize> {
    window_us: u64,
    entries: Vec<Entry, N>,
    evictions: u32,
}

impl<const N: usize> Deduplicator<N> {
    pub fn new(config: &SnifferConfig) -> Self {
        Self::with_window(config.dedupe_window_us())
    }

    pub fn with_window(window_us: u64) -> Self {
        Self {
            window_us,
            entries: Vec::new(),
            evictions: 0,
        }
    }

    /// Returns true if the frame should be emitted. `now_us` is the frame's
    /// end timestamp.
    pub fn accept(&mut self, frame: &Frame, now_us: u64) -> bool {
        self.accept_fingerprint(frame.fingerprint(), now_us)
    }

    pub fn accept_fingerprint(&mut self, fingerprint: u64, now_us: u64) -> bool {
        let window_us = self.window_us;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.fingerprint == fingerprint) {
            let fresh = now_us.saturating_sub(entry.last_seen_us) >= window_us;
            entry.last_seen_us = entry.last_seen_us.max(now_us);
            return fresh;
        }

        self.insert(fingerprint, now_us);
        true
    }

    /// Number of fingerprints currently held, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries evicted to make room before their window expired.
    pub fn evictions(&self) -> u32 {
        self.evictions
    }

    fn insert(&mut self, fingerprint: u64, now_us: u64) {
        if self.entries.is_full() {
            let window_us = self.window_us;
            self.entries
                .retain(|e| now_us.saturating_sub(e.last_seen_us) < window_us);
        }
        if self.entries.is_full() {
            // Nothing stale: drop the least recently seen.
            if let Some((idx, _)) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_seen_us)
            {
                self.entries.swap_remove(idx);
                self.evictions = self.evictions.wrapping_add(1);
            }
        }
        let _ = self.entries.push(Entry {
            fingerprint,
            last_seen_us: now_us,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::test_frame;

    const MS: u64 = 1_000;

    fn dedupe() -> Deduplicator<8> {
        Deduplicator::with_window(200 * MS)
    }

    #[test]
    fn first_sighting_accepted() {
        let mut d = dedupe();
        assert!(d.accept(&test_frame(&[0xAA, 0xBB, 0xCC], 0, 0), 0));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn repeat_within_window_suppressed_and_window_slides() {
        let mut d = dedupe();
        let frame = test_frame(&[0xAA, 0xBB, 0xCC], 0, 0);
        assert!(d.accept(&frame, 0));
        assert!(!d.accept(&frame, 150 * MS));
        // 250 ms after the first but only 100 ms after the last occurrence.
        assert!(!d.accept(&frame, 250 * MS));
        // 250 ms after the last occurrence (at 250 ms).
        assert!(d.accept(&frame, 500 * MS));
    }

    #[test]
    fn repeat_250ms_after_last_occurrence_emitted() {
        let mut d = dedupe();
        let frame = test_frame(&[0xAA, 0xBB, 0xCC], 0, 0);
        assert!(d.accept(&frame, 0));
        assert!(!d.accept(&frame, 150 * MS));
        assert!(d.accept(&frame, 400 * MS));
    }

    #[test]
    fn repeat_at_exact_window_emitted() {
        let mut d = dedupe();
        let frame = test_frame(&[1, 2, 3], 0, 0);
        assert!(d.accept(&frame, 10 * MS));
        assert!(!d.accept(&frame, 209 * MS + 999));
        assert!(d.accept(&frame, 409 * MS + 999));
    }

    #[test]
    fn distinct_frames_independent() {
        let mut d = dedupe();
        assert!(d.accept(&test_frame(&[1, 2, 3], 0, 0), 0));
        assert!(d.accept(&test_frame(&[1, 2, 4], 0, 0), 1 * MS));
        assert!(!d.accept(&test_frame(&[1, 2, 3], 0, 0), 2 * MS));
    }

    #[test]
    fn full_cache_purges_stale_first() {
        let mut d: Deduplicator<2> = Deduplicator::with_window(200 * MS);
        assert!(d.accept_fingerprint(1, 0));
        assert!(d.accept_fingerprint(2, 300 * MS));
        // fp 1 is stale at 300 ms; inserting fp 3 must not evict live fp 2.
        assert!(d.accept_fingerprint(3, 300 * MS));
        assert_eq!(d.len(), 2);
        assert_eq!(d.evictions(), 0);
        assert!(!d.accept_fingerprint(2, 310 * MS));
    }

    #[test]
    fn full_cache_evicts_least_recent_when_nothing_stale() {
        let mut d: Deduplicator<2> = Deduplicator::with_window(200 * MS);
        assert!(d.accept_fingerprint(1, 0));
        assert!(d.accept_fingerprint(2, 10 * MS));
        assert!(d.accept_fingerprint(3, 20 * MS));
        assert_eq!(d.len(), 2);
        assert_eq!(d.evictions(), 1);
        // fp 1 was evicted, so its repeat is let through rather than suppressed.
        assert!(d.accept_fingerprint(1, 30 * MS));
        assert!(!d.accept_fingerprint(3, 40 * MS));
    }

    #[test]
    fn sustained_unique_traffic_stays_bounded() {
        let mut d: Deduplicator<4> = Deduplicator::with_window(200 * MS);
        for fp in 0..1000u64 {
            assert!(d.accept_fingerprint(fp, fp * MS));
            assert!(d.len() <= 4);
        }
    }
}
