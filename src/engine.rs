//! The sniffer engine: assembler → idle filter → length filter →
//! deduplicator → emitter.
//!
//! One [`Sniffer`] per bus. It owns its configuration copy and all mutable
//! state; the byte source, clock and sink are passed in per call. Nothing is
//! global, so several instances can run side by side. The engine is not
//! meant for concurrent use: a multi-threaded host wraps the whole value in
//! one mutex.

use serde::Serialize;

use crate::assembler::FrameAssembler;
use crate::clock::Clock;
use crate::config::SnifferConfig;
use crate::dedupe::Deduplicator;
use crate::defaults::DEDUPE_CACHE_SIZE;
use crate::emitter::{Emitter, FrameSink};
use crate::filter::{self, Verdict};
use crate::frame::Frame;
use crate::ingest::ByteQueue;

/// What happened to a closed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Emitted,
    IdleDropped,
    ShortDropped,
    Duplicate,
    /// Passed every filter but the sink had no room.
    SinkDropped,
}

/// Diagnostic counters. All wrap on overflow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnifferStats {
    pub bytes_in: u32,
    pub frames_closed: u32,
    pub frames_truncated: u32,
    pub idle_dropped: u32,
    pub short_dropped: u32,
    pub duplicates: u32,
    pub frames_emitted: u32,
    pub sink_dropped: u32,
    pub queue_dropped: u32,
    pub clock_anomalies: u32,
    pub dedupe_evictions: u32,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    bytes_in: u32,
    frames_closed: u32,
    frames_truncated: u32,
    idle_dropped: u32,
    short_dropped: u32,
    duplicates: u32,
    queue_dropped: u32,
}

pub struct Sniffer {
    config: SnifferConfig,
    assembler: FrameAssembler,
    dedupe: Deduplicator<DEDUPE_CACHE_SIZE>,
    emitter: Emitter,
    counters: Counters,
    // Baseline so reset_stats() does not disturb the cache itself.
    evictions_base: u32,
}

impl Sniffer {
    /// Build an engine for a validated configuration.
    pub fn new(config: SnifferConfig) -> Self {
        log::info!(
            "Sniffer: min_gap {} us, max_burst_len {}, min_length {}, dedupe {} ms, idle filter {} ({} codes)",
            config.min_gap_us,
            config.max_burst_len,
            config.min_length,
            config.dedupe_ms,
            if config.idle_filter { "on" } else { "off" },
            config.idle_bytes.len(),
        );
        Self {
            assembler: FrameAssembler::new(&config),
            dedupe: Deduplicator::new(&config),
            emitter: Emitter::new(),
            counters: Counters::default(),
            evictions_base: 0,
            config,
        }
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    /// Feed one byte. Returns the fate of the frame it closed, if any.
    pub fn push<S: FrameSink + ?Sized>(
        &mut self,
        byte: u8,
        ts_us: u64,
        sink: &mut S,
    ) -> Option<Disposition> {
        self.counters.bytes_in = self.counters.bytes_in.wrapping_add(1);
        let frame = self.assembler.push(byte, ts_us)?;
        Some(self.process(&frame, sink))
    }

    /// Close the open frame if the bus has been idle for `min_gap_us`.
    pub fn poll<S: FrameSink + ?Sized>(&mut self, now_us: u64, sink: &mut S) -> Option<Disposition> {
        let frame = self.assembler.poll(now_us)?;
        Some(self.process(&frame, sink))
    }

    /// Shutdown: close and process any pending frame.
    pub fn flush<S: FrameSink + ?Sized>(&mut self, sink: &mut S) -> Option<Disposition> {
        let frame = self.assembler.flush()?;
        log::debug!("Flushed pending frame of {} bytes", frame.len());
        Some(self.process(&frame, sink))
    }

    /// Drain every queued byte into the pipeline. Returns bytes consumed.
    pub fn drain<S: FrameSink + ?Sized, const N: usize>(
        &mut self,
        queue: &mut ByteQueue<N>,
        sink: &mut S,
    ) -> usize {
        self.record_queue_drops(queue.take_dropped());
        let mut consumed = 0;
        while let Some(event) = queue.pop() {
            self.push(event.value, event.ts_us, sink);
            consumed += 1;
        }
        consumed
    }

    /// One scheduling tick: drain the queue, then check for an idle close.
    pub fn service<S: FrameSink + ?Sized, C: Clock, const N: usize>(
        &mut self,
        queue: &mut ByteQueue<N>,
        clock: &C,
        sink: &mut S,
    ) -> usize {
        let consumed = self.drain(queue, sink);
        self.poll(clock.now_us(), sink);
        consumed
    }

    /// Account for byte events a shared queue discarded on overflow.
    pub fn record_queue_drops(&mut self, dropped: u32) {
        if dropped > 0 {
            log::warn!("Byte queue overflow, {} bytes lost", dropped);
            self.counters.queue_dropped = self.counters.queue_dropped.wrapping_add(dropped);
        }
    }

    /// True while a frame is being accumulated.
    pub fn frame_open(&self) -> bool {
        self.assembler.is_open()
    }

    pub fn stats(&self) -> SnifferStats {
        let c = &self.counters;
        SnifferStats {
            bytes_in: c.bytes_in,
            frames_closed: c.frames_closed,
            frames_truncated: c.frames_truncated,
            idle_dropped: c.idle_dropped,
            short_dropped: c.short_dropped,
            duplicates: c.duplicates,
            frames_emitted: self.emitter.emitted(),
            sink_dropped: self.emitter.dropped(),
            queue_dropped: c.queue_dropped,
            clock_anomalies: self.assembler.clock_anomalies(),
            dedupe_evictions: self.dedupe.evictions().wrapping_sub(self.evictions_base),
        }
    }

    /// Zero the diagnostic counters. Frame and cache state are kept.
    pub fn reset_stats(&mut self) {
        self.counters = Counters::default();
        self.emitter.reset();
        self.assembler.reset_counters();
        self.evictions_base = self.dedupe.evictions();
    }

    fn process<S: FrameSink + ?Sized>(&mut self, frame: &Frame, sink: &mut S) -> Disposition {
        let c = &mut self.counters;
        c.frames_closed = c.frames_closed.wrapping_add(1);
        if frame.truncated() {
            c.frames_truncated = c.frames_truncated.wrapping_add(1);
        }

        match filter::evaluate(frame, &self.config) {
            Verdict::Idle => {
                c.idle_dropped = c.idle_dropped.wrapping_add(1);
                return Disposition::IdleDropped;
            }
            Verdict::Short => {
                c.short_dropped = c.short_dropped.wrapping_add(1);
                return Disposition::ShortDropped;
            }
            Verdict::Pass => {}
        }

        if !self.dedupe.accept(frame, frame.end_us()) {
            c.duplicates = c.duplicates.wrapping_add(1);
            return Disposition::Duplicate;
        }

        if self.emitter.emit(frame, sink) {
            Disposition::Emitted
        } else {
            Disposition::SinkDropped
        }
    }
}
