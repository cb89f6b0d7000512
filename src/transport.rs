//! Transport/timebase state: tempo, meter, rolling flag, and the running tick used to drive an
//! LV2 `time:Position` atom and (when acting as JACK timebase master) the server's timebase
//! callback. Grounded in `effects.c`'s `UpdateGlobalJackPosition`/`JackTimebase`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::atomic::AtomicType;

pub const DEFAULT_BEATS_PER_BAR: f64 = 4.0;
pub const DEFAULT_BEATS_PER_MINUTE: f64 = 120.0;
pub const TICKS_PER_BEAT: f64 = 1920.0;
pub const BEAT_TYPE: f64 = 4.0;

/// Single-writer/multiple-reader transport scalars. Writers are the control surface
/// (`transport()`) and the MIDI dispatcher (CC mapped to `:bpb`/`:bpm`/`:rolling`); readers are
/// every RT process callback, which snapshots these once at the top of each cycle.
pub struct TransportState {
    bpb: <f64 as AtomicType>::AtomicType,
    bpm: <f64 as AtomicType>::AtomicType,
    rolling: AtomicBool,
    reset: AtomicBool,
    /// Absolute frame counter driven by the audio server; advanced by whichever caller queries
    /// the server's transport position each cycle (see `audio_server.rs`).
    frame: AtomicU64,
}

impl TransportState {
    pub fn new() -> Self {
        Self {
            bpb: DEFAULT_BEATS_PER_BAR.new_atomic(),
            bpm: DEFAULT_BEATS_PER_MINUTE.new_atomic(),
            rolling: AtomicBool::new(false),
            reset: AtomicBool::new(true),
            frame: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            rolling: self.rolling.load(Ordering::Acquire),
            bpb: self.bpb.load(Ordering::Acquire),
            bpm: self.bpm.load(Ordering::Acquire),
            frame: self.frame.load(Ordering::Acquire),
        }
    }

    pub fn set_bpb(&self, bpb: f64) {
        self.bpb.store(bpb, Ordering::Release);
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.bpm.store(bpm, Ordering::Release);
    }

    pub fn set_rolling(&self, rolling: bool) {
        self.rolling.store(rolling, Ordering::Release);
        if !rolling {
            self.request_reset();
        }
    }

    pub fn set_frame(&self, frame: u64) {
        self.frame.store(frame, Ordering::Release);
    }

    pub fn request_reset(&self) {
        self.reset.store(true, Ordering::Release);
    }

    /// Consumes the reset flag: returns whether a reset was pending and clears it.
    pub fn take_reset(&self) -> bool {
        self.reset.swap(false, Ordering::AcqRel)
    }

    /// Applies a `transport(rolling, bpb, bpm)` control-surface call.
    pub fn apply(&self, rolling: bool, bpb: f64, bpm: f64) {
        self.set_bpb(bpb);
        self.set_bpm(bpm);
        self.set_rolling(rolling);
        self.request_reset();
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    pub rolling: bool,
    pub bpb: f64,
    pub bpm: f64,
    pub frame: u64,
}

impl TransportSnapshot {
    /// Bar/beat/tick decomposition used to fill a `time:Position` atom or the
    /// JACK timebase callback's `jack_position_t`.
    pub fn bars_beats_ticks(&self, sample_rate: f64) -> BarsBeatsTicks {
        let seconds = self.frame as f64 / sample_rate;
        let ticks_per_second = self.bpm * TICKS_PER_BEAT / 60.0;
        let abs_tick = seconds * ticks_per_second;

        let ticks_per_bar = TICKS_PER_BEAT * self.bpb;
        let bar = (abs_tick / ticks_per_bar).floor();
        let tick_in_bar = abs_tick - bar * ticks_per_bar;
        let beat = (tick_in_bar / TICKS_PER_BEAT).floor();
        let tick = tick_in_bar - beat * TICKS_PER_BEAT;

        BarsBeatsTicks {
            bar: bar as i32,
            beat: beat as i32,
            tick,
            bar_beat: beat as f64 + tick / TICKS_PER_BEAT,
        }
    }

    /// Advances the running tick by `nframes` at the current tempo, used when this host is the
    /// JACK timebase master and no reset/relocate has been requested this cycle.
    pub fn advance_tick(&self, current_tick: f64, nframes: u32, sample_rate: f64) -> f64 {
        current_tick + nframes as f64 * TICKS_PER_BEAT * self.bpm / (sample_rate * 60.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarsBeatsTicks {
    pub bar: i32,
    pub beat: i32,
    pub tick: f64,
    pub bar_beat: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_scalars_and_reset_flag() {
        let t = TransportState::new();
        assert!(t.take_reset()); // starts pending
        assert!(!t.take_reset()); // consumed

        t.apply(true, 3.0, 140.0);
        let snap = t.snapshot();
        assert!(snap.rolling);
        assert_eq!(snap.bpb, 3.0);
        assert_eq!(snap.bpm, 140.0);
        assert!(t.take_reset());
    }

    #[test]
    fn stopping_requests_a_reset() {
        let t = TransportState::new();
        t.take_reset();
        t.set_rolling(true);
        t.take_reset();
        assert!(!t.take_reset());
        t.set_rolling(false);
        assert!(t.take_reset());
    }
}
