//! The postponed-event queue: the handoff between RT producers (the process callback and the
//! MIDI dispatcher) and the feedback thread (`feedback.rs`). Grounded in `effects.c`'s
//! `PostPonedEvent`/`RunPostPonedEvents`/`ShouldIgnorePostPonedEvent`.
//!
//! The original links nodes into an intrusive doubly-linked list to avoid allocating on the RT
//! thread. In Rust, `PostponedEvent` is a small `Copy` enum with no owned heap data, so a
//! preallocated `VecDeque` that never grows past its initial capacity gives the same guarantee
//! with far less code; [`RtPool`] still tracks the capacity bound so pool exhaustion is visible
//! and testable independent of the queue's own bookkeeping.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::rt_pool::RtPool;

pub const MAX_POSTPONED_EVENTS: usize = 1024;

/// The instance id used to mean "ignore nothing" when draining, and the sentinel the original
/// implementation uses for its idle feedback-thread wakeups.
pub const IGNORE_NONE: i32 = -3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostponedEvent {
    ParamSet {
        instance: i32,
        symbol: u32,
        value: f32,
    },
    OutputMonitor {
        instance: i32,
        symbol: u32,
        value: f32,
    },
    MidiMap {
        instance: i32,
        symbol: u32,
        channel: u8,
        controller: u8,
        value: f32,
        min: f32,
        max: f32,
    },
    ProgramListen {
        channel: u8,
        value: u8,
    },
    Transport {
        rolling: bool,
        bpb: f64,
        bpm: f64,
    },
}

impl Default for PostponedEvent {
    fn default() -> Self {
        PostponedEvent::ParamSet {
            instance: IGNORE_NONE,
            symbol: 0,
            value: 0.0,
        }
    }
}

impl PostponedEvent {
    fn instance(&self) -> Option<i32> {
        match self {
            PostponedEvent::ParamSet { instance, .. }
            | PostponedEvent::OutputMonitor { instance, .. }
            | PostponedEvent::MidiMap { instance, .. } => Some(*instance),
            PostponedEvent::ProgramListen { .. } | PostponedEvent::Transport { .. } => None,
        }
    }

    /// `(symbol, kind-discriminant)` used by the drain's coalescing predicate.
    fn coalesce_key(&self) -> Option<(i32, u32, u8)> {
        match self {
            PostponedEvent::ParamSet {
                instance, symbol, ..
            } => Some((*instance, *symbol, 0)),
            PostponedEvent::OutputMonitor {
                instance, symbol, ..
            } => Some((*instance, *symbol, 1)),
            _ => None,
        }
    }
}

pub struct PostponedQueue {
    pool: RtPool<PostponedEvent>,
    queue: Mutex<VecDeque<PostponedEvent>>,
    wake: crossbeam::channel::Sender<()>,
    pub wake_rx: crossbeam::channel::Receiver<()>,
}

impl PostponedQueue {
    pub fn new() -> Self {
        let (wake, wake_rx) = crossbeam::channel::bounded(1);
        Self {
            pool: RtPool::new(MAX_POSTPONED_EVENTS),
            queue: Mutex::new(VecDeque::with_capacity(MAX_POSTPONED_EVENTS)),
            wake,
            wake_rx,
        }
    }

    /// Allocates from the pool and appends to the queue under the short queue mutex. Silently
    /// drops the event if the pool is exhausted rather than blocking the RT thread on growth.
    /// Does not post the wake semaphore — callers batch several pushes per RT cycle and post once
    /// (see `process.rs` Phase F, `midi.rs` dispatch).
    pub fn push(&self, event: PostponedEvent) {
        let Some(event) = self.pool.allocate_atomic(event) else {
            return;
        };
        let mut queue = self.queue.lock();
        queue.push_back(event);
    }

    /// Posts the wake signal once; coalesces multiple posts between wakeups into one, just like a
    /// counting semaphore capped at 1 pending wakeup would from the feedback thread's point of
    /// view (it drains everything on each wakeup regardless of the count).
    pub fn notify(&self) {
        let _ = self.wake.try_send(());
    }

    /// Splices the entire queue into a local `Vec` under `Q`, releasing `Q` before iterating.
    fn splice(&self) -> Vec<PostponedEvent> {
        let mut queue = self.queue.lock();
        queue.drain(..).collect()
    }

    /// Runs one drain pass: splice, iterate newest-first, apply the coalescing predicate, return
    /// nodes to the pool. `ignored` is an instance id to skip entirely (used by `remove(id)` to
    /// guarantee no more feedback for a disappearing instance).
    pub fn drain(&self, ignored: i32, mut emit: impl FnMut(PostponedEvent)) {
        let spliced = self.splice();

        let mut last_coalesce_key: Option<(i32, u32, u8)> = None;
        let mut seen: Vec<(i32, u32, u8)> = Vec::new();
        let mut got_program_listen = false;
        let mut got_transport = false;

        for event in spliced.into_iter().rev() {
            if event.instance() == Some(ignored) {
                self.pool.deallocate(event);
                continue;
            }

            let should_emit = match &event {
                PostponedEvent::ParamSet { .. } | PostponedEvent::OutputMonitor { .. } => {
                    let key = event.coalesce_key().unwrap();
                    if last_coalesce_key == Some(key) || seen.contains(&key) {
                        false
                    } else {
                        last_coalesce_key = Some(key);
                        seen.push(key);
                        true
                    }
                }
                PostponedEvent::ProgramListen { .. } => {
                    let first = !got_program_listen;
                    got_program_listen = true;
                    first
                }
                PostponedEvent::Transport { .. } => {
                    let first = !got_transport;
                    got_transport = true;
                    first
                }
                PostponedEvent::MidiMap { .. } => true,
            };

            if should_emit {
                emit(event);
            }
            self.pool.deallocate(event);
        }
    }
}

impl Default for PostponedQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_param_set_per_instance_symbol_newest_first() {
        let q = PostponedQueue::new();
        for v in 0..5 {
            q.push(PostponedEvent::ParamSet {
                instance: 4,
                symbol: 1,
                value: v as f32,
            });
        }

        let mut emitted = Vec::new();
        q.drain(IGNORE_NONE, |e| emitted.push(e));

        assert_eq!(emitted.len(), 1);
        match emitted[0] {
            PostponedEvent::ParamSet { value, .. } => assert_eq!(value, 4.0),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ignored_instance_is_skipped_and_freed() {
        let q = PostponedQueue::new();
        q.push(PostponedEvent::ParamSet {
            instance: 7,
            symbol: 1,
            value: 1.0,
        });
        q.push(PostponedEvent::ParamSet {
            instance: 8,
            symbol: 1,
            value: 2.0,
        });

        let mut emitted = Vec::new();
        q.drain(7, |e| emitted.push(e));

        assert_eq!(emitted.len(), 1);
        match emitted[0] {
            PostponedEvent::ParamSet { instance, .. } => assert_eq!(instance, 8),
            _ => panic!("wrong variant"),
        }
        assert_eq!(q.pool.available(), MAX_POSTPONED_EVENTS);
    }

    #[test]
    fn midi_map_always_emitted() {
        let q = PostponedQueue::new();
        for _ in 0..3 {
            q.push(PostponedEvent::MidiMap {
                instance: 1,
                symbol: 1,
                channel: 0,
                controller: 7,
                value: 0.5,
                min: 0.0,
                max: 1.0,
            });
        }
        let mut count = 0;
        q.drain(IGNORE_NONE, |_| count += 1);
        assert_eq!(count, 3);
    }

    #[test]
    fn program_listen_and_transport_emit_only_newest() {
        let q = PostponedQueue::new();
        q.push(PostponedEvent::ProgramListen { channel: 0, value: 1 });
        q.push(PostponedEvent::ProgramListen { channel: 0, value: 2 });
        q.push(PostponedEvent::Transport {
            rolling: true,
            bpb: 4.0,
            bpm: 120.0,
        });
        q.push(PostponedEvent::Transport {
            rolling: false,
            bpb: 4.0,
            bpm: 120.0,
        });

        let mut emitted = Vec::new();
        q.drain(IGNORE_NONE, |e| emitted.push(e));
        assert_eq!(emitted.len(), 2);
    }
}
