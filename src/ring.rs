//! The control-thread → RT event ring, a thin wrapper around [`rtrb`]'s single-producer
//! single-consumer ring buffer. `effects.c` hand-rolls this with raw `jack_ringbuffer_t` plumbing;
//! `rtrb` is the idiomatic Rust equivalent, unconditional here since every instance needs one.
//!
//! Wire format: each record is a small header (`type` URID, `size` in bytes) followed by `size`
//! bytes of atom body. Producer: the control surface, encoding a `patch:Set` atom for
//! `set_property`. Consumer: the RT process callback (`process.rs`, Phase C), which drains all
//! complete records once per cycle and appends them to the control-input event port.

use rtrb::{Consumer, Producer, RingBuffer};

#[derive(Debug, Clone, Copy)]
pub struct EventHeader {
    pub atom_type: u32,
    pub size: u32,
}

pub const HEADER_LEN: usize = std::mem::size_of::<u32>() * 2;

pub struct EventRingProducer {
    inner: Producer<u8>,
}

pub struct EventRingConsumer {
    inner: Consumer<u8>,
}

/// Creates a paired producer/consumer sized to hold `capacity_bytes` of atom records, rounded up
/// to a multiple of the server's MIDI buffer size.
pub fn event_ring(capacity_bytes: usize, midi_buffer_size: usize) -> (EventRingProducer, EventRingConsumer) {
    let rounded = capacity_bytes.div_ceil(midi_buffer_size).max(1) * midi_buffer_size;
    let (producer, consumer) = RingBuffer::new(rounded);
    (
        EventRingProducer { inner: producer },
        EventRingConsumer { inner: consumer },
    )
}

impl EventRingProducer {
    /// Writes one atom record. Returns `false` (and writes nothing) if there isn't enough space,
    /// matching the "drop silently, let the next write supersede it" degrade policy used
    /// throughout this host for control-thread-to-RT handoffs.
    pub fn write(&mut self, header: EventHeader, body: &[u8]) -> bool {
        debug_assert_eq!(header.size as usize, body.len());
        let needed = HEADER_LEN + body.len();
        if self.inner.slots() < needed {
            return false;
        }

        let chunk = match self.inner.write_chunk_uninit(needed) {
            Ok(chunk) => chunk,
            Err(_) => return false,
        };
        let bytes = header
            .atom_type
            .to_ne_bytes()
            .into_iter()
            .chain(header.size.to_ne_bytes())
            .chain(body.iter().copied());
        let written = chunk.fill_from_iter(bytes);
        debug_assert_eq!(written, needed);
        true
    }
}

impl EventRingConsumer {
    /// Drains all complete records into `sink`, called once per RT cycle. `sink` receives the
    /// header and body slice for each record in write order.
    pub fn drain(&mut self, mut sink: impl FnMut(EventHeader, &[u8])) {
        loop {
            if self.inner.slots() < HEADER_LEN {
                return;
            }
            // Peeking: build a chunk but never call `.commit()` on it, so nothing is consumed
            // until we know the whole record (header + body) is present.
            let (atom_type, size) = {
                let Ok(peek) = self.inner.read_chunk(HEADER_LEN) else {
                    return;
                };
                let (first, second) = peek.as_slices();
                let mut header_bytes = [0u8; HEADER_LEN];
                if second.is_empty() {
                    header_bytes.copy_from_slice(&first[..HEADER_LEN]);
                } else {
                    header_bytes[..first.len()].copy_from_slice(first);
                    header_bytes[first.len()..].copy_from_slice(&second[..HEADER_LEN - first.len()]);
                }
                (
                    u32::from_ne_bytes(header_bytes[0..4].try_into().unwrap()),
                    u32::from_ne_bytes(header_bytes[4..8].try_into().unwrap()),
                )
            };

            let total = HEADER_LEN + size as usize;
            if self.inner.slots() < total {
                // torn record: the rest hasn't been fully written yet, try again next cycle
                return;
            }
            let Ok(full) = self.inner.read_chunk(total) else {
                return;
            };
            let (first, second) = full.as_slices();
            if second.is_empty() {
                sink(EventHeader { atom_type, size }, &first[HEADER_LEN..total]);
            } else {
                let mut buf = Vec::with_capacity(total - HEADER_LEN);
                buf.extend_from_slice(&first[HEADER_LEN.min(first.len())..]);
                buf.extend_from_slice(second);
                sink(EventHeader { atom_type, size }, &buf);
            }
            full.commit(total);
        }
    }

    pub fn read_space(&self) -> usize {
        self.inner.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_drain_round_trip() {
        let (mut producer, mut consumer) = event_ring(256, 64);
        let body = [1u8, 2, 3, 4];
        assert!(producer.write(EventHeader { atom_type: 7, size: 4 }, &body));

        let mut seen = Vec::new();
        consumer.drain(|header, bytes| seen.push((header.atom_type, bytes.to_vec())));
        assert_eq!(seen, vec![(7, body.to_vec())]);
    }

    #[test]
    fn write_fails_silently_when_full() {
        let (mut producer, _consumer) = event_ring(8, 8);
        let body = [0u8; 64];
        assert!(!producer.write(EventHeader { atom_type: 1, size: 64 }, &body));
    }
}
