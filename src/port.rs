//! Port model: typed descriptors for audio/control/CV/event ports, independent of any concrete
//! plugin loader (see `discovery.rs` for the `livi`-backed adapter that produces these).

use bitflags::bitflags;

bitflags! {
    /// Control-port hints. Event-port hints (`TRANSPORT`, `OLD_EVENT_API`) share the bitset type
    /// for simplicity even though a given port only ever uses one sub-family, mirroring how the
    /// original packs all of these into a single `int flags` per port.
    #[derive(Default)]
    pub struct PortHints: u32 {
        const ENUMERATION  = 1 << 0;
        const INTEGER      = 1 << 1;
        const TOGGLE       = 1 << 2;
        const TRIGGER      = 1 << 3;
        const LOGARITHMIC  = 1 << 4;
        const MONITORED    = 1 << 5;
        const TRANSPORT    = 1 << 6;
        const OLD_EVENT_API = 1 << 7;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Audio,
    Control,
    Cv,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFlow {
    Input,
    Output,
}

/// A compact interned id for a port symbol, scoped to one instance. Interning symbols at
/// instantiation turns the feedback drain's coalescing predicate (`postponed.rs`) into integer
/// comparisons instead of string comparisons, per the design note on the coalescing invariant.
pub type SymbolId = u32;

#[derive(Debug, Clone)]
pub struct ControlPort {
    pub index: u32,
    pub symbol: SymbolId,
    pub flow: PortFlow,
    pub hints: PortHints,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub prev: f32,
    pub current: f32,
}

impl ControlPort {
    /// Enforces `min < max` by bumping `max` when the declared range is degenerate or inverted,
    /// per the data model invariant.
    pub fn new(index: u32, symbol: SymbolId, flow: PortFlow, hints: PortHints, mut min: f32, mut max: f32, default: f32) -> Self {
        if !(min < max) {
            max = min + 0.1;
        }
        let default = default.clamp(min, max);
        min = min.min(max - f32::EPSILON).min(min);
        Self {
            index,
            symbol,
            flow,
            hints,
            min,
            max,
            default,
            prev: default,
            current: default,
        }
    }

    pub fn set(&mut self, value: f32) {
        self.prev = self.current;
        self.current = value.clamp(self.min, self.max);
    }

    pub fn reset_to_default(&mut self) {
        self.prev = self.current;
        self.current = self.default;
    }
}

#[derive(Debug, Clone)]
pub struct AudioPort {
    pub index: u32,
    pub flow: PortFlow,
    pub buffer: Vec<f32>,
}

impl AudioPort {
    pub fn new(index: u32, flow: PortFlow, block_size: usize) -> Self {
        Self {
            index,
            flow,
            buffer: vec![0.0; block_size],
        }
    }

    pub fn zero(&mut self) {
        self.buffer.iter_mut().for_each(|s| *s = 0.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventEncoding {
    AtomSequence,
    OldEventApi,
}

#[derive(Debug, Clone)]
pub struct EventPort {
    pub index: u32,
    pub flow: PortFlow,
    pub encoding: EventEncoding,
    pub hints: PortHints,
    pub buffer: Vec<u8>,
}

impl EventPort {
    pub fn new(index: u32, flow: PortFlow, encoding: EventEncoding, hints: PortHints, capacity: usize) -> Self {
        Self {
            index,
            flow,
            encoding,
            hints,
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn accepts_transport(&self) -> bool {
        self.hints.contains(PortHints::TRANSPORT)
    }
}

/// Indices into an instance's port vectors, recorded when the plugin declares the corresponding
/// designation. `(instance_id, port_index)` is the stable "handle" the design notes call for in
/// place of the original's raw pointers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesignatedPorts {
    pub control_input: Option<usize>,
    pub enabled: Option<usize>,
    pub freewheel: Option<usize>,
    pub bpb: Option<usize>,
    pub bpm: Option<usize>,
    pub speed: Option<usize>,
}

/// Well-known symbol ids for the virtual ports every instance carries (`:bypass`, `:presets`) and
/// the reserved global instance's transport ports (`:bpb`, `:bpm`, `:rolling`), interned once at
/// startup in `uri_table.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualSymbols {
    pub bypass: SymbolId,
    pub presets: SymbolId,
    pub bpb: SymbolId,
    pub bpm: SymbolId,
    pub rolling: SymbolId,
}
