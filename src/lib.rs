//! `modhost`: a headless realtime host for LV2 audio/MIDI plugins, controlled over a line
//! protocol. See `main.rs` for the startup sequence that wires these modules into a running
//! process; this crate root only declares the module tree.

#[macro_use]
pub mod debug;

pub mod atomic;
pub mod audio_server;
pub mod config;
pub mod control;
pub mod discovery;
pub mod error;
pub mod feedback;
pub mod host;
pub mod instance;
pub mod instance_table;
pub mod license;
pub mod midi;
pub mod monitor;
pub mod port;
pub mod postponed;
pub mod process;
pub mod protocol;
pub mod ring;
pub mod rt_pool;
pub mod state;
pub mod transport;
pub mod uri_table;
pub mod worker;
