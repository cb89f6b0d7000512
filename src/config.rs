//! Process-level configuration, parsed once at startup from the command line.
//!
//! This is deliberately separate from anything in [`crate::host`]: `HostConfig` is read once by
//! `main()` and handed to the `Host` and its socket listeners by value. Nothing in the RT or
//! control-surface data model depends on it after startup.

use std::path::PathBuf;

use clap::Parser;

/// Default TCP port for the control socket.
pub const DEFAULT_CONTROL_PORT: u16 = 5555;

#[derive(Debug, Clone, Parser)]
#[clap(about = "A headless realtime host for LV2 audio/MIDI plugins", long_about = None)]
pub struct HostConfig {
    /// TCP port for the control socket.
    #[clap(short = 'p', long, default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,

    /// Raise the log verbosity. Can be passed multiple times (-v, -vv, -vvv).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all but error-level logging, matching the original's quiet/piped mode.
    #[clap(short = 'q', long)]
    pub quiet: bool,

    /// JACK client name prefix used when creating per-instance clients ("effect_<id>" is always
    /// suffixed, this only controls the common prefix used for the dispatcher's own client).
    #[clap(long, default_value = "mod-host")]
    pub client_name: String,

    /// Overrides the `MOD_KEYS_PATH` environment variable for the license lookup helper.
    #[clap(long)]
    pub keys_path: Option<PathBuf>,
}

impl HostConfig {
    /// The log level implied by `-v`/`-q`, matching `simplelog`'s `LevelFilter`.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }

        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}
