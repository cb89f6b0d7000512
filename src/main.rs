//! Startup: parses [`HostConfig`], builds the [`Host`], opens the control/feedback/monitor
//! sockets, and blocks serving the control socket for the life of the process.
//!
//! Grounded in `effects.c`'s `main()` and `socket.c`'s socket-opening sequence: one bookkeeping
//! JACK client for port connect/disconnect, a feedback socket that accepts a single collector
//! connection, a monitor socket that accepts a single collector connection, and the control socket
//! itself served on the calling thread.

use std::net::TcpListener;
use std::sync::Arc;

use clap::Parser;

use modhost::config::HostConfig;
use modhost::control::ModHostControl;
use modhost::discovery::{LiviPluginSource, PluginSource};
use modhost::feedback::{FeedbackSink, FeedbackThread};
use modhost::host::Host;
use modhost::protocol;

/// The feedback socket lives at `port + 1`, matching the original's convention of handing out an
/// adjacent port for the control process's side channel. The monitor socket has no fixed port of
/// its own: it's opened by the `monitor_start <host> <port>` control command, which dials out to
/// whatever collector address the client names.
const FEEDBACK_PORT_OFFSET: u16 = 1;

fn init_logging(config: &HostConfig) {
    let log_config = simplelog::ConfigBuilder::new().build();
    let _ = simplelog::TermLogger::init(
        config.log_level(),
        log_config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
}

fn main() {
    let config = HostConfig::parse();
    init_logging(&config);

    let sample_rate = 48_000.0;
    let block_size = 4096;
    let midi_buffer_size = 4096;

    let host = Host::new();
    host.set_keys_path(config.keys_path.clone());
    let source: Arc<dyn PluginSource> = Arc::new(LiviPluginSource::new(sample_rate, block_size, midi_buffer_size));

    let (jack_client, _status) =
        jack::Client::new(&config.client_name, jack::ClientOptions::NO_START_SERVER)
            .expect("failed to open the bookkeeping JACK client used for port connect/disconnect");

    let state_dir = std::env::temp_dir().join("modhost-presets");
    let control = Arc::new(ModHostControl::new(host.clone(), source, jack_client, state_dir));

    let feedback_listener = TcpListener::bind(("0.0.0.0", config.port + FEEDBACK_PORT_OFFSET))
        .expect("failed to bind the feedback socket");

    {
        let host = host.clone();
        std::thread::Builder::new()
            .name("mod-feedback-accept".into())
            .spawn(move || {
                let Ok(stream) = protocol::accept_one(feedback_listener) else {
                    return;
                };
                let sink: Box<dyn FeedbackSink> = Box::new(stream);
                let feedback = FeedbackThread::spawn(host.clone(), sink);
                // Lives for the rest of the process; there's no second feedback connection to hand
                // off to, so there's nothing useful to do with the handle once spawned.
                std::mem::forget(feedback);
            })
            .expect("failed to spawn the feedback accept thread");
    }

    let control_listener = TcpListener::bind(("0.0.0.0", config.port)).expect("failed to bind the control socket");
    log::info!("modhost listening on port {}", config.port);
    protocol::serve_control(control_listener, control);
}
