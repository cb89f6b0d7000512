//! The line protocol: a tiny whitespace/quote tokenizer, a `resp <code>`/`resp <code> <value>`
//! response formatter, and the TCP accept loop shared by the control and feedback sockets (the
//! monitor socket is dialed out by `control.rs`'s `monitor_start` command instead, so it has no
//! accept loop of its own). Grounded in `socket.c`'s line-oriented command loop; kept deliberately
//! thin, since the interesting tokenizing/quoting edge cases of a full production parser aren't
//! the point here.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

use crate::debug::{host_debug, host_error, host_log};

/// Splits a line into whitespace-delimited tokens, treating a double-quoted segment as a single
/// token (quotes themselves are stripped, no escape sequences are recognized).
pub fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }
        let mut token = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                token.push(c);
            }
        } else {
            while matches!(chars.peek(), Some(c) if !c.is_whitespace()) {
                token.push(chars.next().unwrap());
            }
        }
        tokens.push(token);
    }
    tokens
}

/// The outcome of dispatching one command line, formatted as the control socket's wire response.
pub enum Response {
    Code(i32),
    CodeValue(i32, String),
}

impl Response {
    pub fn ok() -> Self {
        Response::Code(0)
    }

    pub fn ok_value(value: impl std::fmt::Display) -> Self {
        Response::CodeValue(0, value.to_string())
    }

    pub fn err(code: i32) -> Self {
        Response::Code(code)
    }

    fn to_line(&self) -> String {
        match self {
            Response::Code(code) => format!("resp {code}"),
            Response::CodeValue(code, value) => format!("resp {code} {value}"),
        }
    }
}

/// Implemented by whatever owns the full command table (`control.rs`'s `ModHostControl`).
/// Returning `None` means "unrecognized command", which the accept loop turns into `resp -1`.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, tokens: &[String]) -> Option<Response>;
}

const UNRECOGNIZED_COMMAND: i32 = -1;

/// Runs the control socket's accept loop on `listener`, serving one line-oriented session per
/// connection sequentially (matching the original's single-client assumption). Blocks until the
/// listener errors or is otherwise torn down; callers typically run this on its own thread.
pub fn serve_control(listener: TcpListener, handler: Arc<dyn CommandHandler>) {
    host_log!("control socket listening on {:?}", listener.local_addr().ok());
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                host_error!("control socket accept failed: {err}");
                continue;
            }
        };
        let handler = handler.clone();
        std::thread::spawn(move || serve_control_connection(stream, handler));
    }
}

fn serve_control_connection(stream: TcpStream, handler: Arc<dyn CommandHandler>) {
    let peer = stream.peer_addr().ok();
    host_log!("control connection opened from {peer:?}");
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(err) => {
            host_error!("failed to clone control stream: {err}");
            return;
        }
    };
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let tokens = tokenize(&line);
        if tokens.is_empty() {
            continue;
        }
        if tokens[0] == "quit" {
            let _ = writeln!(writer, "{}", Response::ok().to_line());
            break;
        }
        let response = handler.handle(&tokens).unwrap_or(Response::err(UNRECOGNIZED_COMMAND));
        if writeln!(writer, "{}", response.to_line()).is_err() {
            break;
        }
    }
    host_debug!("control connection from {peer:?} closed");
}

/// Accepts exactly one connection on `listener` and returns it, for the feedback socket (which
/// the original dials into a single waiting collector rather than serving many clients).
pub fn accept_one(listener: TcpListener) -> std::io::Result<TcpStream> {
    let (stream, peer) = listener.accept()?;
    host_log!("feedback/monitor connection accepted from {peer}");
    Ok(stream)
}
