//! Interactive shell (spec.md §6): `send`, `echo`, `neighbors`, `routes`,
//! `topology`, `logs`, `quit`. Each command only reads orchestrator/
//! algorithm accessors or calls [`Node::originate`]; no protocol logic
//! lives here.
//!
//! Shaped after the split between `tracing` stderr output and the
//! `runtime::mgmt` status snapshot, generalized from an HTTP surface to a
//! bounded textual ring buffer since there's no management port here.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::model::packet::{TYPE_ECHO, TYPE_MESSAGE};
use crate::runtime::node::Node;

const LOG_RING_CAPACITY: usize = 500;
const DEFAULT_ORIGINATE_TTL: i64 = 5;

/// Bounded in-memory activity log backing the `logs` command.
#[derive(Clone)]
pub struct LogRing {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogRing {
    pub fn new() -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(LOG_RING_CAPACITY))),
        }
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() >= LOG_RING_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new()
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}

/// A `tracing_subscriber` layer mirroring formatted events into a
/// [`LogRing`], composed alongside the normal stderr `fmt` layer.
pub struct RingLayer {
    ring: LogRing,
}

impl RingLayer {
    pub fn new(ring: LogRing) -> Self {
        Self { ring }
    }
}

impl<S: Subscriber> Layer<S> for RingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        self.ring
            .push(format!("{} {}", event.metadata().level(), visitor.message));
    }
}

/// Runs the interactive shell on the current thread until `quit` or EOF.
pub fn run_shell(node: &Arc<Node>, ring: &LogRing) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{}> ", node.self_id());
        let _ = stdout.flush();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        if !dispatch(node, ring, line.trim()) {
            break;
        }
    }
}

/// Returns `false` when the shell should stop.
fn dispatch(node: &Arc<Node>, ring: &LogRing, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let mut parts = line.splitn(3, ' ');
    let cmd = parts.next().unwrap_or("");
    match cmd {
        "send" => match (parts.next(), parts.next()) {
            (Some(dst), Some(msg)) => {
                node.originate(dst, TYPE_MESSAGE, msg.to_string(), DEFAULT_ORIGINATE_TTL)
            }
            _ => println!("usage: send <dst> <msg>"),
        },
        "echo" => match parts.next() {
            Some(dst) => node.originate(dst, TYPE_ECHO, String::new(), DEFAULT_ORIGINATE_TTL),
            None => println!("usage: echo <dst>"),
        },
        "neighbors" => {
            for neighbor in node.neighbors() {
                println!("{neighbor}");
            }
        }
        "routes" => {
            for (dest, hop) in node.routes() {
                println!("{dest} -> {hop}");
            }
        }
        "topology" => {
            println!("self={} protocol={}", node.self_id(), node.algorithm_name());
            for neighbor in node.neighbors() {
                println!("  {} -- {}", node.self_id(), neighbor);
            }
        }
        "logs" => {
            for line in ring.snapshot() {
                println!("{line}");
            }
        }
        "quit" => return false,
        other => println!("unknown command: {other}"),
    }
    true
}
