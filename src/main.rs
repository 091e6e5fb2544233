//! hmsearch driver: JSON requests on stdin, one JSON response per line on
//! stdout.
//!
//! ```text
//! {"id": 1, "call": "initSync", "args": ["hashes.redb", 64, 5, 1000]}
//! {"id": 2, "call": "openSync", "args": ["hashes.redb", 1]}
//! {"id": 3, "this": 1, "call": "insertSync", "args": ["00ff00ff00ff00ff"]}
//! {"id": 4, "this": 1, "call": "lookupAsync", "args": ["00ff00ff00ff00fe"], "callback": true}
//! {"id": 5, "this": 1, "call": "isOpen"}
//! ```
//!
//! Handles are returned as `{"handle": n}` and addressed through `this`.
//! Requests with `"callback": true` get a trailing callback argument and are
//! answered from the delivery thread once they complete. Usage: `hmsearch
//! [config.yaml]`; `RUST_LOG` sets the log filter and `HMSEARCH_LOG_JSON`
//! switches logs (on stderr) to JSON.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use anyhow::Context;
use hmsearch::host::{Host, HostValue};
use hmsearch::{Database, Error, HmResult, Module, Runtime, RuntimeConfig, UsageError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    call: String,
    #[serde(default)]
    this: Option<u64>,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    callback: bool,
}

/// Count of callbacks not yet run or dropped.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

struct Ticket(Arc<Pending>);

impl Pending {
    fn ticket(self: &Arc<Self>) -> Ticket {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ticket(Arc::clone(self))
    }

    fn wait_idle(&self) {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let _idle = self
            .idle
            .wait_while(count, |c| *c > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

struct Session {
    host: Host,
    handles: Mutex<HashMap<u64, Database>>,
    next_handle: AtomicU64,
    pending: Arc<Pending>,
    out: Mutex<io::Stdout>,
}

impl Session {
    fn new(host: Host) -> Self {
        Self {
            host,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            pending: Arc::new(Pending::default()),
            out: Mutex::new(io::stdout()),
        }
    }

    fn register(&self, db: Database) -> u64 {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, db);
        id
    }

    fn handle(&self, id: u64) -> Result<Database, Error> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| UsageError::NotAHandle.into())
    }

    fn respond(&self, id: &Value, outcome: HmResult<HostValue>) {
        let response = match outcome {
            Ok(HostValue::Handle(db)) => json!({"id": id, "result": {"handle": self.register(db)}}),
            Ok(value) => json!({"id": id, "result": value.to_json()}),
            Err(err) => json!({
                "id": id,
                "error": {"kind": err.kind(), "message": err.to_string()}
            }),
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(out, "{response}").and_then(|()| out.flush()) {
            warn!(error = %err, "response_write_failed");
        }
    }

    fn dispatch(self: &Arc<Self>, request: Request) -> HmResult<HostValue> {
        let mut args: Vec<HostValue> = request.args.into_iter().map(HostValue::from_json).collect();
        if request.callback {
            let session = Arc::clone(self);
            let ticket = self.pending.ticket();
            let id = request.id.clone();
            args.push(HostValue::function(move |outcome| {
                session.respond(&id, outcome);
                drop(ticket);
            }));
        }

        match request.this {
            None => match Host::constant(&request.call) {
                Some(value) => Ok(value),
                None => self.host.call(&request.call, args),
            },
            Some(handle) => {
                let this = HostValue::Handle(self.handle(handle)?);
                if request.call == "isOpen" {
                    self.host.get_property(&this, &request.call)
                } else {
                    self.host.call_method(&this, &request.call, args)
                }
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_names(true);
    if std::env::var_os("HMSEARCH_LOG_JSON").is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> anyhow::Result<RuntimeConfig> {
    match std::env::args_os().nth(1) {
        Some(path) => RuntimeConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.to_string_lossy()))?
            .with_env_overrides()
            .context("applying environment overrides"),
        None => RuntimeConfig::from_env().context("reading environment"),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let runtime = Runtime::new(load_config()?).context("starting runtime")?;
    let session = Arc::new(Session::new(Host::new(Module::new(runtime))));
    info!("driver_ready");

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let id = request.id.clone();
                let is_async = request.callback;
                match session.dispatch(request) {
                    Ok(HostValue::Undefined) if is_async => {}
                    outcome => session.respond(&id, outcome),
                }
            }
            Err(err) => {
                let response = json!({"id": null, "error": {"kind": "request", "message": err.to_string()}});
                let mut out = session.out.lock().unwrap_or_else(PoisonError::into_inner);
                writeln!(out, "{response}").context("writing stdout")?;
            }
        }
    }

    session.pending.wait_idle();
    info!("driver_done");
    Ok(())
}
