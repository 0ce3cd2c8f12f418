//! Per-device lifecycle supervisor: connects each configured device,
//! materialises its tag subtree from specification, polls for liveness,
//! tears the subtree down on disconnect, and restarts every device when
//! `clients.json` changes (spec §4.5).
//!
//! One OS thread per device plus one filesystem-watch thread, all
//! synchronous — no async runtime, matching spec §5's "no async
//! suspension" and the supervisor pseudocode's plain `sleep` calls between
//! checks of the `running`/`reload_requested` flags.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::SupervisorError;
use crate::r3::client::R3Client;
use crate::slmp::client::SlmpClient;
use crate::slmp::frame::FrameHeader;
use crate::spec::config::{self, ClientEntry, ClientKind};
use crate::spec::{plc, robot};
use crate::tagserver::TagServer;

/// Reconnect delay after a failed connect or a teardown, per the
/// pseudocode's `sleep 3s`.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(3);
/// Liveness-poll interval while connected, per the pseudocode's `sleep 1s`.
const LIVENESS_TICK: Duration = Duration::from_secs(1);
/// Applied to every protocol socket at connect time. The spec's default of
/// zero (no timeout) is explicitly called out as something "callers should
/// avoid in production" (§4.1); the supervisor always passes a finite one.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);
/// Debounce window for `clients.json` modify events (spec §4.5, §8
/// scenario 6).
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(10);

/// Drives every configured device and reacts to configuration changes.
///
/// `tag_server` is the external collaborator (spec §6): a trait object so
/// the supervisor itself never depends on a concrete implementation.
pub struct Supervisor {
    config_dir: PathBuf,
    tag_server: Arc<dyn TagServer>,
    running: Arc<AtomicBool>,
    /// Timestamp of the last event acted upon, persisted across calls to
    /// [`Supervisor::wait_for_reload_or_shutdown`] — a burst of modify
    /// events spanning two reload passes must still debounce to one
    /// reload, per spec §4.5.
    last_reload_event: Mutex<Option<Instant>>,
}

impl Supervisor {
    pub fn new(config_dir: impl Into<PathBuf>, tag_server: Arc<dyn TagServer>) -> Self {
        Self {
            config_dir: config_dir.into(),
            tag_server,
            running: Arc::new(AtomicBool::new(true)),
            last_reload_event: Mutex::new(None),
        }
    }

    /// A handle the caller can clear to request shutdown; checked by the
    /// supervisor loop and by every device task between sleeps.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Run until `stop_handle()` is cleared. Each pass loads
    /// `clients.json` and the per-type schema documents, spawns one
    /// thread per device, then blocks until either a debounced
    /// `clients.json` modify event or shutdown — at which point every
    /// device thread is joined before the next pass (or exit).
    pub fn run(&self) -> Result<(), SupervisorError> {
        let (watch_tx, watch_rx) = channel::unbounded();
        let _watcher = self.spawn_watcher(watch_tx)?;

        while self.running.load(Ordering::SeqCst) {
            let clients_path = self.config_dir.join("clients.json");
            let clients = config::load_clients_file(&clients_path)?;
            let plc_schema = self.load_schema("plc-specification.json")?;
            let robot_schema = self.load_schema("robot-specification.json")?;

            let reload_requested = Arc::new(AtomicBool::new(false));
            let handles: Vec<thread::JoinHandle<()>> = clients
                .clients
                .into_iter()
                .map(|entry| {
                    self.spawn_device(
                        entry,
                        Arc::clone(&plc_schema),
                        Arc::clone(&robot_schema),
                        Arc::clone(&reload_requested),
                    )
                })
                .collect();

            self.wait_for_reload_or_shutdown(&watch_rx, &reload_requested);

            for handle in handles {
                let _ = handle.join();
            }
        }
        Ok(())
    }

    fn spawn_watcher(
        &self,
        tx: channel::Sender<notify::Result<Event>>,
    ) -> Result<RecommendedWatcher, SupervisorError> {
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&self.config_dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    /// Block until shutdown or a debounced `clients.json` event. Events
    /// within [`RELOAD_DEBOUNCE`] of the last acted-upon one are ignored,
    /// per spec §4.5.
    fn wait_for_reload_or_shutdown(
        &self,
        watch_rx: &channel::Receiver<notify::Result<Event>>,
        reload_requested: &Arc<AtomicBool>,
    ) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            match watch_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(Ok(event)) => {
                    if !is_clients_file_event(&event) {
                        continue;
                    }
                    let now = Instant::now();
                    let mut last_acted = self.last_reload_event.lock().unwrap();
                    if let Some(prev) = *last_acted {
                        if now.duration_since(prev) < RELOAD_DEBOUNCE {
                            continue;
                        }
                    }
                    *last_acted = Some(now);
                    drop(last_acted);
                    info!("clients.json changed, reloading devices");
                    reload_requested.store(true, Ordering::SeqCst);
                    return;
                }
                Ok(Err(err)) => warn!(error = %err, "filesystem watch error"),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Load a per-type schema document. A missing file (no devices of that
    /// type configured) is not an error — it yields an empty `Nodes` list.
    fn load_schema(&self, filename: &str) -> Result<Arc<Value>, SupervisorError> {
        let path = self.config_dir.join(filename);
        if !path.exists() {
            return Ok(Arc::new(serde_json::json!({ "Nodes": [] })));
        }
        Ok(Arc::new(config::load_json_with_comments(&path)?))
    }

    fn spawn_device(
        &self,
        entry: ClientEntry,
        plc_schema: Arc<Value>,
        robot_schema: Arc<Value>,
        reload_requested: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()> {
        let tag_server = Arc::clone(&self.tag_server);
        let running = Arc::clone(&self.running);
        thread::spawn(move || match entry.kind {
            ClientKind::Plc => run_plc_device(entry, &plc_schema, tag_server, running, reload_requested),
            ClientKind::Robot => run_robot_device(entry, &robot_schema, tag_server, running, reload_requested),
        })
    }
}

fn is_clients_file_event(event: &Event) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|f| f == "clients.json"))
}

fn should_keep_running(running: &AtomicBool, reload_requested: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst) && !reload_requested.load(Ordering::SeqCst)
}

/// Drive one PLC device through Disconnected → Connecting → Connected →
/// Disconnected, looping until shutdown or reload, per the §4.5
/// pseudocode.
fn run_plc_device(
    entry: ClientEntry,
    schema: &Value,
    tag_server: Arc<dyn TagServer>,
    running: Arc<AtomicBool>,
    reload_requested: Arc<AtomicBool>,
) {
    let header = FrameHeader {
        network_no: entry.network_no.unwrap_or(0),
        station_no: entry.station_no.unwrap_or(0xFF),
        module_io: entry.module_io.unwrap_or(0x03FF),
        multidrop_station_no: entry.multidrop_station_no.unwrap_or(0),
    };

    while should_keep_running(&running, &reload_requested) {
        let client = Arc::new(SlmpClient::new(header));
        if let Err(err) = client.connect(&entry.ip, entry.port, RECV_TIMEOUT) {
            warn!(device = %entry.name, error = %err, "PLC connect failed, retrying");
            thread::sleep(CONNECT_RETRY_DELAY);
            continue;
        }

        let device_root = tag_server.add_container(tag_server.root(), &entry.name, true);
        match plc::build_device_tree(&client, &entry.name, schema, &entry.user_nodes) {
            Ok(tree) => {
                for child in tree.children {
                    child.register(tag_server.as_ref(), device_root);
                }
                info!(device = %entry.name, "device up");
            }
            Err(err) => warn!(device = %entry.name, error = %err, "failed to build PLC tag tree"),
        }

        while client.is_connected() && should_keep_running(&running, &reload_requested) {
            thread::sleep(LIVENESS_TICK);
        }

        tag_server.delete_node(device_root, true);
        client.close();
        info!(device = %entry.name, "device down");

        if should_keep_running(&running, &reload_requested) {
            thread::sleep(CONNECT_RETRY_DELAY);
        }
    }
}

/// As [`run_plc_device`], for an R3 robot controller.
fn run_robot_device(
    entry: ClientEntry,
    schema: &Value,
    tag_server: Arc<dyn TagServer>,
    running: Arc<AtomicBool>,
    reload_requested: Arc<AtomicBool>,
) {
    while should_keep_running(&running, &reload_requested) {
        let client = Arc::new(R3Client::new());
        if let Err(err) = client.connect(&entry.ip, entry.port, RECV_TIMEOUT) {
            warn!(device = %entry.name, error = %err, "robot connect failed, retrying");
            thread::sleep(CONNECT_RETRY_DELAY);
            continue;
        }

        let device_root = tag_server.add_container(tag_server.root(), &entry.name, true);
        match robot::build_device_tree(&client, &entry.name, schema, &entry.user_nodes) {
            Ok(tree) => {
                for child in tree.children {
                    child.register(tag_server.as_ref(), device_root);
                }
                info!(device = %entry.name, "device up");
            }
            Err(err) => warn!(device = %entry.name, error = %err, "failed to build robot tag tree"),
        }

        while client.is_connected() && should_keep_running(&running, &reload_requested) {
            thread::sleep(LIVENESS_TICK);
        }

        tag_server.delete_node(device_root, true);
        client.close();
        info!(device = %entry.name, "device down");

        if should_keep_running(&running, &reload_requested) {
            thread::sleep(CONNECT_RETRY_DELAY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagserver::memory::MemoryTagServer;
    use std::io::{Read as _, Write as _};
    use std::net::TcpListener;

    fn minimal_entry(name: &str, port: u16) -> ClientEntry {
        serde_json::from_value(serde_json::json!({
            "Type": "PLC",
            "Name": name,
            "Ip": "127.0.0.1",
            "Port": port,
        }))
        .unwrap()
    }

    #[test]
    fn plc_device_attaches_and_detaches_subtree_around_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 64];
            // Accept then immediately drop, simulating a device that
            // disconnects right after the handshake.
            let _ = sock.read(&mut buf);
            drop(sock);
        });

        let tag_server: Arc<dyn TagServer> = Arc::new(MemoryTagServer::new());
        let running = Arc::new(AtomicBool::new(true));
        let reload_requested = Arc::new(AtomicBool::new(false));
        let schema = serde_json::json!({ "Nodes": [] });
        let entry = minimal_entry("Line1", addr.port());

        // Run one pass of the loop body directly (no background thread
        // needed): connect, build (empty) tree, detect the peer closing,
        // detach, then stop because `running` flips false before retrying.
        let running_for_stop = Arc::clone(&running);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            running_for_stop.store(false, Ordering::SeqCst);
        });
        run_plc_device(entry, &schema, Arc::clone(&tag_server), running, reload_requested);

        server.join().unwrap();
        // No panics, and the device root is gone: dispatch on any id
        // fails since nothing was ever left behind.
        assert!(tag_server.dispatch_read(crate::tagserver::NodeId(1)).is_err());
    }

    fn clients_json_event(path: &std::path::Path) -> notify::Result<Event> {
        Ok(Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![path.to_path_buf()],
            attrs: Default::default(),
        })
    }

    #[test]
    fn first_event_in_a_reload_pass_is_acted_on() {
        let dir = tempfile::tempdir().unwrap();
        let clients_path = dir.path().join("clients.json");
        std::fs::write(&clients_path, b"{\"Clients\": []}").unwrap();

        let tag_server: Arc<dyn TagServer> = Arc::new(MemoryTagServer::new());
        let supervisor = Supervisor::new(dir.path(), tag_server);
        let (tx, rx) = channel::unbounded();
        tx.send(clients_json_event(&clients_path)).unwrap();
        let reload_requested = Arc::new(AtomicBool::new(false));
        supervisor.wait_for_reload_or_shutdown(&rx, &reload_requested);
        assert!(reload_requested.load(Ordering::SeqCst));
    }

    /// A second burst arriving within the debounce window of the first —
    /// even across two separate reload passes, i.e. two separate calls to
    /// `wait_for_reload_or_shutdown` — must not trigger a second reload.
    #[test]
    fn debounce_persists_across_reload_passes() {
        let dir = tempfile::tempdir().unwrap();
        let clients_path = dir.path().join("clients.json");
        std::fs::write(&clients_path, b"{\"Clients\": []}").unwrap();

        let tag_server: Arc<dyn TagServer> = Arc::new(MemoryTagServer::new());
        let supervisor = Supervisor::new(dir.path(), tag_server);

        let (tx1, rx1) = channel::unbounded();
        tx1.send(clients_json_event(&clients_path)).unwrap();
        let first_reload = Arc::new(AtomicBool::new(false));
        supervisor.wait_for_reload_or_shutdown(&rx1, &first_reload);
        assert!(first_reload.load(Ordering::SeqCst));

        // Immediately start a second pass's wait call, as `run()` would,
        // and deliver another event right away — well inside the 10 ms
        // debounce window.
        let (tx2, rx2) = channel::unbounded();
        tx2.send(clients_json_event(&clients_path)).unwrap();
        let second_reload = Arc::new(AtomicBool::new(false));
        let running = supervisor.stop_handle();
        let running_for_stop = Arc::clone(&running);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            running_for_stop.store(false, Ordering::SeqCst);
        });
        supervisor.wait_for_reload_or_shutdown(&rx2, &second_reload);
        assert!(!second_reload.load(Ordering::SeqCst));
    }
}
