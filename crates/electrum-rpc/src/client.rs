use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};

use bitcoin::{Script, Transaction, Txid};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

use crate::config::ElectrumConfig;
use crate::error::ElectrumError;
use crate::transport::{self, LineSink, LineStream};
use crate::wire::{
    client_name, script_hash, BalanceResult, HistoryEntry, Request, Response, UnspentEntry,
    PROTOCOL_VERSION,
};

/// Externally observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

type PendingSlot = oneshot::Sender<Result<Value, ElectrumError>>;

/// An asynchronous Electrum client over one multiplexed socket.
///
/// Construction performs no I/O; the first RPC connects lazily, announcing
/// `server.version` within the connect deadline. Concurrent callers share
/// the socket and are matched to responses by request id, so completions
/// arrive in server order, not call order. Dropping a caller's future
/// abandons its slot; a late response for it is discarded.
pub struct ElectrumClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ElectrumConfig,
    next_id: AtomicU64,
    next_generation: AtomicU64,
    pending: StdMutex<HashMap<u64, PendingSlot>>,
    state: StdMutex<ConnectionState>,
    conn: Mutex<ConnSlot>,
}

enum ConnSlot {
    Disconnected,
    Connected(ConnHandle),
    Closed,
}

struct ConnHandle {
    out_tx: mpsc::UnboundedSender<String>,
    generation: u64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

impl ConnHandle {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
        self.keepalive.abort();
    }
}

impl ElectrumClient {
    /// Create a client for the endpoint; no socket is opened yet.
    pub fn new(config: ElectrumConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                next_id: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
                pending: StdMutex::new(HashMap::new()),
                state: StdMutex::new(ConnectionState::Disconnected),
                conn: Mutex::new(ConnSlot::Disconnected),
            }),
        }
    }

    pub fn config(&self) -> &ElectrumConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock().expect("state lock poisoned")
    }

    /// Issue one RPC, connecting first if necessary.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ElectrumError> {
        let out_tx = self.ensure_connected().await?;
        self.dispatch(&out_tx, method, params).await
    }

    /// Flush all pending calls and tear the connection down for good.
    pub async fn close(&self) {
        let mut conn = self.inner.conn.lock().await;
        if let ConnSlot::Connected(handle) = std::mem::replace(&mut *conn, ConnSlot::Closed) {
            handle.abort();
        }
        flush_pending(&self.inner);
        self.set_state(ConnectionState::Closed);
        log::debug!("electrum client closed");
    }

    /// Tear down the current session and open a fresh one; used to refresh
    /// a stale connection.
    pub async fn reconnect(&self) -> Result<(), ElectrumError> {
        {
            let mut conn = self.inner.conn.lock().await;
            match std::mem::replace(&mut *conn, ConnSlot::Disconnected) {
                ConnSlot::Closed => {
                    *conn = ConnSlot::Closed;
                    return Err(ElectrumError::Closed);
                }
                ConnSlot::Connected(handle) => handle.abort(),
                ConnSlot::Disconnected => {}
            }
            flush_pending(&self.inner);
            self.set_state(ConnectionState::Disconnected);
        }
        self.ensure_connected().await.map(|_| ())
    }

    // ---- typed RPC surface ----

    /// Confirmed/unconfirmed balance of an output script, in satoshis.
    pub async fn get_balance(&self, script: &Script) -> Result<BalanceResult, ElectrumError> {
        let value = self
            .call(
                "blockchain.scripthash.get_balance",
                vec![json!(script_hash(script))],
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Unspent outputs locked to a script.
    pub async fn list_unspent(&self, script: &Script) -> Result<Vec<UnspentEntry>, ElectrumError> {
        let value = self
            .call(
                "blockchain.scripthash.listunspent",
                vec![json!(script_hash(script))],
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Confirmed and mempool history of a script.
    pub async fn get_history(&self, script: &Script) -> Result<Vec<HistoryEntry>, ElectrumError> {
        let value = self
            .call(
                "blockchain.scripthash.get_history",
                vec![json!(script_hash(script))],
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Raw transaction hex by txid.
    pub async fn get_raw_transaction(&self, txid: &Txid) -> Result<String, ElectrumError> {
        let value = self
            .call(
                "blockchain.transaction.get",
                vec![json!(txid.to_string()), json!(false)],
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch and decode a transaction.
    pub async fn get_transaction(&self, txid: &Txid) -> Result<Transaction, ElectrumError> {
        let raw = self.get_raw_transaction(txid).await?;
        bitcoin::consensus::encode::deserialize_hex(&raw)
            .map_err(|e| ElectrumError::InvalidResponse(e.to_string()))
    }

    /// Broadcast a signed transaction; returns the txid the server accepted.
    pub async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ElectrumError> {
        let raw = bitcoin::consensus::encode::serialize_hex(tx);
        let value = self
            .call("blockchain.transaction.broadcast", vec![json!(raw)])
            .await?;
        let txid: String = serde_json::from_value(value)?;
        txid.parse()
            .map_err(|e| ElectrumError::InvalidResponse(format!("bad txid: {e}")))
    }

    /// Fee estimate for confirmation within `blocks`, in BTC per kB.
    /// Negative when the server has no estimate; callers clamp.
    pub async fn estimate_fee(&self, blocks: u16) -> Result<f64, ElectrumError> {
        let value = self
            .call("blockchain.estimatefee", vec![json!(blocks)])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Explicit ping, independent of the keep-alive timer.
    pub async fn ping(&self) -> Result<(), ElectrumError> {
        self.call("server.ping", vec![]).await.map(|_| ())
    }

    // ---- internals ----

    fn set_state(&self, state: ConnectionState) {
        *self.inner.state.lock().expect("state lock poisoned") = state;
    }

    async fn dispatch(
        &self,
        out_tx: &mpsc::UnboundedSender<String>,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, ElectrumError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let line = Request::new(id, method, params).to_line()?;
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id, tx);
        if out_tx.send(line).is_err() {
            self.inner
                .pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            return Err(ElectrumError::ConnectionClosed);
        }
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ElectrumError::ConnectionClosed),
        }
    }

    /// Return the writer for the live connection, opening one if needed.
    ///
    /// Holding the connection lock across the whole attempt serializes
    /// concurrent first calls onto a single in-flight handshake.
    async fn ensure_connected(
        &self,
    ) -> Result<mpsc::UnboundedSender<String>, ElectrumError> {
        let mut conn = self.inner.conn.lock().await;
        match &*conn {
            ConnSlot::Closed => return Err(ElectrumError::Closed),
            ConnSlot::Connected(handle) if !handle.out_tx.is_closed() => {
                return Ok(handle.out_tx.clone())
            }
            _ => {}
        }
        // A half-dead session (writer gone, reader lingering) is torn down
        // before the fresh connect; its waiters get ConnectionClosed.
        if let ConnSlot::Connected(stale) = std::mem::replace(&mut *conn, ConnSlot::Disconnected)
        {
            stale.abort();
            flush_pending(&self.inner);
        }

        self.set_state(ConnectionState::Connecting);
        let attempts = self.inner.config.max_retry.saturating_add(1);
        let mut last_err = ElectrumError::ConnectionClosed;
        for attempt in 0..attempts {
            if attempt > 0 {
                sleep(self.inner.config.retry_period()).await;
            }
            match self.open_connection().await {
                Ok(handle) => {
                    let out_tx = handle.out_tx.clone();
                    *conn = ConnSlot::Connected(handle);
                    self.set_state(ConnectionState::Connected);
                    log::debug!(
                        "connected to {}:{}",
                        self.inner.config.host,
                        self.inner.config.port
                    );
                    return Ok(out_tx);
                }
                Err(e) => {
                    log::warn!("connect attempt {} failed: {e}", attempt + 1);
                    last_err = e;
                }
            }
        }
        *conn = ConnSlot::Disconnected;
        self.set_state(ConnectionState::Disconnected);
        Err(last_err)
    }

    /// Open the socket, start the connection tasks, and run the
    /// `server.version` handshake, all within the connect deadline. On any
    /// failure the just-spawned tasks are stopped so no half-open
    /// connection lingers.
    async fn open_connection(&self) -> Result<ConnHandle, ElectrumError> {
        let config = &self.inner.config;
        let deadline = config.timeout();
        let (stream, sink) =
            match timeout(deadline, transport::open(&config.host, config.port, config.protocol))
                .await
            {
                Ok(opened) => opened?,
                Err(_) => return Err(ElectrumError::Timeout),
            };
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(sink, out_rx));
        let reader = tokio::spawn(read_loop(stream, Arc::clone(&self.inner), generation));
        let keepalive = tokio::spawn(keepalive_loop(
            Arc::downgrade(&self.inner),
            out_tx.clone(),
        ));
        let handle = ConnHandle { out_tx, generation, reader, writer, keepalive };

        let params = vec![json!(client_name()), json!(PROTOCOL_VERSION)];
        let outcome = match timeout(deadline, self.dispatch(&handle.out_tx, "server.version", params))
            .await
        {
            Ok(outcome) => outcome.map(|_| ()),
            Err(_) => Err(ElectrumError::Timeout),
        };
        if let Err(e) = outcome {
            handle.abort();
            // Only handshake slots can exist here; drop them.
            flush_pending(&self.inner);
            return Err(e);
        }
        Ok(handle)
    }
}

impl Drop for ElectrumClient {
    fn drop(&mut self) {
        // Tasks hold no strong reference to `Inner` except the reader; stop
        // them so the runtime does not keep a dead connection alive.
        if let Ok(conn) = self.inner.conn.try_lock() {
            if let ConnSlot::Connected(handle) = &*conn {
                handle.abort();
            }
        }
    }
}

/// Pump queued frames onto the socket until the channel or socket dies.
async fn write_loop(mut sink: LineSink, mut out_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = out_rx.recv().await {
        log::trace!("--> {line}");
        if let Err(e) = sink.send_line(&line).await {
            log::debug!("socket write failed: {e}");
            break;
        }
    }
}

/// Read frames and resolve pending slots until the socket dies, then flush
/// every waiter with `ConnectionClosed` and mark the client disconnected.
async fn read_loop(mut stream: LineStream, inner: Arc<Inner>, generation: u64) {
    loop {
        match stream.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                handle_frame(&inner, line);
            }
            Ok(None) => {
                log::debug!("server closed the connection");
                break;
            }
            Err(e) => {
                log::debug!("socket read failed: {e}");
                break;
            }
        }
    }

    flush_pending(&inner);
    let mut conn = inner.conn.lock().await;
    let ours = matches!(&*conn, ConnSlot::Connected(handle) if handle.generation == generation);
    if ours {
        if let ConnSlot::Connected(handle) =
            std::mem::replace(&mut *conn, ConnSlot::Disconnected)
        {
            handle.abort();
        }
        *inner.state.lock().expect("state lock poisoned") = ConnectionState::Disconnected;
    }
}

/// Demultiplex one frame into its pending slot.
fn handle_frame(inner: &Inner, line: &str) {
    log::trace!("<-- {line}");
    match serde_json::from_str::<Response>(line) {
        Ok(response) => match response.id {
            Some(id) => {
                let slot = inner
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&id);
                match slot {
                    Some(tx) => {
                        let outcome = match response.error {
                            Some(err) => Err(ElectrumError::Protocol {
                                code: err.code(),
                                message: err.message().to_owned(),
                            }),
                            None => Ok(response.result.unwrap_or(Value::Null)),
                        };
                        // The caller may have been cancelled; the result is
                        // simply discarded then.
                        let _ = tx.send(outcome);
                    }
                    None => log::trace!("discarding response for unregistered id {id}"),
                }
            }
            None => log::trace!("ignoring notification frame"),
        },
        Err(e) => log::warn!("dropping undecodable frame: {e}"),
    }
}

/// Periodic `server.ping` while the connection lives. The reply carries an
/// id that was never registered, so it falls into the discard path.
async fn keepalive_loop(inner: Weak<Inner>, out_tx: mpsc::UnboundedSender<String>) {
    let period = match inner.upgrade() {
        Some(strong) => strong.config.ping_period(),
        None => return,
    };
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick completes immediately
    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else { break };
        let id = strong.next_id.fetch_add(1, Ordering::SeqCst);
        let line = match Request::new(id, "server.ping", vec![]).to_line() {
            Ok(line) => line,
            Err(_) => break,
        };
        if out_tx.send(line).is_err() {
            break;
        }
        log::trace!("keepalive ping sent");
    }
}

/// Fail every in-flight call with `ConnectionClosed`.
fn flush_pending(inner: &Inner) {
    let slots: Vec<PendingSlot> = {
        let mut pending = inner.pending.lock().expect("pending lock poisoned");
        pending.drain().map(|(_, tx)| tx).collect()
    };
    for tx in slots {
        let _ = tx.send(Err(ElectrumError::ConnectionClosed));
    }
}
