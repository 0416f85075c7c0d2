use bitcoin::hashes::{sha256, Hash};
use bitcoin::{Script, Txid};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version announced in the `server.version` handshake.
pub const PROTOCOL_VERSION: &str = "1.4";

/// Client name announced in the `server.version` handshake.
pub fn client_name() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

/// One JSON-RPC 2.0 request frame.
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Vec<Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Vec<Value>) -> Self {
        Self { jsonrpc: "2.0", id, method, params }
    }

    /// Serialize as one newline-terminated frame body (without the newline).
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// One response frame. Notifications carry no id and are ignored by the
/// demultiplexer.
#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

/// Server error objects; some servers send a bare string instead of the
/// structured form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    Structured { code: i64, message: String },
    Message(String),
}

impl ErrorPayload {
    pub fn code(&self) -> i64 {
        match self {
            ErrorPayload::Structured { code, .. } => *code,
            ErrorPayload::Message(_) => 0,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ErrorPayload::Structured { message, .. } => message,
            ErrorPayload::Message(message) => message,
        }
    }
}

/// `blockchain.scripthash.get_balance` result, in satoshis.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResult {
    pub confirmed: u64,
    /// Can be negative while a spend of unconfirmed funds is pending.
    pub unconfirmed: i64,
}

/// One `blockchain.scripthash.listunspent` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct UnspentEntry {
    pub tx_hash: Txid,
    pub tx_pos: u32,
    pub value: u64,
    /// Confirming block height, 0 while in the mempool.
    #[serde(default)]
    pub height: u32,
}

/// One `blockchain.scripthash.get_history` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub tx_hash: Txid,
    /// Height of the confirming block; 0 or -1 for mempool transactions.
    pub height: i64,
    #[serde(default)]
    pub fee: Option<u64>,
}

/// The Electrum account key for an output script: SHA-256 of the script,
/// byte-reversed, hex-encoded.
pub fn script_hash(script: &Script) -> String {
    let mut digest = sha256::Hash::hash(script.as_bytes()).to_byte_array();
    digest.reverse();
    hex::encode(digest)
}
