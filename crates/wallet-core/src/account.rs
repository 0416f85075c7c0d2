use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::{Script, ScriptBuf, Transaction, TxOut, Txid};
use chain_btc::address::{address_to_script, script_to_address, script_type_of};
use chain_btc::transaction::{build_transaction, BuildRequest, DerivationMeta};
use chain_btc::utxo::{plan_spend, Selection, Utxo};
use chain_btc::{BtcError, BtcNetwork};
use electrum_rpc::{ElectrumClient, ElectrumError};

use crate::error::WalletError;
use crate::hd::HdNode;
use crate::signer::Signer;
use crate::types::Bip;

/// Parameters of a send or quote.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to: String,
    /// Amount in satoshis.
    pub value: u64,
    /// Fee rate in sat/vB; when absent, the Electrum estimate for
    /// `confirmation_target` blocks is used.
    pub fee_rate: Option<u64>,
    pub confirmation_target: u16,
}

impl SendRequest {
    pub fn new(to: impl Into<String>, value: u64) -> Self {
        Self { to: to.into(), value, fee_rate: None, confirmation_target: 1 }
    }

    pub fn fee_rate(mut self, rate: u64) -> Self {
        self.fee_rate = Some(rate);
        self
    }
}

/// Fee quote for a send, from the planner alone.
#[derive(Debug, Clone)]
pub struct Quote {
    pub fee_sats: u64,
}

/// Result of a broadcast send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub txid: Txid,
    pub fee_sats: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Incoming,
    Outgoing,
    /// Self-paid outputs of own spends; suppressed in listings.
    Change,
}

/// One per-output history record.
#[derive(Debug, Clone)]
pub struct Transfer {
    pub txid: Txid,
    pub vout: u32,
    pub address: Option<String>,
    /// Confirming block height; 0 or -1 while unconfirmed.
    pub height: i64,
    pub value_sats: u64,
    pub direction: TransferDirection,
    /// Whole-transaction fee, set on outgoing records.
    pub fee_sats: Option<u64>,
    pub recipient: Option<String>,
}

/// Filter and paging for [`Account::get_transfers`].
#[derive(Debug, Clone)]
pub struct TransferQuery {
    pub direction: Option<TransferDirection>,
    pub limit: usize,
    pub skip: usize,
}

impl Default for TransferQuery {
    fn default() -> Self {
        Self { direction: None, limit: 10, skip: 0 }
    }
}

/// A confirmed transaction looked up from this account's history.
#[derive(Debug, Clone)]
pub struct TransactionReceipt {
    pub txid: Txid,
    pub height: i64,
    pub transaction: Transaction,
}

/// One address worth of wallet: a derived signer plus a (shared) Electrum
/// client. All chain state is fetched on demand; nothing is cached across
/// calls.
pub struct Account {
    index: u32,
    network: BtcNetwork,
    bip: Bip,
    signer: Signer,
    client: Arc<ElectrumClient>,
}

impl Account {
    pub fn new(
        master: &HdNode,
        index: u32,
        bip: Bip,
        client: Arc<ElectrumClient>,
    ) -> Result<Self, WalletError> {
        let signer = Signer::new(master, bip, index, 0)?;
        Ok(Self { index, network: master.network(), bip, signer, client })
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn get_address(&self) -> &str {
        self.signer.address()
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    fn script(&self) -> &Script {
        self.signer.script_pubkey()
    }

    /// Confirmed balance in satoshis.
    pub async fn get_balance(&self) -> Result<u64, WalletError> {
        let balance = self.client.get_balance(self.script()).await?;
        Ok(balance.confirmed)
    }

    /// Run the planner and report the fee; nothing is built or broadcast.
    pub async fn quote_send_transaction(&self, request: &SendRequest) -> Result<Quote, WalletError> {
        let (selection, _, _) = self.plan(request).await?;
        Ok(Quote { fee_sats: selection.fee_sats })
    }

    /// Plan, build, sign, and broadcast a payment. On any failure before
    /// the final broadcast call, nothing has hit the network.
    pub async fn send_transaction(&self, request: &SendRequest) -> Result<SendOutcome, WalletError> {
        let (selection, to_script, rate) = self.plan(request).await?;

        // P2PKH inputs need their previous transactions for value
        // attestation; fetch each once per build.
        let mut prev_txs: HashMap<Txid, Transaction> = HashMap::new();
        if self.bip == Bip::Bip44 {
            for utxo in &selection.selected {
                if !prev_txs.contains_key(&utxo.txid) {
                    let tx = self.client.get_transaction(&utxo.txid).await?;
                    prev_txs.insert(utxo.txid, tx);
                }
            }
        }

        let build = BuildRequest {
            selection: &selection,
            to_script: &to_script,
            change_script: self.script(),
            amount_sats: request.value,
            fee_rate: rate,
            input_type: self.bip.script_type(),
            derivation: Some(DerivationMeta {
                master_fingerprint: self.signer.master_fingerprint(),
                path: self.signer.derivation_path().clone(),
                pubkey: self.signer.public_key(),
            }),
            prev_txs: &prev_txs,
        };
        let built = build_transaction(&build, &self.signer)?;
        log::debug!(
            "account {} sending {} sat (+{} fee) with {} inputs",
            self.index,
            request.value,
            built.fee_sats,
            selection.selected.len()
        );
        let tx: Transaction = bitcoin::consensus::deserialize(&built.raw)
            .map_err(|e| WalletError::SigningFailed(e.to_string()))?;
        let txid = self.client.broadcast(&tx).await?;
        log::debug!("broadcast accepted as {txid}");
        Ok(SendOutcome { txid, fee_sats: built.fee_sats })
    }

    /// Per-output history of this address, newest last, in history order.
    ///
    /// `limit` and `skip` page over transaction entries after the direction
    /// filter: all rows of a selected transaction are returned together.
    /// Change rows never appear.
    pub async fn get_transfers(&self, query: &TransferQuery) -> Result<Vec<Transfer>, WalletError> {
        let history = self.client.get_history(self.script()).await?;
        let mut cache: HashMap<Txid, Transaction> = HashMap::new();
        let mut groups: Vec<Vec<Transfer>> = Vec::new();

        for entry in &history {
            let tx = self.cached_tx(&mut cache, &entry.tx_hash).await?;
            let mut prevouts: Vec<TxOut> = Vec::with_capacity(tx.input.len());
            for txin in &tx.input {
                if txin.previous_output.is_null() {
                    continue; // coinbase
                }
                let prev = self.cached_tx(&mut cache, &txin.previous_output.txid).await?;
                let prevout = prev
                    .output
                    .get(txin.previous_output.vout as usize)
                    .cloned()
                    .ok_or_else(|| {
                        ElectrumError::InvalidResponse(format!(
                            "transaction {} lacks output {}",
                            txin.previous_output.txid, txin.previous_output.vout
                        ))
                    })?;
                prevouts.push(prevout);
            }

            let mut records = classify_outputs(
                entry.tx_hash,
                entry.height,
                &tx,
                &prevouts,
                self.script(),
                self.network,
            );
            if let Some(direction) = query.direction {
                records.retain(|r| r.direction == direction);
            }
            if !records.is_empty() {
                groups.push(records);
            }
        }

        Ok(groups
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .flatten()
            .collect())
    }

    /// The parsed transaction, if it is in this account's history with a
    /// confirming block; `None` otherwise.
    pub async fn get_transaction_receipt(
        &self,
        txid: &Txid,
    ) -> Result<Option<TransactionReceipt>, WalletError> {
        let history = self.client.get_history(self.script()).await?;
        let Some(entry) = history.iter().find(|e| e.tx_hash == *txid && e.height > 0) else {
            return Ok(None);
        };
        let transaction = self.client.get_transaction(txid).await?;
        Ok(Some(TransactionReceipt { txid: *txid, height: entry.height, transaction }))
    }

    /// Dispose the signer's secret material.
    pub fn dispose(&self) {
        self.signer.dispose();
    }

    async fn plan(
        &self,
        request: &SendRequest,
    ) -> Result<(Selection, ScriptBuf, u64), WalletError> {
        let to_script = address_to_script(&request.to, self.network)?;
        let to_type = script_type_of(&to_script)
            .ok_or_else(|| BtcError::InvalidAddress("unsupported recipient script".into()))?;
        let rate = self.resolve_fee_rate(request).await?;
        let utxos = self.fetch_utxos().await?;
        let selection = plan_spend(&utxos, self.bip.script_type(), to_type, request.value, rate)?;
        Ok((selection, to_script, rate))
    }

    async fn resolve_fee_rate(&self, request: &SendRequest) -> Result<u64, WalletError> {
        if let Some(rate) = request.fee_rate {
            return Ok(rate.max(1));
        }
        let btc_per_kb = self.client.estimate_fee(request.confirmation_target).await?;
        Ok(btc_per_kb_to_sat_per_vb(btc_per_kb))
    }

    async fn fetch_utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        let entries = self.client.list_unspent(self.script()).await?;
        Ok(entries
            .into_iter()
            .map(|entry| Utxo {
                txid: entry.tx_hash,
                vout: entry.tx_pos,
                value: entry.value,
                script_pubkey: self.script().to_owned(),
                height: entry.height,
            })
            .collect())
    }

    async fn cached_tx(
        &self,
        cache: &mut HashMap<Txid, Transaction>,
        txid: &Txid,
    ) -> Result<Transaction, WalletError> {
        if let Some(tx) = cache.get(txid) {
            return Ok(tx.clone());
        }
        let tx = self.client.get_transaction(txid).await?;
        cache.insert(*txid, tx.clone());
        Ok(tx)
    }
}

/// Convert an `estimatefee` result (BTC per kB, negative when unknown) to
/// a usable sat/vB rate.
fn btc_per_kb_to_sat_per_vb(btc_per_kb: f64) -> u64 {
    let sat_per_vb = (btc_per_kb * 1e5).round() as i64;
    sat_per_vb.max(1) as u64
}

/// Classify every output of `tx` relative to `own_script`.
///
/// An output to us in someone else's spend is incoming; an output to a
/// third party in our own spend is outgoing (with the transaction fee
/// attached); an output to ourselves in our own spend is change and is
/// dropped. Unrelated outputs are dropped too.
fn classify_outputs(
    txid: Txid,
    height: i64,
    tx: &Transaction,
    prevouts: &[TxOut],
    own_script: &Script,
    network: BtcNetwork,
) -> Vec<Transfer> {
    let total_input: u64 = prevouts.iter().map(|o| o.value.to_sat()).sum();
    let total_output: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
    let outgoing = prevouts.iter().any(|o| o.script_pubkey == *own_script);
    let fee = total_input.saturating_sub(total_output);

    let mut records = Vec::new();
    for (vout, txout) in tx.output.iter().enumerate() {
        let is_self = txout.script_pubkey == *own_script;
        let direction = match (is_self, outgoing) {
            (true, false) => TransferDirection::Incoming,
            (false, true) => TransferDirection::Outgoing,
            _ => continue,
        };
        let address = script_to_address(&txout.script_pubkey, network);
        records.push(Transfer {
            txid,
            vout: vout as u32,
            address: address.clone(),
            height,
            value_sats: txout.value.to_sat(),
            direction,
            fee_sats: (direction == TransferDirection::Outgoing).then_some(fee),
            recipient: if direction == TransferDirection::Outgoing { address } else { None },
        });
    }
    records
}
