use std::collections::HashMap;

use bitcoin::absolute::LockTime;
use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::psbt::Psbt;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};

use crate::address::{script_type_of, ScriptType};
use crate::error::BtcError;
use crate::utxo::Selection;

/// HD metadata attached to every owned PSBT input so signers can locate the
/// key: master fingerprint, full path, and the derived pubkey.
#[derive(Debug, Clone)]
pub struct DerivationMeta {
    pub master_fingerprint: Fingerprint,
    pub path: DerivationPath,
    pub pubkey: bitcoin::secp256k1::PublicKey,
}

/// Something that can add partial signatures for the inputs it owns.
///
/// The seed-backed signer lives in the wallet crate; hardware or
/// private-key-only signers can substitute here, managing their own
/// derivation metadata.
pub trait PsbtSigner {
    /// Output script whose inputs this signer can satisfy.
    fn script_pubkey(&self) -> &Script;

    /// Return the PSBT with partial signatures added for every owned input.
    /// Inputs belonging to other scripts are left untouched.
    fn sign_psbt(&self, psbt: Psbt) -> Result<Psbt, BtcError>;
}

/// Everything the builder needs to assemble and sign one transaction.
pub struct BuildRequest<'a> {
    pub selection: &'a Selection,
    pub to_script: &'a Script,
    pub change_script: &'a Script,
    pub amount_sats: u64,
    /// Fee rate in sat/vB used for the reconciliation check.
    pub fee_rate: u64,
    pub input_type: ScriptType,
    /// HD metadata for the owned inputs; `None` for signers that manage
    /// their own paths.
    pub derivation: Option<DerivationMeta>,
    /// Previous raw transactions by txid; required for every P2PKH input.
    pub prev_txs: &'a HashMap<Txid, Transaction>,
}

/// A finalized wire transaction ready to broadcast.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub txid: Txid,
    pub raw: Vec<u8>,
    pub fee_sats: u64,
}

impl BuiltTransaction {
    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw)
    }
}

/// Assemble, sign, finalize and extract a transaction.
///
/// The planner's fee is checked against the actual virtual size after
/// signing; at most one rebuild absorbs a shortfall (out of change first,
/// else out of the recipient amount). A second shortfall is fatal.
pub fn build_transaction<S: PsbtSigner>(
    request: &BuildRequest<'_>,
    signer: &S,
) -> Result<BuiltTransaction, BtcError> {
    let rate = request.fee_rate.max(1);
    let to_type = script_type_of(request.to_script)
        .ok_or_else(|| BtcError::InvalidAddress("unsupported recipient script".into()))?;
    let change_dust = request.input_type.dust_limit();

    let mut amount = request.amount_sats;
    let mut fee = request.selection.fee_sats;
    let mut change = request.selection.change_sats;

    for rebuild in [false, true] {
        let psbt = assemble_psbt(request, amount, change)?;
        let signed = signer.sign_psbt(psbt)?;
        let tx = finalize_and_extract(signed, request.input_type)?;

        let required = tx.vsize() as u64 * rate;
        if required <= fee {
            return Ok(BuiltTransaction {
                txid: tx.compute_txid(),
                raw: bitcoin::consensus::serialize(&tx),
                fee_sats: fee,
            });
        }
        if rebuild {
            return Err(BtcError::FeeShortfall);
        }

        let shortfall = required - fee;
        if change >= shortfall {
            change -= shortfall;
            fee = required;
            if change > 0 && change <= change_dust {
                fee += change;
                change = 0;
            }
        } else if change == 0 {
            if amount <= shortfall || amount - shortfall <= to_type.dust_limit() {
                return Err(BtcError::FeeShortfall);
            }
            amount -= shortfall;
            fee = required;
        } else {
            return Err(BtcError::FeeShortfall);
        }
    }
    Err(BtcError::FeeShortfall)
}

/// Build the unsigned PSBT: inputs from the selection, recipient output at
/// index 0, change (when present) at index 1.
fn assemble_psbt(
    request: &BuildRequest<'_>,
    amount_sats: u64,
    change_sats: u64,
) -> Result<Psbt, BtcError> {
    let inputs: Vec<TxIn> = request
        .selection
        .selected
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        })
        .collect();

    let mut outputs = vec![TxOut {
        value: Amount::from_sat(amount_sats),
        script_pubkey: request.to_script.to_owned(),
    }];
    if change_sats > 0 {
        outputs.push(TxOut {
            value: Amount::from_sat(change_sats),
            script_pubkey: request.change_script.to_owned(),
        });
    }

    let unsigned = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };
    let mut psbt = Psbt::from_unsigned_tx(unsigned)
        .map_err(|e| BtcError::TransactionBuild(e.to_string()))?;

    for (index, utxo) in request.selection.selected.iter().enumerate() {
        match request.input_type {
            ScriptType::P2wpkh => {
                psbt.inputs[index].witness_utxo = Some(TxOut {
                    value: Amount::from_sat(utxo.value),
                    script_pubkey: utxo.script_pubkey.clone(),
                });
            }
            ScriptType::P2pkh => {
                let prev = request.prev_txs.get(&utxo.txid).ok_or_else(|| {
                    BtcError::TransactionBuild(format!(
                        "missing previous transaction {} for input {index}",
                        utxo.txid
                    ))
                })?;
                psbt.inputs[index].non_witness_utxo = Some(prev.clone());
            }
        }
        if let Some(meta) = &request.derivation {
            psbt.inputs[index]
                .bip32_derivation
                .insert(meta.pubkey, (meta.master_fingerprint, meta.path.clone()));
        }
    }
    Ok(psbt)
}

/// Turn partial signatures into final witnesses / scriptSigs and extract the
/// wire transaction.
fn finalize_and_extract(psbt: Psbt, input_type: ScriptType) -> Result<Transaction, BtcError> {
    let mut tx = psbt.unsigned_tx.clone();
    for (index, input) in psbt.inputs.iter().enumerate() {
        let (pubkey, signature) = input.partial_sigs.iter().next().ok_or_else(|| {
            BtcError::Signing(format!("no signature for input {index}"))
        })?;
        match input_type {
            ScriptType::P2wpkh => {
                let mut witness = Witness::new();
                witness.push(signature.to_vec());
                witness.push(pubkey.to_bytes());
                tx.input[index].witness = witness;
            }
            ScriptType::P2pkh => {
                let sig_push = PushBytesBuf::try_from(signature.to_vec())
                    .map_err(|e| BtcError::Signing(e.to_string()))?;
                let key_push = PushBytesBuf::try_from(pubkey.to_bytes())
                    .map_err(|e| BtcError::Signing(e.to_string()))?;
                tx.input[index].script_sig = Builder::new()
                    .push_slice(sig_push)
                    .push_slice(key_push)
                    .into_script();
            }
        }
    }
    Ok(tx)
}
