use bitcoin::{OutPoint, ScriptBuf, Txid};

use crate::address::ScriptType;
use crate::error::BtcError;

/// Hard cap on the number of inputs one transaction may fund itself with.
pub const MAX_UTXO_INPUTS: usize = 200;

/// Absolute fee floor in satoshis, independent of the fee rate.
pub const MIN_ABSOLUTE_FEE: u64 = 141;

/// Fixed transaction overhead in vbytes: version, locktime, segwit
/// marker/flag and the in/out counts.
pub const TX_OVERHEAD_VBYTES: u64 = 11;

/// A single unspent transaction output.
#[derive(Debug, Clone)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    /// The locking script.
    pub script_pubkey: ScriptBuf,
    /// Block height of the confirming block, 0 while unconfirmed.
    pub height: u32,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }

    /// Confirmation count relative to the chain tip.
    pub fn confirmations(&self, tip_height: u32) -> u32 {
        if self.height == 0 || self.height > tip_height {
            0
        } else {
            tip_height - self.height + 1
        }
    }
}

/// A funding plan: the inputs to spend, the fee they pay, and the change
/// that returns to the sender.
#[derive(Debug, Clone)]
pub struct Selection {
    pub selected: Vec<Utxo>,
    pub fee_sats: u64,
    pub change_sats: u64,
}

/// A drain plan: spend every UTXO to a single output.
#[derive(Debug, Clone)]
pub struct DrainPlan {
    pub selected: Vec<Utxo>,
    pub fee_sats: u64,
    /// Amount delivered to the recipient after the fee.
    pub amount_sats: u64,
}

/// Estimated virtual size for a transaction shape.
fn estimated_vbytes(num_inputs: usize, input_type: ScriptType, outputs: &[ScriptType]) -> u64 {
    TX_OVERHEAD_VBYTES
        + num_inputs as u64 * input_type.input_vbytes()
        + outputs.iter().map(|o| o.output_vbytes()).sum::<u64>()
}

/// Estimated fee for a transaction shape at `fee_rate` sat/vB, never below
/// the absolute floor.
pub fn estimate_fee(
    num_inputs: usize,
    input_type: ScriptType,
    outputs: &[ScriptType],
    fee_rate: u64,
) -> u64 {
    (estimated_vbytes(num_inputs, input_type, outputs) * fee_rate).max(MIN_ABSOLUTE_FEE)
}

/// Select UTXOs to fund `amount_sats` to a `to_type` output at `fee_rate`
/// sat/vB.
///
/// Policy: prefer any single UTXO that covers amount plus the one-input fee;
/// otherwise accumulate in list order. Change below its own dust limit is
/// absorbed into the fee and the plan collapses to one output. The result is
/// deterministic for a given UTXO order.
pub fn plan_spend(
    utxos: &[Utxo],
    input_type: ScriptType,
    to_type: ScriptType,
    amount_sats: u64,
    fee_rate: u64,
) -> Result<Selection, BtcError> {
    let rate = fee_rate.max(1);
    let dust = to_type.dust_limit();
    if amount_sats <= dust {
        return Err(BtcError::AmountBelowDust { value: amount_sats, dust });
    }

    let two_outputs = [to_type, input_type];
    let fee_one_input = estimate_fee(1, input_type, &two_outputs, rate);

    let selected: Vec<Utxo> = match utxos
        .iter()
        .find(|u| u.value >= amount_sats + fee_one_input)
    {
        Some(single) => vec![single.clone()],
        None => {
            let mut acc: Vec<Utxo> = Vec::new();
            let mut total = 0u64;
            let mut covered = false;
            for utxo in utxos {
                if acc.len() == MAX_UTXO_INPUTS {
                    return Err(BtcError::TooManyInputs { max: MAX_UTXO_INPUTS });
                }
                total += utxo.value;
                acc.push(utxo.clone());
                let fee = estimate_fee(acc.len(), input_type, &two_outputs, rate);
                if total >= amount_sats + fee {
                    covered = true;
                    break;
                }
            }
            if !covered {
                let fee = estimate_fee(acc.len().max(1), input_type, &two_outputs, rate);
                return Err(BtcError::InsufficientBalance {
                    needed: amount_sats + fee,
                    available: total,
                });
            }
            acc
        }
    };

    let total: u64 = selected.iter().map(|u| u.value).sum();
    let mut fee = estimate_fee(selected.len(), input_type, &two_outputs, rate);
    if total < amount_sats + fee {
        return Err(BtcError::InsufficientBalance {
            needed: amount_sats + fee,
            available: total,
        });
    }
    let mut change = total - amount_sats - fee;

    // Sub-dust change is not worth an output; fold it into the fee.
    if change > 0 && change <= input_type.dust_limit() {
        fee += change;
        change = 0;
    }

    Ok(Selection { selected, fee_sats: fee, change_sats: change })
}

/// Plan spending the entire UTXO set to one output.
pub fn plan_drain(
    utxos: &[Utxo],
    input_type: ScriptType,
    to_type: ScriptType,
    fee_rate: u64,
) -> Result<DrainPlan, BtcError> {
    if utxos.len() > MAX_UTXO_INPUTS {
        return Err(BtcError::TooManyInputs { max: MAX_UTXO_INPUTS });
    }
    let rate = fee_rate.max(1);
    let total: u64 = utxos.iter().map(|u| u.value).sum();
    let fee = estimate_fee(utxos.len(), input_type, &[to_type], rate);
    if total <= fee {
        return Err(BtcError::InsufficientBalance { needed: fee + 1, available: total });
    }
    let amount = total - fee;
    if amount <= to_type.dust_limit() {
        return Err(BtcError::AmountBelowDust { value: amount, dust: to_type.dust_limit() });
    }
    Ok(DrainPlan { selected: utxos.to_vec(), fee_sats: fee, amount_sats: amount })
}
