use std::sync::RwLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bitcoin::bip32::{DerivationPath, Fingerprint};
use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Script, ScriptBuf, TxOut};
use chain_btc::address::{pubkey_to_address, pubkey_to_script};
use chain_btc::transaction::PsbtSigner;
use chain_btc::{BtcError, BtcNetwork};
use crypto_utils::hashes::double_sha256;
use crypto_utils::ZeroizingBytes;

use crate::error::WalletError;
use crate::hd::{self, HdNode};
use crate::types::{Bip, KeyPair};

/// Length-prefixed magic for the Bitcoin Signed Message convention.
const MESSAGE_MAGIC: &[u8] = b"\x18Bitcoin Signed Message:\n";

/// Double-SHA256 of magic + CompactSize(len) + message.
fn signed_message_hash(message: &str) -> [u8; 32] {
    let mut data = Vec::with_capacity(MESSAGE_MAGIC.len() + message.len() + 9);
    data.extend_from_slice(MESSAGE_MAGIC);
    VarInt(message.len() as u64)
        .consensus_encode(&mut data)
        .expect("writing to a Vec cannot fail");
    data.extend_from_slice(message.as_bytes());
    double_sha256(&data)
}

/// A seed-backed signer for one derived key.
///
/// Construction consumes the master node by value semantics: only the leaf
/// secret (in a zeroizing buffer), public metadata, and the master
/// fingerprint are retained. `dispose` drops the secret buffer; signing
/// afterwards fails with `Disposed`.
pub struct Signer {
    network: BtcNetwork,
    bip: Bip,
    path: DerivationPath,
    path_str: String,
    master_fingerprint: Fingerprint,
    public_key: PublicKey,
    script_pubkey: ScriptBuf,
    address: String,
    secret: RwLock<Option<ZeroizingBytes>>,
}

impl Signer {
    /// Derive the signing key for `account`/`index` under `bip` from the
    /// wallet's master node. `master` must be the depth-0 node so the PSBT
    /// fingerprint identifies the wallet root.
    pub fn new(master: &HdNode, bip: Bip, account: u32, index: u32) -> Result<Self, WalletError> {
        let network = master.network();
        let path = hd::leaf_path(bip, network, account, false, index)?;
        let path_str = format!(
            "m/{}'/{}'/{account}'/0/{index}",
            bip.purpose(),
            network.coin_type()
        );
        let leaf = master.derive(&path)?;
        let secret_key = leaf.secret_key().ok_or_else(|| {
            WalletError::DerivationFailed("cannot build a signer from a neutered node".into())
        })?;
        let pubkey_bytes = leaf.public_key();
        let public_key = PublicKey::from_slice(&pubkey_bytes)
            .map_err(|e| WalletError::DerivationFailed(e.to_string()))?;
        let script_pubkey = pubkey_to_script(&pubkey_bytes, bip.script_type())?;
        let address = pubkey_to_address(&pubkey_bytes, bip.script_type(), network)?;

        Ok(Self {
            network,
            bip,
            path,
            path_str,
            master_fingerprint: master.fingerprint(),
            public_key,
            script_pubkey,
            address,
            secret: RwLock::new(Some(ZeroizingBytes::from(secret_key.secret_bytes()))),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub fn bip(&self) -> Bip {
        self.bip
    }

    pub fn derivation_path(&self) -> &DerivationPath {
        &self.path
    }

    /// Canonical string form of the derivation path.
    pub fn path_string(&self) -> &str {
        &self.path_str
    }

    pub fn master_fingerprint(&self) -> Fingerprint {
        self.master_fingerprint
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public_key.serialize()
    }

    /// The output script this signer's inputs are locked to.
    pub fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    pub fn is_disposed(&self) -> bool {
        self.secret.read().expect("secret lock poisoned").is_none()
    }

    /// The key material; `private` is `None` once disposed. Callers are
    /// responsible for what they do with the private half.
    pub fn key_pair(&self) -> KeyPair {
        KeyPair {
            public: self.public_key_bytes(),
            private: self.secret.read().expect("secret lock poisoned").clone(),
        }
    }

    /// Sign `message` under the Bitcoin Signed Message convention and
    /// return the base64 compact signature with recovery header.
    pub fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        let secret = self.secret_bytes()?;
        let digest = signed_message_hash(message);
        let (signature, recovery_id) = crypto_utils::ecdsa::sign_ecdsa(&digest, &secret)?;

        // 27 + recovery, +4 for a compressed key, +4 more for P2WPKH.
        let mut header = 27 + recovery_id + 4;
        if self.bip == Bip::Bip84 {
            header += 4;
        }
        let mut out = Vec::with_capacity(65);
        out.push(header);
        out.extend_from_slice(&signature);
        Ok(BASE64.encode(out))
    }

    /// Verify a base64 message signature against this signer's key.
    /// Malformed signatures verify as `false` rather than erroring.
    pub fn verify_message(&self, message: &str, signature: &str) -> Result<bool, WalletError> {
        let raw = match BASE64.decode(signature) {
            Ok(raw) => raw,
            Err(_) => return Ok(false),
        };
        if raw.len() != 65 || raw[0] < 27 {
            return Ok(false);
        }
        let recovery_id = (raw[0] - 27) & 0x03;
        let compact: [u8; 64] = raw[1..].try_into().expect("length checked above");
        let digest = signed_message_hash(message);
        match crypto_utils::ecdsa::recover_pubkey(&digest, &compact, recovery_id) {
            Ok(recovered) => Ok(recovered == self.public_key_bytes()),
            Err(_) => Ok(false),
        }
    }

    /// Add partial signatures (SIGHASH_ALL, low-S) for every input locked
    /// to this signer's script. Inputs carrying other scripts are skipped
    /// silently; finalization is the builder's job.
    ///
    /// Input provenance is attested before signing: P2WPKH inputs need a
    /// `witness_utxo` (derived from `non_witness_utxo` when absent), P2PKH
    /// inputs the full previous transaction, which must match the outpoint
    /// txid.
    pub fn sign_psbt(&self, mut psbt: Psbt) -> Result<Psbt, WalletError> {
        let secret = self.secret_bytes()?;
        let secret_key = SecretKey::from_slice(&secret)
            .map_err(|e| WalletError::SigningFailed(e.to_string()))?;
        let secp = Secp256k1::new();
        let unsigned = psbt.unsigned_tx.clone();
        let mut cache = SighashCache::new(&unsigned);

        for (index, input) in psbt.inputs.iter_mut().enumerate() {
            let outpoint = unsigned.input[index].previous_output;
            let utxo: TxOut = match (&input.witness_utxo, &input.non_witness_utxo) {
                (Some(witness_utxo), _) => witness_utxo.clone(),
                (None, Some(prev)) => {
                    if prev.compute_txid() != outpoint.txid {
                        return Err(WalletError::SigningFailed(format!(
                            "previous transaction does not match input {index}"
                        )));
                    }
                    match prev.output.get(outpoint.vout as usize) {
                        Some(txout) => txout.clone(),
                        None => {
                            return Err(WalletError::SigningFailed(format!(
                                "previous transaction lacks output {}",
                                outpoint.vout
                            )))
                        }
                    }
                }
                (None, None) => continue,
            };
            if utxo.script_pubkey != self.script_pubkey {
                continue;
            }

            input
                .bip32_derivation
                .entry(self.public_key)
                .or_insert_with(|| (self.master_fingerprint, self.path.clone()));

            let sighash = match self.bip {
                Bip::Bip84 => {
                    if input.witness_utxo.is_none() {
                        input.witness_utxo = Some(utxo.clone());
                    }
                    cache
                        .p2wpkh_signature_hash(
                            index,
                            &utxo.script_pubkey,
                            utxo.value,
                            EcdsaSighashType::All,
                        )
                        .map_err(|e| WalletError::SigningFailed(e.to_string()))?
                        .to_byte_array()
                }
                Bip::Bip44 => {
                    if input.non_witness_utxo.is_none() {
                        return Err(WalletError::SigningFailed(format!(
                            "input {index} needs its previous transaction for value attestation"
                        )));
                    }
                    cache
                        .legacy_signature_hash(
                            index,
                            &utxo.script_pubkey,
                            EcdsaSighashType::All.to_u32(),
                        )
                        .map_err(|e| WalletError::SigningFailed(e.to_string()))?
                        .to_byte_array()
                }
            };

            let signature = secp.sign_ecdsa(&Message::from_digest(sighash), &secret_key);
            input.partial_sigs.insert(
                bitcoin::PublicKey::new(self.public_key),
                bitcoin::ecdsa::Signature { signature, sighash_type: EcdsaSighashType::All },
            );
        }
        Ok(psbt)
    }

    /// Drop the secret buffer; the zeroizing wipe runs here. Signing
    /// operations fail with `Disposed` from now on.
    pub fn dispose(&self) {
        *self.secret.write().expect("secret lock poisoned") = None;
    }

    fn secret_bytes(&self) -> Result<[u8; 32], WalletError> {
        let guard = self.secret.read().expect("secret lock poisoned");
        let secret = guard.as_ref().ok_or(WalletError::Disposed)?;
        secret
            .to_array()
            .ok_or_else(|| WalletError::SigningFailed("corrupt secret buffer".into()))
    }
}

impl PsbtSigner for Signer {
    fn script_pubkey(&self) -> &Script {
        &self.script_pubkey
    }

    fn sign_psbt(&self, psbt: Psbt) -> Result<Psbt, BtcError> {
        Signer::sign_psbt(self, psbt).map_err(|e| BtcError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic::mnemonic_to_seed;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, Txid, Witness};

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon about";

    fn test_signer(bip: Bip) -> Signer {
        let seed = mnemonic_to_seed(TEST_MNEMONIC, "").unwrap();
        let master = HdNode::from_seed(&seed, BtcNetwork::Mainnet).unwrap();
        Signer::new(&master, bip, 0, 0).unwrap()
    }

    #[test]
    fn derives_the_bip84_vector_address() {
        let signer = test_signer(Bip::Bip84);
        assert_eq!(signer.address(), "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
        assert_eq!(
            hex::encode(signer.public_key_bytes()),
            "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c"
        );
        assert_eq!(signer.path_string(), "m/84'/0'/0'/0/0");
    }

    #[test]
    fn sign_and_verify_message() {
        let signer = test_signer(Bip::Bip84);
        let signature = signer.sign_message("Hello, world!").unwrap();
        assert!(signer.verify_message("Hello, world!", &signature).unwrap());
        assert!(!signer.verify_message("tampered", &signature).unwrap());
    }

    #[test]
    fn message_header_encodes_script_family() {
        let raw84 = BASE64
            .decode(test_signer(Bip::Bip84).sign_message("x").unwrap())
            .unwrap();
        assert!((35..=38).contains(&raw84[0]), "header {}", raw84[0]);

        let raw44 = BASE64
            .decode(test_signer(Bip::Bip44).sign_message("x").unwrap())
            .unwrap();
        assert!((31..=34).contains(&raw44[0]), "header {}", raw44[0]);
    }

    #[test]
    fn garbage_signatures_verify_false() {
        let signer = test_signer(Bip::Bip84);
        assert!(!signer.verify_message("m", "not base64 at all!").unwrap());
        assert!(!signer.verify_message("m", &BASE64.encode([0u8; 10])).unwrap());
    }

    fn psbt_spending(signer: &Signer, value: u64) -> Psbt {
        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_slice(&[9u8; 32]).unwrap(), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::default(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(value - 1_000),
                script_pubkey: ScriptBuf::new_p2wpkh(
                    &bitcoin::WPubkeyHash::from_slice(&[7u8; 20]).unwrap(),
                ),
            }],
        };
        let mut psbt = Psbt::from_unsigned_tx(unsigned).unwrap();
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: signer.script_pubkey.clone(),
        });
        psbt
    }

    #[test]
    fn sign_psbt_adds_signature_and_derivation() {
        let signer = test_signer(Bip::Bip84);
        let signed = signer.sign_psbt(psbt_spending(&signer, 100_000)).unwrap();
        let input = &signed.inputs[0];
        assert_eq!(input.partial_sigs.len(), 1);
        let (fingerprint, path) = input.bip32_derivation.get(&signer.public_key()).unwrap();
        assert_eq!(*fingerprint, signer.master_fingerprint());
        assert_eq!(path, signer.derivation_path());
    }

    #[test]
    fn foreign_inputs_are_skipped_silently() {
        let signer = test_signer(Bip::Bip84);
        let mut psbt = psbt_spending(&signer, 100_000);
        // Re-point the utxo at someone else's script.
        psbt.inputs[0].witness_utxo = Some(TxOut {
            value: Amount::from_sat(100_000),
            script_pubkey: ScriptBuf::new_p2wpkh(
                &bitcoin::WPubkeyHash::from_slice(&[8u8; 20]).unwrap(),
            ),
        });
        let signed = signer.sign_psbt(psbt).unwrap();
        assert!(signed.inputs[0].partial_sigs.is_empty());
        assert!(signed.inputs[0].bip32_derivation.is_empty());
    }

    #[test]
    fn disposed_signer_refuses_to_sign() {
        let signer = test_signer(Bip::Bip84);
        assert!(!signer.is_disposed());
        assert!(signer.key_pair().private.is_some());

        signer.dispose();
        assert!(signer.is_disposed());
        assert!(signer.key_pair().private.is_none());
        assert!(matches!(
            signer.sign_message("x"),
            Err(WalletError::Disposed)
        ));
        assert!(matches!(
            signer.sign_psbt(psbt_spending(&signer, 10_000)),
            Err(WalletError::Disposed)
        ));
        // The address and public key survive disposal.
        assert_eq!(signer.address(), "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
    }

    #[test]
    fn signature_is_deterministic() {
        let signer = test_signer(Bip::Bip84);
        let a = signer.sign_message("same message").unwrap();
        let b = signer.sign_message("same message").unwrap();
        assert_eq!(a, b);
    }
}
