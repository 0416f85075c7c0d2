use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chain_btc::BtcNetwork;
use crypto_utils::ZeroizingBytes;
use electrum_rpc::ElectrumClient;

use crate::account::Account;
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::fees::{self, FeeRates};
use crate::hd::HdNode;
use crate::mnemonic::{self, ValidatedMnemonic};
use crate::types::Bip;

/// The wallet: owns the seed, hands out accounts, shares one Electrum
/// client among them.
///
/// Nothing is persisted; the mnemonic alone reconstructs the wallet. The
/// mnemonic string itself is not retained, only the derived seed, which is
/// zeroized on [`Wallet::dispose`].
pub struct Wallet {
    config: WalletConfig,
    seed: Mutex<Option<ZeroizingBytes>>,
    client: Arc<ElectrumClient>,
    accounts: Mutex<HashMap<u32, Arc<Account>>>,
    http: reqwest::Client,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Validate the mnemonic and build a wallet with its own Electrum
    /// client from the configuration.
    pub fn new(mnemonic: &str, config: WalletConfig) -> Result<Self, WalletError> {
        let client = Arc::new(ElectrumClient::new(config.electrum.clone()));
        Self::with_client(mnemonic, config, client)
    }

    /// Same, but share an externally constructed client.
    pub fn with_client(
        mnemonic: &str,
        config: WalletConfig,
        client: Arc<ElectrumClient>,
    ) -> Result<Self, WalletError> {
        let mnemonic = ValidatedMnemonic::new(mnemonic)?;
        let seed = mnemonic.to_seed("")?;
        Ok(Self {
            config,
            seed: Mutex::new(Some(seed)),
            client,
            accounts: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
        })
    }

    /// Generate a fresh 12- or 24-word mnemonic.
    pub fn generate_mnemonic(word_count: usize) -> Result<String, WalletError> {
        mnemonic::generate_mnemonic(word_count)
    }

    pub fn network(&self) -> BtcNetwork {
        self.config.network
    }

    pub fn bip(&self) -> Bip {
        self.config.bip
    }

    pub fn electrum(&self) -> Arc<ElectrumClient> {
        Arc::clone(&self.client)
    }

    /// The account at `index`, deriving it on first use.
    pub fn get_account(&self, index: u32) -> Result<Arc<Account>, WalletError> {
        if let Some(account) = self
            .accounts
            .lock()
            .expect("accounts lock poisoned")
            .get(&index)
        {
            return Ok(Arc::clone(account));
        }

        // The master node exists only for the duration of the derivation.
        let master = {
            let guard = self.seed.lock().expect("seed lock poisoned");
            let seed = guard.as_ref().ok_or(WalletError::Disposed)?;
            HdNode::from_seed(seed, self.config.network)?
        };
        let account = Arc::new(Account::new(
            &master,
            index,
            self.config.bip,
            Arc::clone(&self.client),
        )?);
        let mut accounts = self.accounts.lock().expect("accounts lock poisoned");
        let entry = accounts.entry(index).or_insert_with(|| Arc::clone(&account));
        Ok(Arc::clone(entry))
    }

    /// Current oracle fee rates in sat/vB.
    pub async fn get_fee_rates(&self) -> Result<FeeRates, WalletError> {
        fees::fetch_fee_rates(&self.http, fees::FEE_ORACLE_URL).await
    }

    /// Zeroize the seed, dispose every account's signer, and close the
    /// Electrum connection. The wallet is unusable afterwards.
    pub async fn dispose(&self) {
        *self.seed.lock().expect("seed lock poisoned") = None;
        for account in self.accounts.lock().expect("accounts lock poisoned").values() {
            account.dispose();
        }
        self.client.close().await;
        log::debug!("wallet disposed");
    }
}
