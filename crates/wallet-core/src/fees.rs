use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// The recommended-fees endpoint of the mempool.space oracle.
pub const FEE_ORACLE_URL: &str = "https://mempool.space/api/v1/fees/recommended";

/// Oracle fee rates in sat/vB, passed through without unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    /// Targets roughly an hour.
    pub normal: u64,
    /// Targets the next block.
    pub fast: u64,
}

#[derive(Debug, Deserialize)]
struct RecommendedFees {
    #[serde(rename = "fastestFee")]
    fastest_fee: u64,
    #[serde(rename = "hourFee")]
    hour_fee: u64,
}

impl From<RecommendedFees> for FeeRates {
    fn from(fees: RecommendedFees) -> Self {
        Self { normal: fees.hour_fee.max(1), fast: fees.fastest_fee.max(1) }
    }
}

/// Fetch the recommended rates over HTTPS.
pub async fn fetch_fee_rates(
    http: &reqwest::Client,
    url: &str,
) -> Result<FeeRates, WalletError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| WalletError::FeeOracle(e.to_string()))?
        .error_for_status()
        .map_err(|e| WalletError::FeeOracle(e.to_string()))?;
    let fees: RecommendedFees = response
        .json()
        .await
        .map_err(|e| WalletError::FeeOracle(e.to_string()))?;
    Ok(fees.into())
}
