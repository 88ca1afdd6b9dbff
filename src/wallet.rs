//! Per-venue deposit/withdraw wallet-state oracle.
//!
//! Tables refresh from each venue's public wallet-status surface; entries
//! default to unknown and stay unknown when a venue cannot be queried.
//! Unknown never blocks an opportunity — it propagates to the wire as "?".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{DepositStatus, Tradeable, Venue, WalletEntry};

/// Wallet tables move slowly; venues are polled on a relaxed cadence.
const REFRESH_INTERVAL: Duration = Duration::from_secs(300);

pub struct WalletOracle {
    client: Client,
    table: RwLock<HashMap<(Venue, String), WalletEntry>>,
    binance_credentials: Option<(String, String)>,
}

impl WalletOracle {
    pub fn new(cfg: &Config) -> Self {
        let client = Client::builder()
            .timeout(cfg.connector_timeout)
            .user_agent(crate::connectors::USER_AGENT)
            .build()
            .unwrap_or_default();
        let binance_credentials = cfg
            .binance_api_key
            .clone()
            .zip(cfg.binance_api_secret.clone());
        Self { client, table: RwLock::new(HashMap::new()), binance_credentials }
    }

    /// Current flags for (venue, asset); unknown when never reported.
    pub fn status(&self, venue: Venue, asset: &str) -> WalletEntry {
        self.table
            .read()
            .get(&(venue, asset.to_uppercase()))
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&self, venue: Venue, asset: &str, entry: WalletEntry) {
        self.table.write().insert((venue, asset.to_uppercase()), entry);
    }

    /// Tradeability of a kimchi pair. With a positive premium the flow is
    /// buy-foreign → withdraw → deposit-korean → sell; a negative premium
    /// inverts it. Any required flag false blocks; otherwise any unknown
    /// stays unknown.
    pub fn kimchi_tradeable(
        &self,
        foreign: Venue,
        korean: Venue,
        asset: &str,
        premium_positive: bool,
    ) -> (Tradeable, DepositStatus) {
        let (buy_venue, sell_venue) = if premium_positive {
            (foreign, korean)
        } else {
            (korean, foreign)
        };
        let withdraw_side = self.status(buy_venue, asset).withdraw;
        let deposit_side = self.status(sell_venue, asset).deposit;

        let verdict = match (withdraw_side, deposit_side) {
            (Some(false), _) | (_, Some(false)) => Tradeable::No,
            (Some(true), Some(true)) => Tradeable::Yes,
            _ => Tradeable::Unknown,
        };
        (verdict, DepositStatus { buy: withdraw_side, sell: deposit_side })
    }

    pub async fn refresh(&self) {
        if let Err(err) = self.refresh_upbit().await {
            warn!(error = %err, "upbit wallet status refresh failed");
        }
        if let Err(err) = self.refresh_bithumb().await {
            warn!(error = %err, "bithumb wallet status refresh failed");
        }
        if let Err(err) = self.refresh_okx().await {
            warn!(error = %err, "okx wallet status refresh failed");
        }
        if let Err(err) = self.refresh_bybit().await {
            warn!(error = %err, "bybit wallet status refresh failed");
        }
        // Binance wallet config needs signed credentials; entries stay
        // unknown when none are configured.
        if self.binance_credentials.is_some() {
            if let Err(err) = self.refresh_binance().await {
                warn!(error = %err, "binance wallet status refresh failed");
            }
        }
    }

    async fn refresh_binance(&self) -> anyhow::Result<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        #[derive(Deserialize)]
        struct Row {
            coin: String,
            #[serde(rename = "depositAllEnable")]
            deposit_all_enable: bool,
            #[serde(rename = "withdrawAllEnable")]
            withdraw_all_enable: bool,
        }

        let Some((key, secret)) = self.binance_credentials.as_ref() else {
            return Ok(());
        };
        let query = format!(
            "timestamp={}&recvWindow=5000",
            chrono::Utc::now().timestamp_millis()
        );
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow::anyhow!("invalid binance api secret"))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        let url = format!(
            "https://api.binance.com/sapi/v1/capital/config/getall?{query}&signature={signature}"
        );
        let rows: Vec<Row> = self
            .client
            .get(url)
            .header("X-MBX-APIKEY", key.as_str())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut table = self.table.write();
        for row in rows {
            table.insert(
                (Venue::Binance, row.coin.to_uppercase()),
                WalletEntry {
                    deposit: Some(row.deposit_all_enable),
                    withdraw: Some(row.withdraw_all_enable),
                },
            );
        }
        Ok(())
    }

    async fn refresh_upbit(&self) -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Row {
            currency: String,
            wallet_state: String,
        }
        let rows: Vec<Row> = self
            .client
            .get("https://api.upbit.com/v1/status/wallet")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let mut table = self.table.write();
        for row in rows {
            let deposit = matches!(row.wallet_state.as_str(), "working" | "deposit_only");
            let withdraw = matches!(row.wallet_state.as_str(), "working" | "withdraw_only");
            table.insert(
                (Venue::Upbit, row.currency.to_uppercase()),
                WalletEntry { deposit: Some(deposit), withdraw: Some(withdraw) },
            );
        }
        Ok(())
    }

    async fn refresh_bithumb(&self) -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Payload {
            status: String,
            data: HashMap<String, Value>,
        }
        let payload: Payload = self
            .client
            .get("https://api.bithumb.com/public/assetsstatus/ALL")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if payload.status != "0000" {
            anyhow::bail!("bithumb status {}", payload.status);
        }
        let mut table = self.table.write();
        for (symbol, entry) in payload.data {
            let Some(obj) = entry.as_object() else {
                continue;
            };
            let deposit = obj.get("deposit_status").and_then(Value::as_i64).map(|v| v == 1);
            let withdraw = obj.get("withdrawal_status").and_then(Value::as_i64).map(|v| v == 1);
            table.insert(
                (Venue::Bithumb, symbol.to_uppercase()),
                WalletEntry { deposit, withdraw },
            );
        }
        Ok(())
    }

    async fn refresh_okx(&self) -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Payload {
            data: Option<Vec<Row>>,
        }
        #[derive(Deserialize)]
        struct Row {
            ccy: String,
            #[serde(rename = "canDep")]
            can_dep: bool,
            #[serde(rename = "canWd")]
            can_wd: bool,
        }
        let payload: Payload = self
            .client
            .get("https://www.okx.com/api/v5/asset/currencies")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let mut table = self.table.write();
        for row in payload.data.unwrap_or_default() {
            // Multiple chains per currency: enabled on any chain counts.
            let key = (Venue::Okx, row.ccy.to_uppercase());
            let entry = table.entry(key).or_insert(WalletEntry {
                deposit: Some(false),
                withdraw: Some(false),
            });
            entry.deposit = Some(entry.deposit.unwrap_or(false) || row.can_dep);
            entry.withdraw = Some(entry.withdraw.unwrap_or(false) || row.can_wd);
        }
        Ok(())
    }

    async fn refresh_bybit(&self) -> anyhow::Result<()> {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(rename = "retCode")]
            ret_code: i64,
            result: Option<ResultRows>,
        }
        #[derive(Deserialize)]
        struct ResultRows {
            rows: Vec<Row>,
        }
        #[derive(Deserialize)]
        struct Row {
            coin: String,
            chains: Vec<Chain>,
        }
        #[derive(Deserialize)]
        struct Chain {
            #[serde(rename = "chainDeposit")]
            chain_deposit: String,
            #[serde(rename = "chainWithdraw")]
            chain_withdraw: String,
        }
        let payload: Payload = self
            .client
            .get("https://api.bybit.com/v5/asset/coin/query-info")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if payload.ret_code != 0 {
            anyhow::bail!("bybit retCode {}", payload.ret_code);
        }
        let mut table = self.table.write();
        for row in payload.result.map(|r| r.rows).unwrap_or_default() {
            let deposit = row.chains.iter().any(|c| c.chain_deposit == "1");
            let withdraw = row.chains.iter().any(|c| c.chain_withdraw == "1");
            table.insert(
                (Venue::Bybit, row.coin.to_uppercase()),
                WalletEntry { deposit: Some(deposit), withdraw: Some(withdraw) },
            );
        }
        Ok(())
    }
}

pub fn spawn_wallet_refresher(oracle: Arc<WalletOracle>) {
    tokio::spawn(async move {
        info!(interval_secs = REFRESH_INTERVAL.as_secs(), "wallet status refresher started");
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        loop {
            ticker.tick().await;
            oracle.refresh().await;
        }
    });
}
