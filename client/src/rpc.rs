use std::time::Duration;

use futures::future::join_all;
use motherlode_api::{decode, prelude::*, sdk};
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{config::ClientConfig, error::ClientError};

/// Error body returned by the fullnode REST API.
#[derive(Deserialize, Debug)]
pub struct NodeErrorBody {
    pub message: String,
    pub error_code: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct LedgerInfo {
    pub chain_id: u8,
    #[serde(deserialize_with = "u64_from_str")]
    pub ledger_timestamp: u64,
}

#[derive(Deserialize, Debug)]
struct AccountData {
    #[serde(deserialize_with = "u64_from_str")]
    sequence_number: u64,
}

#[derive(Deserialize, Debug)]
struct GasEstimate {
    gas_estimate: u64,
}

#[derive(Deserialize, Debug)]
struct CoinStoreResource {
    data: CoinStoreData,
}

#[derive(Deserialize, Debug)]
struct CoinStoreData {
    coin: CoinValue,
}

#[derive(Deserialize, Debug)]
struct CoinValue {
    value: Amount,
}

/// Unsigned transaction in the node's JSON submission format.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UserTransactionRequest {
    pub sender: Address,
    pub sequence_number: String,
    pub max_gas_amount: String,
    pub gas_unit_price: String,
    pub expiration_timestamp_secs: String,
    pub payload: EntryFunctionPayload,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct TransactionSignature {
    #[serde(rename = "type")]
    pub signature_type: String,
    pub public_key: String,
    pub signature: String,
}

impl TransactionSignature {
    pub fn ed25519(public_key: &[u8], signature: &[u8]) -> Self {
        Self {
            signature_type: "ed25519_signature".to_string(),
            public_key: format!("0x{}", hex::encode(public_key)),
            signature: format!("0x{}", hex::encode(signature)),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub request: UserTransactionRequest,
    pub signature: TransactionSignature,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct PendingTransaction {
    pub hash: String,
}

#[derive(Deserialize, Debug)]
struct TransactionView {
    #[serde(rename = "type")]
    kind: String,
    hash: String,
    success: Option<bool>,
    vm_status: Option<String>,
    version: Option<String>,
    gas_used: Option<String>,
}

/// A transaction the node has executed, successfully or not.
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedTransaction {
    pub hash: String,
    pub success: bool,
    pub vm_status: String,
    pub version: u64,
    pub gas_used: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransactionStatus {
    /// Unknown to the node or still in the mempool.
    Pending,
    Committed(CommittedTransaction),
}

/// Typed boundary to the game contract on a fullnode.
///
/// Every `fetch_*` read returns a classified [`ClientError`] on failure and
/// maps "account/resource not found" to an empty value.
#[derive(Clone, Debug)]
pub struct RemoteStateClient {
    base_url: String,
    contract: Contract,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl RemoteStateClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: config.fullnode_url().trim_end_matches('/').to_string(),
            contract: config.contract.clone(),
            http,
            request_timeout: config.request_timeout,
        })
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    // ============ Transport ============

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.request_timeout)
            } else {
                ClientError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.request_timeout)
            } else {
                ClientError::Transport(e.to_string())
            }
        })?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        if !status.is_success() {
            let (error_code, message) = match serde_json::from_slice::<NodeErrorBody>(&bytes) {
                Ok(body) => (body.error_code, body.message),
                Err(_) => (None, String::from_utf8_lossy(&bytes).into_owned()),
            };
            if message.to_ascii_lowercase().contains("rate limit") {
                return Err(ClientError::RateLimited);
            }
            return Err(ClientError::Node {
                status: status.as_u16(),
                error_code,
                message,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| ClientError::Malformed(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.base_url, path);
        self.send(self.http.get(url)).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.base_url, path);
        self.send(self.http.post(url).json(body)).await
    }

    /// Calls a view function and returns its raw result values.
    pub async fn view(&self, request: &ViewRequest) -> Result<Vec<Value>, ClientError> {
        let values: Vec<Value> = self.post_json("view", request).await?;
        tracing::trace!(function = %request.function, ?values, "view");
        Ok(values)
    }

    // ============ Game reads ============

    pub async fn fetch_round_status(&self) -> Result<RoundSnapshot, ClientError> {
        let values = self.view(&sdk::get_round_status(&self.contract)).await?;
        Ok(RoundSnapshot::from_view(&values)?)
    }

    pub async fn fetch_game_state(&self) -> Result<GameState, ClientError> {
        let values = self.view(&sdk::get_game_state(&self.contract)).await?;
        Ok(GameState::from_view(&values)?)
    }

    /// `index` is the contract index, 0..=24.
    pub async fn fetch_block(&self, index: u8) -> Result<GridCell, ClientError> {
        if index as usize >= GRID_SIZE {
            return Err(MotherlodeError::InvalidBlock(index as u64 + 1).into());
        }
        let values = self.view(&sdk::get_block(&self.contract, index)).await?;
        Ok(GridCell::from_view(index, &values)?)
    }

    /// Reads all 25 blocks concurrently.
    ///
    /// A block that fails to load is zeroed for this cycle without affecting
    /// the others. If every block fails the whole read fails.
    pub async fn fetch_grid(&self) -> Result<Grid, ClientError> {
        let results = join_all((0..GRID_SIZE as u8).map(|i| self.fetch_block(i))).await;

        let mut cells = Vec::with_capacity(GRID_SIZE);
        let mut failures = 0;
        let mut last_error = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(cell) => cells.push(cell),
                Err(err) => {
                    tracing::warn!(
                        block = index + 1,
                        %err,
                        "block fetch failed, using zeroed cell"
                    );
                    cells.push(GridCell::zeroed(index as u8));
                    failures += 1;
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if failures == GRID_SIZE => Err(err),
            _ => Ok(Grid::from_cells(cells)),
        }
    }

    pub async fn fetch_motherlode(&self) -> Result<Amount, ClientError> {
        let values = self.view(&sdk::get_motherlode_pool(&self.contract)).await?;
        Ok(single_amount(&values, "motherlode_pool")?)
    }

    pub async fn fetch_miner_stats(&self, miner: Address) -> Result<MinerStats, ClientError> {
        match self.view(&sdk::get_miner_state(&self.contract, miner)).await {
            Ok(values) => Ok(MinerStats::from_view(&values)?),
            Err(err) if err.is_absence() => Ok(MinerStats::default()),
            Err(err) => Err(err),
        }
    }

    /// Native coin balance from the account's coin store.
    pub async fn fetch_primary_balance(&self, account: Address) -> Result<Amount, ClientError> {
        let path = format!("accounts/{account}/resource/{NATIVE_COIN_STORE}");
        match self.get_json::<CoinStoreResource>(&path).await {
            Ok(resource) => Ok(resource.data.coin.value),
            Err(err) if err.is_absence() => Ok(Amount::ZERO),
            Err(err) => Err(err),
        }
    }

    /// MORE balance via the token module's `balance_of` view.
    pub async fn fetch_reward_balance(&self, account: Address) -> Result<Amount, ClientError> {
        match self.view(&sdk::more_balance_of(&self.contract, account)).await {
            Ok(values) => Ok(single_amount(&values, "balance")?),
            Err(err) if err.is_absence() => Ok(Amount::ZERO),
            Err(err) => Err(err),
        }
    }

    /// Automation record merged with the keeper's runway estimate. `None`
    /// when the user never enabled automation.
    pub async fn fetch_automation(
        &self,
        user: Address,
    ) -> Result<Option<AutomationConfig>, ClientError> {
        let config_request = sdk::get_automation_config(&self.contract, user);
        let estimate_request = sdk::estimate_rounds_remaining(&self.contract, user);
        let (config, estimate) =
            futures::join!(self.view(&config_request), self.view(&estimate_request));

        let config = match config {
            Ok(values) => AutomationConfig::from_view(&values)?,
            Err(err) if err.is_absence() => None,
            Err(err) => return Err(err),
        };
        let Some(config) = config else {
            return Ok(None);
        };

        let rounds = match estimate {
            Ok(values) => single_u64(&values, "rounds_remaining")?,
            Err(err) if err.is_absence() => 0,
            Err(err) => return Err(err),
        };
        Ok(Some(config.with_estimate(rounds)))
    }

    pub async fn fetch_can_execute_automation(&self, user: Address) -> Result<bool, ClientError> {
        let values = self.view(&sdk::can_execute_automation(&self.contract, user)).await?;
        match values.first() {
            Some(value) => Ok(decode::as_bool(value, "can_execute")?),
            None => Ok(false),
        }
    }

    /// Latest settled round, or a specific one.
    pub async fn fetch_round_result(&self, round: Option<u64>) -> Result<RoundResult, ClientError> {
        let request = match round {
            Some(round) => sdk::get_round_result_by_number(&self.contract, round),
            None => sdk::get_round_result(&self.contract),
        };
        let values = self.view(&request).await?;
        Ok(RoundResult::from_view(&values)?)
    }

    pub async fn fetch_total_rounds(&self) -> Result<u64, ClientError> {
        let values = self.view(&sdk::get_total_rounds(&self.contract)).await?;
        Ok(single_u64(&values, "total_rounds")?)
    }

    pub async fn fetch_protocol_fees(&self) -> Result<ProtocolFees, ClientError> {
        let values = self.view(&sdk::get_protocol_fees(&self.contract)).await?;
        Ok(ProtocolFees::from_view(&values)?)
    }

    // ============ Transactions ============

    pub async fn ledger_info(&self) -> Result<LedgerInfo, ClientError> {
        self.get_json("").await
    }

    pub async fn account_sequence_number(&self, account: Address) -> Result<u64, ClientError> {
        let data: AccountData = self.get_json(&format!("accounts/{account}")).await?;
        Ok(data.sequence_number)
    }

    pub async fn estimate_gas_price(&self) -> Result<u64, ClientError> {
        let estimate: GasEstimate = self.get_json("estimate_gas_price").await?;
        Ok(estimate.gas_estimate)
    }

    /// Asks the node for the exact bytes the sender must sign.
    pub async fn encode_submission(
        &self,
        request: &UserTransactionRequest,
    ) -> Result<Vec<u8>, ClientError> {
        let encoded: String = self.post_json("transactions/encode_submission", request).await?;
        let digits = encoded.strip_prefix("0x").unwrap_or(&encoded);
        hex::decode(digits).map_err(|e| ClientError::Malformed(format!("signing message: {e}")))
    }

    pub async fn submit_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<PendingTransaction, ClientError> {
        self.post_json("transactions", signed).await
    }

    pub async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, ClientError> {
        let view = match self
            .get_json::<TransactionView>(&format!("transactions/by_hash/{hash}"))
            .await
        {
            Ok(view) => view,
            Err(ClientError::Node { status: 404, .. }) => return Ok(TransactionStatus::Pending),
            Err(err) => return Err(err),
        };
        if view.kind == "pending_transaction" {
            return Ok(TransactionStatus::Pending);
        }
        Ok(TransactionStatus::Committed(CommittedTransaction {
            hash: view.hash,
            success: view.success.unwrap_or(false),
            vm_status: view.vm_status.unwrap_or_default(),
            version: view.version.and_then(|v| v.parse().ok()).unwrap_or_default(),
            gas_used: view.gas_used.and_then(|g| g.parse().ok()).unwrap_or_default(),
        }))
    }

    /// Polls until the transaction is committed. `Ok(None)` on timeout.
    ///
    /// Transient read errors while waiting are retried; anything else is
    /// returned.
    pub async fn wait_for_transaction(
        &self,
        hash: &str,
        timeout: Duration,
        poll: Duration,
    ) -> Result<Option<CommittedTransaction>, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.transaction_status(hash).await {
                Ok(TransactionStatus::Committed(tx)) => return Ok(Some(tx)),
                Ok(TransactionStatus::Pending) => {}
                Err(err) if err.is_transient() => {
                    tracing::debug!(%hash, %err, "transaction status read failed, retrying");
                }
                Err(err) => return Err(err),
            }
            if tokio::time::Instant::now() + poll > deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Logs a failed read and substitutes its documented default.
pub fn or_fallback<T>(result: Result<T, ClientError>, fallback: T, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(%err, "{what} read failed, using fallback");
            fallback
        }
    }
}

fn u64_from_str<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    decode::as_u64(&value, "u64").map_err(serde::de::Error::custom)
}
