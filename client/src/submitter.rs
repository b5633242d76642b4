use std::collections::HashSet;

use motherlode_api::{prelude::*, sdk};

use crate::{
    config::ClientConfig,
    error::{is_insufficient_funds, SubmitError},
    poller::{AggregateId, RefreshHandle},
    rpc::{
        CommittedTransaction, RemoteStateClient, SignedTransaction, TransactionSignature,
        UserTransactionRequest,
    },
    signer::{SignerError, TransactionSigner},
};

/// A write the client can make against the game contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameAction {
    /// Deploy `amount_per_block` to each of the visible `blocks`.
    Deploy {
        blocks: Vec<BlockNumber>,
        amount_per_block: Amount,
    },
    EnableAutomation {
        stake: Amount,
        amount_per_block: Amount,
        strategy: Strategy,
        custom_blocks: Vec<BlockNumber>,
    },
    DisableAutomation,
    AddAutomationStake {
        amount: Amount,
    },
    TestFaucet,
}

impl GameAction {
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::Deploy { .. } => "deploy",
            GameAction::EnableAutomation { .. } => "enable_automation",
            GameAction::DisableAutomation => "disable_automation",
            GameAction::AddAutomationStake { .. } => "add_automation_stake",
            GameAction::TestFaucet => "test_faucet",
        }
    }

    /// Rejects requests the contract would refuse, before any network call.
    pub fn validate(&self) -> Result<(), SubmitError> {
        match self {
            GameAction::Deploy {
                blocks,
                amount_per_block,
            } => {
                if blocks.is_empty() {
                    return Err(SubmitError::Validation("Select at least one block.".to_string()));
                }
                check_unique(blocks)?;
                if *amount_per_block < Amount::from_base_units(MIN_DEPLOYMENT) {
                    return Err(SubmitError::Validation(format!(
                        "Minimum deployment is {} per block.",
                        Amount::from_base_units(MIN_DEPLOYMENT)
                    )));
                }
                self.total_cost().map(|_| ())
            }
            GameAction::EnableAutomation {
                stake,
                amount_per_block,
                strategy,
                custom_blocks,
            } => {
                if *stake < Amount::from_base_units(MIN_AUTOMATION_STAKE) {
                    return Err(SubmitError::Validation(format!(
                        "Minimum stake is {}.",
                        Amount::from_base_units(MIN_AUTOMATION_STAKE)
                    )));
                }
                if amount_per_block.is_zero() {
                    return Err(SubmitError::Validation(
                        "Amount per block must be greater than zero.".to_string(),
                    ));
                }
                if amount_per_block > stake {
                    return Err(SubmitError::Validation(
                        "Amount per block exceeds the stake.".to_string(),
                    ));
                }
                if *strategy == Strategy::Custom && custom_blocks.is_empty() {
                    return Err(SubmitError::Validation(
                        "The custom strategy needs at least one block.".to_string(),
                    ));
                }
                check_unique(custom_blocks)
            }
            GameAction::AddAutomationStake { amount } => {
                if amount.is_zero() {
                    return Err(SubmitError::Validation(
                        "Top-up amount must be greater than zero.".to_string(),
                    ));
                }
                Ok(())
            }
            GameAction::DisableAutomation | GameAction::TestFaucet => Ok(()),
        }
    }

    /// Native coin the action moves out of the sender's account, gas aside.
    pub fn total_cost(&self) -> Result<Amount, SubmitError> {
        match self {
            GameAction::Deploy {
                blocks,
                amount_per_block,
            } => amount_per_block
                .checked_mul(blocks.len() as u64)
                .ok_or_else(|| SubmitError::Validation("Deployment total overflows.".to_string())),
            GameAction::EnableAutomation { stake, .. } => Ok(*stake),
            GameAction::AddAutomationStake { amount } => Ok(*amount),
            GameAction::DisableAutomation | GameAction::TestFaucet => Ok(Amount::ZERO),
        }
    }

    pub fn payload(&self, contract: &Contract) -> EntryFunctionPayload {
        match self {
            GameAction::Deploy {
                blocks,
                amount_per_block,
            } => sdk::deploy(contract, blocks, *amount_per_block),
            GameAction::EnableAutomation {
                stake,
                amount_per_block,
                strategy,
                custom_blocks,
            } => sdk::enable_automation(
                contract,
                *stake,
                *amount_per_block,
                *strategy,
                custom_blocks,
            ),
            GameAction::DisableAutomation => sdk::disable_automation(contract),
            GameAction::AddAutomationStake { amount } => {
                sdk::add_automation_stake(contract, *amount)
            }
            GameAction::TestFaucet => sdk::test_faucet(contract),
        }
    }

    /// Aggregates whose remote state a confirmed action may have changed.
    pub fn refresh_targets(&self) -> &'static [AggregateId] {
        match self {
            GameAction::Deploy { .. } => &[
                AggregateId::PrimaryBalance,
                AggregateId::Grid,
                AggregateId::GameState,
                AggregateId::MinerStats,
                AggregateId::Motherlode,
            ],
            GameAction::EnableAutomation { .. }
            | GameAction::DisableAutomation
            | GameAction::AddAutomationStake { .. } => {
                &[AggregateId::Automation, AggregateId::PrimaryBalance]
            }
            GameAction::TestFaucet => &[AggregateId::RewardBalance],
        }
    }
}

fn check_unique(blocks: &[BlockNumber]) -> Result<(), SubmitError> {
    let mut seen = HashSet::new();
    for block in blocks {
        if !seen.insert(*block) {
            return Err(SubmitError::Validation(format!("Block {block} is selected twice.")));
        }
    }
    Ok(())
}

/// Where a submission got to. `Failed` can follow any other stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmissionStage {
    Built,
    Signed,
    Submitted { hash: String },
    Confirmed { hash: String },
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: String,
    pub version: u64,
    pub gas_used: u64,
    pub explorer_url: String,
}

/// Builds, signs, submits and confirms game transactions for one signer.
pub struct TransactionSubmitter<S> {
    client: RemoteStateClient,
    config: ClientConfig,
    signer: S,
    refresh: Option<RefreshHandle>,
}

impl<S: TransactionSigner> TransactionSubmitter<S> {
    pub fn new(client: RemoteStateClient, config: ClientConfig, signer: S) -> Self {
        Self {
            client,
            config,
            signer,
            refresh: None,
        }
    }

    /// Refresh the affected aggregates through `refresh` after each confirmation.
    pub fn with_refresh(mut self, refresh: RefreshHandle) -> Self {
        self.refresh = Some(refresh);
        self
    }

    pub async fn submit(&self, action: &GameAction) -> Result<Confirmation, SubmitError> {
        self.submit_with_progress(action, |_| {}).await
    }

    /// Runs the full submission, reporting each stage reached to `progress`.
    pub async fn submit_with_progress(
        &self,
        action: &GameAction,
        mut progress: impl FnMut(&SubmissionStage),
    ) -> Result<Confirmation, SubmitError> {
        let result = self.run(action, &mut progress).await;
        match &result {
            Ok(confirmation) => {
                tracing::info!(
                    action = action.name(),
                    hash = %confirmation.hash,
                    "transaction confirmed"
                );
                if let Some(refresh) = &self.refresh {
                    refresh.force_refresh_all(action.refresh_targets());
                }
            }
            Err(err) => {
                tracing::error!(action = action.name(), %err, "transaction failed");
                progress(&SubmissionStage::Failed);
            }
        }
        result
    }

    async fn run(
        &self,
        action: &GameAction,
        progress: &mut impl FnMut(&SubmissionStage),
    ) -> Result<Confirmation, SubmitError> {
        action.validate()?;
        let sender = self.signer.address();
        self.check_balance(action, sender).await?;

        let request = self.build(action, sender).await?;
        progress(&SubmissionStage::Built);

        let message = self.client.encode_submission(&request).await?;
        let signature = self.signer.sign(&message).await.map_err(|err| match err {
            SignerError::Rejected(reason) => SubmitError::SignatureRejected(reason),
            SignerError::Unavailable(reason) => {
                SubmitError::Validation(format!("No wallet available: {reason}"))
            }
        })?;
        progress(&SubmissionStage::Signed);

        let signed = SignedTransaction {
            request,
            signature: TransactionSignature::ed25519(&self.signer.public_key(), &signature),
        };
        let pending = self.client.submit_transaction(&signed).await?;
        let hash = pending.hash;
        tracing::debug!(action = action.name(), %hash, "transaction submitted");
        progress(&SubmissionStage::Submitted { hash: hash.clone() });

        let committed = self
            .client
            .wait_for_transaction(
                &hash,
                self.config.confirmation_timeout,
                self.config.confirmation_poll,
            )
            .await
            .map_err(|err| match SubmitError::from(err) {
                SubmitError::Aborted { vm_status, .. } => SubmitError::Aborted {
                    hash: Some(hash.clone()),
                    vm_status,
                },
                other => other,
            })?
            .ok_or_else(|| SubmitError::ConfirmationTimeout { hash: hash.clone() })?;
        classify(&committed)?;
        progress(&SubmissionStage::Confirmed { hash: hash.clone() });

        Ok(Confirmation {
            explorer_url: self.config.tx_explorer_url(&hash),
            hash,
            version: committed.version,
            gas_used: committed.gas_used,
        })
    }

    // A failed balance read does not block the submission; the chain has the
    // final say.
    async fn check_balance(&self, action: &GameAction, sender: Address) -> Result<(), SubmitError> {
        let cost = action.total_cost()?;
        if cost.is_zero() {
            return Ok(());
        }
        match self.client.fetch_primary_balance(sender).await {
            Ok(balance) if balance < cost => Err(SubmitError::InsufficientFunds(format!(
                "Need {cost} but the wallet holds {balance}."
            ))),
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::debug!(%err, "balance pre-check skipped");
                Ok(())
            }
        }
    }

    async fn build(
        &self,
        action: &GameAction,
        sender: Address,
    ) -> Result<UserTransactionRequest, SubmitError> {
        let (sequence_number, gas_unit_price, ledger) = futures::try_join!(
            self.client.account_sequence_number(sender),
            self.client.estimate_gas_price(),
            self.client.ledger_info(),
        )?;
        let expiration =
            ledger.ledger_timestamp / 1_000_000 + self.config.transaction_ttl.as_secs();
        Ok(UserTransactionRequest {
            sender,
            sequence_number: sequence_number.to_string(),
            max_gas_amount: self.config.max_gas_amount.to_string(),
            gas_unit_price: gas_unit_price.to_string(),
            expiration_timestamp_secs: expiration.to_string(),
            payload: action.payload(self.client.contract()),
        })
    }
}

/// Maps a committed but unsuccessful transaction to its failure reason.
pub fn classify(tx: &CommittedTransaction) -> Result<(), SubmitError> {
    if tx.success {
        return Ok(());
    }
    if is_insufficient_funds(&tx.vm_status) {
        return Err(SubmitError::InsufficientFunds(tx.vm_status.clone()));
    }
    Err(SubmitError::Aborted {
        hash: Some(tx.hash.clone()),
        vm_status: tx.vm_status.clone(),
    })
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use futures::future::{BoxFuture, FutureExt};
    use serde_json::Value;

    use super::*;
    use crate::{
        poller::{PollerConfig, PollerRegistry},
        testing::{MockNode, Route},
    };

    struct FakeSigner {
        reject: bool,
    }

    fn submitter(node: &MockNode, reject: bool) -> TransactionSubmitter<FakeSigner> {
        TransactionSubmitter::new(node.client(), node.config(), FakeSigner { reject })
    }

    impl TransactionSigner for FakeSigner {
        fn address(&self) -> Address {
            "0xbeef".parse().unwrap()
        }

        fn public_key(&self) -> Vec<u8> {
            vec![7; 32]
        }

        fn sign<'a>(&'a self, message: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, SignerError>> {
            async move {
                if self.reject {
                    Err(SignerError::Rejected("user declined".to_string()))
                } else {
                    Ok(message.iter().rev().copied().collect())
                }
            }
            .boxed()
        }
    }

    fn blocks(list: &str) -> Vec<BlockNumber> {
        parse_block_list(list).unwrap()
    }

    fn deploy(list: &str, amount: &str) -> GameAction {
        GameAction::Deploy {
            blocks: blocks(list),
            amount_per_block: amount.parse().unwrap(),
        }
    }

    fn chain_routes(balance: &str, tx: &str) -> Vec<Route> {
        vec![
            Route::get("/resource/", &format!(r#"{{"data":{{"coin":{{"value":"{balance}"}}}}}}"#)),
            Route::get("/estimate_gas_price", r#"{"gas_estimate":100}"#),
            Route::get("/transactions/by_hash/", tx),
            Route::new("POST", "/transactions/encode_submission", 200, r#""0x0a0b0c""#),
            Route::new("POST", "/transactions", 202, r#"{"hash":"0xfeed"}"#),
            Route::get("/accounts/", r#"{"sequence_number":"5","authentication_key":"0x0"}"#),
            Route::get("/v1", r#"{"chain_id":250,"ledger_timestamp":"1700000000000000"}"#),
        ]
    }

    const SUCCESS: &str = r#"{
        "type": "user_transaction",
        "hash": "0xfeed",
        "success": true,
        "vm_status": "Executed successfully",
        "version": "99",
        "gas_used": "12"
    }"#;

    #[test]
    fn test_validation() {
        assert!(deploy("1,5,9", "2.5").validate().is_ok());
        assert!(matches!(
            GameAction::Deploy {
                blocks: vec![],
                amount_per_block: Amount::from_tokens(1).unwrap()
            }
            .validate(),
            Err(SubmitError::Validation(_))
        ));
        assert!(deploy("1,1", "1").validate().is_err());
        assert!(deploy("3", "0.5").validate().is_err());

        let enable = |stake: &str, strategy, custom: &str| GameAction::EnableAutomation {
            stake: stake.parse().unwrap(),
            amount_per_block: "1".parse().unwrap(),
            strategy,
            custom_blocks: if custom.is_empty() { vec![] } else { blocks(custom) },
        };
        assert!(enable("10", Strategy::Random, "").validate().is_ok());
        assert!(enable("9.99", Strategy::Random, "").validate().is_err());
        assert!(enable("10", Strategy::Custom, "").validate().is_err());
        assert!(enable("10", Strategy::Custom, "2,7").validate().is_ok());
        assert!(GameAction::AddAutomationStake { amount: Amount::ZERO }.validate().is_err());
    }

    #[test]
    fn test_deploy_payload_and_cost() {
        let action = deploy("1,5,9", "2.5");
        let payload = action.payload(&ClientConfig::testnet().contract);
        assert_eq!(payload.arguments[1], serde_json::json!([0, 4, 8]));
        assert_eq!(payload.arguments[2], serde_json::json!("250000000"));
        assert_eq!(action.total_cost().unwrap(), "7.5".parse().unwrap());
    }

    #[test]
    fn test_refresh_targets() {
        let targets = deploy("1", "1").refresh_targets();
        assert!(targets.contains(&AggregateId::Grid));
        assert!(targets.contains(&AggregateId::PrimaryBalance));
        assert_eq!(
            GameAction::DisableAutomation.refresh_targets(),
            &[AggregateId::Automation, AggregateId::PrimaryBalance]
        );
    }

    #[test]
    fn test_classify() {
        let mut tx = CommittedTransaction {
            hash: "0x1".to_string(),
            success: true,
            vm_status: "Executed successfully".to_string(),
            version: 1,
            gas_used: 1,
        };
        assert!(classify(&tx).is_ok());

        tx.success = false;
        tx.vm_status = "Move abort in 0x1::coin: EINSUFFICIENT_BALANCE(0x10006)".to_string();
        assert!(matches!(classify(&tx), Err(SubmitError::InsufficientFunds(_))));

        tx.vm_status = "Move abort in game_state_v3: E_ROUND_ENDED(0x3)".to_string();
        let err = classify(&tx).unwrap_err();
        assert!(matches!(err, SubmitError::Aborted { hash: Some(_), .. }));
        assert!(err.user_message().contains("E_ROUND_ENDED"));
    }

    #[tokio::test]
    async fn test_submit_confirms_and_refreshes() {
        let node = MockNode::start(chain_routes("1000000000", SUCCESS)).await;
        let mut config = node.config();
        config.confirmation_poll = Duration::from_millis(10);

        let refreshed = std::sync::Arc::new(Mutex::new(Vec::new()));
        let mut registry = PollerRegistry::new();
        for id in [AggregateId::Grid, AggregateId::PrimaryBalance] {
            let sink = refreshed.clone();
            registry
                .register(
                    id,
                    PollerConfig::new(Duration::from_secs(3600), || async { Ok(()) })
                        .on_success(move |_| sink.lock().unwrap().push(id)),
                )
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        refreshed.lock().unwrap().clear();

        let submitter =
            TransactionSubmitter::new(node.client(), config, FakeSigner { reject: false })
                .with_refresh(registry.refresh_handle());
        let mut stages = Vec::new();
        let confirmation = submitter
            .submit_with_progress(&deploy("1,5,9", "2.5"), |stage| stages.push(stage.clone()))
            .await
            .unwrap();

        assert_eq!(confirmation.hash, "0xfeed");
        assert_eq!(confirmation.version, 99);
        assert!(confirmation.explorer_url.contains("/txn/0xfeed"));
        assert_eq!(
            stages,
            vec![
                SubmissionStage::Built,
                SubmissionStage::Signed,
                SubmissionStage::Submitted { hash: "0xfeed".into() },
                SubmissionStage::Confirmed { hash: "0xfeed".into() },
            ]
        );

        let submit = node
            .requests_to("/transactions")
            .into_iter()
            .find(|r| r.method == "POST" && r.path.ends_with("/transactions"))
            .unwrap();
        let submitted: Value = serde_json::from_str(&submit.body).unwrap();
        assert_eq!(submitted["sequence_number"], "5");
        assert_eq!(submitted["expiration_timestamp_secs"], "1700000060");
        assert_eq!(submitted["payload"]["arguments"][1], serde_json::json!([0, 4, 8]));
        assert_eq!(submitted["signature"]["signature"], "0x0c0b0a");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut refreshed = refreshed.lock().unwrap().clone();
        refreshed.sort();
        assert_eq!(refreshed, vec![AggregateId::Grid, AggregateId::PrimaryBalance]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_insufficient_balance_stops_before_signing() {
        let node = MockNode::start(chain_routes("100000000", SUCCESS)).await;
        let err = submitter(&node, false).submit(&deploy("1,2", "1")).await.unwrap_err();
        assert!(matches!(err, SubmitError::InsufficientFunds(_)));
        assert!(node.requests_to("encode_submission").is_empty());
    }

    #[tokio::test]
    async fn test_rejected_signature() {
        let node = MockNode::start(chain_routes("0", SUCCESS)).await;
        let mut stages = Vec::new();
        let err = submitter(&node, true)
            .submit_with_progress(&GameAction::DisableAutomation, |stage| {
                stages.push(stage.clone())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::SignatureRejected(_)));
        assert_eq!(stages, vec![SubmissionStage::Built, SubmissionStage::Failed]);
    }

    #[tokio::test]
    async fn test_on_chain_abort() {
        let aborted = SUCCESS
            .replace("\"success\": true", "\"success\": false")
            .replace("Executed successfully", "Move abort: E_NOT_ACTIVE(0x2)");
        let node = MockNode::start(chain_routes("0", &aborted)).await;
        let err = submitter(&node, false).submit(&GameAction::TestFaucet).await.unwrap_err();
        assert_eq!(
            err,
            SubmitError::Aborted {
                hash: Some("0xfeed".to_string()),
                vm_status: "Move abort: E_NOT_ACTIVE(0x2)".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_validation_skips_network() {
        let node = MockNode::start(vec![]).await;
        let err = submitter(&node, false).submit(&deploy("4", "0.1")).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(_)));
        assert!(node.requests().is_empty());
    }
}
