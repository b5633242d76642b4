use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    address::Address,
    amount::Amount,
    block::BlockNumber,
    consts::*,
    state::Strategy,
};

/// Contract modules the client talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Module {
    MoreToken,
    GameState,
    Motherlode,
    Automation,
}

/// Published module names. Defaults to the v3 deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNames {
    pub more_token: String,
    pub game_state: String,
    pub motherlode: String,
    pub automation: String,
}

impl Default for ModuleNames {
    fn default() -> Self {
        Self {
            more_token: MORE_TOKEN_MODULE.to_string(),
            game_state: GAME_STATE_MODULE.to_string(),
            motherlode: MOTHERLODE_MODULE.to_string(),
            automation: AUTOMATION_MODULE.to_string(),
        }
    }
}

/// The deployed game contract. Its address doubles as the admin address
/// every view and entry function takes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub address: Address,
    pub modules: ModuleNames,
}

impl Contract {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            modules: ModuleNames::default(),
        }
    }

    /// Fully qualified `address::module::function` id.
    pub fn function_id(&self, module: Module, function: &str) -> String {
        let module = match module {
            Module::MoreToken => &self.modules.more_token,
            Module::GameState => &self.modules.game_state,
            Module::Motherlode => &self.modules.motherlode,
            Module::Automation => &self.modules.automation,
        };
        format!("{}::{}::{}", self.address, module, function)
    }

    fn admin_arg(&self) -> Value {
        json!(self.address.to_string())
    }
}

/// Body of a `POST /view` request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewRequest {
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl ViewRequest {
    pub fn new(function: String, arguments: Vec<Value>) -> Self {
        Self {
            function,
            type_arguments: vec![],
            arguments,
        }
    }
}

/// An entry-function call, ready to be wrapped in a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl EntryFunctionPayload {
    pub fn new(function: String, arguments: Vec<Value>) -> Self {
        Self {
            payload_type: "entry_function_payload".to_string(),
            function,
            type_arguments: vec![],
            arguments,
        }
    }
}

// u64 arguments are encoded as decimal strings, u8 as bare numbers.
fn u64_arg(value: u64) -> Value {
    json!(value.to_string())
}

fn block_indices(blocks: &[BlockNumber]) -> Value {
    Value::Array(blocks.iter().map(|b| json!(b.contract_index())).collect())
}

// ============ Views ============

pub fn get_game_state(contract: &Contract) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::GameState, "get_game_state"),
        vec![contract.admin_arg()],
    )
}

pub fn get_round_status(contract: &Contract) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::GameState, "get_round_status"),
        vec![contract.admin_arg()],
    )
}

pub fn get_miner_state(contract: &Contract, miner: Address) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::GameState, "get_miner_state"),
        vec![json!(miner.to_string())],
    )
}

/// `index` is the contract index, 0..=24.
pub fn get_block(contract: &Contract, index: u8) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::GameState, "get_block"),
        vec![contract.admin_arg(), json!(index)],
    )
}

pub fn get_protocol_fees(contract: &Contract) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::GameState, "get_protocol_fees"),
        vec![contract.admin_arg()],
    )
}

pub fn get_motherlode_pool(contract: &Contract) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Motherlode, "get_motherlode_pool"),
        vec![contract.admin_arg()],
    )
}

pub fn get_round_result(contract: &Contract) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Motherlode, "get_round_result"),
        vec![contract.admin_arg()],
    )
}

pub fn get_round_result_by_number(contract: &Contract, round: u64) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Motherlode, "get_round_result_by_number"),
        vec![contract.admin_arg(), u64_arg(round)],
    )
}

pub fn get_total_rounds(contract: &Contract) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Motherlode, "get_total_rounds"),
        vec![contract.admin_arg()],
    )
}

pub fn get_automation_config(contract: &Contract, user: Address) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Automation, "get_automation_config"),
        vec![json!(user.to_string())],
    )
}

pub fn estimate_rounds_remaining(contract: &Contract, user: Address) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Automation, "estimate_rounds_remaining"),
        vec![json!(user.to_string())],
    )
}

pub fn can_execute_automation(contract: &Contract, user: Address) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::Automation, "can_execute_automation"),
        vec![json!(user.to_string()), contract.admin_arg()],
    )
}

pub fn more_balance_of(contract: &Contract, account: Address) -> ViewRequest {
    ViewRequest::new(
        contract.function_id(Module::MoreToken, "balance_of"),
        vec![json!(account.to_string()), contract.admin_arg()],
    )
}

// ============ Entry functions ============

/// Deploys `amount_per_block` to each of `blocks`.
///
/// Visible block numbers are converted to contract indices here and nowhere
/// else.
pub fn deploy(
    contract: &Contract,
    blocks: &[BlockNumber],
    amount_per_block: Amount,
) -> EntryFunctionPayload {
    EntryFunctionPayload::new(
        contract.function_id(Module::GameState, "deploy"),
        vec![
            contract.admin_arg(),
            block_indices(blocks),
            u64_arg(amount_per_block.base_units()),
        ],
    )
}

pub fn enable_automation(
    contract: &Contract,
    stake: Amount,
    amount_per_block: Amount,
    strategy: Strategy,
    custom_blocks: &[BlockNumber],
) -> EntryFunctionPayload {
    EntryFunctionPayload::new(
        contract.function_id(Module::Automation, "enable_automation"),
        vec![
            u64_arg(stake.base_units()),
            u64_arg(amount_per_block.base_units()),
            json!(u8::from(strategy)),
            block_indices(custom_blocks),
        ],
    )
}

pub fn disable_automation(contract: &Contract) -> EntryFunctionPayload {
    EntryFunctionPayload::new(
        contract.function_id(Module::Automation, "disable_automation"),
        vec![],
    )
}

pub fn add_automation_stake(contract: &Contract, amount: Amount) -> EntryFunctionPayload {
    EntryFunctionPayload::new(
        contract.function_id(Module::Automation, "add_automation_stake"),
        vec![u64_arg(amount.base_units())],
    )
}

/// Mints test MORE to the sender.
pub fn test_faucet(contract: &Contract) -> EntryFunctionPayload {
    EntryFunctionPayload::new(
        contract.function_id(Module::MoreToken, "test_faucet"),
        vec![contract.admin_arg()],
    )
}
