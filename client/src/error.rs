use std::time::Duration;

use motherlode_api::error::MotherlodeError;
use thiserror::Error;

use crate::poller::AggregateId;

/// Failure of a read against the fullnode.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by node")]
    RateLimited,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("node responded with {status}: {message}")]
    Node {
        status: u16,
        error_code: Option<String>,
        message: String,
    },

    #[error(transparent)]
    Decode(#[from] MotherlodeError),
}

impl ClientError {
    /// Errors worth retrying on the next poll.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_)
            | ClientError::Timeout(_)
            | ClientError::RateLimited
            | ClientError::Malformed(_)
            | ClientError::Decode(_) => true,
            ClientError::Node { status, .. } => *status >= 500,
        }
    }

    /// The queried account, resource or record simply does not exist yet.
    ///
    /// Only the node's typed not-found codes and Move aborts naming a
    /// not-found condition count. A bare 404 from a proxy or a wrong base
    /// path is an error.
    pub fn is_absence(&self) -> bool {
        match self {
            ClientError::Node {
                error_code,
                message,
                ..
            } => {
                matches!(
                    error_code.as_deref(),
                    Some("resource_not_found" | "account_not_found" | "table_item_not_found")
                ) || is_not_found_abort(message)
            }
            _ => false,
        }
    }
}

/// Abort names such as `EBALANCE_NOT_FOUND`, or the VM's `MISSING_DATA`
/// raised when a view borrows a resource that was never published.
fn is_not_found_abort(message: &str) -> bool {
    message
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| {
            (word.starts_with('E') && word.ends_with("_NOT_FOUND")) || word == "MISSING_DATA"
        })
}

/// Why a write did not land. Every variant implies no state change.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubmitError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    #[error("transaction aborted on-chain: {vm_status}")]
    Aborted { hash: Option<String>, vm_status: String },

    #[error("network error: {0}")]
    Network(ClientError),

    #[error("transaction {hash} not confirmed in time")]
    ConfirmationTimeout { hash: String },
}

impl SubmitError {
    /// Short, actionable text for a notification.
    pub fn user_message(&self) -> String {
        match self {
            SubmitError::Validation(reason) => reason.clone(),
            SubmitError::InsufficientFunds(detail) => {
                format!("Insufficient balance. {detail}")
            }
            SubmitError::SignatureRejected(_) => {
                "The wallet rejected the signature request. Approve it to continue.".to_string()
            }
            SubmitError::Aborted { vm_status, .. } => {
                format!("The contract rejected the transaction ({vm_status}).")
            }
            SubmitError::Network(_) => {
                "Could not reach the network. Check your connection and try again.".to_string()
            }
            SubmitError::ConfirmationTimeout { hash } => {
                format!(
                    "Transaction {hash} was submitted but not confirmed yet. \
                     Check the explorer before retrying."
                )
            }
        }
    }
}

impl From<ClientError> for SubmitError {
    fn from(err: ClientError) -> Self {
        match &err {
            ClientError::Node { message, .. } if is_insufficient_funds(message) => {
                SubmitError::InsufficientFunds(message.clone())
            }
            ClientError::Node { status, message, .. } if *status == 400 => SubmitError::Aborted {
                hash: None,
                vm_status: message.clone(),
            },
            _ => SubmitError::Network(err),
        }
    }
}

/// Matches the VM statuses and abort codes that mean the sender cannot pay.
pub fn is_insufficient_funds(vm_status: &str) -> bool {
    let status = vm_status.to_ascii_uppercase();
    status.contains("INSUFFICIENT_BALANCE")
        || status.contains("EINSUFFICIENT")
        || status.contains("ECOIN_STORE_NOT_PUBLISHED")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("aggregate {0} is already registered")]
    Duplicate(AggregateId),

    #[error("aggregate {0} has a zero poll interval")]
    ZeroInterval(AggregateId),

    #[error("aggregate {0} is not registered")]
    Unknown(AggregateId),

    #[error("poller registry is shut down")]
    Closed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}
