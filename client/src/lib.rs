pub mod clock;
pub mod config;
pub mod error;
pub mod poller;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod submitter;
#[cfg(test)]
mod testing;
pub mod time;

pub use clock::{RemainingTime, RoundClock, RoundTransition, SyncReport, TimedSnapshot};
pub use config::{ClientConfig, NetworkTarget, PollIntervals};
pub use error::{ClientError, ConfigError, RegistryError, SubmitError};
pub use poller::{AggregateId, PollerConfig, PollerRegistry, RefreshHandle};
pub use rpc::RemoteStateClient;
pub use session::{GameSession, SessionView};
pub use signer::{SignerError, TransactionSigner};
pub use submitter::{Confirmation, GameAction, SubmissionStage, TransactionSubmitter};
pub use time::{SystemClock, TimeSource};
