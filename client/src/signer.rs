use std::sync::Arc;

use futures::future::BoxFuture;
use motherlode_api::prelude::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The key holder declined to sign.
    #[error("signing rejected: {0}")]
    Rejected(String),

    /// No key is available to sign with.
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// An ed25519 key able to sign transactions for one account.
///
/// Signing is async so that wallets which prompt the user can be plugged in
/// alongside local keypairs.
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    fn public_key(&self) -> Vec<u8>;

    /// Signs the node-encoded signing message.
    fn sign<'a>(&'a self, message: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, SignerError>>;
}

impl<S: TransactionSigner + ?Sized> TransactionSigner for Arc<S> {
    fn address(&self) -> Address {
        (**self).address()
    }

    fn public_key(&self) -> Vec<u8> {
        (**self).public_key()
    }

    fn sign<'a>(&'a self, message: &'a [u8]) -> BoxFuture<'a, Result<Vec<u8>, SignerError>> {
        (**self).sign(message)
    }
}
