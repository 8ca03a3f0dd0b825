//! Request synthesis.
//!
//! [`PayloadBuilder`] turns entropy plus the static `[payload]` settings into
//! wire requests. It performs no I/O and keeps no state between calls; every
//! request is built fresh and owned by the iteration that issues it.

use base64::{engine::general_purpose, Engine as _};
use serde_json::json;

use crate::loadtest::config::{PayloadConfig, ScenarioStep, TransactionKind};
use crate::loadtest::entropy::EntropySource;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::OperationType;
use crate::loadtest::wire::transaction_request::TransactionType;
use crate::loadtest::wire::{ClientTransactionRequest, Empty, TransactionRequest};

/// One remote call ready to be issued.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `ClientTransaction` with a synthesized key and value.
    Transaction(ClientTransactionRequest),
    /// `GetCurrentRoot` with an empty payload.
    RootRead(Empty),
}

impl Call {
    /// Metrics classification for this call.
    pub fn operation(&self) -> OperationType {
        match self {
            Self::Transaction(_) => OperationType::Transaction,
            Self::RootRead(_) => OperationType::RootRead,
        }
    }

    /// JSON rendering with bytes as base64, the protobuf JSON mapping.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Transaction(request) => {
                let transaction = request.transaction.as_ref().map(|t| {
                    json!({
                        "key": general_purpose::STANDARD.encode(&t.key),
                        "transaction_type": t.transaction_type().as_str_name(),
                        "value": t.value.as_ref().map(|v| general_purpose::STANDARD.encode(v)),
                    })
                });
                json!({
                    "auxiliary": request.auxiliary.as_ref().map(|a| general_purpose::STANDARD.encode(a)),
                    "transaction": transaction,
                    "wait": request.wait,
                })
            }
            Self::RootRead(_) => json!({}),
        }
    }
}

/// Builds requests from entropy and the static payload settings.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    key_length: usize,
    value_length: usize,
    auxiliary: Option<Vec<u8>>,
    kind: TransactionKind,
    wait: bool,
}

impl PayloadBuilder {
    /// Creates a builder from a `[payload]` section.
    ///
    /// An empty auxiliary token is sent as an absent field.
    pub fn new(config: &PayloadConfig) -> Result<Self, LoadTestError> {
        let auxiliary = config.auxiliary_bytes()?;
        Ok(Self {
            key_length: config.key_length,
            value_length: config.value_length,
            auxiliary: (!auxiliary.is_empty()).then_some(auxiliary),
            kind: config.transaction_type,
            wait: config.wait,
        })
    }

    /// Build the call for one scenario step.
    pub fn build(&self, step: &ScenarioStep, entropy: &mut EntropySource) -> Call {
        match step {
            ScenarioStep::Transaction { .. } => Call::Transaction(self.build_update_request(entropy)),
            ScenarioStep::RootRead { .. } => Call::RootRead(self.build_read_request()),
        }
    }

    /// A transaction with a fresh random key and, for updates, a fresh value.
    pub fn build_update_request(&self, entropy: &mut EntropySource) -> ClientTransactionRequest {
        let key = entropy.random_bytes(self.key_length);
        let (transaction_type, value) = match self.kind {
            TransactionKind::Update => (
                TransactionType::Update,
                Some(entropy.random_bytes(self.value_length)),
            ),
            TransactionKind::Delete => (TransactionType::Delete, None),
        };
        ClientTransactionRequest {
            transaction: Some(TransactionRequest {
                key,
                value,
                transaction_type: transaction_type as i32,
            }),
            auxiliary: self.auxiliary.clone(),
            wait: self.wait,
        }
    }

    /// The root-read payload.
    pub fn build_read_request(&self) -> Empty {
        Empty {}
    }
}
