//! Transaction invoker: one remote call per iteration.
//!
//! [`Invoker`] is the seam between a virtual user and the network. Each
//! virtual user owns its own invoker instance, so connection state is never
//! shared across users. [`GrpcInvoker`] talks to the real service over tonic;
//! tests substitute [`crate::loadtest::mock::MockInvoker`].

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, ClientTlsConfig};

use crate::loadtest::config::ConnectionPolicy;
use crate::loadtest::error::InvokeError;
use crate::loadtest::payload::Call;
use crate::loadtest::shard::Endpoint;
use crate::loadtest::wire::MerkleVerseClient;

/// Status of a well-formed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// gRPC status OK.
    Ok,
    /// Any other status the server answered with.
    Rejected(tonic::Code),
}

/// A response the service actually produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    /// gRPC status of the call.
    pub status: CallStatus,
    /// Opaque body: the returned head on success, the status message otherwise.
    pub message: Vec<u8>,
}

impl InvocationResult {
    /// Successful response carrying `message`.
    pub fn ok(message: Vec<u8>) -> Self {
        Self {
            status: CallStatus::Ok,
            message,
        }
    }

    /// Non-OK response.
    pub fn rejected(code: tonic::Code, message: &str) -> Self {
        Self {
            status: CallStatus::Rejected(code),
            message: message.as_bytes().to_vec(),
        }
    }
}

/// Issues exactly one remote call and reports what happened.
///
/// The call suspends the caller until a response, an error, or `timeout`.
#[async_trait]
pub trait Invoker: Send {
    /// Call `endpoint` with `call`, giving up after `timeout`.
    async fn invoke(
        &mut self,
        endpoint: &Endpoint,
        call: &Call,
        timeout: Duration,
    ) -> Result<InvocationResult, InvokeError>;
}

/// gRPC invoker for the `mverseouter.MerkleVerse` service.
///
/// Under [`ConnectionPolicy::PerCall`] the channel lives only for the call
/// and is dropped on every exit path, including cancellation. Under
/// [`ConnectionPolicy::PerVu`] channels are cached per endpoint inside this
/// instance and evicted after a transport failure.
#[derive(Debug, Clone)]
pub struct GrpcInvoker {
    plaintext: bool,
    policy: ConnectionPolicy,
    channels: HashMap<Endpoint, Channel>,
}

impl GrpcInvoker {
    /// Creates an invoker with an empty connection cache.
    pub fn new(plaintext: bool, policy: ConnectionPolicy) -> Self {
        Self {
            plaintext,
            policy,
            channels: HashMap::new(),
        }
    }

    #[cfg(test)]
    fn cached_channels(&self) -> usize {
        self.channels.len()
    }

    async fn channel_for(&mut self, endpoint: &Endpoint) -> Result<Channel, InvokeError> {
        if let Some(channel) = self.channels.get(endpoint) {
            return Ok(channel.clone());
        }
        let channel = connect(endpoint, self.plaintext).await?;
        if self.policy == ConnectionPolicy::PerVu {
            self.channels.insert(endpoint.clone(), channel.clone());
        }
        Ok(channel)
    }

    async fn call(
        &mut self,
        endpoint: &Endpoint,
        call: &Call,
    ) -> Result<InvocationResult, InvokeError> {
        let channel = self.channel_for(endpoint).await?;
        let mut client = MerkleVerseClient::new(channel);
        let response = match call {
            Call::Transaction(request) => client
                .client_transaction(request.clone())
                .await
                .map(|r| r.into_inner().head),
            Call::RootRead(request) => client
                .get_current_root(*request)
                .await
                .map(|r| r.into_inner().head),
        };
        match response {
            Ok(head) => Ok(InvocationResult::ok(head)),
            Err(status) => classify_status(&status),
        }
    }
}

#[async_trait]
impl Invoker for GrpcInvoker {
    async fn invoke(
        &mut self,
        endpoint: &Endpoint,
        call: &Call,
        timeout: Duration,
    ) -> Result<InvocationResult, InvokeError> {
        let result = match tokio::time::timeout(timeout, self.call(endpoint, call)).await {
            Ok(result) => result,
            Err(_) => Err(InvokeError::Timeout),
        };
        if result.is_err() {
            self.channels.remove(endpoint);
        }
        result
    }
}

/// Open a channel to `endpoint`.
async fn connect(endpoint: &Endpoint, plaintext: bool) -> Result<Channel, InvokeError> {
    let mut builder = Channel::from_shared(endpoint.uri(plaintext))
        .map_err(|e| InvokeError::Connection {
            message: format!("invalid endpoint {endpoint}: {e}"),
        })?
        .tcp_nodelay(true);
    if !plaintext {
        let tls = ClientTlsConfig::new()
            .with_webpki_roots()
            .domain_name(endpoint.host.clone());
        builder = builder
            .tls_config(tls)
            .map_err(|e| InvokeError::Connection {
                message: format!("TLS setup for {endpoint} failed: {}", error_chain(&e)),
            })?;
    }
    builder
        .connect()
        .await
        .map_err(|e| InvokeError::Connection {
            message: format!("{endpoint}: {}", error_chain(&e)),
        })
}

/// Prefix of `prost::DecodeError`'s message, which tonic's codec wraps in an
/// `Internal` status when a response body does not decode.
const DECODE_ERROR_PREFIX: &str = "failed to decode Protobuf message";

/// Split a failed call's status into "the server answered" and "the call
/// broke locally".
///
/// tonic attaches the underlying error as `source` when it synthesizes a
/// status from a transport failure. An undecodable body becomes `Internal`
/// carrying the prost decode message and no response metadata. Everything
/// else came from the server, including a server-sent `Internal`.
pub fn classify_status(status: &tonic::Status) -> Result<InvocationResult, InvokeError> {
    let decode_failure = status.code() == tonic::Code::Internal
        && status.metadata().is_empty()
        && status.message().starts_with(DECODE_ERROR_PREFIX);
    let local = status.source().is_some() || decode_failure;
    if local {
        Err(InvokeError::from_local_status(status))
    } else {
        Ok(InvocationResult::rejected(status.code(), status.message()))
    }
}

/// Render an error with its full source chain, `outer: inner: root`.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
