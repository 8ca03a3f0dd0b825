//! Wire types and client stub for the `mverseouter.MerkleVerse` service.
//!
//! Mirrors `proto/outer.proto`. Messages are declared with `prost` derives
//! and the client is the unary subset of what `tonic-build` would emit, so
//! building the harness does not need `protoc`.

#![allow(missing_docs)]

use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
    #[prost(enumeration = "transaction_request::TransactionType", tag = "3")]
    pub transaction_type: i32,
}

/// Nested types for [`TransactionRequest`].
pub mod transaction_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum TransactionType {
        Update = 0,
        Delete = 1,
    }

    impl TransactionType {
        /// Name as it appears in the `.proto` definition.
        pub fn as_str_name(&self) -> &'static str {
            match self {
                Self::Update => "Update",
                Self::Delete => "Delete",
            }
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientTransactionRequest {
    #[prost(message, optional, tag = "1")]
    pub transaction: Option<TransactionRequest>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub auxiliary: Option<Vec<u8>>,
    #[prost(bool, tag = "3")]
    pub wait: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransactionResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub head: Vec<u8>,
    #[prost(int32, tag = "2")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetMerkleRootResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub head: Vec<u8>,
}

const CLIENT_TRANSACTION_PATH: &str = "/mverseouter.MerkleVerse/ClientTransaction";
const GET_CURRENT_ROOT_PATH: &str = "/mverseouter.MerkleVerse/GetCurrentRoot";

/// Unary client for the two calls the load generator issues.
#[derive(Debug, Clone)]
pub struct MerkleVerseClient {
    inner: tonic::client::Grpc<Channel>,
}

impl MerkleVerseClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// `ClientTransaction`: submit one keyed transaction.
    pub async fn client_transaction(
        &mut self,
        request: impl tonic::IntoRequest<ClientTransactionRequest>,
    ) -> Result<tonic::Response<TransactionResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(CLIENT_TRANSACTION_PATH);
        self.inner.unary(request.into_request(), path, codec).await
    }

    /// `GetCurrentRoot`: read the service's current root.
    pub async fn get_current_root(
        &mut self,
        request: impl tonic::IntoRequest<Empty>,
    ) -> Result<tonic::Response<GetMerkleRootResponse>, tonic::Status> {
        self.ready().await?;
        let codec = tonic::codec::ProstCodec::default();
        let path = PathAndQuery::from_static(GET_CURRENT_ROOT_PATH);
        self.inner.unary(request.into_request(), path, codec).await
    }

    async fn ready(&mut self) -> Result<(), tonic::Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::from_error(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::transaction_request::TransactionType;
    use super::*;
    use prost::Message;

    #[test]
    fn test_client_transaction_request_wire_round_trip() {
        let request = ClientTransactionRequest {
            transaction: Some(TransactionRequest {
                key: vec![0xde, 0xad, 0xbe, 0xef],
                value: Some(vec![0, 255, 7, 7, 1]),
                transaction_type: TransactionType::Update as i32,
            }),
            auxiliary: Some(vec![1, 2, 3]),
            wait: true,
        };

        let bytes = request.encode_to_vec();
        let decoded = ClientTransactionRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_transaction_type_accessor() {
        let request = TransactionRequest {
            key: vec![1],
            value: None,
            transaction_type: TransactionType::Delete as i32,
        };
        assert_eq!(request.transaction_type(), TransactionType::Delete);
        assert_eq!(request.transaction_type().as_str_name(), "Delete");
    }

    #[test]
    fn test_empty_encodes_to_nothing() {
        assert!(Empty {}.encode_to_vec().is_empty());
    }

    #[test]
    fn test_truncated_bytes_fail_to_decode() {
        let response = TransactionResponse {
            head: vec![9; 32],
            status: 0,
        };
        let bytes = response.encode_to_vec();
        assert!(TransactionResponse::decode(&bytes[..10]).is_err());
    }
}
