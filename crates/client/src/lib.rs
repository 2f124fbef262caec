//! Client wrapper for the Bitrix24 REST API.
//!
//! [`BitrixApi`] is the seam the tool handlers depend on; [`HttpBitrixClient`]
//! is the network implementation and tests substitute their own.

mod error;
mod http;
mod retry;
mod throttle;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub use error::RemoteError;
pub use http::{ClientSettings, HttpBitrixClient};

/// Parameter object of one remote method call.
pub type Params = Map<String, Value>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Offset of the first record.
    pub start: u64,
    /// Maximum number of records to collect; 0 collects everything.
    pub limit: u64,
}

impl ListRequest {
    pub fn new(start: u64, limit: u64) -> Self {
        Self { start, limit }
    }

    /// Records still wanted after `collected` have been gathered.
    pub fn remaining(&self, collected: usize) -> u64 {
        if self.limit == 0 {
            u64::MAX
        } else {
            self.limit.saturating_sub(collected as u64)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ListPage {
    pub items: Vec<Value>,
    /// Total matching records, when the remote reports it.
    pub total: Option<u64>,
    /// Offset to continue from, absent once the listing is exhausted.
    pub next: Option<u64>,
}

#[async_trait]
pub trait BitrixApi: Send + Sync {
    /// Calls one remote method and returns its `result` member.
    async fn call(&self, method: &str, params: Params) -> Result<Value, RemoteError>;

    /// Offset-paginated listing, following `next` until `request.limit` records
    /// are collected or the remote runs out.
    async fn list(
        &self,
        method: &str,
        params: Params,
        request: ListRequest,
    ) -> Result<ListPage, RemoteError>;
}
