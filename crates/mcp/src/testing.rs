//! Test doubles for the remote API.
//!
//! [`RecordingBitrix`] implements [`BitrixApi`] in memory: every call is
//! recorded and answered from a per-method script, so handler behaviour can be
//! asserted without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use bitrix_mcp_client::{BitrixApi, ListPage, ListRequest, Params, RemoteError};
use serde_json::Value;

/// One recorded remote call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Params,
    /// Present for paginated listings.
    pub list: Option<ListRequest>,
}

#[derive(Clone, Debug)]
enum Scripted {
    Result(Value),
    Page(ListPage),
    Error(RemoteError),
}

#[derive(Debug, Default)]
pub struct RecordingBitrix {
    calls: Mutex<Vec<RecordedCall>>,
    script: Mutex<HashMap<String, VecDeque<Scripted>>>,
}

impl RecordingBitrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the `result` member for the next call of `method`.
    pub fn respond(&self, method: &str, result: Value) -> &Self {
        self.push(method, Scripted::Result(result))
    }

    /// Queues a listing for the next `list` of `method`. The page is cut to the
    /// requested limit the way the network client does.
    pub fn respond_page(&self, method: &str, page: ListPage) -> &Self {
        self.push(method, Scripted::Page(page))
    }

    pub fn fail(&self, method: &str, error: RemoteError) -> &Self {
        self.push(method, Scripted::Error(error))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn calls_to(&self, method: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|call| call.method == method).collect()
    }

    fn push(&self, method: &str, reply: Scripted) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.entry(method.to_owned()).or_default().push_back(reply);
        }
        self
    }

    fn record(&self, method: &str, params: Params, list: Option<ListRequest>) -> Option<Scripted> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall { method: method.to_owned(), params, list });
        }
        self.script.lock().ok().and_then(|mut script| script.get_mut(method)?.pop_front())
    }
}

#[async_trait]
impl BitrixApi for RecordingBitrix {
    async fn call(&self, method: &str, params: Params) -> Result<Value, RemoteError> {
        match self.record(method, params, None) {
            Some(Scripted::Result(result)) => Ok(result),
            Some(Scripted::Page(page)) => Ok(Value::Array(page.items)),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(Value::Bool(true)),
        }
    }

    async fn list(
        &self,
        method: &str,
        params: Params,
        request: ListRequest,
    ) -> Result<ListPage, RemoteError> {
        let mut page = match self.record(method, params, Some(request)) {
            Some(Scripted::Page(page)) => page,
            Some(Scripted::Result(Value::Array(items))) => ListPage { items, ..ListPage::default() },
            Some(Scripted::Result(other)) => {
                return Err(RemoteError::Decode(format!("scripted list result is not an array: {other}")));
            }
            Some(Scripted::Error(error)) => return Err(error),
            None => ListPage::default(),
        };

        let wanted = request.remaining(0);
        if (page.items.len() as u64) > wanted {
            page.items.truncate(wanted as usize);
            page.next = Some(request.start + wanted);
        }
        Ok(page)
    }
}
