//! HTTP-backed providers.
//!
//! An [`HttpProvider`] pairs the shared [`RequestExecutor`] with a
//! [`RequestAdapter`] that knows one provider's URL scheme, auth, and
//! payload shape. The adapter is the only provider-specific code; the chain
//! never sees raw HTTP.

use async_trait::async_trait;

use super::traits::DataProvider;
use crate::Result;
use crate::transport::{HttpResponse, RequestDescriptor, RequestExecutor};

/// Maps a logical request to HTTP and an HTTP response back to a payload.
pub trait RequestAdapter: Send + Sync {
    type Request: Send + Sync;
    type Output: Send;

    fn build(&self, request: &Self::Request) -> Result<RequestDescriptor>;

    /// Decode a 2xx response. Decode failures are terminal for this provider.
    fn parse(&self, request: &Self::Request, response: HttpResponse) -> Result<Self::Output>;
}

/// A [`DataProvider`] that fetches over HTTP through an adapter.
pub struct HttpProvider<A> {
    id: String,
    executor: RequestExecutor,
    adapter: A,
}

impl<A: RequestAdapter> HttpProvider<A> {
    pub fn new(id: impl Into<String>, executor: RequestExecutor, adapter: A) -> Self {
        Self {
            id: id.into(),
            executor,
            adapter,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }
}

#[async_trait]
impl<A: RequestAdapter> DataProvider<A::Request, A::Output> for HttpProvider<A> {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: &A::Request) -> Result<A::Output> {
        let descriptor = self.adapter.build(request)?;
        let response = self.executor.execute(&descriptor).await?;
        self.adapter.parse(request, response)
    }
}
