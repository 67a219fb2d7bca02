use std::future::Future;
use std::pin::Pin;

use crate::{ClientError, CompletionRequest, FragmentStream};

pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A chat-completion backend that can stream one completion.
///
/// Implementations must validate the request before dispatching it and
/// surface endpoint failures as [`ClientError`]s rather than panics.
pub trait CompletionClient: Send + Sync {
    fn stream<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> ClientFuture<'a, Result<FragmentStream, ClientError>>;
}
