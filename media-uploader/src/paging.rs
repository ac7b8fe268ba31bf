//! Walking `pageToken`-paginated list endpoints as a [`Stream`].

use crate::error::Error;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tokio_stream::Stream;

/// One fetched page: its items and the token of the page after it.
pub(crate) type Page<T> = (VecDeque<T>, Option<String>);

type PendingPage<'a, F, T> = Pin<Box<dyn Future<Output = Result<(F, Page<T>), Error>> + Send + 'a>>;

/// Yields the items of every page in order, fetching the next page only once the current one
/// is drained.
///
/// `fetcher` is called with `None` for the first page and with the previous page's
/// `nextPageToken` after that. The stream ends after the first page without a token, or right
/// after the first error.
pub struct Pages<'a, T, F> {
    buffered: VecDeque<T>,
    pending: Option<PendingPage<'a, F, T>>,
}

impl<'a, T, F> Pages<'a, T, F> {
    pub(crate) fn new<Fut>(fetcher: F) -> Self
    where
        F: Fn(Option<String>) -> Fut + Send + 'a,
        Fut: Future<Output = Result<Page<T>, Error>> + Send + 'a,
    {
        Self {
            buffered: VecDeque::new(),
            pending: Some(Box::pin(async move {
                let page = fetcher(None).await?;
                Ok((fetcher, page))
            })),
        }
    }
}

impl<T: Unpin, F> Unpin for Pages<'_, T, F> {}

impl<'a, T: Unpin, F, Fut> Stream for Pages<'a, T, F>
where
    F: Fn(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<Page<T>, Error>> + Send + 'a,
{
    type Item = Result<T, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }
            let Some(pending) = self.pending.as_mut() else {
                return Poll::Ready(None);
            };
            match pending.as_mut().poll(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(e)) => {
                    self.pending = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Ok((fetcher, (items, next_page_token)))) => {
                    self.buffered.extend(items);
                    self.pending = match next_page_token {
                        Some(token) => Some(Box::pin(async move {
                            let page = fetcher(Some(token)).await?;
                            Ok((fetcher, page))
                        })),
                        None => None,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn follows_page_tokens() {
        let calls = AtomicUsize::new(0);
        let pages = Pages::new(|token: Option<String>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match token.as_deref() {
                    None => (VecDeque::from([1, 2]), Some("p2".to_string())),
                    Some("p2") => (VecDeque::new(), Some("p3".to_string())),
                    Some("p3") => (VecDeque::from([3]), None),
                    Some(other) => panic!("unexpected page token {other}"),
                })
            }
        });
        let items: Vec<i32> = pages.map(|r| r.unwrap()).collect().await;
        assert_eq!(items, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_error() {
        let pages = Pages::new(|token: Option<String>| async move {
            match token {
                None => Ok((VecDeque::from(["a"]), Some("next".to_string()))),
                Some(_) => Err(UploadError::Protocol("page unavailable".into()).into()),
            }
        });
        let results: Vec<Result<&str, Error>> = pages.collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].as_ref().is_err_and(Error::is_upload));
    }
}
