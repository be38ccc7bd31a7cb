use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::body::{Body, Frame, SizeHint};

use crate::balance::DoneToken;

/// Response-body wrapper that owns the pick's release token. Reads pass
/// through unchanged; the token fires when the stream ends, and dropping the
/// wrapper (early client disconnect, cancellation) fires it too. The token's
/// one-shot guard swallows the overlap.
pub(crate) struct DoneBody<B> {
    inner: B,
    done: DoneToken,
}

impl<B> DoneBody<B> {
    pub(crate) fn new(inner: B, done: DoneToken) -> Self {
        Self { inner, done }
    }
}

impl<B> Body for DoneBody<B>
where
    B: Body + Unpin,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        if matches!(poll, Poll::Ready(None)) {
            this.done.fire();
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
