use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use futures::FutureExt;

use crate::Deferred;

/// Polls a freshly created deferred once, without a real waker.
///
/// Whatever is ready right away gets applied in the caller's turn. A deferred
/// that is not ready stays usable: the next poll from a real executor
/// registers the real waker.
pub(crate) fn poll_now<T>(deferred: &mut Deferred<T>) -> Option<T> {
	let mut cx = Context::from_waker(noop_waker_ref());
	match deferred.poll_unpin(&mut cx) {
		Poll::Ready(value) => Some(value),
		Poll::Pending => None,
	}
}
