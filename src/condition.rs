use std::future::Future;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::{future, FutureExt};

use crate::{Deferred, Message, Outcome};

/// The validity check of a rule.
///
/// Whatever shape it is written in, a condition is invoked with the rule's
/// context and the input, and yields a deferred [`Outcome`].
pub struct Condition<I, C = ()> {
	func: Rc<dyn Fn(&C, I) -> Deferred<Outcome>>,
}

impl<I, C> Clone for Condition<I, C> {
	fn clone(&self) -> Self {
		Self {
			func: self.func.clone(),
		}
	}
}

impl<I, C> Default for Condition<I, C>
where
	I: 'static,
	C: 'static,
{
	fn default() -> Self {
		Condition::always()
	}
}

impl<I, C> Condition<I, C>
where
	I: 'static,
	C: 'static,
{
	/// Completion-handle style: the function settles the condition through
	/// `Settle`, now or later.
	///
	/// Returning `Err` counts as a rejection unless the handle was already
	/// settled. Dropping the handle without settling leaves the rule pending.
	pub fn new<F>(func: F) -> Self
	where
		F: Fn(&C, I, Settle) -> Outcome + 'static,
	{
		Condition {
			func: Rc::new(move |cx: &C, input: I| {
				let (tx, mut rx) = oneshot::channel();
				let returned = func(cx, input, Settle { tx });

				match (returned, rx.try_recv()) {
					(_, Ok(Some(outcome))) => future::ready(outcome).boxed_local(),
					(Err(message), _) => future::err(message).boxed_local(),
					(Ok(()), _) => async move {
						match rx.await {
							Ok(outcome) => outcome,
							Err(_) => {
								tracing::trace!("condition dropped its settle handle");
								future::pending().await
							}
						}
					}
					.boxed_local(),
				}
			}),
		}
	}

	/// Synchronous check.
	pub fn check<F>(func: F) -> Self
	where
		F: Fn(&C, &I) -> Outcome + 'static,
	{
		Condition {
			func: Rc::new(move |cx: &C, input: I| future::ready(func(cx, &input)).boxed_local()),
		}
	}

	pub fn future<F, R>(func: F) -> Self
	where
		F: Fn(&C, I) -> R + 'static,
		R: Future<Output = Outcome> + 'static,
	{
		Condition {
			func: Rc::new(move |cx: &C, input: I| func(cx, input).boxed_local()),
		}
	}

	pub fn always() -> Self {
		Condition {
			func: Rc::new(|_: &C, _: I| future::ok(()).boxed_local()),
		}
	}

	pub(crate) fn invoke(&self, cx: &C, input: I) -> Deferred<Outcome> {
		(self.func)(cx, input)
	}
}

/// Completes a callback-style condition. Settling twice is impossible, the
/// handle is consumed.
pub struct Settle {
	tx: oneshot::Sender<Outcome>,
}

impl Settle {
	pub fn resolve(self) {
		self.settle(Ok(()))
	}

	pub fn reject(self, message: impl Into<Message>) {
		self.settle(Err(message.into()))
	}

	pub fn settle(self, outcome: Outcome) {
		// the evaluation that waited for us may be gone already
		let _ = self.tx.send(outcome);
	}
}
