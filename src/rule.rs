use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use futures::future::{self, join_all};
use futures::FutureExt;
use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::deferred::poll_now;
use crate::options::Observer;
use crate::update::{update, Observable};
use crate::{Condition, Deferred, Input, Message, Outcome, RuleOptions, Snapshot, Status};

/// A validation node: a condition gated by zero or more named prerequisites.
///
/// Cloning a `Rule` clones the handle, both clones drive the same node.
pub struct Rule<I, C = ()> {
	body: Rc<RuleBody<I, C>>,
}

impl<I, C> Clone for Rule<I, C> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub(crate) struct RuleBody<I, C> {
	key: Rc<str>,
	condition: Option<Condition<I, C>>,
	context: Rc<C>,
	required: bool,
	children: SmallVec<[Rule<I, C>; 4]>,
	slots: FxHashMap<Rc<str>, usize>,
	observe: Option<Observer<I>>,
	parent: Option<Link<I, C>>,
	state: RefCell<Rc<Snapshot<I>>>,
	gathering: Cell<bool>,
	continuation: RefCell<Option<Deferred<Outcome>>>,
}

/// Where a child reports to: its parent and its own position there.
struct Link<I, C> {
	parent: Weak<RuleBody<I, C>>,
	slot: usize,
}

impl<I, C> Rule<I, C>
where
	I: Input,
	C: 'static,
{
	pub fn new(options: RuleOptions<I, C>) -> Self
	where
		C: Default,
	{
		Self::with_context(options, Rc::default())
	}

	/// Builds a rule whose tree inherits `context` wherever the options
	/// don't set one.
	pub fn with_context(options: RuleOptions<I, C>, context: Rc<C>) -> Self {
		Self::build(Rc::from(""), options, context, None)
	}

	pub(crate) fn keyed(key: Rc<str>, options: RuleOptions<I, C>, context: Rc<C>) -> Self {
		Self::build(key, options, context, None)
	}

	fn build(
		key: Rc<str>,
		options: RuleOptions<I, C>,
		inherited: Rc<C>,
		parent: Option<Link<I, C>>,
	) -> Self {
		let RuleOptions {
			condition,
			required,
			rules,
			observe,
			context,
		} = options;
		let context = context.unwrap_or(inherited);

		Rule {
			body: Rc::new_cyclic(|this| {
				let mut children = SmallVec::new();
				let mut slots = FxHashMap::default();

				for (slot, (name, options)) in rules.into_iter().enumerate() {
					slots.insert(name.clone(), slot);
					let link = Link {
						parent: this.clone(),
						slot,
					};
					children.push(Rule::build(name, options, context.clone(), Some(link)));
				}

				let snapshots = children
					.iter()
					.map(|child: &Rule<I, C>| (child.body.key.clone(), child.state()))
					.collect();

				RuleBody {
					key,
					condition,
					context,
					required,
					children,
					slots,
					observe,
					parent,
					state: RefCell::new(Rc::new(Snapshot::initial(required, snapshots))),
					gathering: Cell::new(false),
					continuation: RefCell::new(None),
				}
			}),
		}
	}

	pub fn key(&self) -> &str {
		&self.body.key
	}

	pub fn is_required(&self) -> bool {
		self.body.required
	}

	pub fn state(&self) -> Rc<Snapshot<I>> {
		self.body.state()
	}

	/// The prerequisite registered under `key`.
	pub fn rule(&self, key: &str) -> Option<&Rule<I, C>> {
		self.body
			.slots
			.get(key)
			.map(|&slot| &self.body.children[slot])
	}

	pub fn rules(&self) -> impl Iterator<Item = (&str, &Rule<I, C>)> + '_ {
		self.body.children.iter().map(|child| (child.key(), child))
	}

	/// Validates `input` against this rule and, first, its prerequisites.
	///
	/// Blank input settles right away. Otherwise prerequisites are all
	/// evaluated back to back and the rule settles from what they report. The
	/// deferred fails with the rejection message if anything rejected.
	///
	/// Whatever settles synchronously is applied before this returns. A
	/// condition that settles later is only applied while the deferred is
	/// awaited: dropping it leaves the rule pending.
	#[must_use = "a condition that settles later is applied only while the deferred is awaited"]
	pub fn evaluate(&self, input: I) -> Deferred<Outcome> {
		self.body.evaluate(input)
	}

	/// Runs this rule's own condition only, prerequisites untouched. Same
	/// awaiting contract as [`Self::evaluate`].
	#[must_use = "a condition that settles later is applied only while the deferred is awaited"]
	pub fn evaluate_condition(&self, input: I) -> Deferred<Outcome> {
		self.body.evaluate_condition(input)
	}

	/// Back to idle, input and message cleared. Prerequisites keep their state.
	pub fn reset(&self) {
		self.body.reset()
	}

	pub fn idle(&self) {
		self.reset()
	}
}

impl<I, C> RuleBody<I, C>
where
	I: Input,
	C: 'static,
{
	fn evaluate(self: &Rc<Self>, input: I) -> Deferred<Outcome> {
		if input.is_blank() {
			let outcome = if self.required {
				Err(Message::blank())
			} else {
				Ok(())
			};
			self.settle(Some(input), &outcome);
			return self.propagate(outcome);
		}

		if self.children.is_empty() {
			self.evaluate_condition(input)
		} else {
			self.evaluate_prerequisites(input)
		}
	}

	fn evaluate_prerequisites(self: &Rc<Self>, input: I) -> Deferred<Outcome> {
		let seen = input.clone();
		update(&**self, move |draft: &mut Snapshot<I>| {
			draft.input = Some(seen);
			draft.status = Status::Idle;
		});

		self.gathering.set(true);
		let children: Vec<_> = self
			.children
			.iter()
			.map(|child| child.evaluate(input.clone()))
			.collect();
		self.gathering.set(false);
		self.derive(Some(input));

		let this = self.clone();
		async move {
			let outcomes = join_all(children).await;
			this.drain().await;

			let own = match this.state().status() {
				Status::Rejected(message) => Err(message.clone()),
				_ => Ok(()),
			};
			let outcome = outcomes.into_iter().find(Result::is_err).unwrap_or(own);
			this.propagate(outcome).await
		}
		.boxed_local()
	}

	fn evaluate_condition(self: &Rc<Self>, input: I) -> Deferred<Outcome> {
		let seen = input.clone();
		update(&**self, move |draft: &mut Snapshot<I>| {
			draft.input = Some(seen);
			draft.status = Status::Pending;
		});

		let mut check = match &self.condition {
			Some(condition) => condition.invoke(&self.context, input),
			None => future::ok(()).boxed_local(),
		};

		if let Some(outcome) = poll_now(&mut check) {
			self.settle(None, &outcome);
			return self.propagate(outcome);
		}

		let this = Rc::downgrade(self);
		async move {
			let outcome = check.await;
			let Some(this) = this.upgrade() else {
				return outcome;
			};
			this.settle(None, &outcome);
			this.propagate(outcome).await
		}
		.boxed_local()
	}

	fn reset(&self) {
		let state = self.state();
		if state.is_idle() && state.input.is_none() {
			return;
		}

		update(self, |draft: &mut Snapshot<I>| {
			draft.input = None;
			draft.status = Status::Idle;
		});
	}

	fn settle(&self, input: Option<I>, outcome: &Outcome) {
		let status = match outcome {
			Ok(()) => Status::Fulfilled,
			Err(message) => Status::Rejected(message.clone()),
		};

		match input {
			Some(input) => {
				update(self, move |draft: &mut Snapshot<I>| {
					draft.input = Some(input);
					draft.status = status;
				});
			}
			None => {
				update(self, status);
			}
		}
	}

	/// A child installed a new snapshot.
	fn receive(self: &Rc<Self>, slot: usize, child: Rc<Snapshot<I>>) {
		let gathering = self.gathering.get();
		let has_condition = self.condition.is_some();
		let became_fulfilled = child.is_fulfilled() && !self.state().children[slot].1.is_fulfilled();
		let accepted = child.input.clone();

		let next = update(&**self, move |draft: &mut Snapshot<I>| {
			draft.children[slot].1 = child;
			if gathering {
				return;
			}
			if let Some(status) = draft.verdict(has_condition) {
				draft.status = status;
			}
		});

		if !gathering && became_fulfilled && next.verdict(has_condition).is_none() {
			self.run_own(accepted);
		}
	}

	/// Settles from the prerequisites as they stand.
	fn derive(self: &Rc<Self>, input: Option<I>) {
		let state = self.state();
		match state.verdict(self.condition.is_some()) {
			Some(status) => {
				if *state.status() != status {
					update(&**self, status);
				}
			}
			None => self.run_own(input),
		}
	}

	/// Every prerequisite fulfilled: the own condition has the last word.
	///
	/// `input` is what the prerequisites just accepted. The stored input only
	/// stands in when the report carried none.
	fn run_own(self: &Rc<Self>, input: Option<I>) {
		let Some(input) = input.or_else(|| self.state().input.clone()) else {
			tracing::trace!(rule = %self.key, "prerequisites fulfilled without any input");
			return;
		};

		let deferred = self.evaluate_condition(input);
		if self.continuation.borrow_mut().replace(deferred).is_some() {
			tracing::trace!(rule = %self.key, "superseded an unawaited condition");
		}
	}

	/// Awaits the own condition a child's report may have started.
	fn drain(&self) -> Deferred<()> {
		let next = self.continuation.borrow_mut().take();
		match next {
			Some(deferred) => deferred.map(|_| ()).boxed_local(),
			None => future::ready(()).boxed_local(),
		}
	}

	/// Resolves to `outcome` once the ancestors finished reacting to it.
	fn propagate(&self, outcome: Outcome) -> Deferred<Outcome> {
		let parent = self.parent.as_ref().map(|link| link.parent.clone());
		async move {
			if let Some(parent) = parent.and_then(|parent| parent.upgrade()) {
				parent.drain().await;
			}
			outcome
		}
		.boxed_local()
	}
}

impl<I, C> Observable for RuleBody<I, C>
where
	I: Input,
	C: 'static,
{
	type State = Snapshot<I>;

	fn state(&self) -> Rc<Snapshot<I>> {
		self.state.borrow().clone()
	}

	fn replace(&self, next: Rc<Snapshot<I>>) {
		*self.state.borrow_mut() = next;
	}

	fn notify(&self, next: &Rc<Snapshot<I>>) {
		tracing::trace!(rule = %self.key, status = ?next.status(), "transition");

		if let Some(observe) = &self.observe {
			observe(next);
		}

		if let Some(link) = &self.parent {
			if let Some(parent) = link.parent.upgrade() {
				parent.receive(link.slot, next.clone());
			}
		}
	}
}

impl<I, C> Debug for Rule<I, C>
where
	I: Input + Debug,
	C: 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Rule")
			.field("key", &self.body.key)
			.field("state", &self.state())
			.finish()
	}
}
