use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::hash::BuildHasher;
use std::rc::{Rc, Weak};

use futures::future::{self, join_all};
use futures::FutureExt;
use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::deferred::poll_now;
use crate::snapshot::Children;
use crate::update::{install, update, Observable};
use crate::{Deferred, Input, Message, Outcome, Rule, RuleOptions, Snapshot};

/// Field name to edited value.
pub type Buffer<I> = BTreeMap<Rc<str>, I>;

type Reader<O, I> = Rc<dyn Fn(&O, &str) -> I>;
type FormObserver<I> = Rc<dyn Fn(&Rc<FormState<I>>)>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormError {
	#[error("no rule is declared for `{0}`")]
	UnknownField(String),
	#[error("{0}")]
	Invalid(Message),
	#[error("submit failed: {0}")]
	Submit(Message),
}

/// Plain field lookup on a source record, the default way a form reads its
/// pristine values.
pub trait Record<I> {
	fn read(&self, key: &str) -> I;
}

impl<I> Record<I> for BTreeMap<String, I>
where
	I: Clone + Default,
{
	fn read(&self, key: &str) -> I {
		self.get(key).cloned().unwrap_or_default()
	}
}

impl<I, S> Record<I> for HashMap<String, I, S>
where
	I: Clone + Default,
	S: BuildHasher,
{
	fn read(&self, key: &str) -> I {
		self.get(key).cloned().unwrap_or_default()
	}
}

pub struct FormOptions<O, I, C = ()> {
	rules: Vec<(Rc<str>, RuleOptions<I, C>)>,
	object: Option<Rc<O>>,
	read: Reader<O, I>,
	observe: Option<FormObserver<I>>,
	context: Option<Rc<C>>,
}

impl<O, I, C> FormOptions<O, I, C>
where
	O: 'static,
	I: Input,
	C: 'static,
{
	pub fn new() -> Self
	where
		O: Record<I>,
	{
		Self::with_reader(|object: &O, key: &str| Record::read(object, key))
	}

	/// Reads pristine values through `read` instead of [`Record`].
	pub fn with_reader<F>(read: F) -> Self
	where
		F: Fn(&O, &str) -> I + 'static,
	{
		FormOptions {
			rules: Vec::new(),
			object: None,
			read: Rc::new(read),
			observe: None,
			context: None,
		}
	}

	pub fn rule(mut self, field: &str, options: RuleOptions<I, C>) -> Self {
		self.rules.push((Rc::from(field), options));
		self
	}

	/// The pristine record. Without one every field starts out blank.
	pub fn object(mut self, object: O) -> Self {
		self.object = Some(Rc::new(object));
		self
	}

	pub fn observe<F>(mut self, func: F) -> Self
	where
		F: Fn(&Rc<FormState<I>>) + 'static,
	{
		self.observe = Some(Rc::new(func));
		self
	}

	pub fn context(mut self, context: C) -> Self {
		self.context = Some(Rc::new(context));
		self
	}
}

#[derive(Debug, Clone)]
pub struct FormState<I> {
	pub(crate) buffer: Rc<Buffer<I>>,
	pub(crate) pristine: Rc<Buffer<I>>,
	pub(crate) rules: Children<I>,
	pub(crate) submitting: bool,
	pub(crate) error: Option<Message>,
	pub(crate) edit: bool,
}

impl<I> FormState<I>
where
	I: PartialEq,
{
	fn fresh<C>(pristine: Rc<Buffer<I>>, edit: bool, fields: &[Rc<str>], rules: &[Rule<I, C>]) -> Self
	where
		I: Input,
		C: 'static,
	{
		FormState {
			buffer: pristine.clone(),
			pristine,
			rules: fields.iter().cloned().zip(rules.iter().map(Rule::state)).collect(),
			submitting: false,
			error: None,
			edit,
		}
	}

	/// Always holds one value per declared field.
	pub fn buffer(&self) -> &Rc<Buffer<I>> {
		&self.buffer
	}

	pub fn value(&self, field: &str) -> Option<&I> {
		self.buffer.get(field)
	}

	pub fn rule(&self, field: &str) -> Option<&Rc<Snapshot<I>>> {
		self.rules
			.iter()
			.find(|(key, _)| &**key == field)
			.map(|(_, state)| state)
	}

	pub fn rules(&self) -> impl Iterator<Item = (&str, &Rc<Snapshot<I>>)> + '_ {
		self.rules.iter().map(|(key, state)| (&**key, state))
	}

	pub fn error(&self) -> Option<&Message> {
		self.error.as_ref()
	}

	/// Created without a source record.
	pub fn is_new(&self) -> bool {
		!self.edit
	}

	/// Editing an existing record.
	pub fn is_edit(&self) -> bool {
		self.edit
	}

	pub fn is_submitting(&self) -> bool {
		self.submitting
	}

	pub fn is_clean(&self) -> bool {
		Rc::ptr_eq(&self.buffer, &self.pristine) || self.buffer == self.pristine
	}

	pub fn is_dirty(&self) -> bool {
		!self.is_clean()
	}

	pub fn is_fulfilled(&self) -> bool {
		self.rules.iter().all(|(_, state)| state.is_fulfilled())
	}

	pub fn is_pending(&self) -> bool {
		self.rules.iter().any(|(_, state)| state.is_pending())
	}

	pub fn is_rejected(&self) -> bool {
		self.rules.iter().any(|(_, state)| state.is_rejected())
	}

	pub fn is_submittable(&self) -> bool {
		self.is_dirty() && !self.submitting && self.is_fulfilled()
	}

	pub fn is_unsubmittable(&self) -> bool {
		!self.is_submittable()
	}
}

/// An edit buffer over a record, one independent rule per field, and the
/// submit protocol around them.
pub struct Form<O, I, C = ()> {
	body: Rc<FormBody<O, I, C>>,
}

impl<O, I, C> Clone for Form<O, I, C> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

struct FormBody<O, I, C> {
	fields: Vec<Rc<str>>,
	slots: FxHashMap<Rc<str>, usize>,
	options: Vec<RuleOptions<I, C>>,
	context: Rc<C>,
	object: Option<Rc<O>>,
	pristine: Rc<Buffer<I>>,
	observe: Option<FormObserver<I>>,
	rules: RefCell<SmallVec<[Rule<I, C>; 4]>>,
	generation: Cell<u64>,
	state: RefCell<Rc<FormState<I>>>,
	this: Weak<FormBody<O, I, C>>,
}

impl<O, I, C> Form<O, I, C>
where
	O: 'static,
	I: Input + Default,
	C: 'static,
{
	pub fn new(options: FormOptions<O, I, C>) -> Self
	where
		C: Default,
	{
		let FormOptions {
			rules,
			object,
			read,
			observe,
			context,
		} = options;

		let context = context.unwrap_or_default();
		let (fields, options): (Vec<_>, Vec<_>) = rules.into_iter().unzip();
		let slots = fields
			.iter()
			.enumerate()
			.map(|(slot, field)| (field.clone(), slot))
			.collect();

		let pristine: Buffer<I> = fields
			.iter()
			.map(|field| {
				let value = match &object {
					Some(object) => read(&**object, &**field),
					None => I::default(),
				};
				(field.clone(), value)
			})
			.collect();
		let pristine = Rc::new(pristine);

		Form {
			body: Rc::new_cyclic(|this| {
				let rules = FormBody::spawn(this, 0, &fields, &options, &context);
				let state = FormState::fresh(pristine.clone(), object.is_some(), &fields, &rules);

				FormBody {
					fields,
					slots,
					options,
					context,
					object,
					pristine,
					observe,
					rules: RefCell::new(rules),
					generation: Cell::new(0),
					state: RefCell::new(Rc::new(state)),
					this: this.clone(),
				}
			}),
		}
	}

	pub fn state(&self) -> Rc<FormState<I>> {
		self.body.state()
	}

	pub fn object(&self) -> Option<&O> {
		self.body.object.as_deref()
	}

	/// The rule currently validating `field`. Submitting successfully or
	/// calling [`Self::reset`] replaces every rule.
	pub fn rule(&self, field: &str) -> Option<Rule<I, C>> {
		let slot = *self.body.slots.get(field)?;
		self.body.rules.borrow().get(slot).cloned()
	}

	/// Writes `input` into the buffer and validates it.
	///
	/// The first edit of a clean form validates every field against the
	/// buffer and resolves once all of them settled, whatever their outcome.
	/// Later edits validate `field` alone and fail if it rejects.
	///
	/// The buffer write is applied right away. Rule transitions that settle
	/// later are applied only while the deferred is awaited.
	#[must_use = "rule transitions that settle later are applied only while the deferred is awaited"]
	pub fn set(&self, field: &str, input: I) -> Deferred<Result<(), FormError>> {
		let body = &self.body;
		let Some(&slot) = body.slots.get(field) else {
			return future::err(FormError::UnknownField(field.to_owned())).boxed_local();
		};

		let was_clean = body.state().is_clean();
		let key = body.fields[slot].clone();
		let value = input.clone();
		let next = update(&**body, move |draft: &mut FormState<I>| {
			let mut buffer = (*draft.buffer).clone();
			buffer.insert(key, value);
			draft.buffer = Rc::new(buffer);
		});

		let rules = body.rules.borrow().clone();

		if was_clean {
			tracing::debug!(field, "first edit, evaluating every field");
			let all: Vec<_> = body
				.fields
				.iter()
				.zip(rules.iter())
				.map(|(field, rule)| rule.evaluate(next.buffer.get(field).cloned().unwrap_or_default()))
				.collect();
			return join_all(all).map(|_| Ok(())).boxed_local();
		}

		rules[slot]
			.evaluate(input)
			.map(|outcome| outcome.map_err(FormError::Invalid))
			.boxed_local()
	}

	/// Hands the buffer to `action`.
	///
	/// Success starts a brand-new form: fresh rules, buffer back to the
	/// pristine values. Failure is recorded as the form's error and leaves
	/// buffer and rules as they are, so the user can correct and resubmit.
	/// An action that completes later only takes effect while the deferred
	/// is awaited.
	#[must_use = "an action that completes later takes effect only while the deferred is awaited"]
	pub fn submit<A, R>(&self, action: A) -> Deferred<Result<(), FormError>>
	where
		A: FnOnce(Rc<Buffer<I>>) -> R,
		R: Future<Output = Outcome> + 'static,
	{
		let state = update(&*self.body, |draft: &mut FormState<I>| {
			draft.submitting = true;
			draft.error = None;
		});
		tracing::debug!("submitting");

		let mut pending = action(state.buffer.clone()).boxed_local();
		let body = self.body.clone();

		if let Some(outcome) = poll_now(&mut pending) {
			return future::ready(body.finish(outcome)).boxed_local();
		}

		async move {
			let outcome = pending.await;
			body.finish(outcome)
		}
		.boxed_local()
	}

	/// Starts over with fresh rules and the pristine buffer.
	pub fn reset(&self) {
		self.body.rebuild();
	}
}

impl<O, I, C> FormBody<O, I, C>
where
	O: 'static,
	I: Input + Default,
	C: 'static,
{
	fn spawn(
		this: &Weak<Self>,
		generation: u64,
		fields: &[Rc<str>],
		options: &[RuleOptions<I, C>],
		context: &Rc<C>,
	) -> SmallVec<[Rule<I, C>; 4]> {
		fields
			.iter()
			.zip(options)
			.enumerate()
			.map(|(slot, (field, options))| {
				let mut options = options.clone();
				let own = options.observe.take();
				let form = this.clone();

				options.observe = Some(Rc::new(move |next: &Rc<Snapshot<I>>| {
					if let Some(own) = &own {
						own(next);
					}
					if let Some(form) = form.upgrade() {
						form.receive(generation, slot, next.clone());
					}
				}));

				Rule::keyed(field.clone(), options, context.clone())
			})
			.collect()
	}

	fn receive(&self, generation: u64, slot: usize, next: Rc<Snapshot<I>>) {
		if generation != self.generation.get() {
			tracing::trace!(generation, "ignoring a rule of a previous form");
			return;
		}

		update(self, move |draft: &mut FormState<I>| {
			draft.rules[slot].1 = next;
		});
	}

	fn finish(&self, outcome: Outcome) -> Result<(), FormError> {
		match outcome {
			Ok(()) => {
				self.rebuild();
				Ok(())
			}
			Err(message) => {
				tracing::debug!(%message, "submit failed");
				let error = message.clone();
				update(self, move |draft: &mut FormState<I>| {
					draft.submitting = false;
					draft.error = Some(error);
				});
				Err(FormError::Submit(message))
			}
		}
	}

	fn rebuild(&self) {
		let generation = self.generation.get() + 1;
		self.generation.set(generation);
		tracing::debug!(generation, "starting a fresh form");

		let rules = Self::spawn(&self.this, generation, &self.fields, &self.options, &self.context);
		let state = FormState::fresh(self.pristine.clone(), self.object.is_some(), &self.fields, &rules);
		*self.rules.borrow_mut() = rules;
		install(self, Rc::new(state));
	}
}

impl<O, I, C> Observable for FormBody<O, I, C>
where
	I: Clone,
{
	type State = FormState<I>;

	fn state(&self) -> Rc<FormState<I>> {
		self.state.borrow().clone()
	}

	fn replace(&self, next: Rc<FormState<I>>) {
		*self.state.borrow_mut() = next;
	}

	fn notify(&self, next: &Rc<FormState<I>>) {
		if let Some(observe) = &self.observe {
			observe(next);
		}
	}
}
