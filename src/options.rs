use std::rc::Rc;

use crate::{Condition, Message, Outcome, Snapshot};

/// Receives every snapshot a rule installs.
pub type Observer<I> = Rc<dyn Fn(&Rc<Snapshot<I>>)>;

/// How to build a [`Rule`](crate::Rule).
///
/// Defaults: no condition (always resolves), optional, no prerequisites,
/// no observer, and the context of the enclosing rule or form.
pub struct RuleOptions<I, C = ()> {
	pub(crate) condition: Option<Condition<I, C>>,
	pub(crate) required: bool,
	pub(crate) rules: Vec<(Rc<str>, RuleOptions<I, C>)>,
	pub(crate) observe: Option<Observer<I>>,
	pub(crate) context: Option<Rc<C>>,
}

impl<I, C> Clone for RuleOptions<I, C> {
	fn clone(&self) -> Self {
		Self {
			condition: self.condition.clone(),
			required: self.required,
			rules: self.rules.clone(),
			observe: self.observe.clone(),
			context: self.context.clone(),
		}
	}
}

impl<I, C> Default for RuleOptions<I, C> {
	fn default() -> Self {
		Self {
			condition: None,
			required: false,
			rules: Vec::new(),
			observe: None,
			context: None,
		}
	}
}

impl<I, C> RuleOptions<I, C>
where
	I: 'static,
	C: 'static,
{
	pub fn new() -> Self {
		Self::default()
	}

	pub fn condition(mut self, condition: Condition<I, C>) -> Self {
		self.condition = Some(condition);
		self
	}

	/// Shorthand for a synchronous [`Condition::check`].
	pub fn check<F>(self, func: F) -> Self
	where
		F: Fn(&C, &I) -> Outcome + 'static,
	{
		self.condition(Condition::check(func))
	}

	pub fn required(mut self) -> Self {
		self.required = true;
		self
	}

	/// Adds a named prerequisite. Declaration order is kept everywhere
	/// children are listed.
	pub fn rule(mut self, name: &str, options: RuleOptions<I, C>) -> Self {
		self.rules.push((Rc::from(name), options));
		self
	}

	pub fn observe<F>(mut self, func: F) -> Self
	where
		F: Fn(&Rc<Snapshot<I>>) + 'static,
	{
		self.observe = Some(Rc::new(func));
		self
	}

	/// Context handed to this rule's condition and, unless they set their
	/// own, to every rule below it.
	pub fn context(mut self, context: C) -> Self {
		self.context = Some(Rc::new(context));
		self
	}
}

impl<I, C> RuleOptions<I, C>
where
	I: PartialEq + 'static,
	C: 'static,
{
	/// Fulfills only for one of `allowed`.
	pub fn one_of(self, allowed: Vec<I>, message: &str) -> Self {
		let message = Message::from(message);
		self.check(move |_, input| {
			if allowed.contains(input) {
				Ok(())
			} else {
				Err(message.clone())
			}
		})
	}
}
