use std::rc::Rc;

use smallvec::SmallVec;

use crate::update::Apply;
use crate::Message;

pub(crate) type Children<I> = SmallVec<[(Rc<str>, Rc<Snapshot<I>>); 4]>;

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
	Idle,
	Pending,
	Fulfilled,
	Rejected(Message),
}

/// The state of one rule at one instant.
///
/// Snapshots are never mutated once installed. Every transition produces a new
/// `Rc<Snapshot>`, so `Rc::ptr_eq` on two snapshots tells whether anything
/// changed in between.
#[derive(Debug, Clone)]
pub struct Snapshot<I> {
	pub(crate) input: Option<I>,
	pub(crate) required: bool,
	pub(crate) status: Status,
	pub(crate) children: Children<I>,
}

impl<I> Snapshot<I> {
	pub(crate) fn initial(required: bool, children: Children<I>) -> Self {
		let status = if required || !children.is_empty() {
			Status::Idle
		} else {
			Status::Fulfilled
		};

		Snapshot {
			input: None,
			required,
			status,
			children,
		}
	}

	pub fn input(&self) -> Option<&I> {
		self.input.as_ref()
	}

	pub fn status(&self) -> &Status {
		&self.status
	}

	pub fn message(&self) -> Option<&Message> {
		match &self.status {
			Status::Rejected(message) => Some(message),
			_ => None,
		}
	}

	pub fn is_required(&self) -> bool {
		self.required
	}

	pub fn is_optional(&self) -> bool {
		!self.required
	}

	pub fn is_idle(&self) -> bool {
		!self.is_pending() && !self.is_settled()
	}

	pub fn is_pending(&self) -> bool {
		matches!(self.status, Status::Pending)
	}

	pub fn is_fulfilled(&self) -> bool {
		matches!(self.status, Status::Fulfilled)
	}

	pub fn is_unfulfilled(&self) -> bool {
		!self.is_fulfilled()
	}

	pub fn is_rejected(&self) -> bool {
		matches!(self.status, Status::Rejected(_))
	}

	pub fn is_settled(&self) -> bool {
		self.is_fulfilled() || self.is_rejected()
	}

	pub fn child(&self, key: &str) -> Option<&Rc<Snapshot<I>>> {
		self.children
			.iter()
			.find(|(k, _)| &**k == key)
			.map(|(_, child)| child)
	}

	pub fn children(&self) -> impl Iterator<Item = (&str, &Rc<Snapshot<I>>)> + '_ {
		self.children.iter().map(|(key, child)| (&**key, child))
	}

	/// Direct children in declaration order. Grandchildren are reachable
	/// through each child's own snapshot, or all at once via [`Self::descendants`].
	pub fn all(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.children.iter().map(|(_, child)| child)
	}

	pub fn idle(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.all().filter(|child| child.is_idle())
	}

	pub fn pending(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.all().filter(|child| child.is_pending())
	}

	pub fn fulfilled(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.all().filter(|child| child.is_fulfilled())
	}

	pub fn unfulfilled(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.all().filter(|child| child.is_unfulfilled())
	}

	pub fn rejected(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.all().filter(|child| child.is_rejected())
	}

	pub fn settled(&self) -> impl Iterator<Item = &Rc<Snapshot<I>>> + '_ {
		self.all().filter(|child| child.is_settled())
	}

	/// Every snapshot below this one, depth first, in declaration order.
	pub fn descendants(&self) -> Vec<&Rc<Snapshot<I>>> {
		let mut out = Vec::new();
		self.collect_into(&mut out);
		out
	}

	fn collect_into<'a>(&'a self, out: &mut Vec<&'a Rc<Snapshot<I>>>) {
		for child in self.all() {
			out.push(child);
			child.collect_into(out);
		}
	}

	/// Status implied by the prerequisites alone.
	///
	/// `None` means every prerequisite fulfilled and the rule's own
	/// condition has the last word.
	pub(crate) fn verdict(&self, has_condition: bool) -> Option<Status> {
		if let Some(message) = self.rejected().find_map(|child| child.message()) {
			return Some(Status::Rejected(message.clone()));
		}

		if self.all().all(|child| child.is_fulfilled()) {
			return if has_condition {
				None
			} else {
				Some(Status::Fulfilled)
			};
		}

		if self.pending().next().is_some() {
			Some(Status::Pending)
		} else {
			Some(Status::Idle)
		}
	}
}

/// A status is the literal patch form of a change: it replaces the status
/// and leaves everything else as it was.
impl<I> Apply<Snapshot<I>> for Status {
	fn apply(self, draft: &mut Snapshot<I>) {
		draft.status = self;
	}
}

#[cfg(test)]
mod tests {
	use smallvec::smallvec;

	use super::*;

	fn leaf(status: Status) -> Rc<Snapshot<&'static str>> {
		Rc::new(Snapshot {
			input: Some("x"),
			required: true,
			status,
			children: SmallVec::new(),
		})
	}

	fn parent(children: Children<&'static str>) -> Snapshot<&'static str> {
		Snapshot::initial(false, children)
	}

	#[test]
	fn initial_status() {
		assert!(Snapshot::<&str>::initial(true, SmallVec::new()).is_idle());
		assert!(Snapshot::<&str>::initial(false, SmallVec::new()).is_fulfilled());
		assert!(parent(smallvec![(Rc::from("a"), leaf(Status::Fulfilled))]).is_idle());
	}

	#[test]
	fn derived_flags_are_consistent() {
		for status in [
			Status::Idle,
			Status::Pending,
			Status::Fulfilled,
			Status::Rejected(Message::from("no")),
		] {
			let state = leaf(status);
			assert_eq!(state.is_settled(), state.is_fulfilled() || state.is_rejected());
			assert_eq!(state.is_idle(), !state.is_pending() && !state.is_settled());
			assert_eq!(state.message().is_some(), state.is_rejected());
		}
	}

	#[test]
	fn views_filter_direct_children() {
		let nested = Rc::new(parent(smallvec![(Rc::from("deep"), leaf(Status::Pending))]));
		let state = parent(smallvec![
			(Rc::from("a"), leaf(Status::Fulfilled)),
			(Rc::from("b"), leaf(Status::Rejected(Message::from("bad")))),
			(Rc::from("c"), nested),
		]);

		assert_eq!(state.all().count(), 3);
		assert_eq!(state.fulfilled().count(), 1);
		assert_eq!(state.rejected().count(), 1);
		assert_eq!(state.settled().count(), 2);
		assert_eq!(state.unfulfilled().count(), 2);
		assert_eq!(state.idle().count(), 1);
		assert_eq!(state.pending().count(), 0);
		assert_eq!(state.descendants().len(), 4);
		assert!(state.child("c").and_then(|c| c.child("deep")).is_some_and(|d| d.is_pending()));
	}

	#[test]
	fn verdict_fails_fast_on_rejection() {
		let state = parent(smallvec![
			(Rc::from("a"), leaf(Status::Pending)),
			(Rc::from("b"), leaf(Status::Rejected(Message::from("bad")))),
		]);
		assert_eq!(state.verdict(false), Some(Status::Rejected(Message::from("bad"))));

		let state = parent(smallvec![
			(Rc::from("a"), leaf(Status::Pending)),
			(Rc::from("b"), leaf(Status::Idle)),
		]);
		assert_eq!(state.verdict(false), Some(Status::Pending));

		let state = parent(smallvec![
			(Rc::from("a"), leaf(Status::Fulfilled)),
			(Rc::from("b"), leaf(Status::Idle)),
		]);
		assert_eq!(state.verdict(false), Some(Status::Idle));

		let state = parent(smallvec![(Rc::from("a"), leaf(Status::Fulfilled))]);
		assert_eq!(state.verdict(false), Some(Status::Fulfilled));
		assert_eq!(state.verdict(true), None);
	}
}
