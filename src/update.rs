use std::rc::Rc;

/// Something that owns exactly one live state snapshot and reports every
/// replacement of it.
pub trait Observable {
	type State: Clone;

	/// The snapshot currently installed.
	fn state(&self) -> Rc<Self::State>;

	/// Swap in `next`. Must not notify.
	fn replace(&self, next: Rc<Self::State>);

	/// Called exactly once per installed snapshot, after it was swapped in.
	fn notify(&self, next: &Rc<Self::State>);
}

/// A change to a draft of the next snapshot.
///
/// Closures get a mutable draft pre-populated from the current snapshot.
/// State types may also provide literal patches.
pub trait Apply<S> {
	fn apply(self, draft: &mut S);
}

impl<S, F> Apply<S> for F
where
	F: FnOnce(&mut S),
{
	fn apply(self, draft: &mut S) {
		self(draft)
	}
}

/// Builds the next snapshot from the current one plus `change`, installs it
/// and notifies the node's observer, all before returning.
pub fn update<N>(node: &N, change: impl Apply<N::State>) -> Rc<N::State>
where
	N: Observable + ?Sized,
{
	let mut draft = (*node.state()).clone();
	change.apply(&mut draft);
	let next = Rc::new(draft);
	install(node, next.clone());
	next
}

/// Installs a ready-made snapshot as is.
pub fn install<N>(node: &N, next: Rc<N::State>)
where
	N: Observable + ?Sized,
{
	node.replace(next.clone());
	node.notify(&next);
}
