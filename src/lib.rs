pub mod macros;

mod condition;
mod deferred;
mod form;
mod message;
mod options;
mod rule;
mod snapshot;
mod update;

use futures::future::LocalBoxFuture;

pub use condition::{Condition, Settle};
pub use form::{Buffer, Form, FormError, FormOptions, FormState, Record};
pub use message::Message;
pub use options::{Observer, RuleOptions};
pub use rule::Rule;
pub use snapshot::{Snapshot, Status};
pub use update::{install, update, Apply, Observable};

/// Result of a single evaluation.
pub type Outcome = Result<(), Message>;

/// An outcome that may still be waiting on a condition.
///
/// Everything that settled synchronously has already been applied by the time
/// a `Deferred` is handed out; awaiting it drives whatever is left.
pub type Deferred<T> = LocalBoxFuture<'static, T>;

/// A value a rule can be evaluated against.
pub trait Input: Clone + PartialEq + 'static {
	/// Blank input short-circuits evaluation: optional rules fulfill
	/// and required rules reject without running any condition.
	fn is_blank(&self) -> bool;
}

impl Input for String {
	fn is_blank(&self) -> bool {
		self.is_empty()
	}
}

impl Input for &'static str {
	fn is_blank(&self) -> bool {
		self.is_empty()
	}
}

impl<T: Input> Input for Option<T> {
	fn is_blank(&self) -> bool {
		self.as_ref().map_or(true, T::is_blank)
	}
}

impl<T: Clone + PartialEq + 'static> Input for Vec<T> {
	fn is_blank(&self) -> bool {
		self.is_empty()
	}
}

macro_rules! never_blank {
	($($ty:ty),*) => {
		$(impl Input for $ty {
			fn is_blank(&self) -> bool {
				false
			}
		})*
	};
}

never_blank!(bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);
