use std::any::Any;
use std::fmt::{Debug, Display};
use std::rc::Rc;

const BLANK: &str = "can't be blank";

/// Why a rule rejected or a submit action failed.
///
/// The engine never interprets a message. It is either text or an arbitrary
/// payload handed over by a condition, and cloning it is cheap.
#[derive(Clone)]
pub enum Message {
	Text(Rc<str>),
	Payload(Rc<dyn Any>),
}

impl Message {
	pub fn blank() -> Self {
		Message::Text(Rc::from(BLANK))
	}

	pub fn payload<T: Any>(value: T) -> Self {
		Message::Payload(Rc::new(value))
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Message::Text(text) => Some(text),
			Message::Payload(_) => None,
		}
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		match self {
			Message::Text(_) => None,
			Message::Payload(value) => value.downcast_ref(),
		}
	}
}

impl From<&str> for Message {
	fn from(text: &str) -> Self {
		Message::Text(Rc::from(text))
	}
}

impl From<String> for Message {
	fn from(text: String) -> Self {
		Message::Text(Rc::from(text))
	}
}

impl PartialEq for Message {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Message::Text(a), Message::Text(b)) => a == b,
			(Message::Payload(a), Message::Payload(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl PartialEq<str> for Message {
	fn eq(&self, other: &str) -> bool {
		self.as_str() == Some(other)
	}
}

impl PartialEq<&str> for Message {
	fn eq(&self, other: &&str) -> bool {
		self.as_str() == Some(*other)
	}
}

impl Display for Message {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Message::Text(text) => f.write_str(text),
			Message::Payload(_) => f.write_str("<payload>"),
		}
	}
}

impl Debug for Message {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Message::Text(text) => Debug::fmt(&**text, f),
			Message::Payload(_) => f.write_str("Payload(..)"),
		}
	}
}
