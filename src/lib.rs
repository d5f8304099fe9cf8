use std::fmt;

pub mod classify;
pub mod config;
pub mod finder;
pub mod frame;
pub mod login;
pub mod navigator;
pub mod oracle;
pub mod quiz;
pub mod solver;

/// Kind of question currently shown in the course frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuestionKind {
	/// At least one checkbox input is present.
	MultipleChoice,
	/// An editor-like element is present (plain text area or rich editor).
	Code,
	/// Anything else: answered through a free-text field.
	Text,
}

impl fmt::Display for QuestionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			QuestionKind::MultipleChoice => write!(f, "Multiple choice"),
			QuestionKind::Code => write!(f, "Coding"),
			QuestionKind::Text => write!(f, "Text or free response"),
		}
	}
}
