//! The answer oracle: prompt construction, the LLM backend, and parsing of
//! its replies into applicable answers.

use std::sync::LazyLock;

use ask_llm::{Client, Conversation, Model, Role};
use color_eyre::Result;
use regex::Regex;
use v_utils::log;

use crate::config::AppConfig;

/// Phrase some models prepend despite instructions; everything after it is
/// the actual answer.
const OPTIONS_MARKER: &str = "correct options are:";

pub const QUIZ_FALLBACK_ANSWER: &str = "1";
pub const CODE_FALLBACK_ANSWER: &str = "# Default code";

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern is valid"));

/// An oracle reply after parsing: either option numbers to check, or literal
/// text to type into a field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParsedAnswer {
	Indices(Vec<usize>),
	Text(String),
}

impl ParsedAnswer {
	/// The string a text field receives when option checking is impossible.
	pub fn display(&self) -> String {
		match self {
			Self::Indices(indices) => indices.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
			Self::Text(text) => text.clone(),
		}
	}
}

/// Interpret a raw quiz reply. Digits anywhere in the reply are treated as
/// option numbers; a digit-free reply is literal answer text.
pub fn parse_quiz_answer(raw: &str) -> ParsedAnswer {
	// Digits survive case folding, so the marker search and the digit scan
	// both run on the lowercased copy; offsets into `raw` would drift when a
	// character's lowercase form has a different byte length.
	let lowered = raw.to_lowercase();
	let scan_region = match lowered.find(OPTIONS_MARKER) {
		Some(pos) => &lowered[pos + OPTIONS_MARKER.len()..],
		None => lowered.as_str(),
	};
	let indices: Vec<usize> = DIGITS.find_iter(scan_region).filter_map(|m| m.as_str().parse().ok()).collect();
	if indices.is_empty() {
		ParsedAnswer::Text(raw.trim().to_string())
	} else {
		ParsedAnswer::Indices(indices)
	}
}

/// Source of answers. The solver only sees this seam, so tests exercise the
/// full solving path without a network.
#[allow(async_fn_in_trait)]
pub trait AnswerOracle {
	async fn quiz_answer(&self, page_text: &str) -> Result<ParsedAnswer>;
	async fn code_answer(&self, page_text: &str) -> Result<String>;
}

/// The production oracle, backed by the LLM gateway.
pub struct LlmOracle {
	quiz_prompt: String,
	code_prompt: String,
}

impl LlmOracle {
	pub fn from_config(config: &AppConfig) -> Self {
		Self {
			quiz_prompt: config.quiz_prompt().to_string(),
			code_prompt: config.code_prompt().to_string(),
		}
	}

}

impl AnswerOracle for LlmOracle {
	async fn quiz_answer(&self, page_text: &str) -> Result<ParsedAnswer> {
		let prompt = self.quiz_prompt.replace("{content}", page_text);
		let client = Client::new().model(Model::Medium).max_tokens(256);
		let mut conv = Conversation::new();
		conv.add(Role::User, prompt);
		let response = client.conversation(&conv).await?;
		log!("Oracle quiz reply: {:?}", response.text);
		Ok(parse_quiz_answer(&response.text))
	}

	async fn code_answer(&self, page_text: &str) -> Result<String> {
		let prompt = self.code_prompt.replace("{content}", page_text);
		let client = Client::new().model(Model::Medium).max_tokens(4096);
		let mut conv = Conversation::new();
		conv.add(Role::User, prompt);
		let response = client.conversation(&conv).await?;
		log!("Oracle code reply: {} chars", response.text.len());
		Ok(response.text.trim().to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn marker_reply_yields_indices_after_marker() {
		assert_eq!(parse_quiz_answer("The correct options are: 2, 4"), ParsedAnswer::Indices(vec![2, 4]));
	}

	#[test]
	fn marker_is_case_insensitive() {
		assert_eq!(parse_quiz_answer("The Correct Options Are: 3"), ParsedAnswer::Indices(vec![3]));
	}

	#[test]
	fn marker_excludes_digits_before_it() {
		assert_eq!(parse_quiz_answer("Question 7: the correct options are: 1, 3"), ParsedAnswer::Indices(vec![1, 3]));
	}

	#[test]
	fn marker_excludes_digits_after_width_changing_case_folds() {
		// 'İ' lowercases to two code points, growing the string by a byte.
		assert_eq!(parse_quiz_answer("İstanbul quiz 7: the correct options are: 2"), ParsedAnswer::Indices(vec![2]));
	}

	#[test]
	fn bare_digit_reply_is_an_index() {
		assert_eq!(parse_quiz_answer("3"), ParsedAnswer::Indices(vec![3]));
		assert_eq!(parse_quiz_answer("1, 3"), ParsedAnswer::Indices(vec![1, 3]));
	}

	#[test]
	fn digit_free_reply_is_literal_text() {
		assert_eq!(parse_quiz_answer("  Paris  "), ParsedAnswer::Text("Paris".to_string()));
	}

	#[test]
	fn display_joins_indices_for_text_fields() {
		assert_eq!(ParsedAnswer::Indices(vec![2, 4]).display(), "2, 4");
		assert_eq!(ParsedAnswer::Text("Paris".to_string()).display(), "Paris");
	}
}
