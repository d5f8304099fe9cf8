//! Question classification from observable DOM signals.

use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;

use crate::{
	QuestionKind,
	frame::{DomTarget, js_string},
};

/// Raw DOM facts a question page exposes, gathered in one evaluation.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct Signals {
	pub checkboxes: u32,
	pub editor: bool,
}

/// Collect classification signals from the current question page. Editor
/// selectors come from the config; a selector the page rejects is skipped
/// rather than failing the sweep.
pub async fn read_signals(target: &impl DomTarget, editor_selectors: &[String]) -> Result<Signals> {
	let selectors = js_string(&editor_selectors.join("\u{1f}"))?;
	let script = format!(
		r#"let editor = false;
	for (const sel of {selectors}.split('\u001f')) {{
		try {{
			if (doc.querySelector(sel)) {{ editor = true; break; }}
		}} catch (e) {{}}
	}}
	return JSON.stringify({{
		checkboxes: doc.querySelectorAll('input[type="checkbox"], input[type="radio"]').length,
		editor: editor,
	}});"#
	);
	match target.eval(&script).await? {
		serde_json::Value::String(raw) => serde_json::from_str(&raw).map_err(|e| eyre!("Malformed classification signals: {e}")),
		other => Err(eyre!("Signal evaluation returned {other:?}")),
	}
}

/// Checkable inputs outrank an editor: platforms keep a hidden code pane
/// mounted on multiple-choice pages, but never the reverse.
pub fn kind_from_signals(signals: Signals) -> QuestionKind {
	if signals.checkboxes > 0 {
		QuestionKind::MultipleChoice
	} else if signals.editor {
		QuestionKind::Code
	} else {
		QuestionKind::Text
	}
}

pub async fn classify(target: &impl DomTarget, editor_selectors: &[String]) -> Result<QuestionKind> {
	Ok(kind_from_signals(read_signals(target, editor_selectors).await?))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn checkboxes_outrank_editor() {
		assert_eq!(kind_from_signals(Signals { checkboxes: 4, editor: true }), QuestionKind::MultipleChoice);
		assert_eq!(kind_from_signals(Signals { checkboxes: 1, editor: false }), QuestionKind::MultipleChoice);
	}

	#[test]
	fn editor_without_checkboxes_is_code() {
		assert_eq!(kind_from_signals(Signals { checkboxes: 0, editor: true }), QuestionKind::Code);
	}

	#[test]
	fn nothing_observable_is_text() {
		assert_eq!(kind_from_signals(Signals { checkboxes: 0, editor: false }), QuestionKind::Text);
	}

	#[test]
	fn signals_deserialize_from_page_json() {
		let signals: Signals = serde_json::from_str(r#"{"checkboxes": 3, "editor": false}"#).unwrap();
		assert_eq!(signals.checkboxes, 3);
		assert!(!signals.editor);
	}
}
