//! Applying answers to a question page: checking options, filling text
//! fields, and driving code editors through synthesized keyboard input.

use std::time::Duration;

use chromiumoxide::{
	Page,
	cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType},
};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use v_utils::{elog, log};

use crate::{
	QuestionKind,
	config::AppConfig,
	finder::{self, ClickMode},
	frame::{CourseFrame, DomTarget, js_string},
	oracle::{AnswerOracle, CODE_FALLBACK_ANSWER, ParsedAnswer, QUIZ_FALLBACK_ANSWER, parse_quiz_answer},
};

/// What a solve attempt did, for the runner's logs.
#[derive(Clone, Debug)]
pub struct SolveReport {
	pub kind: QuestionKind,
	pub answer: String,
	pub applied: bool,
}

pub async fn solve_question<O: AnswerOracle>(page: &Page, frame: &CourseFrame<'_>, config: &AppConfig, oracle: &O, kind: QuestionKind, page_text: &str) -> Result<SolveReport> {
	match kind {
		QuestionKind::MultipleChoice | QuestionKind::Text => solve_quiz(frame, config, oracle, kind, page_text).await,
		QuestionKind::Code => solve_code(page, frame, config, oracle, page_text).await,
	}
}

async fn solve_quiz<O: AnswerOracle>(frame: &CourseFrame<'_>, config: &AppConfig, oracle: &O, kind: QuestionKind, page_text: &str) -> Result<SolveReport> {
	let answer = match oracle.quiz_answer(page_text).await {
		Ok(answer) => answer,
		Err(e) => {
			elog!("Oracle failed for {kind} question, using fallback: {e}");
			parse_quiz_answer(QUIZ_FALLBACK_ANSWER)
		}
	};

	if let ParsedAnswer::Indices(indices) = &answer {
		let total = checkbox_count(frame).await?;
		if total > 0 {
			match plan_checks(indices, total) {
				CheckPlan::Check(checkable) => {
					check_boxes(frame, &checkable).await?;
					log!("Checked options {checkable:?} of {total}");
				}
				// Nothing on the page matches the oracle's numbers. The
				// submission still goes out; an empty form loses at most
				// this one question, aborting loses the subtopic.
				CheckPlan::SubmitUnchanged => {
					tracing::warn!("None of options {indices:?} exist among {total}, submitting with nothing checked");
				}
			}
			return Ok(SolveReport { kind, answer: answer.display(), applied: true });
		}
	}

	// No checkable inputs to receive the indices, so whatever the oracle
	// said goes into the page's text field verbatim.
	let text = answer.display();
	fill_first_text_field(frame, &text).await?;
	log!("Filled text answer: {text:?}");
	Ok(SolveReport { kind, answer: text, applied: true })
}

async fn checkbox_count(frame: &CourseFrame<'_>) -> Result<u32> {
	let value = frame.eval(r#"return doc.querySelectorAll('input[type="checkbox"], input[type="radio"]').length;"#).await?;
	value.as_u64().map(|n| n as u32).ok_or_else(|| eyre!("Checkbox count evaluation returned {value:?}"))
}

/// What to do with the oracle's option numbers, given how many checkable
/// inputs the page actually has.
#[derive(Clone, Debug, Eq, PartialEq)]
enum CheckPlan {
	Check(Vec<usize>),
	SubmitUnchanged,
}

/// Keep only 1-based option numbers the page can satisfy; when none survive
/// the question is still submitted, not failed.
fn plan_checks(indices: &[usize], total: u32) -> CheckPlan {
	let mut kept = Vec::new();
	for &idx in indices {
		if idx >= 1 && idx <= total as usize {
			kept.push(idx);
		} else {
			tracing::warn!("Dropping option {idx}: page only has {total}");
		}
	}
	if kept.is_empty() { CheckPlan::SubmitUnchanged } else { CheckPlan::Check(kept) }
}

/// Click each target option unless it is already checked, so re-solving a
/// page never toggles a correct answer off.
async fn check_boxes(frame: &CourseFrame<'_>, indices: &[usize]) -> Result<()> {
	let payload = js_string(&indices.iter().map(ToString::to_string).collect::<Vec<_>>().join(","))?;
	let script = format!(
		r#"const boxes = doc.querySelectorAll('input[type="checkbox"], input[type="radio"]');
	for (const raw of {payload}.split(',')) {{
		const box = boxes[parseInt(raw, 10) - 1];
		if (box && !box.checked) box.click();
	}}
	return true;"#
	);
	frame.eval(&script).await?;
	Ok(())
}

async fn fill_first_text_field(frame: &CourseFrame<'_>, text: &str) -> Result<()> {
	let text = js_string(text)?;
	let script = format!(
		r#"const field = doc.querySelector('input[type="text"], textarea');
	if (!field) return false;
	field.value = {text};
	field.dispatchEvent(new Event('input', {{ bubbles: true }}));
	field.dispatchEvent(new Event('change', {{ bubbles: true }}));
	return true;"#
	);
	match frame.eval(&script).await? {
		serde_json::Value::Bool(true) => Ok(()),
		_ => bail!("No text field found to receive the answer"),
	}
}

/// Code questions own their whole lifecycle: type the solution, submit it,
/// wait out the grader's feedback, then advance.
async fn solve_code<O: AnswerOracle>(page: &Page, frame: &CourseFrame<'_>, config: &AppConfig, oracle: &O, page_text: &str) -> Result<SolveReport> {
	let code = match oracle.code_answer(page_text).await {
		Ok(code) if !code.is_empty() => code,
		Ok(_) => {
			elog!("Oracle returned empty code, using fallback");
			CODE_FALLBACK_ANSWER.to_string()
		}
		Err(e) => {
			elog!("Oracle failed for coding question, using fallback: {e}");
			CODE_FALLBACK_ANSWER.to_string()
		}
	};

	// Editors mount asynchronously well after the page itself settles.
	tokio::time::sleep(Duration::from_secs(config.timings.editor_settle_secs)).await;
	focus_editor(frame, &config.code_editor_selectors).await?;
	clear_editor(page).await?;
	type_text(page, &code, Duration::from_millis(config.timings.keystroke_delay_ms)).await?;
	log!("Typed {} chars of code", code.len());

	tokio::time::sleep(Duration::from_secs(config.timings.pre_submit_settle_secs)).await;
	let backoff = Duration::from_secs(config.timings.code_retry_backoff_secs);
	submit_and_advance(frame, config, ClickMode::Submit, backoff).await?;
	tokio::time::sleep(Duration::from_secs(config.timings.feedback_wait_secs)).await;
	submit_and_advance(frame, config, ClickMode::Next, backoff).await?;

	Ok(SolveReport { kind: QuestionKind::Code, answer: code, applied: true })
}

async fn submit_and_advance(frame: &CourseFrame<'_>, config: &AppConfig, mode: ClickMode, backoff: Duration) -> Result<()> {
	for attempt in 1..=config.retries.code_submit_attempts {
		if finder::click_submit_or_next(frame, config, mode).await? {
			return Ok(());
		}
		tracing::warn!("Code {mode} attempt {attempt}/{} found no control", config.retries.code_submit_attempts);
		tokio::time::sleep(backoff).await;
	}
	bail!("No {mode} control appeared after {} attempts", config.retries.code_submit_attempts)
}

async fn focus_editor(frame: &CourseFrame<'_>, selectors: &[String]) -> Result<()> {
	let selectors = js_string(&selectors.join("\u{1f}"))?;
	let script = format!(
		r#"for (const sel of {selectors}.split('\u001f')) {{
		try {{
			const editor = doc.querySelector(sel);
			if (editor) {{
				editor.scrollIntoView();
				editor.click();
				editor.focus();
				return true;
			}}
		}} catch (e) {{}}
	}}
	return false;"#
	);
	match frame.eval(&script).await? {
		serde_json::Value::Bool(true) => Ok(()),
		_ => bail!("No code editor found on the page"),
	}
}

const CTRL: i64 = 2;

/// Select-all then delete, through real key events so editor widgets see it.
async fn clear_editor(page: &Page) -> Result<()> {
	press_key(page, "a", CTRL).await?;
	tokio::time::sleep(Duration::from_millis(500)).await;
	press_key(page, "Delete", 0).await?;
	tokio::time::sleep(Duration::from_millis(500)).await;
	Ok(())
}

/// Type text one key event at a time. Pasting is both detectable and ignored
/// by most editor widgets; synthesized keystrokes are neither.
async fn type_text(page: &Page, text: &str, delay: Duration) -> Result<()> {
	for ch in text.chars() {
		match ch {
			'\n' => press_key(page, "Enter", 0).await?,
			'\t' => press_key(page, "Tab", 0).await?,
			_ => {
				let event = DispatchKeyEventParams::builder()
					.r#type(DispatchKeyEventType::Char)
					.text(ch.to_string())
					.build()
					.map_err(|e| eyre!("Failed to build key event: {e}"))?;
				page.execute(event).await?;
			}
		}
		tokio::time::sleep(delay).await;
	}
	Ok(())
}

async fn press_key(page: &Page, key: &str, modifiers: i64) -> Result<()> {
	for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
		let event = DispatchKeyEventParams::builder()
			.r#type(kind)
			.key(key)
			.modifiers(modifiers)
			.build()
			.map_err(|e| eyre!("Failed to build key event: {e}"))?;
		page.execute(event).await?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn in_range_indices_are_kept_in_order() {
		assert_eq!(plan_checks(&[2, 4], 4), CheckPlan::Check(vec![2, 4]));
	}

	#[test]
	fn out_of_range_indices_are_dropped() {
		assert_eq!(plan_checks(&[2, 7], 4), CheckPlan::Check(vec![2]));
		assert_eq!(plan_checks(&[0, 1], 4), CheckPlan::Check(vec![1]));
	}

	#[test]
	fn all_indices_out_of_range_still_submits() {
		assert_eq!(plan_checks(&[9, 12], 4), CheckPlan::SubmitUnchanged);
		assert_eq!(plan_checks(&[7], 4), CheckPlan::SubmitUnchanged);
	}
}
