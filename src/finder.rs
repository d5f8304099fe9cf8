//! Locating and clicking controls by accessible name.
//!
//! Every strategy is a [`Matcher`] compiled to a self-contained script, so
//! new fallbacks are added by appending to a matcher list instead of
//! hand-writing another traversal. Matchers are ordered strictest-first;
//! the first hit wins.

use std::{fmt, time::Duration};

use color_eyre::{Result, eyre::eyre};
use v_utils::log;

use crate::{
	config::{AppConfig, Locator},
	frame::{DomTarget, js_string},
};

/// Accessible-name approximation shared by all matchers: explicit label
/// attributes first, visible text last.
const ACC_NAME_JS: &str = r#"
	const accName = (el) => {
		if (el.getAttribute('aria-label')) return el.getAttribute('aria-label');
		if (el.labels && el.labels.length) return Array.from(el.labels).map(l => l.innerText).join(' ');
		if (el.innerText) return el.innerText;
		return el.value || '';
	};
"#;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
	Button,
	Link,
}

impl Role {
	fn selector(self) -> &'static str {
		match self {
			Self::Button => r#"button, [role="button"], input[type="submit"], input[type="button"]"#,
			Self::Link => r#"a, [role="link"]"#,
		}
	}

	pub fn parse(s: &str) -> Self {
		match s {
			"link" => Self::Link,
			_ => Self::Button,
		}
	}
}

/// One strategy for finding a control. Compiled to JS on demand.
#[derive(Clone, Debug, PartialEq)]
pub enum Matcher {
	/// Accessible name equals the given string, after trimming.
	ExactRoleName { role: Role, name: String },
	/// Accessible name contains the given string.
	PartialText { role: Role, text: String },
	/// Last resort: scan every button-like element's text for any needle,
	/// case-insensitive, tolerating elements that throw on inspection.
	FreeTextScan { needles: Vec<String> },
}

impl Matcher {
	pub fn exact(role: Role, name: &str) -> Self {
		Self::ExactRoleName { role, name: name.to_string() }
	}

	pub fn partial(role: Role, text: &str) -> Self {
		Self::PartialText { role, text: text.to_string() }
	}

	pub fn scan(needles: &[String]) -> Self {
		Self::FreeTextScan {
			needles: needles.iter().map(|n| n.to_lowercase()).collect(),
		}
	}

	/// Script body for a [`DomTarget`]: returns the matched element's name,
	/// or null. When `click` is set the match is also clicked.
	pub fn js(&self, click: bool) -> Result<String> {
		let act = if click { "el.click();" } else { "" };
		match self {
			Self::ExactRoleName { role, name } => {
				let name = js_string(name)?;
				Ok(format!(
					r#"{ACC_NAME_JS}
	for (const el of doc.querySelectorAll('{sel}')) {{
		const n = accName(el).trim();
		if (n === {name}) {{ {act} return n; }}
	}}
	return null;"#,
					sel = role.selector(),
				))
			}
			Self::PartialText { role, text } => {
				let text = js_string(text)?;
				Ok(format!(
					r#"{ACC_NAME_JS}
	for (const el of doc.querySelectorAll('{sel}')) {{
		const n = accName(el).trim();
		if (n.includes({text})) {{ {act} return n; }}
	}}
	return null;"#,
					sel = role.selector(),
				))
			}
			Self::FreeTextScan { needles } => {
				let needles = js_string(&needles.join("\u{1f}"))?;
				Ok(format!(
					r#"const needles = {needles}.split('\u001f');
	for (const sel of ['button', 'div[role="button"]']) {{
		for (const el of doc.querySelectorAll(sel)) {{
			try {{
				const t = (el.innerText || '').toLowerCase();
				if (needles.some(n => t.includes(n))) {{ {act} return el.innerText; }}
			}} catch (e) {{}}
		}}
	}}
	return null;"#
				))
			}
		}
	}
}

/// Strategies for opening a navigation entry by its configured label.
pub fn label_matchers(label: &str) -> Vec<Matcher> {
	vec![
		Matcher::exact(Role::Button, label),
		Matcher::partial(Role::Button, label),
		Matcher::partial(Role::Link, label),
		Matcher::scan(&[label.to_string()]),
	]
}

/// Strategies for a control configured as a role + name pair.
pub fn locator_matchers(locator: &Locator) -> Vec<Matcher> {
	let role = Role::parse(&locator.role);
	vec![Matcher::exact(role, &locator.name), Matcher::partial(role, &locator.name), Matcher::scan(std::slice::from_ref(&locator.name))]
}

/// Strategies for a configured action-name list (submit/next variants).
/// All exact matches are tried before any substring match.
pub fn action_matchers(names: &[String]) -> Vec<Matcher> {
	let mut matchers: Vec<Matcher> = names.iter().map(|n| Matcher::exact(Role::Button, n)).collect();
	matchers.extend(names.iter().map(|n| Matcher::partial(Role::Button, n)));
	matchers.push(Matcher::scan(names));
	matchers
}

/// Run matchers in order, clicking the first hit. Each evaluation is capped
/// so a wedged frame cannot hang the run.
pub async fn click_first(target: &impl DomTarget, matchers: &[Matcher], timeout: Duration) -> Result<Option<String>> {
	for matcher in matchers {
		let script = matcher.js(true)?;
		let value = tokio::time::timeout(timeout, target.eval(&script))
			.await
			.map_err(|_| eyre!("Click evaluation timed out after {timeout:?}"))??;
		if let serde_json::Value::String(name) = value {
			return Ok(Some(name));
		}
	}
	Ok(None)
}

/// Probe-only variant of [`click_first`]: reports presence without touching
/// page state.
pub async fn control_present(target: &impl DomTarget, matchers: &[Matcher]) -> Result<bool> {
	for matcher in matchers {
		let script = matcher.js(false)?;
		if let serde_json::Value::String(_) = target.eval(&script).await? {
			return Ok(true);
		}
	}
	Ok(false)
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClickMode {
	Submit,
	Next,
}

impl fmt::Display for ClickMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Submit => write!(f, "submit"),
			Self::Next => write!(f, "next"),
		}
	}
}

/// Click a submit- or next-like control, retrying the full matcher ladder a
/// bounded number of times. `false` means the control never appeared.
pub async fn click_submit_or_next(target: &impl DomTarget, config: &AppConfig, mode: ClickMode) -> Result<bool> {
	let names = match mode {
		ClickMode::Submit => &config.submit_buttons,
		ClickMode::Next => &config.next_buttons,
	};
	let matchers = action_matchers(names);
	let timeout = Duration::from_secs(config.timings.click_timeout_secs);
	for attempt in 1..=config.retries.finder_attempts {
		match click_first(target, &matchers, timeout).await {
			Ok(Some(name)) => {
				log!("Clicked {mode} control: \"{name}\"");
				return Ok(true);
			}
			Ok(None) => {}
			Err(e) => tracing::warn!("Attempt {attempt} to click {mode} control failed: {e}"),
		}
		tokio::time::sleep(Duration::from_secs(config.timings.finder_backoff_secs)).await;
	}
	Ok(false)
}

/// Whether any configured submit-like control is currently on the page.
/// Absence is the quiz runner's completion signal.
pub async fn has_submit_control(target: &impl DomTarget, config: &AppConfig) -> Result<bool> {
	control_present(target, &action_matchers(&config.submit_buttons)).await
}

/// Fill the form field a [`Locator`] points at, matching its accessible name
/// or placeholder, then fire the events frameworks listen for.
pub async fn fill_by_locator(target: &impl DomTarget, locator: &Locator, value: &str) -> Result<()> {
	let name = js_string(&locator.name)?;
	let value = js_string(value)?;
	let script = format!(
		r#"{ACC_NAME_JS}
	for (const el of doc.querySelectorAll('input, textarea')) {{
		const n = accName(el).trim();
		const placeholder = el.getAttribute('placeholder') || '';
		if (n.includes({name}) || placeholder.includes({name})) {{
			el.value = {value};
			el.dispatchEvent(new Event('input', {{ bubbles: true }}));
			el.dispatchEvent(new Event('change', {{ bubbles: true }}));
			return true;
		}}
	}}
	return false;"#
	);
	match target.eval(&script).await? {
		serde_json::Value::Bool(true) => Ok(()),
		_ => Err(eyre!("No field matching {:?} \"{}\"", locator.role, locator.name)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn label_matchers_run_exact_before_partial_before_scan() {
		let matchers = label_matchers("Quiz 1");
		assert_eq!(matchers[0], Matcher::exact(Role::Button, "Quiz 1"));
		assert_eq!(matchers[1], Matcher::partial(Role::Button, "Quiz 1"));
		assert_eq!(matchers[2], Matcher::partial(Role::Link, "Quiz 1"));
		assert_eq!(matchers[3], Matcher::FreeTextScan { needles: vec!["quiz 1".to_string()] });
	}

	#[test]
	fn action_matchers_exhaust_exact_names_first() {
		let names = vec!["Submit".to_string(), "Run".to_string()];
		let matchers = action_matchers(&names);
		assert_eq!(matchers.len(), 5);
		assert_eq!(matchers[0], Matcher::exact(Role::Button, "Submit"));
		assert_eq!(matchers[1], Matcher::exact(Role::Button, "Run"));
		assert_eq!(matchers[2], Matcher::partial(Role::Button, "Submit"));
		assert_eq!(matchers[3], Matcher::partial(Role::Button, "Run"));
		assert_eq!(matchers[4], Matcher::FreeTextScan { needles: vec!["submit".to_string(), "run".to_string()] });
	}

	#[test]
	fn probe_script_never_clicks() {
		let matcher = Matcher::exact(Role::Button, "Submit");
		assert!(!matcher.js(false).unwrap().contains("el.click()"));
		assert!(matcher.js(true).unwrap().contains("el.click()"));
	}

	#[test]
	fn scan_lowercases_needles() {
		let matcher = Matcher::scan(&["Check Answer".to_string()]);
		assert_eq!(matcher, Matcher::FreeTextScan { needles: vec!["check answer".to_string()] });
	}

	#[test]
	fn role_parse_defaults_to_button() {
		assert_eq!(Role::parse("link"), Role::Link);
		assert_eq!(Role::parse("button"), Role::Button);
		assert_eq!(Role::parse("tab"), Role::Button);
	}
}
