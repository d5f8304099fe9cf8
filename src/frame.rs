//! Evaluation targets: the top-level page and the course iframe.
//!
//! All DOM work goes through evaluated JS rather than element handles. The
//! iframe is re-resolved inside every script, so a frame swap between calls
//! can never leave us holding a stale reference; at worst a script observes
//! the frame as detached and reports it.

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use derive_new::new;
use serde_json::Value;

/// Quote a Rust string as a JS string literal.
pub fn js_string(s: &str) -> Result<String> {
	serde_json::to_string(s).map_err(|e| eyre!("Failed to encode JS string: {e}"))
}

/// Anything a DOM script can run against. `body` receives a `doc` binding; a
/// `return` from it becomes the evaluation's value.
#[allow(async_fn_in_trait)]
pub trait DomTarget {
	async fn eval(&self, body: &str) -> Result<Value>;
}

/// The top-level document of the page.
#[derive(Clone, Copy, new)]
pub struct PageDom<'a> {
	page: &'a Page,
}

impl DomTarget for PageDom<'_> {
	async fn eval(&self, body: &str) -> Result<Value> {
		let script = format!("(function(doc) {{ {body} }})(document)");
		let result = self.page.evaluate(script).await?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}
}

/// The document inside a same-origin iframe, re-queried on every call.
#[derive(Clone, Copy, new)]
pub struct CourseFrame<'a> {
	page: &'a Page,
	selector: &'a str,
}

impl CourseFrame<'_> {
	pub async fn visible_text(&self) -> Result<String> {
		let value = self.eval("return doc.body.innerText;").await?;
		match value {
			Value::String(text) => Ok(text),
			other => Err(eyre!("Frame text evaluation returned {other:?}")),
		}
	}
}

impl DomTarget for CourseFrame<'_> {
	async fn eval(&self, body: &str) -> Result<Value> {
		let selector = js_string(self.selector)?;
		let script = format!(
			r#"(function() {{
	const host = document.querySelector({selector});
	if (!host || !host.contentDocument) return null;
	return (function(doc) {{ {body} }})(host.contentDocument);
}})()"#
		);
		let result = self.page.evaluate(script).await?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}
}

/// Gate for frame-dependent work: `resolve` yields the frame only while it is
/// actually attached and reachable.
#[derive(Clone, Copy, new)]
pub struct FrameResolver<'a> {
	page: &'a Page,
	selector: &'a str,
}

impl<'a> FrameResolver<'a> {
	pub async fn resolve(&self) -> Option<CourseFrame<'a>> {
		let frame = CourseFrame::new(self.page, self.selector);
		match frame.eval("return true;").await {
			Ok(Value::Bool(true)) => Some(frame),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn js_string_escapes_quotes_and_newlines() {
		assert_eq!(js_string(r#"iframe[name="lesson"]"#).unwrap(), r#""iframe[name=\"lesson\"]""#);
		assert_eq!(js_string("a\nb").unwrap(), r#""a\nb""#);
	}
}
