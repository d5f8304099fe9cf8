//! The course configuration document and out-of-band credentials.

use std::path::Path;

use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;
use v_utils::log;

/// Role + accessible-name pair identifying one control on the platform.
#[derive(Clone, Debug, Deserialize)]
pub struct Locator {
	pub role: String,
	pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginLocators {
	pub email: Locator,
	pub password: Locator,
	pub button: Locator,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CourseNavigation {
	pub view_courses: Locator,
	/// CSS selector of the iframe hosting the course listing
	pub frame: String,
	/// Fallback text when the exact course name is not found in the listing
	pub partial_match: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Subtopic {
	pub name: String,
	/// Label of the link/button opening this subtopic's quiz
	pub quiz: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Unit {
	pub name: String,
	pub subtopics: Vec<Subtopic>,
}

/// Every fixed delay the automation relies on, named and overridable.
/// Each value encodes an assumption about the platform's latency.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Timings {
	/// Settle after page-level navigation (login, course entry)
	pub page_settle_secs: u64,
	/// Ceiling on a single click through the control finder
	pub click_timeout_secs: u64,
	/// Backoff between the finder's submit/next attempts
	pub finder_backoff_secs: u64,
	/// Backoff between unit/subtopic/quiz entry click attempts
	pub nav_retry_backoff_secs: u64,
	/// Settle after entering a unit or subtopic
	pub entry_settle_secs: u64,
	/// Poll before inspecting the frame for the next question
	pub question_poll_ms: u64,
	/// Settle at the end of each question iteration
	pub loop_settle_secs: u64,
	/// Wait for asynchronously-mounting code editors
	pub editor_settle_secs: u64,
	/// Delay between keystrokes when typing code
	pub keystroke_delay_ms: u64,
	/// Wait between typing code and submitting it
	pub pre_submit_settle_secs: u64,
	/// Wait for code submission feedback before advancing
	pub feedback_wait_secs: u64,
	/// Backoff between code submit/advance attempts
	pub code_retry_backoff_secs: u64,
	/// Settle after a subtopic's quiz completes
	pub subtopic_settle_secs: u64,
	/// Wait for the platform's auto-redirect to the next subtopic
	pub next_subtopic_wait_secs: u64,
	/// Longer wait when a unit finishes and the platform redirects onward
	pub unit_complete_wait_secs: u64,
	/// How long the session stays open after the run, for inspection
	pub post_run_idle_secs: u64,
}

impl Default for Timings {
	fn default() -> Self {
		Self {
			page_settle_secs: 2,
			click_timeout_secs: 60,
			finder_backoff_secs: 1,
			nav_retry_backoff_secs: 5,
			entry_settle_secs: 10,
			question_poll_ms: 500,
			loop_settle_secs: 2,
			editor_settle_secs: 15,
			keystroke_delay_ms: 100,
			pre_submit_settle_secs: 5,
			feedback_wait_secs: 30,
			code_retry_backoff_secs: 3,
			subtopic_settle_secs: 5,
			next_subtopic_wait_secs: 10,
			unit_complete_wait_secs: 15,
			post_run_idle_secs: 3600,
		}
	}
}

/// Bounded attempt counts for every retry loop.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Retries {
	/// Outer attempts when searching for submit/next controls
	pub finder_attempts: u32,
	/// Attempts per unit/subtopic/quiz entry click
	pub entry_click_attempts: u32,
	/// Attempts to submit or advance past a code question
	pub code_submit_attempts: u32,
	/// Attempts to find the course tile in the listing frame
	pub course_entry_attempts: u32,
	/// Question ceiling per quiz, guarantees loop termination
	pub max_questions: u32,
}

impl Default for Retries {
	fn default() -> Self {
		Self {
			finder_attempts: 3,
			entry_click_attempts: 5,
			code_submit_attempts: 5,
			course_entry_attempts: 3,
			max_questions: 20,
		}
	}
}

pub const DEFAULT_QUIZ_PROMPT: &str = r#"Analyze this quiz page content. Find the question and options.
Then tell me ONLY the numbers of the correct options (e.g., "1, 3") for multiple-choice, or the exact answer text for text-based questions.
No explanation needed, no prefix, no suffix.
Page content:
{content}"#;

pub const DEFAULT_CODE_PROMPT: &str = r#"You are a coding expert. Provide ONLY the code solution for the following problem, with no explanation or comments.
Problem:
{content}
Code:"#;

fn default_submit_buttons() -> Vec<String> {
	["Submit", "Check Answer", "Run", "Execute", "Verify"].map(String::from).to_vec()
}

fn default_next_buttons() -> Vec<String> {
	["Next", "Continue"].map(String::from).to_vec()
}

fn default_code_editor_selectors() -> Vec<String> {
	["textarea", ".CodeMirror", ".ace_editor", "[contenteditable='true']"].map(String::from).to_vec()
}

/// The structured document driving a whole run. Loaded once, never modified.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	/// Display name of the platform, for logging only
	pub platform: String,
	pub url: String,
	pub login: LoginLocators,
	pub course_name: String,
	pub course_navigation: CourseNavigation,
	/// CSS selector of the iframe hosting the course content
	pub course_frame: String,
	pub contents_navigation: Locator,
	#[serde(default)]
	pub back_to_contents: Option<Locator>,
	/// Submit-like control names, ordered, first match wins
	#[serde(default = "default_submit_buttons")]
	pub submit_buttons: Vec<String>,
	/// Next-like control names, ordered, first match wins
	#[serde(default = "default_next_buttons")]
	pub next_buttons: Vec<String>,
	/// DOM signatures that mark a page as hosting a code editor
	#[serde(default = "default_code_editor_selectors")]
	pub code_editor_selectors: Vec<String>,
	/// Custom quiz prompt template; `{content}` is replaced with page text
	#[serde(default)]
	pub quiz_prompt: Option<String>,
	/// Custom code prompt template; `{content}` is replaced with page text
	#[serde(default)]
	pub code_prompt: Option<String>,
	/// The unit/subtopic/quiz tree walked by the navigator
	pub units: Vec<Unit>,
	#[serde(default)]
	pub timings: Timings,
	#[serde(default)]
	pub retries: Retries,
}

impl AppConfig {
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("Failed to read config file {}: {e}", path.display()))?;
		let config: Self = serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse config file {}: {e}", path.display()))?;
		log!("Loaded configuration from {}", path.display());
		Ok(config)
	}

	pub fn quiz_prompt(&self) -> &str {
		self.quiz_prompt.as_deref().unwrap_or(DEFAULT_QUIZ_PROMPT)
	}

	pub fn code_prompt(&self) -> &str {
		self.code_prompt.as_deref().unwrap_or(DEFAULT_CODE_PROMPT)
	}
}

/// Secrets supplied out-of-band. The oracle token is consumed by the LLM
/// client from the environment; it is only checked for presence here.
#[derive(Clone, Debug)]
pub struct Credentials {
	pub email: String,
	pub password: String,
}

impl Credentials {
	/// Missing values abort the run before any browser interaction.
	pub fn from_env() -> Result<Self> {
		let email = std::env::var("PLATFORM_EMAIL").unwrap_or_default();
		let password = std::env::var("PLATFORM_PASSWORD").unwrap_or_default();
		let oracle_token = std::env::var("CLAUDE_TOKEN").unwrap_or_default();

		let mut missing = Vec::new();
		if email.is_empty() {
			missing.push("PLATFORM_EMAIL");
		}
		if password.is_empty() {
			missing.push("PLATFORM_PASSWORD");
		}
		if oracle_token.is_empty() {
			missing.push("CLAUDE_TOKEN");
		}
		if !missing.is_empty() {
			return Err(eyre!("Missing required environment variables: {}", missing.join(", ")));
		}

		Ok(Self { email, password })
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;

	pub(crate) const MINIMAL_CONFIG: &str = r#"{
		"platform": "Acme Academy",
		"url": "https://learn.example.com",
		"login": {
			"email": {"role": "textbox", "name": "Email"},
			"password": {"role": "textbox", "name": "Password"},
			"button": {"role": "button", "name": "Sign in"}
		},
		"course_name": "Intro to SQL",
		"course_navigation": {
			"view_courses": {"role": "link", "name": "My Courses"},
			"frame": "iframe#course-list",
			"partial_match": "SQL"
		},
		"course_frame": "iframe#course-content",
		"contents_navigation": {"role": "link", "name": "Contents"},
		"units": [
			{"name": "Unit 1", "subtopics": [{"name": "Basics", "quiz": "Quiz 1"}]}
		]
	}"#;

	#[test]
	fn minimal_document_parses_with_defaults() {
		let config: AppConfig = serde_json::from_str(MINIMAL_CONFIG).unwrap();
		assert_eq!(config.submit_buttons, default_submit_buttons());
		assert_eq!(config.next_buttons, vec!["Next".to_string(), "Continue".to_string()]);
		assert_eq!(config.retries.max_questions, 20);
		assert_eq!(config.timings.editor_settle_secs, 15);
		assert_eq!(config.units.len(), 1);
		assert!(config.back_to_contents.is_none());
	}

	#[test]
	fn overrides_win_over_defaults() {
		let mut value: serde_json::Value = serde_json::from_str(MINIMAL_CONFIG).unwrap();
		value["timings"] = serde_json::json!({"feedback_wait_secs": 5});
		value["retries"] = serde_json::json!({"max_questions": 3});
		value["submit_buttons"] = serde_json::json!(["Valider"]);
		let config: AppConfig = serde_json::from_value(value).unwrap();
		assert_eq!(config.timings.feedback_wait_secs, 5);
		// untouched siblings keep their defaults
		assert_eq!(config.timings.editor_settle_secs, 15);
		assert_eq!(config.retries.max_questions, 3);
		assert_eq!(config.submit_buttons, vec!["Valider".to_string()]);
	}

	#[test]
	fn prompt_templates_fall_back_to_defaults() {
		let config: AppConfig = serde_json::from_str(MINIMAL_CONFIG).unwrap();
		assert!(config.quiz_prompt().contains("{content}"));
		assert!(config.code_prompt().contains("{content}"));
	}
}
