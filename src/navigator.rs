//! Walking the configured unit/subtopic tree and entering the course.
//!
//! Navigation is best-effort throughout: a subtopic that cannot be opened is
//! skipped and counted, never allowed to end the run.

use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::{elog, log};

use crate::{
	config::AppConfig,
	finder::{self, Matcher, Role},
	frame::{CourseFrame, FrameResolver, PageDom},
	oracle::AnswerOracle,
	quiz::{LiveQuiz, QuizOutcome, run_quiz},
};

/// Aggregate tally for a whole traversal.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
	pub subtopics_completed: u32,
	pub subtopics_skipped: u32,
	pub questions_solved: u32,
}

/// What the traversal needs from the page. Clicks resolve the frame
/// internally, so a single attempt reports detachment as a plain miss.
#[allow(async_fn_in_trait)]
pub trait CourseSurface {
	async fn click_entry(&self, label: &str) -> Result<bool>;
	async fn run_quiz(&self) -> QuizOutcome;
	async fn settle(&self, duration: Duration);
}

async fn click_with_retry(surface: &impl CourseSurface, label: &str, attempts: u32, backoff: Duration) -> bool {
	for attempt in 1..=attempts {
		match surface.click_entry(label).await {
			Ok(true) => return true,
			Ok(false) => tracing::warn!("Attempt {attempt}/{attempts}: \"{label}\" not found"),
			Err(e) => tracing::warn!("Attempt {attempt}/{attempts} to open \"{label}\" failed: {e}"),
		}
		surface.settle(backoff).await;
	}
	false
}

/// Walk every unit and subtopic in configured order, running each quiz.
///
/// Only the first unit is entered by clicking; the platform redirects to
/// later units on its own once a unit's quizzes are done. Likewise only a
/// unit's first subtopic is opened explicitly.
pub async fn traverse_course(surface: &impl CourseSurface, config: &AppConfig) -> RunSummary {
	let timings = &config.timings;
	let backoff = Duration::from_secs(timings.nav_retry_backoff_secs);
	let attempts = config.retries.entry_click_attempts;
	let mut summary = RunSummary::default();

	for (unit_idx, unit) in config.units.iter().enumerate() {
		if unit_idx == 0 {
			if !click_with_retry(surface, &unit.name, attempts, backoff).await {
				elog!("Could not open unit \"{}\", skipping it", unit.name);
				summary.subtopics_skipped += unit.subtopics.len() as u32;
				continue;
			}
		} else {
			log!("Assuming auto-navigation to unit \"{}\"", unit.name);
		}
		surface.settle(Duration::from_secs(timings.entry_settle_secs)).await;

		let last_subtopic = unit.subtopics.len().saturating_sub(1);
		for (sub_idx, subtopic) in unit.subtopics.iter().enumerate() {
			if sub_idx == 0 {
				if !click_with_retry(surface, &subtopic.name, attempts, backoff).await {
					elog!("Could not open subtopic \"{}\", skipping it", subtopic.name);
					summary.subtopics_skipped += 1;
					continue;
				}
				surface.settle(Duration::from_secs(timings.entry_settle_secs)).await;
			}

			if !click_with_retry(surface, &subtopic.quiz, attempts, backoff).await {
				elog!("Could not open quiz \"{}\", skipping subtopic \"{}\"", subtopic.quiz, subtopic.name);
				summary.subtopics_skipped += 1;
				continue;
			}
			surface.settle(Duration::from_secs(timings.entry_settle_secs)).await;

			let outcome = surface.run_quiz().await;
			summary.questions_solved += outcome.solved();
			match outcome {
				QuizOutcome::Completed { solved } => {
					log!("Subtopic \"{}\" complete, {solved} questions solved", subtopic.name);
					summary.subtopics_completed += 1;
				}
				QuizOutcome::Stalled { .. } | QuizOutcome::Failed { .. } => {
					elog!("Subtopic \"{}\" did not finish cleanly: {outcome:?}", subtopic.name);
					summary.subtopics_skipped += 1;
				}
			}

			surface.settle(Duration::from_secs(timings.subtopic_settle_secs)).await;
			if sub_idx < last_subtopic {
				surface.settle(Duration::from_secs(timings.next_subtopic_wait_secs)).await;
			} else {
				log!("Unit \"{}\" finished, waiting for the platform to move on", unit.name);
				surface.settle(Duration::from_secs(timings.unit_complete_wait_secs)).await;
			}
		}
	}
	summary
}

/// The real course surface: clicks run against the course iframe, quizzes
/// run through [`LiveQuiz`].
pub struct LiveCourse<'a, O> {
	page: &'a Page,
	config: &'a AppConfig,
	oracle: &'a O,
}

impl<'a, O: AnswerOracle> LiveCourse<'a, O> {
	pub fn new(page: &'a Page, config: &'a AppConfig, oracle: &'a O) -> Self {
		Self { page, config, oracle }
	}
}

impl<O: AnswerOracle> CourseSurface for LiveCourse<'_, O> {
	async fn click_entry(&self, label: &str) -> Result<bool> {
		let Some(frame) = FrameResolver::new(self.page, &self.config.course_frame).resolve().await else {
			return Ok(false);
		};
		let timeout = Duration::from_secs(self.config.timings.click_timeout_secs);
		let clicked = finder::click_first(&frame, &finder::label_matchers(label), timeout).await?;
		if let Some(name) = &clicked {
			log!("Opened \"{name}\"");
		}
		Ok(clicked.is_some())
	}

	async fn run_quiz(&self) -> QuizOutcome {
		let quiz = LiveQuiz::new(self.page, self.config, self.oracle);
		run_quiz(
			&quiz,
			self.config.retries.max_questions,
			Duration::from_millis(self.config.timings.question_poll_ms),
			Duration::from_secs(self.config.timings.loop_settle_secs),
		)
		.await
	}

	async fn settle(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}

/// From the landing page into the configured course: open the listing, find
/// the course tile in its frame, click through.
pub async fn open_course(page: &Page, config: &AppConfig) -> Result<()> {
	let nav = &config.course_navigation;
	let timeout = Duration::from_secs(config.timings.click_timeout_secs);
	let page_dom = PageDom::new(page);
	let course_matchers = vec![
		Matcher::exact(Role::Button, &config.course_name),
		Matcher::exact(Role::Link, &config.course_name),
		Matcher::partial(Role::Button, &nav.partial_match),
		Matcher::partial(Role::Link, &nav.partial_match),
		Matcher::scan(&[config.course_name.clone(), nav.partial_match.clone()]),
	];

	for attempt in 1..=config.retries.course_entry_attempts {
		tokio::time::sleep(Duration::from_secs(config.timings.nav_retry_backoff_secs)).await;
		if finder::click_first(&page_dom, &finder::locator_matchers(&nav.view_courses), timeout).await?.is_none() {
			tracing::warn!("Attempt {attempt}: course listing control not found");
			continue;
		}
		tokio::time::sleep(Duration::from_secs(config.timings.page_settle_secs)).await;

		let listing = CourseFrame::new(page, &nav.frame);
		match finder::click_first(&listing, &course_matchers, timeout).await {
			Ok(Some(name)) => {
				log!("Entered course \"{name}\"");
				tokio::time::sleep(Duration::from_secs(config.timings.entry_settle_secs)).await;
				return Ok(());
			}
			Ok(None) => tracing::warn!("Attempt {attempt}: course \"{}\" not in the listing", config.course_name),
			Err(e) => tracing::warn!("Attempt {attempt}: course listing frame unreadable: {e}"),
		}
	}
	Err(eyre!("Could not enter course \"{}\" after {} attempts", config.course_name, config.retries.course_entry_attempts))
}

/// Open the course's contents view inside the course frame.
pub async fn open_contents(page: &Page, config: &AppConfig) -> Result<()> {
	let frame = FrameResolver::new(page, &config.course_frame)
		.resolve()
		.await
		.ok_or_else(|| eyre!("Course frame \"{}\" is not attached", config.course_frame))?;
	let timeout = Duration::from_secs(config.timings.click_timeout_secs);
	let clicked = finder::click_first(&frame, &finder::locator_matchers(&config.contents_navigation), timeout).await?;
	match clicked {
		Some(name) => {
			log!("Opened contents via \"{name}\"");
			tokio::time::sleep(Duration::from_secs(config.timings.page_settle_secs)).await;
			Ok(())
		}
		None => Err(eyre!("Contents control \"{}\" not found", config.contents_navigation.name)),
	}
}

#[cfg(test)]
mod tests {
	use std::{cell::RefCell, collections::VecDeque};

	use super::*;

	/// Course surface that records clicks and replays scripted outcomes.
	struct ScriptedCourse {
		clicks: RefCell<Vec<String>>,
		failing_labels: Vec<String>,
		outcomes: RefCell<VecDeque<QuizOutcome>>,
	}

	impl ScriptedCourse {
		fn new(failing_labels: &[&str], outcomes: &[QuizOutcome]) -> Self {
			Self {
				clicks: RefCell::new(Vec::new()),
				failing_labels: failing_labels.iter().map(|s| s.to_string()).collect(),
				outcomes: RefCell::new(outcomes.iter().copied().collect()),
			}
		}
	}

	impl CourseSurface for ScriptedCourse {
		async fn click_entry(&self, label: &str) -> Result<bool> {
			self.clicks.borrow_mut().push(label.to_string());
			Ok(!self.failing_labels.iter().any(|l| l == label))
		}

		async fn run_quiz(&self) -> QuizOutcome {
			self.outcomes.borrow_mut().pop_front().unwrap_or(QuizOutcome::Completed { solved: 0 })
		}

		async fn settle(&self, _duration: Duration) {}
	}

	fn two_by_two_config() -> AppConfig {
		let mut value: serde_json::Value = serde_json::from_str(crate::config::tests::MINIMAL_CONFIG).unwrap();
		value["units"] = serde_json::json!([
			{"name": "Unit 1", "subtopics": [
				{"name": "Sub 1.1", "quiz": "Quiz 1.1"},
				{"name": "Sub 1.2", "quiz": "Quiz 1.2"}
			]},
			{"name": "Unit 2", "subtopics": [
				{"name": "Sub 2.1", "quiz": "Quiz 2.1"},
				{"name": "Sub 2.2", "quiz": "Quiz 2.2"}
			]}
		]);
		serde_json::from_value(value).unwrap()
	}

	fn run(surface: &ScriptedCourse, config: &AppConfig) -> RunSummary {
		tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(traverse_course(surface, config))
	}

	#[test]
	fn clicks_follow_the_configured_tree_order() {
		let config = two_by_two_config();
		let surface = ScriptedCourse::new(&[], &[QuizOutcome::Completed { solved: 2 }; 4]);
		let summary = run(&surface, &config);

		// Unit 2 and the units' second subtopics are reached by
		// auto-navigation, so they are never clicked.
		let clicks = surface.clicks.borrow();
		assert_eq!(*clicks, vec!["Unit 1", "Sub 1.1", "Quiz 1.1", "Quiz 1.2", "Sub 2.1", "Quiz 2.1", "Quiz 2.2"]);
		assert_eq!(summary, RunSummary { subtopics_completed: 4, subtopics_skipped: 0, questions_solved: 8 });
	}

	#[test]
	fn unopenable_quiz_is_retried_then_skipped() {
		let config = two_by_two_config();
		let surface = ScriptedCourse::new(&["Quiz 1.2"], &[QuizOutcome::Completed { solved: 1 }; 3]);
		let summary = run(&surface, &config);

		let clicks = surface.clicks.borrow();
		let quiz12_attempts = clicks.iter().filter(|c| *c == "Quiz 1.2").count();
		assert_eq!(quiz12_attempts, config.retries.entry_click_attempts as usize);
		assert_eq!(summary, RunSummary { subtopics_completed: 3, subtopics_skipped: 1, questions_solved: 3 });
	}

	#[test]
	fn stalled_and_failed_quizzes_count_as_skipped_but_keep_their_answers() {
		let config = two_by_two_config();
		let outcomes = [
			QuizOutcome::Completed { solved: 2 },
			QuizOutcome::Stalled { solved: 1 },
			QuizOutcome::Failed { solved: 0 },
			QuizOutcome::Completed { solved: 3 },
		];
		let surface = ScriptedCourse::new(&[], &outcomes);
		assert_eq!(run(&surface, &config), RunSummary { subtopics_completed: 2, subtopics_skipped: 2, questions_solved: 6 });
	}

	#[test]
	fn unopenable_first_unit_skips_its_subtopics() {
		let config = two_by_two_config();
		let surface = ScriptedCourse::new(&["Unit 1"], &[QuizOutcome::Completed { solved: 1 }; 2]);
		let summary = run(&surface, &config);
		// Unit 2 still runs off auto-navigation.
		assert_eq!(summary, RunSummary { subtopics_completed: 2, subtopics_skipped: 2, questions_solved: 2 });
	}
}
