//! The bounded question loop for a single quiz.
//!
//! The loop is written against [`QuizSurface`] so its transition logic is
//! testable without a browser; [`LiveQuiz`] is the production surface.

use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::Result;
use v_utils::{elog, log};

use crate::{
	QuestionKind,
	classify,
	config::AppConfig,
	finder::{self, ClickMode},
	frame::{CourseFrame, FrameResolver},
	oracle::AnswerOracle,
	solver,
};

/// How a quiz run ended. `solved` counts questions that were answered,
/// including one whose submission then stalled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuizOutcome {
	/// No more questions, or the quiz advanced past its last one.
	Completed { solved: u32 },
	/// A question was answered but its submit control stopped responding.
	Stalled { solved: u32 },
	/// The frame detached or a question could not be answered at all.
	Failed { solved: u32 },
}

impl QuizOutcome {
	pub fn solved(&self) -> u32 {
		match self {
			Self::Completed { solved } | Self::Stalled { solved } | Self::Failed { solved } => *solved,
		}
	}
}

/// Everything the question loop needs from the page.
#[allow(async_fn_in_trait)]
pub trait QuizSurface {
	async fn frame_attached(&self) -> bool;
	async fn submit_control_present(&self) -> Result<bool>;
	async fn visible_text(&self) -> Result<String>;
	async fn classify(&self) -> Result<QuestionKind>;
	/// Answer the current question. `false` means the answer could not be
	/// applied; the loop gives up on the quiz.
	async fn solve(&self, kind: QuestionKind, page_text: &str) -> Result<bool>;
	async fn submit(&self) -> Result<bool>;
	async fn advance(&self) -> Result<bool>;
	async fn settle(&self, duration: Duration);
}

/// Walk a quiz question by question until it completes, stalls, fails, or
/// hits the question ceiling. Never runs more than `max_questions`
/// iterations, so a quiz that keeps serving questions cannot wedge the run.
pub async fn run_quiz(surface: &impl QuizSurface, max_questions: u32, poll: Duration, loop_settle: Duration) -> QuizOutcome {
	let mut solved = 0u32;
	for iteration in 1..=max_questions {
		surface.settle(poll).await;

		if !surface.frame_attached().await {
			elog!("Course frame detached at question {iteration}");
			return QuizOutcome::Failed { solved };
		}

		match surface.submit_control_present().await {
			Ok(true) => {}
			Ok(false) => {
				log!("No submit control on the page, quiz is complete");
				return QuizOutcome::Completed { solved };
			}
			Err(e) => {
				elog!("Could not probe for a submit control: {e}");
				return QuizOutcome::Failed { solved };
			}
		}

		let page_text = match surface.visible_text().await {
			Ok(text) => text,
			Err(e) => {
				elog!("Could not read question {iteration}: {e}");
				return QuizOutcome::Failed { solved };
			}
		};
		let kind = match surface.classify().await {
			Ok(kind) => kind,
			Err(e) => {
				elog!("Could not classify question {iteration}: {e}");
				return QuizOutcome::Failed { solved };
			}
		};
		log!("Question {iteration}: {kind}");

		match surface.solve(kind, &page_text).await {
			Ok(true) => {}
			Ok(false) | Err(_) => return QuizOutcome::Failed { solved },
		}

		match surface.submit().await {
			Ok(true) => {}
			Ok(false) => {
				// The answer is in, so it still counts.
				solved += 1;
				elog!("Submit control vanished after answering question {iteration}");
				return QuizOutcome::Stalled { solved };
			}
			Err(e) => {
				solved += 1;
				elog!("Submitting question {iteration} failed: {e}");
				return QuizOutcome::Stalled { solved };
			}
		}
		solved += 1;

		match surface.advance().await {
			Ok(true) => {}
			Ok(false) | Err(_) => {
				log!("No next control after question {iteration}, quiz is complete");
				return QuizOutcome::Completed { solved };
			}
		}

		surface.settle(loop_settle).await;
	}
	tracing::warn!("Question ceiling of {max_questions} reached, moving on");
	QuizOutcome::Completed { solved }
}

/// The real quiz surface: a course iframe plus an answer oracle.
pub struct LiveQuiz<'a, O> {
	page: &'a Page,
	config: &'a AppConfig,
	oracle: &'a O,
}

impl<'a, O: AnswerOracle> LiveQuiz<'a, O> {
	pub fn new(page: &'a Page, config: &'a AppConfig, oracle: &'a O) -> Self {
		Self { page, config, oracle }
	}

	fn frame(&self) -> CourseFrame<'a> {
		CourseFrame::new(self.page, &self.config.course_frame)
	}
}

impl<O: AnswerOracle> QuizSurface for LiveQuiz<'_, O> {
	async fn frame_attached(&self) -> bool {
		FrameResolver::new(self.page, &self.config.course_frame).resolve().await.is_some()
	}

	async fn submit_control_present(&self) -> Result<bool> {
		finder::has_submit_control(&self.frame(), self.config).await
	}

	async fn visible_text(&self) -> Result<String> {
		self.frame().visible_text().await
	}

	async fn classify(&self) -> Result<QuestionKind> {
		classify::classify(&self.frame(), &self.config.code_editor_selectors).await
	}

	async fn solve(&self, kind: QuestionKind, page_text: &str) -> Result<bool> {
		match solver::solve_question(self.page, &self.frame(), self.config, self.oracle, kind, page_text).await {
			Ok(report) => {
				log!("Applied {} answer: {:.60}", report.kind, report.answer);
				Ok(report.applied)
			}
			Err(e) => {
				elog!("Solving a {kind} question failed: {e}");
				Ok(false)
			}
		}
	}

	async fn submit(&self) -> Result<bool> {
		finder::click_submit_or_next(&self.frame(), self.config, ClickMode::Submit).await
	}

	async fn advance(&self) -> Result<bool> {
		finder::click_submit_or_next(&self.frame(), self.config, ClickMode::Next).await
	}

	async fn settle(&self, duration: Duration) {
		tokio::time::sleep(duration).await;
	}
}

#[cfg(test)]
mod tests {
	use std::{cell::RefCell, collections::VecDeque};

	use super::*;

	/// Surface whose per-question behavior is scripted ahead of time; any
	/// exhausted script falls back to the happy path.
	#[derive(Default)]
	struct Scripted {
		frame_attached: RefCell<VecDeque<bool>>,
		submit_present: RefCell<VecDeque<bool>>,
		solve_results: RefCell<VecDeque<bool>>,
		submit_results: RefCell<VecDeque<bool>>,
		advance_results: RefCell<VecDeque<bool>>,
	}

	fn pop(queue: &RefCell<VecDeque<bool>>, default: bool) -> bool {
		queue.borrow_mut().pop_front().unwrap_or(default)
	}

	impl QuizSurface for Scripted {
		async fn frame_attached(&self) -> bool {
			pop(&self.frame_attached, true)
		}

		async fn submit_control_present(&self) -> Result<bool> {
			Ok(pop(&self.submit_present, true))
		}

		async fn visible_text(&self) -> Result<String> {
			Ok("Which of these is a join?".to_string())
		}

		async fn classify(&self) -> Result<QuestionKind> {
			Ok(QuestionKind::MultipleChoice)
		}

		async fn solve(&self, _kind: QuestionKind, _page_text: &str) -> Result<bool> {
			Ok(pop(&self.solve_results, true))
		}

		async fn submit(&self) -> Result<bool> {
			Ok(pop(&self.submit_results, true))
		}

		async fn advance(&self) -> Result<bool> {
			Ok(pop(&self.advance_results, true))
		}

		async fn settle(&self, _duration: Duration) {}
	}

	fn run(surface: &Scripted, max_questions: u32) -> QuizOutcome {
		tokio::runtime::Builder::new_current_thread()
			.build()
			.unwrap()
			.block_on(run_quiz(surface, max_questions, Duration::ZERO, Duration::ZERO))
	}

	#[test]
	fn absent_submit_control_completes_immediately() {
		let surface = Scripted::default();
		surface.submit_present.borrow_mut().push_back(false);
		assert_eq!(run(&surface, 20), QuizOutcome::Completed { solved: 0 });
	}

	#[test]
	fn ceiling_bounds_an_endless_quiz() {
		let surface = Scripted::default();
		assert_eq!(run(&surface, 3), QuizOutcome::Completed { solved: 3 });
	}

	#[test]
	fn detached_frame_fails_with_partial_count() {
		let surface = Scripted::default();
		surface.frame_attached.borrow_mut().extend([true, false]);
		assert_eq!(run(&surface, 20), QuizOutcome::Failed { solved: 1 });
	}

	#[test]
	fn vanished_submit_control_stalls_but_counts_the_answer() {
		let surface = Scripted::default();
		surface.submit_results.borrow_mut().push_back(false);
		assert_eq!(run(&surface, 20), QuizOutcome::Stalled { solved: 1 });
	}

	#[test]
	fn missing_next_control_means_the_quiz_ended() {
		let surface = Scripted::default();
		surface.advance_results.borrow_mut().push_back(false);
		assert_eq!(run(&surface, 20), QuizOutcome::Completed { solved: 1 });
	}

	#[test]
	fn unapplied_answer_fails_the_quiz() {
		let surface = Scripted::default();
		surface.solve_results.borrow_mut().push_back(false);
		assert_eq!(run(&surface, 20), QuizOutcome::Failed { solved: 0 });
	}
}
