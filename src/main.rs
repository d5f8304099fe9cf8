use std::{path::PathBuf, time::Duration};

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use coursebot::{
	config::{AppConfig, Credentials},
	login,
	navigator::{self, LiveCourse},
	oracle::LlmOracle,
};
use futures::StreamExt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};
use v_utils::log;

#[derive(Debug, Parser)]
#[command(name = "coursebot")]
#[command(about = "Unattended course-completion automation", long_about = None)]
struct Args {
	/// Path to the course configuration document
	#[arg(short, long, default_value = "config.json")]
	config: PathBuf,

	/// Run with a visible browser window (non-headless mode)
	#[arg(long)]
	visible: bool,

	/// Directory for rolling log files
	#[arg(long, default_value = "logs")]
	log_dir: PathBuf,
}

/// Human-readable logs on stderr, full detail in a daily-rolling file. The
/// returned guard must stay alive or buffered file output is lost.
fn init_tracing(log_dir: &PathBuf) -> Result<WorkerGuard> {
	let file_appender = tracing_appender::rolling::daily(log_dir, "coursebot.log");
	let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
		.try_init()
		.map_err(|e| eyre!("Failed to initialize logging: {e}"))?;
	Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	let args = Args::parse();
	let _guard = init_tracing(&args.log_dir)?;

	// Fail on bad inputs before a browser ever launches.
	let credentials = Credentials::from_env()?;
	let config = AppConfig::load(&args.config)?;

	let browser_config = if args.visible {
		BrowserConfig::builder().with_head().build().map_err(|e| eyre!("Failed to build browser config: {e}"))?
	} else {
		BrowserConfig::builder().build().map_err(|e| eyre!("Failed to build browser config: {e}"))?
	};
	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {e}"))?;

	// The handler stream must be drained or the browser connection stalls.
	let handle = tokio::spawn(async move { while handler.next().await.is_some() {} });

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {e}"))?;

	login::login(&page, &config, &credentials).await?;
	navigator::open_course(&page, &config).await?;
	navigator::open_contents(&page, &config).await?;

	let oracle = LlmOracle::from_config(&config);
	let course = LiveCourse::new(&page, &config, &oracle);
	let summary = navigator::traverse_course(&course, &config).await;
	log!(
		"Run finished: {} subtopics completed, {} skipped, {} questions solved",
		summary.subtopics_completed,
		summary.subtopics_skipped,
		summary.questions_solved
	);

	if args.visible {
		log!("Browser is visible. Press Ctrl+C to exit...");
		tokio::signal::ctrl_c().await?;
	} else {
		// Leave the session up so late platform-side grading can land.
		tokio::time::sleep(Duration::from_secs(config.timings.post_run_idle_secs)).await;
	}

	drop(page);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {e}"))?;
	drop(browser);
	handle.abort();

	Ok(())
}
