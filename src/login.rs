//! Logging in to the platform with configured locators and env credentials.

use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use v_utils::log;

use crate::{
	config::{AppConfig, Credentials},
	finder,
	frame::PageDom,
};

/// Navigate to the platform and authenticate. Any missing field or button is
/// fatal: nothing downstream works without a session.
pub async fn login(page: &Page, config: &AppConfig, credentials: &Credentials) -> Result<()> {
	log!("Opening {} at {}", config.platform, config.url);
	page.goto(config.url.as_str()).await?;
	tokio::time::sleep(Duration::from_secs(config.timings.page_settle_secs)).await;

	let dom = PageDom::new(page);
	finder::fill_by_locator(&dom, &config.login.email, &credentials.email).await?;
	finder::fill_by_locator(&dom, &config.login.password, &credentials.password).await?;

	let timeout = Duration::from_secs(config.timings.click_timeout_secs);
	let clicked = finder::click_first(&dom, &finder::locator_matchers(&config.login.button), timeout).await?;
	if clicked.is_none() {
		return Err(eyre!("Login button \"{}\" not found", config.login.button.name));
	}

	tokio::time::sleep(Duration::from_secs(config.timings.page_settle_secs)).await;
	log!("Logged in as {}", credentials.email);
	Ok(())
}
