//! WhatsApp Web driven through a WebDriver-controlled Chrome.
//!
//! This is the production [`MessagingClient`]: it steers the real WhatsApp
//! Web application in a (usually headless) browser the same way a person at
//! the keyboard would. Login state is read off the page itself: the pairing
//! QR carries its payload in a `data-ref` attribute, a visible chat pane
//! means the session is linked.
//!
//! ## Caveats
//!
//! Selectors track the WhatsApp Web DOM and break when Meta ships UI
//! changes; they are collected below so that stays a one-file fix. The
//! Chrome profile under the configured `data_dir` is the only session
//! storage; wiping it forces a fresh QR on the next start.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fantoccini::{ClientBuilder, Locator};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::config::BrowserConfig;

use super::{ClientEvent, MessagingClient};

const WHATSAPP_URL: &str = "https://web.whatsapp.com";

// DOM anchors, WhatsApp Web as of mid-2025.
const QR_CONTAINER: &str = "div[data-ref]";
const CHAT_PANE: &str = "#side";
const COMPOSER: &str = "div[contenteditable='true'][data-tab]";
const MENU_BUTTON: &str = "span[data-icon='menu']";
const LOGOUT_ITEM: &str = "div[aria-label='Log out']";
const CONFIRM_BUTTON: &str = "div[role='dialog'] button:last-of-type";

/// WebDriver key code for Enter.
const ENTER_KEY: &str = "\u{e007}";

/// Consecutive poll failures before the session counts as lost.
const DISCONNECT_THRESHOLD: u32 = 3;

/// How long a send waits for the chat composer to appear.
const COMPOSER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct WebDriverClient {
    config: BrowserConfig,
    data_dir: PathBuf,
    session: Mutex<Option<fantoccini::Client>>,
}

impl WebDriverClient {
    pub fn new(config: BrowserConfig, data_dir: PathBuf) -> Self {
        Self {
            config,
            data_dir,
            session: Mutex::new(None),
        }
    }

    /// Chrome capabilities: configured switches plus the profile directory
    /// that keeps the linked session across restarts.
    fn chrome_caps(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut args = self.config.args.clone();
        if self.config.headless {
            args.push("--headless=new".to_string());
        }
        args.push(format!("--user-data-dir={}", self.data_dir.display()));

        let mut caps = serde_json::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({ "args": args }),
        );
        caps
    }

    /// Current session handle, or an error when not initialized.
    async fn session(&self) -> Result<fantoccini::Client> {
        self.session
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("browser session not initialized"))
    }
}

#[async_trait]
impl MessagingClient for WebDriverClient {
    fn name(&self) -> &str {
        "whatsapp-web"
    }

    async fn initialize(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        info!("connecting to WebDriver at {}", self.config.webdriver_url);
        let client = ClientBuilder::rustls()
            .context("rustls initialization failed")?
            .capabilities(self.chrome_caps())
            .connect(&self.config.webdriver_url)
            .await
            .with_context(|| {
                format!("WebDriver connect to {} failed", self.config.webdriver_url)
            })?;
        client
            .goto(WHATSAPP_URL)
            .await
            .context("failed to open WhatsApp Web")?;
        info!("WhatsApp Web opened");
        *slot = Some(client);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut slot = self.session.lock().await;
        if let Some(client) = slot.take() {
            info!("closing browser session");
            client
                .close()
                .await
                .context("WebDriver session close failed")?;
        }
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<()> {
        let client = self.session().await?;
        // The send URL wants the bare number, not the full JID.
        let number = bare_number(chat_id);
        let url = send_url(number, body);
        client.goto(&url).await.context("failed to open the chat")?;
        let composer = client
            .wait()
            .at_most(COMPOSER_TIMEOUT)
            .for_element(Locator::Css(COMPOSER))
            .await
            .context("chat composer never appeared; is the session linked?")?;
        composer
            .send_keys(ENTER_KEY)
            .await
            .context("failed to submit the message")?;
        debug!("message dispatched to {number}");
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        let client = self.session().await?;
        client
            .find(Locator::Css(MENU_BUTTON))
            .await
            .context("app menu not found; probably not logged in")?
            .click()
            .await
            .context("failed to open the app menu")?;
        client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css(LOGOUT_ITEM))
            .await
            .context("log out entry not found in the menu")?
            .click()
            .await
            .context("failed to click log out")?;
        client
            .wait()
            .at_most(Duration::from_secs(5))
            .for_element(Locator::Css(CONFIRM_BUTTON))
            .await
            .context("logout confirmation dialog not found")?
            .click()
            .await
            .context("failed to confirm the logout")?;
        info!("WhatsApp session logged out");
        Ok(())
    }

    async fn listen(&self, tx: mpsc::Sender<ClientEvent>) -> Result<()> {
        let interval = Duration::from_millis(self.config.poll_interval_ms.max(250));
        let mut last_qr: Option<String> = None;
        let mut linked = false;
        let mut failures = 0u32;

        loop {
            tokio::time::sleep(interval).await;

            let Some(client) = self.session.lock().await.clone() else {
                // Not initialized, or torn down mid-restart. Nothing to
                // observe; forget what we knew about the old session.
                last_qr = None;
                linked = false;
                failures = 0;
                continue;
            };

            match observe(&client).await {
                Ok(Observation::Qr(payload)) => {
                    failures = 0;
                    linked = false;
                    if last_qr.as_deref() != Some(payload.as_str()) {
                        last_qr = Some(payload.clone());
                        if tx.send(ClientEvent::Qr(payload)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Ok(Observation::Linked) => {
                    failures = 0;
                    last_qr = None;
                    if !linked {
                        linked = true;
                        if tx.send(ClientEvent::Authenticated).await.is_err() {
                            return Ok(());
                        }
                        if tx.send(ClientEvent::Ready).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Ok(Observation::Loading) => {
                    failures = 0;
                }
                Err(err) => {
                    failures += 1;
                    debug!("poll failure {failures}/{DISCONNECT_THRESHOLD}: {err}");
                    if failures >= DISCONNECT_THRESHOLD {
                        failures = 0;
                        last_qr = None;
                        linked = false;
                        let reason = format!("browser stopped answering: {err}");
                        if tx.send(ClientEvent::Disconnected(reason)).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// One page snapshot, reduced to what the session tracker cares about.
enum Observation {
    /// Pairing QR on screen, with its payload.
    Qr(String),
    /// Chat pane visible; the session is linked.
    Linked,
    /// Neither yet: the app is loading or mid-transition.
    Loading,
}

async fn observe(client: &fantoccini::Client) -> Result<Observation> {
    let panes = client.find_all(Locator::Css(CHAT_PANE)).await?;
    if !panes.is_empty() {
        return Ok(Observation::Linked);
    }
    let containers = client.find_all(Locator::Css(QR_CONTAINER)).await?;
    if let Some(container) = containers.first() {
        if let Some(payload) = container.attr("data-ref").await? {
            if !payload.is_empty() {
                return Ok(Observation::Qr(payload));
            }
        }
    }
    Ok(Observation::Loading)
}

/// Strip the JID suffix; the send URL wants the bare number.
fn bare_number(chat_id: &str) -> &str {
    match chat_id.split_once('@') {
        Some((number, _)) => number,
        None => chat_id,
    }
}

/// Click-to-chat URL for one message. Both query values are percent-encoded;
/// a stray `&` or space in the number would otherwise split the query.
fn send_url(number: &str, body: &str) -> String {
    format!(
        "{WHATSAPP_URL}/send?phone={}&text={}",
        urlencoding::encode(number),
        urlencoding::encode(body)
    )
}
