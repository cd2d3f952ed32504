//! Attendance submission. The core only knows the `AttendanceSubmitter`
//! trait and the four terminal outcomes; the bundled implementation drives a
//! chromedriver over the W3C WebDriver protocol and replays the portal's
//! login, attend, and confirm sequence.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{PortalConfig, WebDriverConfig};

/// Terminal result of one attendance attempt. No variant aborts the run; the
/// caller maps them to logging and an exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceOutcome {
    Attended,
    AlreadyAttended,
    NoClassAvailable,
    Failed(String),
}

impl fmt::Display for AttendanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceOutcome::Attended => write!(f, "attended"),
            AttendanceOutcome::AlreadyAttended => write!(f, "already attended"),
            AttendanceOutcome::NoClassAvailable => write!(f, "no class available"),
            AttendanceOutcome::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Capability the orchestration flow needs from the browser side: take a
/// login and a classroom, come back with exactly one outcome.
pub trait AttendanceSubmitter {
    fn submit(&self, username: &str, password: &str, classroom: &str) -> AttendanceOutcome;
}

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("webdriver request failed: {0}")]
    Transport(String),
    #[error("webdriver protocol error: {0}")]
    Protocol(String),
    #[error("timed out waiting for element {0}")]
    ElementTimeout(String),
}

/// W3C element identifier key in element-lookup responses.
const ELEMENT_ID_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

// Locators for the portal's fixed markup.
const USERNAME_FIELD: &str = r#"//*[@id="userid"]"#;
const PASSWORD_FIELD: &str = r#"//*[@id="password"]"#;
const LOGIN_BUTTON: &str = "/html/body/form/div/div/button";
const NO_CLASS_ALERT: &str = r#"/html/body/div/div/p[contains(@class, "alert_message")]"#;
const ALREADY_ATTENDED_BUTTON: &str = "/html/body/div/div/form/button[@disabled]";
const ATTEND_BUTTON: &str = r#"//*[@id="attend"]"#;
const CONFIRM_BUTTON: &str = r#"//*[@id="ok_confirmModal"]"#;
const COMPLETE_CLOSE_BUTTON: &str = r#"//*[@id="close_completeModal"]"#;

/// Portal text shown when no class is currently open for check-in.
const NO_CLASS_MESSAGE: &str = "出席できる授業はありません";

/// Drives the attendance page through a chromedriver endpoint.
pub struct WebDriverSubmitter {
    portal: PortalConfig,
    driver: WebDriverConfig,
    client: Client,
}

impl WebDriverSubmitter {
    pub fn new(portal: PortalConfig, driver: WebDriverConfig) -> Result<Self, WebDriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WebDriverError::Transport(format!("{e}")))?;
        Ok(Self {
            portal,
            driver,
            client,
        })
    }

    fn open_session(&self) -> Result<Session<'_>, WebDriverError> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.driver.headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
            args.push("--disable-software-rasterizer".to_string());
        }

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });

        let url = format!("{}/session", self.driver.endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| WebDriverError::Transport(format!("{e}")))?;
        let payload: Value = response
            .json()
            .map_err(|e| WebDriverError::Protocol(format!("{e}")))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if let Some(code) = error_code(&value) {
            return Err(WebDriverError::Protocol(format!(
                "session could not be created: {code}"
            )));
        }
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WebDriverError::Protocol("session response missing sessionId".to_string())
            })?;

        debug!(session = id, "webdriver session created");
        Ok(Session {
            client: &self.client,
            endpoint: self.driver.endpoint.trim_end_matches('/').to_string(),
            id: id.to_string(),
        })
    }

    fn run(
        &self,
        username: &str,
        password: &str,
        classroom: &str,
    ) -> Result<AttendanceOutcome, WebDriverError> {
        let session = self.open_session()?;
        let wait = Duration::from_secs(self.driver.wait_secs);
        let probe = Duration::from_secs(self.driver.probe_secs);

        session.navigate(&class_page_url(&self.portal.base_url, classroom))?;

        let username_field = session.wait_for_element(USERNAME_FIELD, wait)?;
        let password_field = session.wait_for_element(PASSWORD_FIELD, wait)?;
        session.send_keys(&username_field, username)?;
        session.send_keys(&password_field, password)?;

        let login = session.wait_for_element(LOGIN_BUTTON, wait)?;
        session.click(&login)?;
        debug!("submitted login form");

        // Both probes are for elements that only exist in their respective
        // outcomes; a timeout there just means the flow continues.
        if let Some(alert) = session.probe_element(NO_CLASS_ALERT, probe)? {
            let text = session.element_text(&alert)?;
            if text.contains(NO_CLASS_MESSAGE) {
                return Ok(AttendanceOutcome::NoClassAvailable);
            }
        }

        if session
            .probe_element(ALREADY_ATTENDED_BUTTON, probe)?
            .is_some()
        {
            return Ok(AttendanceOutcome::AlreadyAttended);
        }

        let attend = session.wait_for_element(ATTEND_BUTTON, wait)?;
        session.click(&attend)?;
        let confirm = session.wait_for_element(CONFIRM_BUTTON, wait)?;
        session.click(&confirm)?;
        session.wait_for_element(COMPLETE_CLOSE_BUTTON, wait)?;

        Ok(AttendanceOutcome::Attended)
    }
}

impl AttendanceSubmitter for WebDriverSubmitter {
    fn submit(&self, username: &str, password: &str, classroom: &str) -> AttendanceOutcome {
        info!(classroom, "starting attendance submission");
        match self.run(username, password, classroom) {
            Ok(outcome) => outcome,
            Err(err) => AttendanceOutcome::Failed(err.to_string()),
        }
    }
}

fn class_page_url(base_url: &str, classroom: &str) -> String {
    format!("{}/{classroom}", base_url.trim_end_matches('/'))
}

fn error_code(value: &Value) -> Option<&str> {
    value.get("error").and_then(Value::as_str)
}

/// One live webdriver session. Dropping it deletes the remote session so the
/// browser is cleaned up on every exit path.
struct Session<'a> {
    client: &'a Client,
    endpoint: String,
    id: String,
}

impl Session<'_> {
    fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/session/{}{path}", self.endpoint, self.id);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .map_err(|e| WebDriverError::Transport(format!("{e}")))?;
        let payload: Value = response
            .json()
            .map_err(|e| WebDriverError::Protocol(format!("{e}")))?;
        Ok(payload.get("value").cloned().unwrap_or(Value::Null))
    }

    fn expect_ok(&self, value: Value, context: &str) -> Result<Value, WebDriverError> {
        if let Some(code) = error_code(&value) {
            return Err(WebDriverError::Protocol(format!("{code} during {context}")));
        }
        Ok(value)
    }

    fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        debug!(url, "navigating");
        let value = self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        self.expect_ok(value, "navigation").map(|_| ())
    }

    /// Single element lookup; `Ok(None)` when the element is not present yet.
    fn find_element(&self, xpath: &str) -> Result<Option<String>, WebDriverError> {
        let value = self.command(
            Method::POST,
            "/element",
            Some(json!({ "using": "xpath", "value": xpath })),
        )?;

        if let Some(code) = error_code(&value) {
            if code == "no such element" {
                return Ok(None);
            }
            return Err(WebDriverError::Protocol(format!(
                "{code} while locating {xpath}"
            )));
        }

        match value.get(ELEMENT_ID_KEY).and_then(Value::as_str) {
            Some(id) => Ok(Some(id.to_string())),
            None => Err(WebDriverError::Protocol(format!(
                "element lookup returned no id for {xpath}"
            ))),
        }
    }

    /// Polls until the element appears or the timeout elapses.
    fn wait_for_element(&self, xpath: &str, timeout: Duration) -> Result<String, WebDriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(id) = self.find_element(xpath)? {
                return Ok(id);
            }
            if Instant::now() >= deadline {
                return Err(WebDriverError::ElementTimeout(xpath.to_string()));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Like `wait_for_element`, but absence is an answer rather than an
    /// error.
    fn probe_element(
        &self,
        xpath: &str,
        timeout: Duration,
    ) -> Result<Option<String>, WebDriverError> {
        match self.wait_for_element(xpath, timeout) {
            Ok(id) => Ok(Some(id)),
            Err(WebDriverError::ElementTimeout(_)) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn click(&self, element_id: &str) -> Result<(), WebDriverError> {
        let value = self.command(
            Method::POST,
            &format!("/element/{element_id}/click"),
            Some(json!({})),
        )?;
        self.expect_ok(value, "click").map(|_| ())
    }

    fn send_keys(&self, element_id: &str, text: &str) -> Result<(), WebDriverError> {
        let value = self.command(
            Method::POST,
            &format!("/element/{element_id}/value"),
            Some(json!({ "text": text })),
        )?;
        self.expect_ok(value, "send keys").map(|_| ())
    }

    fn element_text(&self, element_id: &str) -> Result<String, WebDriverError> {
        let value = self.command(Method::GET, &format!("/element/{element_id}/text"), None)?;
        let value = self.expect_ok(value, "read element text")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.endpoint, self.id);
        if let Err(err) = self.client.delete(&url).send() {
            debug!(error = %err, "webdriver session cleanup failed");
        }
    }
}
