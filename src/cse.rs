//! Custom search engine id fallback.
//!
//! The results page loads Google's CSE script for one engine id at a time.
//! If the script fails to load, or loads but never initializes before the
//! deadline, the next id in the list is tried. The controller is shared by
//! every browser, so each report names the id it is about: reports for an
//! id that is no longer current are answered with the current script and
//! never advance the list a second time. The list is walked at most once.

use std::time::Duration;

use tracing::{debug, info, warn};

const CSE_SCRIPT_BASE: &str = "https://cse.google.com/cse.js";

#[derive(Debug, Clone)]
pub struct CseFallback {
    ids: Vec<String>,
    current: usize,
    ready: bool,
    deadline_armed: bool,
    init_timeout: Duration,
}

impl CseFallback {
    /// The first entry of `ids` is the primary engine.
    pub fn new(ids: Vec<String>, init_timeout: Duration) -> Self {
        Self {
            ids,
            current: 0,
            ready: false,
            deadline_armed: false,
            init_timeout,
        }
    }

    pub fn current_cx(&self) -> Option<&str> {
        self.ids.get(self.current).map(String::as_str)
    }

    pub fn all_cx(&self) -> &[String] {
        &self.ids
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// How long a loaded script gets to initialize before the page gives up
    /// on the current id.
    pub fn init_timeout(&self) -> Duration {
        self.init_timeout
    }

    pub fn deadline_armed(&self) -> bool {
        self.deadline_armed
    }

    /// Script URL for the current id.
    pub fn current_script(&self) -> Option<String> {
        self.current_cx().map(script_url)
    }

    fn is_current(&self, cx: &str) -> bool {
        self.current_cx() == Some(cx)
    }

    /// Advance to the next backup id. Returns false when none is left.
    pub fn switch_to_next_cx(&mut self) -> bool {
        if self.current + 1 < self.ids.len() {
            self.current += 1;
            self.ready = false;
            self.deadline_armed = false;
            info!("Switched to backup CX: {}", self.ids[self.current]);
            true
        } else {
            warn!("No more backup CX available");
            false
        }
    }

    /// The script for `cx` arrived; it must now initialize within
    /// [`Self::init_timeout`].
    pub fn on_script_loaded(&mut self, cx: &str) {
        if self.is_current(cx) && !self.ready {
            self.deadline_armed = true;
        }
    }

    /// Returns false when `cx` is no longer the active id.
    pub fn on_initialized(&mut self, cx: &str) -> bool {
        if !self.is_current(cx) {
            debug!("Ignoring initialization of stale CX {}", cx);
            return false;
        }
        self.ready = true;
        self.deadline_armed = false;
        info!("CSE successfully initialized with CX {}", cx);
        true
    }

    /// The initialization deadline for `cx` passed. Returns the script the
    /// page should load next, if any.
    pub fn on_init_timeout(&mut self, cx: &str) -> Option<String> {
        if !self.is_current(cx) {
            return self.current_script();
        }
        if self.ready || !self.deadline_armed {
            return None;
        }
        self.deadline_armed = false;
        self.fall_back()
    }

    /// The script for `cx` failed to load at all (network, DNS or quota).
    /// Returns the script the page should load next, if any.
    pub fn on_load_error(&mut self, cx: &str) -> Option<String> {
        if !self.is_current(cx) {
            return self.current_script();
        }
        self.ready = false;
        self.deadline_armed = false;
        self.fall_back()
    }

    fn fall_back(&mut self) -> Option<String> {
        if self.switch_to_next_cx() {
            self.current_script()
        } else {
            None
        }
    }
}

pub fn script_url(cx: &str) -> String {
    format!(
        "{}?cx={}&callback=cseScriptLoaded",
        CSE_SCRIPT_BASE,
        urlencoding::encode(cx)
    )
}
