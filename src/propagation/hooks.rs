//! Request start/end hooks

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;

use super::token::TokenCodec;
use crate::config::ProxyConfig;
use crate::context::{Clock, ConsistencyWindow, SystemClock};

/// Cookie carrying the context token
pub const COOKIE_NAME: &str = "arpa_context";

/// Added on top of the proxy delay when computing cookie expiry
pub const COOKIE_BUFFER: Duration = Duration::from_secs(5);

const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Attributes of the outbound cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub name: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    /// `Strict`, `Lax` or `None`
    pub same_site: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: COOKIE_NAME.to_string(),
            path: "/".to_string(),
            http_only: true,
            secure: false,
            same_site: None,
        }
    }
}

/// Propagation settings
#[derive(Debug, Clone)]
pub struct PropagationOptions {
    pub cookie: CookieOptions,
    pub buffer: Duration,
    /// Requests under this path prefix are passed through untouched
    pub asset_prefix: Option<String>,
    /// Sign outbound tokens and reject unsigned inbound ones
    pub signing_secret: Option<Vec<u8>>,
}

impl Default for PropagationOptions {
    fn default() -> Self {
        Self {
            cookie: CookieOptions::default(),
            buffer: COOKIE_BUFFER,
            asset_prefix: None,
            signing_secret: None,
        }
    }
}

/// Moves a consistency window in and out of a request/response cycle
#[derive(Clone)]
pub struct ContextPropagator {
    options: PropagationOptions,
    codec: TokenCodec,
    config: Arc<ProxyConfig>,
    clock: Arc<dyn Clock>,
}

impl ContextPropagator {
    pub fn new(config: Arc<ProxyConfig>, options: PropagationOptions) -> Self {
        let codec = match &options.signing_secret {
            Some(secret) => TokenCodec::signed(secret),
            None => TokenCodec::unsigned(),
        };
        Self {
            options,
            codec,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> &PropagationOptions {
        &self.options
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Whether `path` bypasses propagation
    pub fn ignores(&self, path: &str) -> bool {
        match self.options.asset_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => path.starts_with(prefix),
            _ => false,
        }
    }

    /// Our token inside a `Cookie` request header
    pub fn token_from_cookie_header<'a>(&self, header: &'a str) -> Option<&'a str> {
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name.trim() == self.options.cookie.name).then(|| value.trim().trim_matches('"'))
        })
    }

    /// Window for a new unit of work.
    ///
    /// Timestamps later than now are clamped to now.
    pub fn on_request_start(&self, raw_token: Option<&str>) -> ConsistencyWindow {
        let Some(raw) = raw_token else {
            return ConsistencyWindow::new();
        };
        let decoded = self.codec.decode(raw);
        let now = self.clock.now();

        let mut window = ConsistencyWindow::new();
        for (key, ts) in decoded.iter() {
            if ts > now {
                tracing::debug!(database = key, timestamp = ts, "clamping future write timestamp");
            }
            window.record_write(key, ts.min(now));
        }
        window
    }

    /// When the cookie for `window` should expire, in UTC epoch seconds.
    ///
    /// The latest `timestamp + proxy_delay` across keys, plus the buffer.
    pub fn expires_at(&self, window: &ConsistencyWindow) -> Option<f64> {
        window
            .iter()
            .map(|(key, ts)| ts + self.config.proxy_delay_for(key).as_secs_f64())
            .reduce(f64::max)
            .map(|until| until + self.options.buffer.as_secs_f64())
    }

    /// `Set-Cookie` value carrying `window` to the client's next request
    pub fn on_request_end(&self, window: &ConsistencyWindow) -> String {
        let now = self.clock.now();
        let live = self.live_entries(window, now);

        let (value, expires, max_age) = match self.expires_at(&live) {
            Some(expires) if expires > now => (
                self.codec.encode(&live),
                expires,
                (expires - now).ceil() as u64,
            ),
            _ => (String::new(), 0.0, 0),
        };

        let cookie = &self.options.cookie;
        let mut header = format!(
            "{}={}; Path={}; Expires={}; Max-Age={}",
            cookie.name,
            value,
            cookie.path,
            http_date(expires),
            max_age
        );
        if cookie.http_only {
            header.push_str("; HttpOnly");
        }
        if cookie.secure {
            header.push_str("; Secure");
        }
        if let Some(same_site) = &cookie.same_site {
            header.push_str("; SameSite=");
            header.push_str(same_site);
        }
        header
    }

    /// Entries whose forced-primary period plus buffer has not passed
    fn live_entries(&self, window: &ConsistencyWindow, now: f64) -> ConsistencyWindow {
        let buffer = self.options.buffer.as_secs_f64();
        let mut live = ConsistencyWindow::new();
        for (key, ts) in window.iter() {
            if ts + self.config.proxy_delay_for(key).as_secs_f64() + buffer > now {
                live.record_write(key, ts);
            }
        }
        live
    }
}

impl std::fmt::Debug for ContextPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPropagator")
            .field("options", &self.options)
            .field("codec", &self.codec)
            .finish()
    }
}

fn http_date(epoch_seconds: f64) -> String {
    let seconds = epoch_seconds.floor() as i64;
    DateTime::from_timestamp(seconds, 0)
        .unwrap_or_default()
        .format(EXPIRES_FORMAT)
        .to_string()
}
