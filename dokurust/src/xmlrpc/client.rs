use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use log::debug;
use reqwest::blocking;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};

use super::error::{Fault, Result, TransportError};
use super::value::{parse_response, MethodResponse, Request, Value};

/// Options applied when constructing a [`Client`].
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Whether TLS certificates are verified.
    pub verify_tls: bool,
    /// Per-request timeout; `None` keeps the HTTP client's default.
    pub timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            verify_tls: true,
            timeout: None,
        }
    }
}

// Session cookies accumulated across calls, keyed by cookie name. Only the
// name=value pair of Set-Cookie is kept; attributes are dropped.
#[derive(Debug, Default)]
struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    fn merge(&mut self, set_cookie: &str) {
        let pair = set_cookie.split(';').next().unwrap_or("");
        if let Some((name, value)) = pair.split_once('=') {
            self.cookies
                .insert(name.trim().to_owned(), value.trim().to_owned());
        }
    }

    fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Some(pairs.join("; "))
    }
}

/// Blocking XML-RPC client bound to a single endpoint.
///
/// Cookies set by the server persist for the life of the client and ride
/// along on every subsequent call, so session flows like login-then-edit
/// work across one instance. Each call is one synchronous round trip.
pub struct Client {
    http: blocking::Client,
    url: reqwest::Url,
    jar: Mutex<CookieJar>,
}

impl Client {
    pub fn new(url: &str) -> Result<Client> {
        Client::with_options(url, ClientOptions::default())
    }

    pub fn with_options(url: &str, options: ClientOptions) -> Result<Client> {
        let url = url
            .parse::<reqwest::Url>()
            .map_err(|err| TransportError::BadEndpoint {
                url: url.to_owned(),
                reason: err.to_string(),
            })?;
        let mut builder =
            blocking::Client::builder().danger_accept_invalid_certs(!options.verify_tls);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| TransportError::BadEndpoint {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Client {
            http,
            url,
            jar: Mutex::new(CookieJar::default()),
        })
    }

    /// Calls `method` with `params` and returns the decoded response values.
    ///
    /// A server-reported fault surfaces as [`Fault`], a failed round trip as
    /// [`TransportError`], and a response outside the XML-RPC grammar as a
    /// structural error carrying the raw body.
    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<Vec<Value>> {
        let request = Request {
            method: method.to_owned(),
            params,
        };
        let request_xml = request.to_string();
        debug!("calling {} at {}", method, self.url);

        // The jar lock spans the whole round trip, so interleaved calls on
        // one client can't tear the send-cookies/merge-cookies pair.
        let mut jar = self.jar.lock().expect("cookie jar lock poisoned");

        let mut http_request = self
            .http
            .post(self.url.clone())
            .header(CONTENT_TYPE, "text/xml")
            .body(request_xml.clone());
        if let Some(cookies) = jar.header() {
            http_request = http_request.header(COOKIE, cookies);
        }
        let response = http_request.send().map_err(|err| TransportError::Request {
            url: self.url.to_string(),
            source: err,
        })?;

        let status = response.status();
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok().map(str::to_owned))
            .collect();
        let body = response.text().map_err(|err| TransportError::Request {
            url: self.url.to_string(),
            source: err,
        })?;
        debug!("{} answered with status {}", method, status);

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        // The server answered, so its session state counts even when the
        // answer turns out to be a fault.
        for cookie in &set_cookies {
            jar.merge(cookie);
        }

        match parse_response(&body)? {
            MethodResponse::Params(values) => Ok(values),
            MethodResponse::Fault { code, message } => Err(Fault {
                code,
                message,
                method: method.to_owned(),
                request_xml,
            }
            .into()),
        }
    }
}
