//! Thin DokuWiki API on top of the XML-RPC client.
//!
//! Remote methods are documented at <https://www.dokuwiki.org/devel:xmlrpc>.
//! Each wrapper issues one call and interprets the first decoded value.

use log::debug;

use crate::xmlrpc::{Client, ClientOptions, Result, StructValue, StructuralError, Value};

/// Path of the XML-RPC endpoint relative to the wiki root.
pub const RPC_PATH: &str = "/lib/exe/xmlrpc.php";

/// A client for one DokuWiki instance.
pub struct DokuWiki {
    client: Client,
    version: String,
}

impl DokuWiki {
    /// Connects to the wiki rooted at `base_url` and fetches its version.
    pub fn connect(base_url: &str, options: ClientOptions) -> Result<DokuWiki> {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), RPC_PATH);
        let client = Client::with_options(&endpoint, options)?;
        let version = expect_string(first(client.call("dokuwiki.getVersion", Vec::new())?)?)?;
        debug!("connected to DokuWiki {}", version);
        Ok(DokuWiki { client, version })
    }

    /// Server version reported at connect time.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Authenticates the session, returning whether the credentials were
    /// accepted. Session cookies set by the server persist on this
    /// instance, so a successful login carries over to later edits.
    pub fn login(&self, username: &str, password: &str) -> Result<bool> {
        expect_bool(first(self.client.call(
            "dokuwiki.login",
            vec![username.into(), password.into()],
        )?)?)
    }

    /// Fetches the raw wikitext of `page`.
    pub fn get_page(&self, page: &str) -> Result<String> {
        expect_string(first(self.client.call("wiki.getPage", vec![page.into()])?)?)
    }

    /// Replaces the wikitext of `page`.
    pub fn put_page(&self, page: &str, text: &str) -> Result<bool> {
        expect_bool(first(self.client.call(
            "wiki.putPage",
            vec![page.into(), text.into()],
        )?)?)
    }

    /// Fetches `page` rendered as HTML.
    pub fn get_page_html(&self, page: &str) -> Result<String> {
        expect_string(first(
            self.client.call("wiki.getPageHTML", vec![page.into()])?,
        )?)
    }

    /// Locks `page` for editing; false means the server refused the lock.
    pub fn lock(&self, page: &str) -> Result<bool> {
        let outcome = self.set_locks(&[page], &[])?;
        Ok(outcome.locked.iter().any(|locked| locked == page))
    }

    /// Releases the lock on `page`.
    pub fn unlock(&self, page: &str) -> Result<bool> {
        let outcome = self.set_locks(&[], &[page])?;
        Ok(outcome.unlocked.iter().any(|unlocked| unlocked == page))
    }

    /// Acquires and releases page locks in one request.
    pub fn set_locks(&self, lock: &[&str], unlock: &[&str]) -> Result<LockOutcome> {
        let mut request = StructValue::new();
        request.insert("lock".to_owned(), page_list(lock));
        request.insert("unlock".to_owned(), page_list(unlock));
        let result = first(
            self.client
                .call("dokuwiki.setLocks", vec![Value::Struct(request)])?,
        )?;
        let members = match result {
            Value::Struct(members) => members,
            other => {
                return Err(StructuralError::malformed(format!(
                    "expected a struct from dokuwiki.setLocks, got {:?}",
                    other
                ))
                .into())
            }
        };
        Ok(LockOutcome {
            locked: string_list(&members, "locked")?,
            lockfail: string_list(&members, "lockfail")?,
            unlocked: string_list(&members, "unlocked")?,
            unlockfail: string_list(&members, "unlockfail")?,
        })
    }
}

/// Per-page results of a `dokuwiki.setLocks` request.
#[derive(Debug, Default, PartialEq)]
pub struct LockOutcome {
    pub locked: Vec<String>,
    pub lockfail: Vec<String>,
    pub unlocked: Vec<String>,
    pub unlockfail: Vec<String>,
}

fn page_list(pages: &[&str]) -> Value {
    Value::Array(pages.iter().map(|page| Value::from(*page)).collect())
}

fn first(mut values: Vec<Value>) -> Result<Value> {
    if values.is_empty() {
        return Err(StructuralError::malformed("server response carried no values").into());
    }
    Ok(values.swap_remove(0))
}

fn expect_string(value: Value) -> Result<String> {
    match value {
        Value::String(text) => Ok(text),
        other => {
            Err(StructuralError::malformed(format!("expected a string result, got {:?}", other))
                .into())
        }
    }
}

fn expect_bool(value: Value) -> Result<bool> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => {
            Err(StructuralError::malformed(format!("expected a boolean result, got {:?}", other))
                .into())
        }
    }
}

// Missing keys read as empty lists; setLocks omits lists it has nothing
// to say about.
fn string_list(members: &StructValue, key: &str) -> Result<Vec<String>> {
    let items = match members.get(key) {
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(StructuralError::malformed(format!(
                "expected `{}` to be an array, got {:?}",
                key, other
            ))
            .into())
        }
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(page) => Ok(page.clone()),
            other => Err(StructuralError::malformed(format!(
                "expected `{}` entries to be strings, got {:?}",
                key, other
            ))
            .into()),
        })
        .collect()
}
