//! The closed set of host capabilities a fragment may call
//!
//! Each capability is a group of named functions registered into an otherwise
//! empty engine. There is no other way for a fragment to reach the host.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tracing::debug;

use super::SandboxError;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// One named group of host functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// `http_get(url)`, `http_post_json(url, body)`
    Http,
    /// `parse_csv(text)`
    Csv,
    /// `pdf_text(base64)`
    Pdf,
    /// `base64_encode(text)`, `base64_decode(b64)`
    Base64,
    /// `json_decode(text)`, `json_encode(value)`
    Json,
    /// `scratch_get(key)`, `scratch_set(key, value)`
    Scratch,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Http,
        Capability::Csv,
        Capability::Pdf,
        Capability::Base64,
        Capability::Json,
        Capability::Scratch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Http => "http",
            Capability::Csv => "csv",
            Capability::Pdf => "pdf",
            Capability::Base64 => "base64",
            Capability::Json => "json",
            Capability::Scratch => "scratch",
        }
    }

    /// Script-visible functions this capability provides
    pub fn functions(&self) -> &'static [&'static str] {
        match self {
            Capability::Http => &["http_get", "http_post_json"],
            Capability::Csv => &["parse_csv"],
            Capability::Pdf => &["pdf_text"],
            Capability::Base64 => &["base64_encode", "base64_decode"],
            Capability::Json => &["json_decode", "json_encode"],
            Capability::Scratch => &["scratch_get", "scratch_set"],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

/// An immutable selection of capabilities, fixed when a sandbox is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    enabled: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Every built-in capability
    pub fn full() -> Self {
        Self {
            enabled: Capability::ALL.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            enabled: BTreeSet::new(),
        }
    }

    /// Keep only the listed capabilities
    ///
    /// The result is always a subset of `self`; names outside it are ignored.
    pub fn narrowed(&self, keep: &[Capability]) -> Self {
        Self {
            enabled: self.enabled.iter().copied().filter(|c| keep.contains(c)).collect(),
        }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.enabled.contains(&capability)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.enabled.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::full()
    }
}

/// Per-sandbox key/value store shared by consecutive fragments
pub type Scratch = Arc<Mutex<HashMap<String, Dynamic>>>;

/// Host resources the capabilities close over
#[derive(Clone)]
pub struct Bindings {
    pub http: reqwest::Client,
    pub runtime: Option<Handle>,
    pub scratch: Scratch,
}

/// Register the host functions of every enabled capability
pub fn register(engine: &mut Engine, set: &CapabilitySet, bindings: &Bindings) {
    for capability in set.iter() {
        debug!(%capability, "register: binding capability");
        match capability {
            Capability::Http => register_http(engine, bindings),
            Capability::Csv => register_csv(engine),
            Capability::Pdf => register_pdf(engine),
            Capability::Base64 => register_base64(engine),
            Capability::Json => register_json(engine),
            Capability::Scratch => register_scratch(engine, bindings.scratch.clone()),
        }
    }
}

fn block_on_http(
    runtime: &Option<Handle>,
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<String, SandboxError> {
    let handle = runtime.as_ref().ok_or(SandboxError::NoRuntime)?;
    handle.block_on(async {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if status.is_client_error() || status.is_server_error() {
            return Err(SandboxError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(body)
    })
}

fn register_http(engine: &mut Engine, bindings: &Bindings) {
    let client = bindings.http.clone();
    let runtime = bindings.runtime.clone();
    engine.register_fn("http_get", move |url: ImmutableString| -> ScriptResult<String> {
        debug!(%url, "http_get: called");
        Ok(block_on_http(&runtime, client.get(url.as_str()), &url)?)
    });

    let client = bindings.http.clone();
    let runtime = bindings.runtime.clone();
    engine.register_fn(
        "http_post_json",
        move |url: ImmutableString, body: Dynamic| -> ScriptResult<String> {
            debug!(%url, "http_post_json: called");
            let payload: serde_json::Value =
                rhai::serde::from_dynamic(&body).map_err(|e| SandboxError::Convert(e.to_string()))?;
            Ok(block_on_http(&runtime, client.post(url.as_str()).json(&payload), &url)?)
        },
    );
}

/// Parse CSV text into an array of maps keyed by the header row
pub fn parse_csv(text: &str) -> Result<Array, SandboxError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Array::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.into(), Dynamic::from(field.to_string()));
        }
        rows.push(Dynamic::from_map(row));
    }
    Ok(rows)
}

fn register_csv(engine: &mut Engine) {
    engine.register_fn("parse_csv", |text: ImmutableString| -> ScriptResult<Array> {
        Ok(parse_csv(&text)?)
    });
}

/// Extract the text layer of a base64-encoded PDF
pub fn pdf_text(encoded: &str) -> Result<String, SandboxError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    // pdf-extract panics on some malformed documents
    match catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(&bytes))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(SandboxError::Pdf(e.to_string())),
        Err(_) => Err(SandboxError::Pdf("document could not be parsed".to_string())),
    }
}

fn register_pdf(engine: &mut Engine) {
    engine.register_fn("pdf_text", |encoded: ImmutableString| -> ScriptResult<String> {
        Ok(pdf_text(&encoded)?)
    });
}

fn register_base64(engine: &mut Engine) {
    engine.register_fn("base64_encode", |text: ImmutableString| -> String {
        STANDARD.encode(text.as_bytes())
    });
    engine.register_fn("base64_decode", |encoded: ImmutableString| -> ScriptResult<String> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(SandboxError::from)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    });
}

fn register_json(engine: &mut Engine) {
    engine.register_fn("json_decode", |text: ImmutableString| -> ScriptResult<Dynamic> {
        let value: serde_json::Value = serde_json::from_str(&text).map_err(SandboxError::from)?;
        rhai::serde::to_dynamic(value)
    });
    engine.register_fn("json_encode", |value: Dynamic| -> ScriptResult<String> {
        Ok(serde_json::to_string(&value).map_err(SandboxError::from)?)
    });
}

fn register_scratch(engine: &mut Engine, scratch: Scratch) {
    let store = scratch.clone();
    engine.register_fn("scratch_get", move |key: ImmutableString| -> Dynamic {
        store
            .lock()
            .ok()
            .and_then(|s| s.get(key.as_str()).cloned())
            .unwrap_or(Dynamic::UNIT)
    });

    engine.register_fn("scratch_set", move |key: ImmutableString, value: Dynamic| {
        if let Ok(mut s) = scratch.lock() {
            s.insert(key.to_string(), value);
        }
    });
}
