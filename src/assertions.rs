use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;

use crate::{report::TestContext, request::FakeRequest};

/// A pluggable check run against an inbound request.
///
/// Assertors never affect routing or the response that is ultimately
/// written: the dispatcher logs each assertor's intent, evaluates it, and
/// reports any failure through the [`TestContext`] before moving on to the
/// next one.
///
/// Any `Fn(&FakeRequest) -> anyhow::Result<()>` closure is an `Assertor`,
/// which is the escape hatch for ad-hoc custom checks.
pub trait Assertor: Send + Sync {
    fn assert(&self, request: &FakeRequest) -> Result<()>;

    /// Human-readable statement of what is being checked, logged before
    /// evaluation.
    fn describe_intent(&self) -> String;

    fn report_failure(&self, context: &dyn TestContext, error: &anyhow::Error) {
        context.fail(&format!("assertion error: {error}"));
    }
}

impl<F> Assertor for F
where
    F: Fn(&FakeRequest) -> Result<()> + Send + Sync,
{
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        self(request)
    }

    fn describe_intent(&self) -> String {
        "Testing request with a custom assertor".to_string()
    }
}

/// Requires every listed header key to carry a non-empty value.
pub(crate) struct RequiredHeaders {
    keys: Vec<String>,
}

impl RequiredHeaders {
    pub(crate) fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }
}

impl Assertor for RequiredHeaders {
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|key| request.header(key).is_none_or(str::is_empty))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            bail!("missing required header(s): {}", missing.join(", "));
        }
        Ok(())
    }

    fn describe_intent(&self) -> String {
        "Testing request for required headers".to_string()
    }
}

/// Requires the named header to equal the expected value exactly.
pub(crate) struct RequiredHeaderValue {
    key: String,
    expected: String,
}

impl RequiredHeaderValue {
    pub(crate) fn new(key: &str, expected: &str) -> Self {
        Self {
            key: key.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl Assertor for RequiredHeaderValue {
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        let value = request.header(&self.key).unwrap_or_default();
        if value != self.expected {
            bail!(
                "header {} does not have the expected value; expected {} to equal {}",
                self.key,
                value,
                self.expected
            );
        }
        Ok(())
    }

    fn describe_intent(&self) -> String {
        format!(
            "Testing request for a required header value [{}: {}]",
            self.key, self.expected
        )
    }
}

/// Requires every listed query parameter to carry a non-empty value.
pub(crate) struct RequiredQueries {
    keys: Vec<String>,
}

impl RequiredQueries {
    pub(crate) fn new(keys: &[&str]) -> Self {
        Self {
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }
}

impl Assertor for RequiredQueries {
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        let missing: Vec<&str> = self
            .keys
            .iter()
            .filter(|key| request.query(key).as_deref().is_none_or(str::is_empty))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            bail!("missing required query parameter(s): {}", missing.join(", "));
        }
        Ok(())
    }

    fn describe_intent(&self) -> String {
        "Testing request for required query parameters".to_string()
    }
}

/// Requires the named query parameter to equal the expected value exactly.
pub(crate) struct RequiredQueryValue {
    key: String,
    expected: String,
}

impl RequiredQueryValue {
    pub(crate) fn new(key: &str, expected: &str) -> Self {
        Self {
            key: key.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl Assertor for RequiredQueryValue {
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        let value = request.query(&self.key).unwrap_or_default();
        if value != self.expected {
            bail!(
                "query {} does not have the expected value; expected {} to equal {}",
                self.key,
                value,
                self.expected
            );
        }
        Ok(())
    }

    fn describe_intent(&self) -> String {
        format!(
            "Testing request for a required query parameter value [{}: {}]",
            self.key, self.expected
        )
    }
}

/// Requires the request body to equal the expected bytes,
/// ASCII-case-insensitively. An absent body is a distinct failure from a
/// mismatching one.
pub(crate) struct RequiredBody {
    expected: Vec<u8>,
}

impl RequiredBody {
    pub(crate) fn new(expected: &[u8]) -> Self {
        Self {
            expected: expected.to_vec(),
        }
    }
}

impl Assertor for RequiredBody {
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        let Some(body) = request.body() else {
            bail!("error reading the request body; the request body is nil");
        };

        if !body.eq_ignore_ascii_case(&self.expected) {
            bail!(
                "request body does not have the expected value; expected {} to equal {}",
                String::from_utf8_lossy(body),
                String::from_utf8_lossy(&self.expected)
            );
        }
        Ok(())
    }

    fn describe_intent(&self) -> String {
        "Testing request for a required body value".to_string()
    }
}

/// Requires every leaf of a reference JSON document to be present and
/// deep-equal at the same dotted path in the request body.
///
/// The reference is flattened at construction time; array elements get
/// numeric path segments. Extra fields in the request body are allowed —
/// this is a subset check, not an equality check.
pub(crate) struct RequiredJsonSubset {
    fields: BTreeMap<String, Value>,
}

impl RequiredJsonSubset {
    pub(crate) fn new(reference: &Value) -> Self {
        let mut fields = BTreeMap::new();
        flatten_value("", reference, &mut fields);
        Self { fields }
    }
}

impl Assertor for RequiredJsonSubset {
    fn assert(&self, request: &FakeRequest) -> Result<()> {
        let body = request
            .body()
            .ok_or_else(|| anyhow!("error reading the request body; the request body is nil"))?;
        let document: Value =
            serde_json::from_slice(body).context("request body is not valid JSON")?;

        for (path, expected) in &self.fields {
            let actual = lookup_path(&document, path);
            if actual != Some(expected) {
                let shown = actual.map(Value::to_string).unwrap_or_else(|| "null".to_string());
                bail!(
                    r#"json assertion failed for "{path}" field: expected "{expected}", got "{shown}""#
                );
            }
        }
        Ok(())
    }

    fn describe_intent(&self) -> String {
        "Testing request for required json fields".to_string()
    }
}

fn flatten_value(prefix: &str, value: &Value, fields: &mut BTreeMap<String, Value>) {
    let joined = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_value(&joined(key), child, fields);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_value(&joined(&index.to_string()), child, fields);
            }
        }
        leaf => {
            fields.insert(prefix.to_string(), leaf.clone());
        }
    }
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
