/// Business-level smoke check
///
/// Sends one request (a recipe search by default) and asserts on fields of the JSON reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::core::probe::{HttpExchange, HttpMethod, ProbeRequest};
use crate::core::report::{ProbeResult, ProbeStatus};

/// Condition a response field must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Present,
    NonZero,
    NonEmpty,
    Equals,
    AtLeast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAssertion {
    /// Dotted path into the response, array indices allowed (`results.0.title`)
    pub field: String,
    pub check: Check,
    /// Operand for `equals` and `at_least`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl fmt::Display for FieldAssertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operand = self.value.clone().unwrap_or(Value::Null);
        match self.check {
            Check::Present => write!(f, "{} present", self.field),
            Check::NonZero => write!(f, "{} non-zero", self.field),
            Check::NonEmpty => write!(f, "{} non-empty", self.field),
            Check::Equals => write!(f, "{} == {}", self.field, operand),
            Check::AtLeast => write!(f, "{} >= {}", self.field, operand),
        }
    }
}

impl FieldAssertion {
    pub fn new(field: impl Into<String>, check: Check) -> Self {
        Self {
            field: field.into(),
            check,
            value: None,
        }
    }

    pub fn with_value(field: impl Into<String>, check: Check, value: Value) -> Self {
        Self {
            field: field.into(),
            check,
            value: Some(value),
        }
    }

    /// Checks that need an operand have a usable one
    pub fn validate(&self) -> Result<(), String> {
        match (self.check, &self.value) {
            (Check::Equals, None) => Err(format!("assertion on '{}': equals needs a value", self.field)),
            (Check::AtLeast, Some(v)) if v.is_number() => Ok(()),
            (Check::AtLeast, _) => Err(format!("assertion on '{}': at_least needs a numeric value", self.field)),
            _ => Ok(()),
        }
    }

    /// `Ok(())` when satisfied, otherwise a short explanation
    pub fn evaluate(&self, document: &Value) -> Result<(), String> {
        let Some(value) = lookup(document, &self.field) else {
            return Err(format!("{}: field missing", self));
        };

        let ok = match self.check {
            Check::Present => !value.is_null(),
            Check::NonZero => value.as_f64().map_or(false, |n| n != 0.0),
            Check::NonEmpty => match value {
                Value::String(s) => !s.is_empty(),
                Value::Array(a) => !a.is_empty(),
                Value::Object(o) => !o.is_empty(),
                _ => false,
            },
            Check::Equals => self.value.as_ref() == Some(value),
            Check::AtLeast => match (value.as_f64(), self.value.as_ref().and_then(Value::as_f64)) {
                (Some(n), Some(min)) => n >= min,
                _ => false,
            },
        };

        if ok {
            Ok(())
        } else {
            Err(format!("{}: got {}", self, value))
        }
    }
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(document, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// A resolved functional check
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionalCheck {
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub payload: Option<Value>,
    pub timeout: Duration,
    pub expect: Vec<FieldAssertion>,
}

impl FunctionalCheck {
    pub fn request(&self) -> ProbeRequest {
        ProbeRequest {
            url: self.url.clone(),
            method: self.method,
            body: self.payload.clone(),
            timeout: self.timeout,
        }
    }

    /// Turn the exchange into the single result for this check
    pub fn assess(&self, exchange: &HttpExchange) -> ProbeResult {
        let (status, detail) = self.judge(exchange);
        ProbeResult::new(&self.name, status, exchange.latency, detail, exchange.timestamp)
    }

    fn judge(&self, exchange: &HttpExchange) -> (ProbeStatus, String) {
        let body = match (&exchange.outcome, exchange.status_code) {
            (Err(message), _) => return (ProbeStatus::Error, message.clone()),
            (Ok(body), Some(code)) if (200..300).contains(&code) => body,
            (Ok(_), Some(code)) => return (ProbeStatus::Unhealthy, format!("HTTP {}", code)),
            (Ok(_), None) => return (ProbeStatus::Error, "response carried no status code".to_string()),
        };

        if self.expect.is_empty() {
            return (ProbeStatus::Healthy, format!("HTTP {}", exchange.status_code.unwrap_or_default()));
        }

        let document: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return (ProbeStatus::Error, format!("malformed JSON response: {}", e)),
        };

        let failures: Vec<String> = self
            .expect
            .iter()
            .filter_map(|assertion| assertion.evaluate(&document).err())
            .collect();

        if failures.is_empty() {
            let passed: Vec<String> = self
                .expect
                .iter()
                .map(|a| format!("{} = {}", a.field, lookup(&document, &a.field).unwrap_or(&Value::Null)))
                .collect();
            (ProbeStatus::Healthy, passed.join(", "))
        } else {
            (ProbeStatus::Unhealthy, failures.join("; "))
        }
    }
}
