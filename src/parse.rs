//! Parsing raw JSON against a schema.
//!
//! Parsing validates and normalizes in one pass: defaults fill absent values,
//! coercing numbers accept numeric strings, stripping objects drop undeclared
//! keys. All failures are collected rather than stopping at the first one.
//!
//! Absence is modelled as `None`, so a missing body or field reads as
//! `undefined` in issue messages.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::convert::number_value;
use crate::error::ValidationError;
use crate::schema::{NumberRules, Schema, SchemaKind, StringFormat, StringRules, UnknownKeys};
use crate::types::json_type_name;

/// One step in the path to a failing value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Kind of failed constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    InvalidType,
    TooSmall,
    TooBig,
    InvalidValue,
    InvalidFormat,
    InvalidUnion,
    UnrecognizedKeys,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::InvalidType => "invalid_type",
            IssueCode::TooSmall => "too_small",
            IssueCode::TooBig => "too_big",
            IssueCode::InvalidValue => "invalid_value",
            IssueCode::InvalidFormat => "invalid_format",
            IssueCode::InvalidUnion => "invalid_union",
            IssueCode::UnrecognizedKeys => "unrecognized_keys",
        }
    }
}

/// A single parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub code: IssueCode,
    pub path: Vec<PathSegment>,
    pub message: String,
    /// Code-specific details such as `expected` or `minimum`.
    pub params: Map<String, Value>,
}

impl Schema {
    /// Parse `value` (absent when `None`) against this schema.
    ///
    /// Returns the normalized value, itself `None` when the schema admits
    /// absence and nothing was supplied.
    ///
    /// # Errors
    ///
    /// Returns every issue found as a `ValidationError`.
    pub fn safe_parse(&self, value: Option<&Value>) -> Result<Option<Value>, ValidationError> {
        let mut parser = Parser::default();
        let parsed = parser.parse(self, value);
        if parser.issues.is_empty() {
            Ok(parsed)
        } else {
            Err(ValidationError::from_issues(parser.issues))
        }
    }
}

#[derive(Default)]
struct Parser {
    path: Vec<PathSegment>,
    issues: Vec<Issue>,
}

impl Parser {
    fn parse(&mut self, schema: &Schema, value: Option<&Value>) -> Option<Value> {
        let schema = schema.dereference();
        match schema.kind() {
            SchemaKind::String(rules) => self.parse_string(rules, value),
            SchemaKind::Number(rules) => self.parse_number(rules, value),
            SchemaKind::Boolean => match value {
                Some(Value::Bool(b)) => Some(Value::Bool(*b)),
                other => self.invalid_type("boolean", other),
            },
            SchemaKind::Null => match value {
                Some(Value::Null) => Some(Value::Null),
                other => self.invalid_type("null", other),
            },
            SchemaKind::Undefined => match value {
                None => None,
                other => self.invalid_type("undefined", other),
            },
            SchemaKind::Date => self.parse_date(value),
            SchemaKind::Literal(expected) => match value {
                Some(actual) if actual == expected => Some(actual.clone()),
                _ => {
                    let message = format!("Invalid input: expected {expected}");
                    self.push(
                        IssueCode::InvalidValue,
                        message,
                        params([("values", json!([expected]))]),
                    );
                    None
                }
            },
            SchemaKind::Enum(options) => match value {
                Some(Value::String(s)) if options.contains(s) => Some(Value::String(s.clone())),
                _ => {
                    let listed = options
                        .iter()
                        .map(|o| format!("\"{o}\""))
                        .collect::<Vec<_>>()
                        .join("|");
                    self.push(
                        IssueCode::InvalidValue,
                        format!("Invalid option: expected one of {listed}"),
                        params([("values", json!(options))]),
                    );
                    None
                }
            },
            SchemaKind::Array {
                items,
                min_items,
                max_items,
            } => self.parse_array(items, *min_items, *max_items, value),
            SchemaKind::Tuple(members) => self.parse_tuple(members, value),
            SchemaKind::Object {
                fields,
                unknown_keys,
            } => self.parse_object(fields, *unknown_keys, value),
            SchemaKind::Record {
                key,
                value: value_schema,
            } => self.parse_record(key, value_schema, value),
            SchemaKind::Union(members) => self.parse_union(members, value),
            SchemaKind::Optional(inner) => match value {
                None => None,
                Some(_) => self.parse(inner, value),
            },
            SchemaKind::Nullable(inner) => match value {
                Some(Value::Null) => Some(Value::Null),
                _ => self.parse(inner, value),
            },
            SchemaKind::Default { inner, value: fill } => match value {
                None => Some(fill.clone()),
                Some(_) => self.parse(inner, value),
            },
            SchemaKind::Any | SchemaKind::Lazy(_) => value.cloned(),
        }
    }

    fn parse_string(&mut self, rules: &StringRules, value: Option<&Value>) -> Option<Value> {
        let Some(Value::String(s)) = value else {
            return self.invalid_type("string", value);
        };
        let len = s.chars().count();

        if let Some(min) = rules.min_length {
            if len < min {
                self.push(
                    IssueCode::TooSmall,
                    format!("Too small: expected string to have >={min} characters"),
                    params([
                        ("origin", json!("string")),
                        ("minimum", json!(min)),
                        ("inclusive", json!(true)),
                    ]),
                );
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                self.push(
                    IssueCode::TooBig,
                    format!("Too big: expected string to have <={max} characters"),
                    params([
                        ("origin", json!("string")),
                        ("maximum", json!(max)),
                        ("inclusive", json!(true)),
                    ]),
                );
            }
        }
        if let Some(format) = rules.format {
            let (valid, label) = match format {
                StringFormat::Uuid => (uuid::Uuid::parse_str(s).is_ok(), "UUID"),
                StringFormat::Uri => (url::Url::parse(s).is_ok(), "URL"),
                StringFormat::DateTime => {
                    (DateTime::parse_from_rfc3339(s).is_ok(), "ISO datetime")
                }
            };
            if !valid {
                self.push(
                    IssueCode::InvalidFormat,
                    format!("Invalid {label}"),
                    params([("format", json!(format.as_str()))]),
                );
            }
        }
        Some(Value::String(s.clone()))
    }

    fn parse_number(&mut self, rules: &NumberRules, value: Option<&Value>) -> Option<Value> {
        let expected = if rules.integer { "int" } else { "number" };
        let (n, coerced) = match value {
            Some(Value::Number(n)) => (n.as_f64()?, false),
            Some(Value::String(s)) if rules.coerce => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => (n, true),
                _ => {
                    self.push(
                        IssueCode::InvalidType,
                        format!("Invalid input: expected {expected}, received NaN"),
                        params([("expected", json!(expected)), ("received", json!("NaN"))]),
                    );
                    return None;
                }
            },
            other => return self.invalid_type(expected, other),
        };

        if rules.integer && n.fract() != 0.0 {
            self.push(
                IssueCode::InvalidType,
                "Invalid input: expected int, received number".into(),
                params([("expected", json!("int")), ("received", json!("number"))]),
            );
        }
        self.check_lower(n, rules.minimum, true);
        self.check_lower(n, rules.exclusive_minimum, false);
        self.check_upper(n, rules.maximum, true);
        self.check_upper(n, rules.exclusive_maximum, false);

        if coerced {
            Some(number_value(n))
        } else {
            value.cloned()
        }
    }

    fn check_lower(&mut self, n: f64, bound: Option<f64>, inclusive: bool) {
        let Some(bound) = bound else { return };
        let ok = if inclusive { n >= bound } else { n > bound };
        if !ok {
            let op = if inclusive { ">=" } else { ">" };
            self.push(
                IssueCode::TooSmall,
                format!("Too small: expected number to be {op}{}", number_value(bound)),
                params([
                    ("origin", json!("number")),
                    ("minimum", number_value(bound)),
                    ("inclusive", json!(inclusive)),
                ]),
            );
        }
    }

    fn check_upper(&mut self, n: f64, bound: Option<f64>, inclusive: bool) {
        let Some(bound) = bound else { return };
        let ok = if inclusive { n <= bound } else { n < bound };
        if !ok {
            let op = if inclusive { "<=" } else { "<" };
            self.push(
                IssueCode::TooBig,
                format!("Too big: expected number to be {op}{}", number_value(bound)),
                params([
                    ("origin", json!("number")),
                    ("maximum", number_value(bound)),
                    ("inclusive", json!(inclusive)),
                ]),
            );
        }
    }

    fn parse_date(&mut self, value: Option<&Value>) -> Option<Value> {
        let parsed = match value {
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(s).ok(),
            _ => None,
        };
        match parsed {
            Some(date) => Some(Value::String(
                date.with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
            None => self.invalid_type("date", value),
        }
    }

    fn parse_array(
        &mut self,
        items: &Schema,
        min_items: Option<usize>,
        max_items: Option<usize>,
        value: Option<&Value>,
    ) -> Option<Value> {
        let Some(Value::Array(elements)) = value else {
            return self.invalid_type("array", value);
        };

        if let Some(min) = min_items {
            if elements.len() < min {
                self.push(
                    IssueCode::TooSmall,
                    format!("Too small: expected array to have >={min} items"),
                    params([("origin", json!("array")), ("minimum", json!(min))]),
                );
            }
        }
        if let Some(max) = max_items {
            if elements.len() > max {
                self.push(
                    IssueCode::TooBig,
                    format!("Too big: expected array to have <={max} items"),
                    params([("origin", json!("array")), ("maximum", json!(max))]),
                );
            }
        }

        let mut out = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            self.path.push(PathSegment::Index(index));
            // Absent array slots serialize as null.
            out.push(self.parse(items, Some(element)).unwrap_or(Value::Null));
            self.path.pop();
        }
        Some(Value::Array(out))
    }

    fn parse_tuple(&mut self, members: &[Schema], value: Option<&Value>) -> Option<Value> {
        let Some(Value::Array(elements)) = value else {
            return self.invalid_type("tuple", value);
        };

        if elements.len() > members.len() {
            self.push(
                IssueCode::TooBig,
                format!(
                    "Too big: expected array to have <={} items",
                    members.len()
                ),
                params([("origin", json!("array")), ("maximum", json!(members.len()))]),
            );
        }

        let mut out = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            self.path.push(PathSegment::Index(index));
            if let Some(parsed) = self.parse(member, elements.get(index)) {
                out.push(parsed);
            }
            self.path.pop();
        }
        Some(Value::Array(out))
    }

    fn parse_object(
        &mut self,
        fields: &[(String, Schema)],
        unknown_keys: UnknownKeys,
        value: Option<&Value>,
    ) -> Option<Value> {
        let Some(Value::Object(input)) = value else {
            return self.invalid_type("object", value);
        };

        let mut out = Map::new();
        for (name, field) in fields {
            self.path.push(PathSegment::Key(name.clone()));
            if let Some(parsed) = self.parse(field, input.get(name)) {
                out.insert(name.clone(), parsed);
            }
            self.path.pop();
        }

        let unknown: Vec<&String> = input
            .keys()
            .filter(|key| !fields.iter().any(|(name, _)| name == *key))
            .collect();
        match unknown_keys {
            UnknownKeys::Strip => {}
            UnknownKeys::Passthrough => {
                for key in unknown {
                    out.insert(key.clone(), input[key.as_str()].clone());
                }
            }
            UnknownKeys::Strict if !unknown.is_empty() => {
                let quoted = unknown
                    .iter()
                    .map(|k| format!("\"{k}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                let noun = if unknown.len() == 1 { "key" } else { "keys" };
                self.push(
                    IssueCode::UnrecognizedKeys,
                    format!("Unrecognized {noun}: {quoted}"),
                    params([("keys", json!(unknown))]),
                );
            }
            UnknownKeys::Strict => {}
        }
        Some(Value::Object(out))
    }

    fn parse_record(
        &mut self,
        key_schema: &Schema,
        value_schema: &Schema,
        value: Option<&Value>,
    ) -> Option<Value> {
        let Some(Value::Object(input)) = value else {
            return self.invalid_type("record", value);
        };

        let mut out = Map::new();
        for (key, element) in input {
            self.path.push(PathSegment::Key(key.clone()));
            let parsed_key = self.parse(key_schema, Some(&Value::String(key.clone())));
            let parsed_value = self.parse(value_schema, Some(element));
            if let (Some(Value::String(k)), Some(v)) = (parsed_key, parsed_value) {
                out.insert(k, v);
            }
            self.path.pop();
        }
        Some(Value::Object(out))
    }

    fn parse_union(&mut self, members: &[Schema], value: Option<&Value>) -> Option<Value> {
        let mut failures = Vec::with_capacity(members.len());

        for member in members {
            let mut attempt = Parser {
                path: self.path.clone(),
                issues: Vec::new(),
            };
            let parsed = attempt.parse(member, value);
            if attempt.issues.is_empty() {
                return parsed;
            }
            let messages: Vec<Value> = attempt
                .issues
                .iter()
                .map(|issue| json!({ "code": issue.code.as_str(), "message": issue.message }))
                .collect();
            failures.push(Value::Array(messages));
        }

        self.push(
            IssueCode::InvalidUnion,
            "Invalid input".into(),
            params([("errors", Value::Array(failures))]),
        );
        None
    }

    fn invalid_type(&mut self, expected: &str, value: Option<&Value>) -> Option<Value> {
        let received = value.map_or("undefined", json_type_name);
        self.push(
            IssueCode::InvalidType,
            format!("Invalid input: expected {expected}, received {received}"),
            params([("expected", json!(expected)), ("received", json!(received))]),
        );
        None
    }

    fn push(&mut self, code: IssueCode, message: String, params: Map<String, Value>) {
        self.issues.push(Issue {
            code,
            path: self.path.clone(),
            message,
            params,
        });
    }
}

fn params<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
