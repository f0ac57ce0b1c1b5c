use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Value, json};

/// Pseudo parameters resolved by the provisioning service at deploy time.
pub mod pseudo {
    pub const ACCOUNT_ID: &str = "AWS::AccountId";
    pub const PARTITION: &str = "AWS::Partition";
    pub const REGION: &str = "AWS::Region";
    pub const STACK_NAME: &str = "AWS::StackName";
    pub const URL_SUFFIX: &str = "AWS::URLSuffix";

    /// Returns `true` for names in the `AWS::` pseudo parameter namespace.
    #[must_use]
    pub fn is_pseudo(name: &str) -> bool {
        name.starts_with("AWS::")
    }
}

/// A template expression: a literal or an intrinsic function call.
///
/// Typed resource properties use `Expr` wherever a value may be resolved by
/// the provisioning service rather than known at synthesis time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<Expr>),
    Map(BTreeMap<String, Expr>),
    /// `{"Ref": id}` — a resource's primary identifier or a parameter value.
    Ref(String),
    /// `{"Fn::GetAtt": [id, attribute]}`
    GetAtt(String, String),
    /// `{"Fn::Join": [delimiter, parts]}`
    Join(String, Vec<Expr>),
    /// `{"Fn::Sub": template}` with `${Name}` / `${Name.Attr}` placeholders.
    Sub(String),
    /// `{"Fn::Select": [index, list]}`
    Select(usize, Box<Expr>),
    /// `{"Fn::GetAZs": region}`; an empty region means the stack's region.
    GetAzs(String),
    /// `{"Fn::Base64": value}`
    Base64(Box<Expr>),
}

impl Expr {
    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    #[must_use]
    pub fn reference(id: impl Into<String>) -> Self {
        Self::Ref(id.into())
    }

    #[must_use]
    pub fn get_att(id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::GetAtt(id.into(), attribute.into())
    }

    #[must_use]
    pub fn sub(template: impl Into<String>) -> Self {
        Self::Sub(template.into())
    }

    #[must_use]
    pub fn join(delimiter: impl Into<String>, parts: Vec<Expr>) -> Self {
        Self::Join(delimiter.into(), parts)
    }

    /// The `index`-th availability zone of the stack's region.
    #[must_use]
    pub fn availability_zone(index: usize) -> Self {
        Self::Select(index, Box::new(Self::GetAzs(String::new())))
    }

    #[must_use]
    pub fn base64(value: Expr) -> Self {
        Self::Base64(Box::new(value))
    }

    /// Render the expression as a template JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Str(s) => Value::String(s.clone()),
            Self::Int(n) => json!(n),
            Self::Bool(b) => Value::Bool(*b),
            Self::List(items) => Value::Array(items.iter().map(Self::to_value).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Self::Ref(id) => json!({ "Ref": id }),
            Self::GetAtt(id, attr) => json!({ "Fn::GetAtt": [id, attr] }),
            Self::Join(delimiter, parts) => json!({
                "Fn::Join": [delimiter, parts.iter().map(Self::to_value).collect::<Vec<_>>()]
            }),
            Self::Sub(template) => json!({ "Fn::Sub": template }),
            Self::Select(index, list) => json!({ "Fn::Select": [index, list.to_value()] }),
            Self::GetAzs(region) => json!({ "Fn::GetAZs": region }),
            Self::Base64(value) => json!({ "Fn::Base64": value.to_value() }),
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// Collect the logical ids a template value refers to.
///
/// Walks `Ref`, `Fn::GetAtt` and the `${Name}` / `${Name.Attr}` placeholders
/// of `Fn::Sub`. Pseudo parameters and `${!Literal}` escapes are skipped.
#[must_use]
pub fn referenced_ids(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_refs(value, &mut out);
    out.sort();
    out.dedup();
    out
}

fn collect_refs(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| collect_refs(v, out)),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(id)) = map.get("Ref") {
                    if !pseudo::is_pseudo(id) {
                        out.push(id.clone());
                    }
                    return;
                }
                if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(id)) = parts.first() {
                        out.push(id.clone());
                    }
                    return;
                }
                if let Some(Value::String(template)) = map.get("Fn::Sub") {
                    out.extend(sub_placeholders(template));
                    return;
                }
            }
            map.values().for_each(|v| collect_refs(v, out));
        }
        _ => {}
    }
}

fn sub_placeholders(template: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        rest = &rest[start + 2..];
        let Some(end) = rest.find('}') else { break };
        let name = &rest[..end];
        rest = &rest[end + 1..];
        if name.starts_with('!') || pseudo::is_pseudo(name) {
            continue;
        }
        let id = name.split('.').next().unwrap_or(name);
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }
    ids
}
