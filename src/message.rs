//! Protocol request/response value types.
//!
//! A [`Message`] is an insertion-ordered, case-sensitive mapping from
//! parameter name to [`Parameter`]. [`Request`] and [`Response`] wrap it
//! with the typed accessors the endpoint handlers work with.

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::constants::{grant_types, params, response_modes, response_types};

/// Parameters whose values never appear in debug output.
const SENSITIVE_PARAMETERS: &[&str] = &[
    params::ACCESS_TOKEN,
    params::REFRESH_TOKEN,
    params::ID_TOKEN,
    params::ID_TOKEN_HINT,
    params::CODE,
    params::CLIENT_SECRET,
    params::ASSERTION,
    params::CLIENT_ASSERTION,
    params::PASSWORD,
    params::TOKEN,
];

/// A single protocol parameter value.
///
/// OAuth parameters are usually flat strings, but protocol extensions allow
/// multi-valued parameters (`resource`) and structured JSON (`address`
/// claim, `claims` request parameter), so the variant set covers all of
/// them.
#[derive(Clone, PartialEq)]
pub enum Parameter {
    Null,
    Bool(bool),
    Integer(i64),
    String(String),
    StringArray(Vec<String>),
    Json(Value),
}

impl Parameter {
    /// Whether the parameter carries no usable value.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Parameter::Null => true,
            Parameter::String(value) => value.is_empty(),
            Parameter::StringArray(values) => values.is_empty(),
            Parameter::Json(Value::Null) => true,
            _ => false,
        }
    }

    /// The parameter as a string slice, when it is single-valued.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Parameter::String(value) => Some(value),
            Parameter::StringArray(values) if values.len() == 1 => Some(&values[0]),
            Parameter::Json(Value::String(value)) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Parameter::Bool(value) => Some(*value),
            Parameter::String(value) => value.parse().ok(),
            Parameter::Json(Value::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Parameter::Integer(value) => Some(*value),
            Parameter::String(value) => value.parse().ok(),
            Parameter::Json(Value::Number(value)) => value.as_i64(),
            _ => None,
        }
    }

    /// The parameter as a list of strings. Single-valued parameters yield a
    /// one-element list.
    pub fn as_string_array(&self) -> Vec<&str> {
        match self {
            Parameter::String(value) => vec![value.as_str()],
            Parameter::StringArray(values) => values.iter().map(String::as_str).collect(),
            Parameter::Json(Value::String(value)) => vec![value.as_str()],
            _ => Vec::new(),
        }
    }

    /// The parameter in JSON form.
    pub fn to_json(&self) -> Value {
        match self {
            Parameter::Null => Value::Null,
            Parameter::Bool(value) => Value::Bool(*value),
            Parameter::Integer(value) => Value::Number((*value).into()),
            Parameter::String(value) => Value::String(value.clone()),
            Parameter::StringArray(values) => Value::Array(
                values
                    .iter()
                    .map(|value| Value::String(value.clone()))
                    .collect(),
            ),
            Parameter::Json(value) => value.clone(),
        }
    }

    /// Rebuild a parameter from its JSON form, preserving the OAuth
    /// mixed-shape semantics: flat primitives, arrays of strings, and
    /// arbitrary structures for everything else.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Parameter::Null,
            Value::Bool(value) => Parameter::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => Parameter::Integer(value),
                None => Parameter::Json(Value::Number(number)),
            },
            Value::String(value) => Parameter::String(value),
            Value::Array(values) => {
                if values.iter().all(Value::is_string) {
                    Parameter::StringArray(
                        values
                            .into_iter()
                            .filter_map(|value| match value {
                                Value::String(value) => Some(value),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Parameter::Json(Value::Array(values))
                }
            }
            other => Parameter::Json(other),
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Null => write!(f, "null"),
            Parameter::Bool(value) => write!(f, "{value}"),
            Parameter::Integer(value) => write!(f, "{value}"),
            Parameter::String(value) => write!(f, "{value:?}"),
            Parameter::StringArray(values) => write!(f, "{values:?}"),
            Parameter::Json(value) => write!(f, "{value}"),
        }
    }
}

impl Serialize for Parameter {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Parameter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Parameter::from_json(Value::deserialize(deserializer)?))
    }
}

impl From<bool> for Parameter {
    fn from(value: bool) -> Self {
        Parameter::Bool(value)
    }
}

impl From<i64> for Parameter {
    fn from(value: i64) -> Self {
        Parameter::Integer(value)
    }
}

impl From<&str> for Parameter {
    fn from(value: &str) -> Self {
        Parameter::String(value.to_string())
    }
}

impl From<String> for Parameter {
    fn from(value: String) -> Self {
        Parameter::String(value)
    }
}

impl From<Vec<String>> for Parameter {
    fn from(values: Vec<String>) -> Self {
        Parameter::StringArray(values)
    }
}

impl From<Value> for Parameter {
    fn from(value: Value) -> Self {
        Parameter::from_json(value)
    }
}

/// Insertion-ordered, case-sensitive parameter map.
#[derive(Clone, Default, PartialEq)]
pub struct Message {
    parameters: IndexMap<String, Parameter>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a message from transport name/value pairs. A name appearing
    /// more than once is stored as a single multi-valued parameter.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut message = Self::new();
        for (name, value) in pairs {
            let name = name.into();
            let value = value.into();
            if let Some(existing) = message.parameters.get_mut(&name) {
                let previous = std::mem::replace(existing, Parameter::Null);
                *existing = match previous {
                    Parameter::String(first) => Parameter::StringArray(vec![first, value]),
                    Parameter::StringArray(mut values) => {
                        values.push(value);
                        Parameter::StringArray(values)
                    }
                    _ => Parameter::String(value),
                };
            } else {
                message.parameters.insert(name, Parameter::String(value));
            }
        }
        message
    }

    /// Add a parameter. No-op when the name is already present.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Parameter>) -> &mut Self {
        let name = name.into();
        if !self.parameters.contains_key(&name) {
            self.parameters.insert(name, value.into());
        }
        self
    }

    /// Set a parameter, replacing any existing value. A `None` or empty
    /// value removes the parameter instead.
    pub fn set(&mut self, name: impl Into<String>, value: Option<Parameter>) -> &mut Self {
        let name = name.into();
        match value {
            Some(value) if !value.is_null_or_empty() => {
                self.parameters.insert(name, value);
            }
            _ => {
                self.parameters.shift_remove(&name);
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        self.parameters.shift_remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.parameters
            .get(name)
            .is_some_and(|value| !value.is_null_or_empty())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Single-valued string accessor.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Parameter::as_str)
    }

    fn set_str(&mut self, name: &str, value: Option<&str>) {
        self.set(name, value.map(Parameter::from));
    }

    /// The message as a JSON object, preserving parameter order.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (name, value) in &self.parameters {
            map.insert(name.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.parameters {
            if SENSITIVE_PARAMETERS.contains(&name.as_str()) {
                map.entry(name, &"[redacted]");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let mut message = Message::new();
        if let Value::Object(map) = value {
            for (name, value) in map {
                message
                    .parameters
                    .insert(name, Parameter::from_json(value));
            }
        }
        Ok(message)
    }
}

macro_rules! string_accessors {
    ($($(#[$meta:meta])* ($get:ident, $set:ident, $param:expr);)*) => {
        $(
            $(#[$meta])*
            pub fn $get(&self) -> Option<&str> {
                self.message.get_str($param)
            }

            pub fn $set(&mut self, value: Option<&str>) {
                self.message.set_str($param, value);
            }
        )*
    };
}

/// An incoming protocol request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Request {
    message: Message,
}

impl Request {
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(Message::from_pairs(pairs))
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    string_accessors! {
        /// The `client_id` parameter.
        (client_id, set_client_id, params::CLIENT_ID);
        (client_secret, set_client_secret, params::CLIENT_SECRET);
        (redirect_uri, set_redirect_uri, params::REDIRECT_URI);
        (scope, set_scope, params::SCOPE);
        (response_type, set_response_type, params::RESPONSE_TYPE);
        (response_mode, set_response_mode, params::RESPONSE_MODE);
        (code, set_code, params::CODE);
        (code_verifier, set_code_verifier, params::CODE_VERIFIER);
        (code_challenge, set_code_challenge, params::CODE_CHALLENGE);
        (code_challenge_method, set_code_challenge_method, params::CODE_CHALLENGE_METHOD);
        (refresh_token, set_refresh_token, params::REFRESH_TOKEN);
        (access_token, set_access_token, params::ACCESS_TOKEN);
        (grant_type, set_grant_type, params::GRANT_TYPE);
        (nonce, set_nonce, params::NONCE);
        (prompt, set_prompt, params::PROMPT);
        (state, set_state, params::STATE);
        (token, set_token, params::TOKEN);
        (token_type_hint, set_token_type_hint, params::TOKEN_TYPE_HINT);
        (id_token_hint, set_id_token_hint, params::ID_TOKEN_HINT);
        (post_logout_redirect_uri, set_post_logout_redirect_uri, params::POST_LOGOUT_REDIRECT_URI);
        (username, set_username, params::USERNAME);
        (password, set_password, params::PASSWORD);
    }

    /// The `resource` parameter values (multi-valued).
    pub fn resources(&self) -> Vec<&str> {
        self.message
            .get(params::RESOURCE)
            .map(Parameter::as_string_array)
            .unwrap_or_default()
    }

    /// The `audience` parameter values (multi-valued).
    pub fn audiences(&self) -> Vec<&str> {
        self.message
            .get(params::AUDIENCE)
            .map(Parameter::as_string_array)
            .unwrap_or_default()
    }

    /// The individual entries of the space-separated `scope` parameter.
    pub fn get_scopes(&self) -> Vec<&str> {
        self.scope()
            .map(|scope| scope.split(' ').filter(|entry| !entry.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.get_scopes().contains(&scope)
    }

    /// The individual entries of the space-separated `prompt` parameter.
    pub fn get_prompts(&self) -> Vec<&str> {
        self.prompt()
            .map(|prompt| prompt.split(' ').filter(|entry| !entry.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn has_prompt_value(&self, prompt: &str) -> bool {
        self.get_prompts().contains(&prompt)
    }

    /// The individual entries of the space-separated `response_type`
    /// parameter.
    pub fn get_response_types(&self) -> Vec<&str> {
        self.response_type()
            .map(|value| value.split(' ').filter(|entry| !entry.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn has_response_type(&self, response_type: &str) -> bool {
        self.get_response_types().contains(&response_type)
    }

    /// `response_type=code` exactly.
    pub fn is_authorization_code_flow(&self) -> bool {
        let types = self.get_response_types();
        types.len() == 1 && types[0] == response_types::CODE
    }

    /// `response_type` limited to `id_token` and/or `token`, non-empty.
    pub fn is_implicit_flow(&self) -> bool {
        let types = self.get_response_types();
        !types.is_empty()
            && types
                .iter()
                .all(|entry| *entry == response_types::ID_TOKEN || *entry == response_types::TOKEN)
    }

    /// `response_type` combining `code` with `id_token` and/or `token`.
    pub fn is_hybrid_flow(&self) -> bool {
        let types = self.get_response_types();
        types.contains(&response_types::CODE)
            && types
                .iter()
                .any(|entry| *entry == response_types::ID_TOKEN || *entry == response_types::TOKEN)
    }

    pub fn is_authorization_code_grant_type(&self) -> bool {
        self.grant_type() == Some(grant_types::AUTHORIZATION_CODE)
    }

    pub fn is_client_credentials_grant_type(&self) -> bool {
        self.grant_type() == Some(grant_types::CLIENT_CREDENTIALS)
    }

    pub fn is_device_code_grant_type(&self) -> bool {
        self.grant_type() == Some(grant_types::DEVICE_CODE)
    }

    pub fn is_password_grant_type(&self) -> bool {
        self.grant_type() == Some(grant_types::PASSWORD)
    }

    pub fn is_refresh_token_grant_type(&self) -> bool {
        self.grant_type() == Some(grant_types::REFRESH_TOKEN)
    }

    pub fn is_query_response_mode(&self) -> bool {
        self.response_mode() == Some(response_modes::QUERY)
    }

    pub fn is_fragment_response_mode(&self) -> bool {
        self.response_mode() == Some(response_modes::FRAGMENT)
    }

    pub fn is_form_post_response_mode(&self) -> bool {
        self.response_mode() == Some(response_modes::FORM_POST)
    }
}

/// An outgoing protocol response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Response {
    message: Message,
}

impl Response {
    pub fn new(message: Message) -> Self {
        Self { message }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    string_accessors! {
        /// The `error` code of a failed request.
        (error, set_error, params::ERROR);
        (error_description, set_error_description, params::ERROR_DESCRIPTION);
        (error_uri, set_error_uri, params::ERROR_URI);
        (access_token, set_access_token, params::ACCESS_TOKEN);
        (token_type, set_token_type, params::TOKEN_TYPE);
        (refresh_token, set_refresh_token, params::REFRESH_TOKEN);
        (id_token, set_id_token, params::ID_TOKEN);
        (code, set_code, params::CODE);
        (state, set_state, params::STATE);
        (scope, set_scope, params::SCOPE);
    }

    pub fn expires_in(&self) -> Option<i64> {
        self.message
            .get(params::EXPIRES_IN)
            .and_then(Parameter::as_i64)
    }

    pub fn set_expires_in(&mut self, value: Option<i64>) {
        self.message
            .set(params::EXPIRES_IN, value.map(Parameter::Integer));
    }

    pub fn active(&self) -> Option<bool> {
        self.message
            .get(params::ACTIVE)
            .and_then(Parameter::as_bool)
    }

    pub fn set_active(&mut self, value: bool) {
        self.message
            .set(params::ACTIVE, Some(Parameter::Bool(value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_noop_when_present() {
        let mut message = Message::new();
        message.add("scope", "openid");
        message.add("scope", "profile");
        assert_eq!(message.get_str("scope"), Some("openid"));
    }

    #[test]
    fn set_removes_on_empty() {
        let mut message = Message::new();
        message.set("state", Some(Parameter::from("xyz")));
        assert!(message.has("state"));
        message.set("state", Some(Parameter::from("")));
        assert!(!message.has("state"));
        message.set("nonce", None);
        assert!(!message.has("nonce"));
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut message = Message::new();
        message.add("Scope", "openid");
        assert!(!message.has("scope"));
        assert!(message.has("Scope"));
    }

    #[test]
    fn repeated_pairs_become_multi_valued() {
        let request = Request::from_pairs(vec![
            ("resource", "https://api1"),
            ("resource", "https://api2"),
            ("client_id", "c1"),
        ]);
        assert_eq!(request.resources(), vec!["https://api1", "https://api2"]);
        assert_eq!(request.client_id(), Some("c1"));
    }

    #[test]
    fn parameter_json_round_trip() {
        let cases = vec![
            Parameter::Null,
            Parameter::Bool(true),
            Parameter::Integer(42),
            Parameter::from("plain"),
            Parameter::StringArray(vec!["a".to_string(), "b".to_string()]),
            Parameter::Json(serde_json::json!({"street_address": "1 Main St"})),
        ];
        for parameter in cases {
            assert_eq!(Parameter::from_json(parameter.to_json()), parameter);
        }
    }

    #[test]
    fn scope_accessors() {
        let mut request = Request::default();
        request.set_scope(Some("openid profile email"));
        assert_eq!(request.get_scopes(), vec!["openid", "profile", "email"]);
        assert!(request.has_scope("profile"));
        assert!(!request.has_scope("phone"));
    }

    #[test]
    fn flow_predicates() {
        let mut request = Request::default();
        request.set_response_type(Some("code"));
        assert!(request.is_authorization_code_flow());
        assert!(!request.is_implicit_flow());
        assert!(!request.is_hybrid_flow());

        request.set_response_type(Some("id_token token"));
        assert!(request.is_implicit_flow());
        assert!(!request.is_hybrid_flow());

        request.set_response_type(Some("code id_token"));
        assert!(request.is_hybrid_flow());
        assert!(!request.is_authorization_code_flow());
    }

    #[test]
    fn debug_redacts_sensitive_parameters() {
        let mut message = Message::new();
        message.add("client_id", "c1");
        message.add("client_secret", "s3cret");
        message.add("code", "abc");
        let rendered = format!("{message:?}");
        assert!(rendered.contains("c1"));
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("abc"));
        assert!(rendered.contains("[redacted]"));
    }
}
