//! Declarative payload templates.
//!
//! A template couples an action name with a JSON *data skeleton* whose string
//! leaves may contain named placeholders such as `"{sender}"`.  Rendering walks
//! the skeleton, substitutes every placeholder from a parameter map, and wraps
//! the result in an [`OutboundMessage`].
//!
//! # Why compile templates? (for beginners)
//!
//! A naive renderer would scan every string for `{` at send time and fail
//! half-way through when a parameter is missing, leaving a partially built
//! message behind.  Here each string is parsed once, at load time, into a list
//! of [`Segment`]s.  Parsing also collects every placeholder name the template
//! needs, so `render` can check the whole parameter set *before* it builds
//! anything.  A render either produces a complete message or an error, never
//! half of one.
//!
//! # Placeholder syntax
//!
//! | Text          | Meaning                          |
//! |---------------|----------------------------------|
//! | `{name}`      | substitute parameter `name`      |
//! | `{{` / `}}`   | a literal `{` / `}`              |
//! | `{}` or `{`   | rejected at load time            |
//! | `{n:>3}`, `{n!r}`, `{a.b}`, `{a[0]}` | rejected at load time; names are plain |
//!
//! Object *keys* are never substituted; only string values are.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::envelope::{OutboundMessage, WireShape};

/// Named parameters supplied to a render call.
pub type Params = Map<String, Value>;

/// Errors raised while loading or rendering templates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// No template is registered under the requested kind.
    #[error("unknown template kind: {0}")]
    UnknownKind(String),

    /// The template references a parameter the caller did not supply.
    #[error("missing parameter `{name}` for template kind `{kind}`")]
    MissingParameter { kind: String, name: String },

    /// The template definition itself is unusable.
    #[error("invalid template `{kind}`: {reason}")]
    InvalidTemplate { kind: String, reason: String },

    /// An inbound or outbound payload is not the JSON object it should be.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Placeholder strings ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A string leaf of a data skeleton, pre-split into literal and placeholder parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateString {
    segments: Vec<Segment>,
}

impl TemplateString {
    /// Parses `raw`, resolving `{{`/`}}` escapes.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when a brace is unbalanced or a
    /// placeholder name is empty or carries a format spec, conversion, or
    /// attribute/index access.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(format!("nested '{{' inside placeholder in {raw:?}"))
                            }
                            Some(ch) => name.push(ch),
                            None => return Err(format!("unclosed placeholder in {raw:?}")),
                        }
                    }
                    if name.trim().is_empty() {
                        return Err(format!("empty placeholder name in {raw:?}"));
                    }
                    if let Some(bad) = name.chars().find(|ch| matches!(ch, ':' | '!' | '.' | '[' | ']')) {
                        return Err(format!("unsupported {bad:?} in placeholder {{{name}}} in {raw:?}"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(format!("single '}}' in {raw:?}")),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Iterates over the placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitutes every placeholder; `Err(name)` names the first absent one.
    fn render(&self, params: &Params) -> Result<String, String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match params.get(name) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => return Err(name.clone()),
                },
            }
        }
        Ok(out)
    }
}

// ── Skeleton tree ─────────────────────────────────────────────────────────────

/// A compiled data skeleton.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// A string leaf, possibly containing placeholders.
    Text(TemplateString),
    /// A list walked element-wise.
    List(Vec<TemplateNode>),
    /// An object walked key-wise; keys are kept verbatim.
    Object(Vec<(String, TemplateNode)>),
    /// Numbers, booleans and null pass through unchanged.
    Literal(Value),
}

impl TemplateNode {
    /// Compiles a JSON skeleton into a node tree.
    pub fn compile(skeleton: &Value) -> Result<Self, String> {
        Ok(match skeleton {
            Value::String(s) => TemplateNode::Text(TemplateString::parse(s)?),
            Value::Array(items) => TemplateNode::List(
                items
                    .iter()
                    .map(TemplateNode::compile)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => TemplateNode::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), TemplateNode::compile(v)?)))
                    .collect::<Result<_, String>>()?,
            ),
            other => TemplateNode::Literal(other.clone()),
        })
    }

    fn collect_placeholders(&self, out: &mut BTreeSet<String>) {
        match self {
            TemplateNode::Text(text) => out.extend(text.placeholders().map(str::to_owned)),
            TemplateNode::List(items) => items.iter().for_each(|n| n.collect_placeholders(out)),
            TemplateNode::Object(fields) => {
                fields.iter().for_each(|(_, n)| n.collect_placeholders(out))
            }
            TemplateNode::Literal(_) => {}
        }
    }

    fn render(&self, params: &Params) -> Result<Value, String> {
        Ok(match self {
            TemplateNode::Text(text) => Value::String(text.render(params)?),
            TemplateNode::List(items) => Value::Array(
                items
                    .iter()
                    .map(|n| n.render(params))
                    .collect::<Result<_, _>>()?,
            ),
            TemplateNode::Object(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (key, node) in fields {
                    map.insert(key.clone(), node.render(params)?);
                }
                Value::Object(map)
            }
            TemplateNode::Literal(value) => value.clone(),
        })
    }
}

// ── Templates ─────────────────────────────────────────────────────────────────

/// The on-disk / in-code form of a template before compilation.
///
/// Both `action` and `data` are required; the game plugin's native spelling
/// `api` is accepted as an alias for `action`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TemplateDefinition {
    #[serde(alias = "api")]
    pub action: String,
    pub data: Value,
}

/// A compiled, immutable template registered under a `kind` key.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolTemplate {
    kind: String,
    action: String,
    data: TemplateNode,
    required: BTreeSet<String>,
}

impl ProtocolTemplate {
    /// Compiles a template.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::InvalidTemplate`] when the action name is empty or a
    /// string in the skeleton has malformed braces.
    pub fn new(
        kind: impl Into<String>,
        action: impl Into<String>,
        data: &Value,
    ) -> Result<Self, ProtocolError> {
        let kind = kind.into();
        let action = action.into();
        if action.trim().is_empty() {
            return Err(ProtocolError::InvalidTemplate {
                kind,
                reason: "action name is empty".to_string(),
            });
        }
        let data = TemplateNode::compile(data)
            .map_err(|reason| ProtocolError::InvalidTemplate {
                kind: kind.clone(),
                reason,
            })?;
        let mut required = BTreeSet::new();
        data.collect_placeholders(&mut required);
        Ok(Self {
            kind,
            action,
            data,
            required,
        })
    }

    /// Compiles a raw JSON definition of the form `{"api"|"action": ..., "data": ...}`.
    pub fn from_json(kind: impl Into<String>, definition: &Value) -> Result<Self, ProtocolError> {
        let kind = kind.into();
        let def: TemplateDefinition =
            serde_json::from_value(definition.clone()).map_err(|e| {
                ProtocolError::InvalidTemplate {
                    kind: kind.clone(),
                    reason: format!("definition must contain an action and data: {e}"),
                }
            })?;
        Self::from_definition(kind, &def)
    }

    pub fn from_definition(
        kind: impl Into<String>,
        def: &TemplateDefinition,
    ) -> Result<Self, ProtocolError> {
        Self::new(kind, def.action.clone(), &def.data)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Every placeholder name the skeleton references, sorted.
    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.required.iter().map(String::as_str)
    }

    /// Renders the data skeleton.
    ///
    /// Every required parameter is checked before traversal starts, so a
    /// failure never leaves a partial value behind.
    pub fn render_data(&self, params: &Params) -> Result<Value, ProtocolError> {
        if let Some(missing) = self.required.iter().find(|name| !params.contains_key(*name)) {
            return Err(self.missing(missing));
        }
        self.data.render(params).map_err(|name| self.missing(&name))
    }

    fn missing(&self, name: &str) -> ProtocolError {
        ProtocolError::MissingParameter {
            kind: self.kind.clone(),
            name: name.to_string(),
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// The template table for one channel.
///
/// The echo switch is fixed at construction: when it is off, tokens passed to
/// [`render`](Self::render) are dropped.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<String, ProtocolTemplate>,
    shape: WireShape,
    echo_enabled: bool,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    pub fn new(shape: WireShape, echo_enabled: bool) -> Self {
        Self {
            templates: HashMap::new(),
            shape,
            echo_enabled,
        }
    }

    /// Creates a registry and compiles every definition into it.
    ///
    /// Later definitions replace earlier ones with the same kind.
    pub fn with_definitions<I, K>(
        shape: WireShape,
        echo_enabled: bool,
        definitions: I,
    ) -> Result<Self, ProtocolError>
    where
        I: IntoIterator<Item = (K, TemplateDefinition)>,
        K: Into<String>,
    {
        let mut registry = Self::new(shape, echo_enabled);
        for (kind, def) in definitions {
            registry.insert(ProtocolTemplate::from_definition(kind, &def)?);
        }
        Ok(registry)
    }

    /// Adds or replaces a template, returning the one it replaced.
    pub fn insert(&mut self, template: ProtocolTemplate) -> Option<ProtocolTemplate> {
        self.templates.insert(template.kind.clone(), template)
    }

    pub fn get(&self, kind: &str) -> Option<&ProtocolTemplate> {
        self.templates.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.templates.contains_key(kind)
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn shape(&self) -> WireShape {
        self.shape
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo_enabled
    }

    /// Renders `kind` with `params`.
    ///
    /// `token` becomes the message's `echo` only when echo is enabled for this
    /// registry; otherwise it is silently dropped.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownKind`] when `kind` is not registered.
    /// - [`ProtocolError::MissingParameter`] when `params` lacks a placeholder.
    pub fn render(
        &self,
        kind: &str,
        params: &Params,
        token: Option<&str>,
    ) -> Result<OutboundMessage, ProtocolError> {
        let template = self
            .templates
            .get(kind)
            .ok_or_else(|| ProtocolError::UnknownKind(kind.to_string()))?;
        let data = template.render_data(params)?;
        let message = OutboundMessage::new(template.action.clone(), data);
        Ok(match token {
            Some(token) if self.echo_enabled => message.with_echo(token),
            _ => message,
        })
    }
}
