//! Redaction rules for bodies and headers

use super::route::RouteScope;
use crate::error::{Error, Result};
use crate::record::Side;
use crate::redact::{MaskStrategy, Rule};
use http::{HeaderName, Method};
use std::str::FromStr;

/// Which bodies or header sets a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Request only
    Request,
    /// Response only
    Response,
    /// Both sides
    #[default]
    Both,
}

impl Target {
    /// Whether the target includes `side`
    pub fn covers(self, side: Side) -> bool {
        matches!(
            (self, side),
            (Target::Both, _) | (Target::Request, Side::Request) | (Target::Response, Side::Response)
        )
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "request" | "req" => Ok(Target::Request),
            "response" | "res" => Ok(Target::Response),
            "both" | "" => Ok(Target::Both),
            other => Err(Error::Config(format!("invalid rule target `{}`", other))),
        }
    }
}

/// A body rule with its target and optional route scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRule {
    rule: Rule,
    target: Target,
    scope: Option<RouteScope>,
}

impl BodyRule {
    /// Rule applying to both sides of every route
    pub fn new(path: &str, strategy: MaskStrategy) -> Result<Self> {
        Ok(Self::from(Rule::new(path, strategy)?))
    }

    /// Restrict the rule to one side
    pub fn on(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Restrict the rule to requests matching `scope`
    pub fn within(mut self, scope: RouteScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The path and strategy
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// The side(s) the rule covers
    pub fn target(&self) -> Target {
        self.target
    }

    /// Whether the rule applies to this body
    pub fn applies_to(&self, side: Side, method: &Method, path: &str) -> bool {
        self.target.covers(side) && in_scope(&self.scope, method, path)
    }
}

impl From<Rule> for BodyRule {
    fn from(rule: Rule) -> Self {
        Self {
            rule,
            target: Target::Both,
            scope: None,
        }
    }
}

/// A header masking rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRule {
    name: String,
    strategy: MaskStrategy,
    target: Target,
    scope: Option<RouteScope>,
}

impl HeaderRule {
    /// Mask the header `name` (case-insensitive) on both sides
    pub fn new(name: &str, strategy: MaskStrategy) -> Result<Self> {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| Error::Config(format!("invalid header name `{}`", name)))?;

        Ok(Self {
            name: name.as_str().to_string(),
            strategy,
            target: Target::Both,
            scope: None,
        })
    }

    /// Restrict the rule to one side
    pub fn on(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Restrict the rule to requests matching `scope`
    pub fn within(mut self, scope: RouteScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Lowercase header name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The mask strategy
    pub fn strategy(&self) -> MaskStrategy {
        self.strategy
    }

    /// Whether the rule applies to this header set
    pub fn applies_to(&self, side: Side, method: &Method, path: &str) -> bool {
        self.target.covers(side) && in_scope(&self.scope, method, path)
    }
}

fn in_scope(scope: &Option<RouteScope>, method: &Method, path: &str) -> bool {
    scope.as_ref().map_or(true, |scope| scope.matches(method, path))
}

/// Ordered body and header rules, immutable once built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    body: Vec<BodyRule>,
    headers: Vec<HeaderRule>,
}

impl RuleSet {
    /// Empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_body(&mut self, rule: BodyRule) {
        self.body.push(rule);
    }

    pub(crate) fn push_header(&mut self, rule: HeaderRule) {
        self.headers.push(rule);
    }

    /// All body rules, in order
    pub fn body(&self) -> &[BodyRule] {
        &self.body
    }

    /// All header rules, in order
    pub fn headers(&self) -> &[HeaderRule] {
        &self.headers
    }

    /// Whether there are no rules at all
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.headers.is_empty()
    }

    /// Body rules applying to one side of one request, in order
    pub fn body_rules_for<'a>(
        &'a self,
        side: Side,
        method: &'a Method,
        path: &'a str,
    ) -> impl Iterator<Item = &'a Rule> + Clone + 'a {
        self.body
            .iter()
            .filter(move |rule| rule.applies_to(side, method, path))
            .map(BodyRule::rule)
    }

    /// Header rules applying to one side of one request, in order
    pub fn header_rules_for<'a>(
        &'a self,
        side: Side,
        method: &'a Method,
        path: &'a str,
    ) -> impl Iterator<Item = &'a HeaderRule> + Clone + 'a {
        self.headers
            .iter()
            .filter(move |rule| rule.applies_to(side, method, path))
    }
}
