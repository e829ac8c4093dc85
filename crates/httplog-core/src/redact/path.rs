//! Path expressions over parsed JSON documents

use super::engine::mask_value;
use super::MaskStrategy;
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

/// What a single step selects among the children of a node
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Name(String),
    Index(usize),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Direct children only
    Child(Selector),
    /// The node itself and every descendant
    Descendant(Selector),
}

/// A parsed path expression
///
/// Supported syntax, always rooted at `$`:
///
/// | form                        | selects                                  |
/// |-----------------------------|------------------------------------------|
/// | `.name`, `['name']`         | object member                            |
/// | `[3]`                       | array element                            |
/// | `.*`, `[*]`                 | every member or element                  |
/// | `..name`, `..*`             | matching members at any depth            |
///
/// A bare `$` is rejected since it would mask the whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    source: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse a path expression
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        let rest = trimmed
            .strip_prefix('$')
            .ok_or_else(|| Error::path(source, "must start with `$`"))?;

        let mut parser = Parser {
            source,
            chars: rest.char_indices().peekable(),
        };
        let segments = parser.segments()?;
        if segments.is_empty() {
            return Err(Error::path(source, "path selects the whole document"));
        }

        Ok(Self {
            source: trimmed.to_string(),
            segments,
        })
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The member name when the path is exactly `$.name`
    pub fn top_level_member(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Child(Selector::Name(name))] => Some(name),
            _ => None,
        }
    }

    /// Apply `strategy` to every node the path matches in `root`.
    ///
    /// Returns the number of values masked or removed.
    pub fn apply(&self, root: &mut Value, strategy: MaskStrategy, mask_token: &str) -> usize {
        let action = Action {
            strategy,
            mask_token,
        };
        walk(root, &self.segments, &action)
    }
}

impl FromStr for JsonPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JsonPath::parse(s)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl Parser<'_> {
    fn segments(&mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();

        while let Some((_, c)) = self.chars.next() {
            let segment = match c {
                '.' if self.eat('.') => {
                    let selector = if self.eat('[') {
                        self.bracket()?
                    } else {
                        self.dotted()?
                    };
                    Segment::Descendant(selector)
                }
                '.' => Segment::Child(self.dotted()?),
                '[' => Segment::Child(self.bracket()?),
                other => return Err(self.error(format!("unexpected character `{}`", other))),
            };
            segments.push(segment);
        }

        Ok(segments)
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    /// `name` or `*` following a dot
    fn dotted(&mut self) -> Result<Selector> {
        if self.eat('*') {
            return Ok(Selector::Wildcard);
        }

        let mut name = String::new();
        while let Some((_, c)) = self.chars.next_if(|&(_, c)| !matches!(c, '.' | '[' | ']')) {
            name.push(c);
        }

        if name.is_empty() {
            return Err(self.error("empty member name"));
        }
        Ok(Selector::Name(name))
    }

    /// The inside of `[...]`, after the opening bracket
    fn bracket(&mut self) -> Result<Selector> {
        let selector = match self.chars.peek().map(|&(_, c)| c) {
            Some('*') => {
                self.chars.next();
                Selector::Wildcard
            }
            Some(quote @ ('\'' | '"')) => {
                self.chars.next();
                Selector::Name(self.quoted(quote)?)
            }
            Some(c) if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some((_, d)) = self.chars.next_if(|&(_, d)| d.is_ascii_digit()) {
                    digits.push(d);
                }
                let index = digits
                    .parse()
                    .map_err(|_| self.error(format!("index `{}` is out of range", digits)))?;
                Selector::Index(index)
            }
            Some(c) => return Err(self.error(format!("unexpected `{}` inside brackets", c))),
            None => return Err(self.error("unterminated bracket")),
        };

        if !self.eat(']') {
            return Err(self.error("expected `]`"));
        }
        Ok(selector)
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut name = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => name.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some((_, c)) if c == quote => return Ok(name),
                Some((_, c)) => name.push(c),
                None => return Err(self.error("unterminated quoted name")),
            }
        }
    }

    fn error(&self, reason: impl Into<String>) -> Error {
        Error::path(self.source, reason)
    }
}

struct Action<'a> {
    strategy: MaskStrategy,
    mask_token: &'a str,
}

fn walk(node: &mut Value, segments: &[Segment], action: &Action<'_>) -> usize {
    let Some((head, rest)) = segments.split_first() else {
        return 0;
    };

    match head {
        Segment::Child(selector) => step(node, selector, rest, action),
        Segment::Descendant(selector) => {
            let mut hits = step(node, selector, rest, action);
            for_each_child(node, |child| hits += walk(child, segments, action));
            hits
        }
    }
}

/// Resolve `selector` against the children of `node`, then continue with `rest`
fn step(node: &mut Value, selector: &Selector, rest: &[Segment], action: &Action<'_>) -> usize {
    if rest.is_empty() {
        return terminal(node, selector, action);
    }

    let mut hits = 0;
    match (selector, node) {
        (Selector::Name(name), Value::Object(map)) => {
            if let Some(child) = map.get_mut(name) {
                hits += walk(child, rest, action);
            }
        }
        (Selector::Index(index), Value::Array(items)) => {
            if let Some(child) = items.get_mut(*index) {
                hits += walk(child, rest, action);
            }
        }
        (Selector::Wildcard, node) => {
            for_each_child(node, |child| hits += walk(child, rest, action));
        }
        _ => {}
    }
    hits
}

/// Mask or remove the children of `node` selected by the last segment
fn terminal(node: &mut Value, selector: &Selector, action: &Action<'_>) -> usize {
    let remove = action.strategy == MaskStrategy::Remove;

    match (selector, node) {
        (Selector::Name(name), Value::Object(map)) => {
            if remove {
                usize::from(map.shift_remove(name).is_some())
            } else if let Some(value) = map.get_mut(name) {
                mask_value(value, action.strategy, action.mask_token);
                1
            } else {
                0
            }
        }
        (Selector::Index(index), Value::Array(items)) if *index < items.len() => {
            if remove {
                items.remove(*index);
            } else {
                mask_value(&mut items[*index], action.strategy, action.mask_token);
            }
            1
        }
        (Selector::Wildcard, Value::Object(map)) => {
            let hits = map.len();
            if remove {
                map.clear();
            } else {
                map.values_mut()
                    .for_each(|value| mask_value(value, action.strategy, action.mask_token));
            }
            hits
        }
        (Selector::Wildcard, Value::Array(items)) => {
            let hits = items.len();
            if remove {
                items.clear();
            } else {
                items
                    .iter_mut()
                    .for_each(|value| mask_value(value, action.strategy, action.mask_token));
            }
            hits
        }
        _ => 0,
    }
}

fn for_each_child(node: &mut Value, mut f: impl FnMut(&mut Value)) {
    match node {
        Value::Object(map) => map.values_mut().for_each(&mut f),
        Value::Array(items) => items.iter_mut().for_each(&mut f),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn apply(path: &str, strategy: MaskStrategy, mut doc: Value) -> (Value, usize) {
        let path = JsonPath::parse(path).unwrap();
        let hits = path.apply(&mut doc, strategy, "***");
        (doc, hits)
    }

    #[test]
    fn test_parse_accepts_supported_forms() {
        for source in [
            "$.a",
            "$.a.b",
            "$['a'].b",
            "$[\"a b\"]",
            "$.items[0].id",
            "$.items[*].id",
            "$.items.*.id",
            "$..password",
            "$..*",
            "$..['x']",
        ] {
            assert!(JsonPath::parse(source).is_ok(), "{} should parse", source);
        }
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        for source in ["", "a.b", "$", "$.", "$..", "$.a[", "$.a[x]", "$.a['b'", "$a", "$.a]"] {
            assert!(JsonPath::parse(source).is_err(), "{} should fail", source);
        }
    }

    #[test]
    fn test_top_level_member() {
        assert_eq!(JsonPath::parse("$.token").unwrap().top_level_member(), Some("token"));
        assert_eq!(JsonPath::parse("$['a.b']").unwrap().top_level_member(), Some("a.b"));
        assert_eq!(JsonPath::parse("$.a.b").unwrap().top_level_member(), None);
        assert_eq!(JsonPath::parse("$..a").unwrap().top_level_member(), None);
    }

    #[test]
    fn test_nested_member() {
        let (doc, hits) = apply(
            "$.user.ssn",
            MaskStrategy::Full,
            json!({"user": {"ssn": "123-45-6789", "name": "ann"}}),
        );
        assert_eq!(hits, 1);
        assert_eq!(doc, json!({"user": {"ssn": "***", "name": "ann"}}));
    }

    #[test]
    fn test_missing_path_is_skipped() {
        let original = json!({"user": {"name": "ann"}, "list": [1]});
        let (doc, hits) = apply("$.user.ssn", MaskStrategy::Full, original.clone());
        assert_eq!(hits, 0);
        assert_eq!(doc, original);

        let (_, hits) = apply("$.list[5]", MaskStrategy::Remove, original.clone());
        assert_eq!(hits, 0);

        let (_, hits) = apply("$.user[0]", MaskStrategy::Full, original);
        assert_eq!(hits, 0);
    }

    #[test]
    fn test_array_wildcard_masks_each_element() {
        let (doc, hits) = apply(
            "$.cards[*].number",
            MaskStrategy::partial(4),
            json!({"cards": [{"number": "4111111111111111"}, {"number": "5500000000000004"}, {}]}),
        );
        assert_eq!(hits, 2);
        assert_eq!(doc["cards"][0]["number"], "************1111");
        assert_eq!(doc["cards"][1]["number"], "************0004");
        assert_eq!(doc["cards"][2], json!({}));
    }

    #[test]
    fn test_remove_member_and_element() {
        let (doc, hits) = apply(
            "$.secret",
            MaskStrategy::Remove,
            json!({"a": 1, "secret": "x", "b": 2}),
        );
        assert_eq!(hits, 1);
        assert_eq!(serde_json::to_string(&doc).unwrap(), r#"{"a":1,"b":2}"#);

        let (doc, _) = apply("$.tags[1]", MaskStrategy::Remove, json!({"tags": ["a", "b", "c"]}));
        assert_eq!(doc, json!({"tags": ["a", "c"]}));
    }

    #[test]
    fn test_recursive_descent() {
        let (doc, hits) = apply(
            "$..password",
            MaskStrategy::Full,
            json!({
                "password": "top",
                "nested": {"password": "mid", "list": [{"password": "deep"}]}
            }),
        );
        assert_eq!(hits, 3);
        assert_eq!(doc["password"], "***");
        assert_eq!(doc["nested"]["password"], "***");
        assert_eq!(doc["nested"]["list"][0]["password"], "***");
    }

    #[test]
    fn test_descendant_then_child() {
        let (doc, hits) = apply(
            "$..card.cvv",
            MaskStrategy::Remove,
            json!({"card": {"cvv": "123"}, "orders": [{"card": {"cvv": "456", "last4": "1111"}}]}),
        );
        assert_eq!(hits, 2);
        assert_eq!(doc, json!({"card": {}, "orders": [{"card": {"last4": "1111"}}]}));
    }

    #[test]
    fn test_quoted_names() {
        let (doc, hits) = apply(
            "$['x-api-key']",
            MaskStrategy::Full,
            json!({"x-api-key": "abc"}),
        );
        assert_eq!(hits, 1);
        assert_eq!(doc["x-api-key"], "***");
    }
}
