//! USDA (ASCII) layer parser.
//!
//! Converts USDA text into the same JSON layer document the loader reads,
//! then into a [`SceneNode`]. The conversion follows the converter rules:
//!
//! - `def`/`over`/`class` blocks become nodes with `def`, `type`, `name`,
//!   `attributes` and `children`
//! - every property assignment inside a block becomes an attribute, keyed by
//!   its name (`uniform token[] elementType = "face"` gives `elementType`)
//! - relationship targets (`rel material:binding = </World/Looks/Red>`)
//!   become `{ "ref": "</World/Looks/Red>" }`
//! - numbers with a fraction or exponent are floats, everything else is an
//!   integer; tuples and arrays both become JSON arrays
//! - layer metadata is dropped except for `defaultPrim`; prim and property
//!   metadata in parentheses is skipped
//!
//! Time samples and dictionary values are not supported.

use serde_json::{Map, Value};
use thiserror::Error;

use super::node::SceneNode;

/// Errors that can occur during USDA parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unexpected end of file")]
    UnexpectedEof,

    #[error("Invalid number format at line {line}: {text}")]
    InvalidNumber { line: usize, text: String },

    #[error("Unclosed block starting at line {0}")]
    UnclosedBlock(usize),

    #[error("Converted layer does not match the scene model: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    /// `<...>`, delimiters kept
    Reference(String),
    /// `@...@`, delimiters stripped
    Asset(String),
    Punct(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Number(s) => format!("number {}", s),
            Token::Reference(s) => format!("path {}", s),
            Token::Asset(s) => format!("asset @{}@", s),
            Token::Punct(c) => format!("'{}'", c),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.')
}

/// Split USDA text into tokens tagged with their line numbers.
fn tokenize(content: &str) -> ParseResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = content.chars().peekable();
    let mut line = 1;

    while let Some(&c) = chars.peek() {
        let start_line = line;
        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();

                // Triple-quoted strings may span lines
                let triple = chars.peek() == Some(&c) && {
                    let mut ahead = chars.clone();
                    ahead.next();
                    ahead.peek() == Some(&c)
                };
                if triple {
                    chars.next();
                    chars.next();
                    let mut quotes = 0;
                    loop {
                        match chars.next() {
                            Some(ch) if ch == c => {
                                quotes += 1;
                                if quotes == 3 {
                                    break;
                                }
                            }
                            Some(ch) => {
                                text.extend(std::iter::repeat(c).take(quotes));
                                quotes = 0;
                                if ch == '\n' {
                                    line += 1;
                                }
                                text.push(ch);
                            }
                            None => return Err(ParseError::UnexpectedEof),
                        }
                    }
                } else {
                    loop {
                        match chars.next() {
                            Some('\\') => match chars.next() {
                                Some('n') => text.push('\n'),
                                Some('t') => text.push('\t'),
                                Some(escaped) => text.push(escaped),
                                None => return Err(ParseError::UnexpectedEof),
                            },
                            Some(ch) if ch == c => break,
                            Some('\n') | None => {
                                return Err(ParseError::Parse {
                                    line: start_line,
                                    message: "Unterminated string".to_string(),
                                })
                            }
                            Some(ch) => text.push(ch),
                        }
                    }
                }
                tokens.push((start_line, Token::Str(text)));
            }
            '<' => {
                chars.next();
                let mut text = String::from("<");
                loop {
                    match chars.next() {
                        Some('>') => break,
                        Some('\n') | None => {
                            return Err(ParseError::Parse {
                                line: start_line,
                                message: "Unterminated path reference".to_string(),
                            })
                        }
                        Some(ch) => text.push(ch),
                    }
                }
                text.push('>');
                tokens.push((start_line, Token::Reference(text)));
            }
            '@' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('@') => break,
                        Some('\n') | None => {
                            return Err(ParseError::Parse {
                                line: start_line,
                                message: "Unterminated asset path".to_string(),
                            })
                        }
                        Some(ch) => text.push(ch),
                    }
                }
                tokens.push((start_line, Token::Asset(text)));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(&ch) = chars.peek() {
                    let exponent_sign = matches!(ch, '-' | '+') && text.ends_with(['e', 'E']);
                    if ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E') || exponent_sign {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((start_line, Token::Number(text)));
            }
            c if is_ident_start(c) => {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    text.push(ch);
                    chars.next();
                }
                tokens.push((start_line, Token::Ident(text)));
            }
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | '=' | ';' | ':' => {
                chars.next();
                tokens.push((start_line, Token::Punct(c)));
            }
            other => {
                return Err(ParseError::Parse {
                    line,
                    message: format!("Unexpected character '{}'", other),
                })
            }
        }
    }

    Ok(tokens)
}

/// Property qualifiers that carry no meaning for the layer document.
const QUALIFIERS: &[&str] = &[
    "uniform", "custom", "varying", "prepend", "append", "add", "delete", "reorder",
];

const SPECIFIERS: &[&str] = &["def", "over", "class"];

/// USDA parser producing layer documents.
pub struct UsdaParser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl UsdaParser {
    /// Create a new parser from file contents.
    pub fn new(content: &str) -> ParseResult<Self> {
        Ok(Self {
            tokens: tokenize(content)?,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(line, _)| *line)
    }

    fn next(&mut self) -> ParseResult<(usize, Token)> {
        let next = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(next)
    }

    fn error<T>(&self, message: impl Into<String>) -> ParseResult<T> {
        error_at(self.line(), message)
    }

    fn at_punct(&self, c: char) -> bool {
        self.peek() == Some(&Token::Punct(c))
    }

    fn eat_punct(&mut self, c: char) -> bool {
        let found = self.at_punct(c);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        match self.next()? {
            (_, Token::Punct(found)) if found == c => Ok(()),
            (line, other) => {
                error_at(line, format!("Expected '{}', found {}", c, other.describe()))
            }
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match self.next()? {
            (_, Token::Ident(name)) => Ok(name),
            (line, other) => error_at(line, format!("Expected a name, found {}", other.describe())),
        }
    }

    /// Parse the whole layer into its JSON document form.
    pub fn parse_document(&mut self) -> ParseResult<Value> {
        let mut document = Map::new();

        if self.at_punct('(') {
            if let Some(default_prim) = self.parse_metadata()? {
                document.insert("defaultPrim".to_string(), Value::String(default_prim));
            }
        }

        let mut children = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Ident(word) if SPECIFIERS.contains(&word.as_str()) => {
                    children.push(self.parse_block()?);
                }
                other => {
                    let message = format!("Expected a prim definition, found {}", other.describe());
                    return self.error(message);
                }
            }
        }
        document.insert("children".to_string(), Value::Array(children));

        Ok(Value::Object(document))
    }

    /// Consume a parenthesized metadata group and return its `defaultPrim`,
    /// if it sets one at the top level.
    fn parse_metadata(&mut self) -> ParseResult<Option<String>> {
        let start_line = self.line();
        self.expect_punct('(')?;

        let mut default_prim = None;
        let mut depth = 1;
        while depth > 0 {
            let (_, token) = self.next().map_err(|_| ParseError::UnclosedBlock(start_line))?;
            match token {
                Token::Punct('(') | Token::Punct('[') | Token::Punct('{') => depth += 1,
                Token::Punct(')') | Token::Punct(']') | Token::Punct('}') => depth -= 1,
                Token::Ident(key) if depth == 1 && key == "defaultPrim" => {
                    if self.eat_punct('=') {
                        if let Some(Token::Str(name)) = self.peek().cloned() {
                            self.pos += 1;
                            default_prim = Some(name);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(default_prim)
    }

    /// Parse `def|over|class [Type] "Name" [(metadata)] { statements }`.
    fn parse_block(&mut self) -> ParseResult<Value> {
        let start_line = self.line();
        let specifier = self.expect_ident()?;

        let prim_type = match self.peek() {
            Some(Token::Ident(_)) => Some(self.expect_ident()?),
            _ => None,
        };

        let name = match self.next()? {
            (_, Token::Str(name)) => name,
            (line, other) => {
                return error_at(line, format!("Expected a prim name, found {}", other.describe()))
            }
        };

        if self.at_punct('(') {
            self.parse_metadata()?;
        }
        self.expect_punct('{')?;

        let mut attributes = Map::new();
        let mut children = Vec::new();

        loop {
            match self.peek() {
                None => return Err(ParseError::UnclosedBlock(start_line)),
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Punct(';')) => {
                    self.pos += 1;
                }
                Some(Token::Ident(word)) if SPECIFIERS.contains(&word.as_str()) => {
                    children.push(self.parse_block()?);
                }
                Some(Token::Ident(_)) => {
                    let (key, value) = self.parse_assignment()?;
                    attributes.insert(key, value);
                }
                Some(other) => {
                    let message = format!("Unexpected {} in prim {}", other.describe(), name);
                    return self.error(message);
                }
            }
        }

        log::trace!("Parsed {} {} \"{}\"", specifier, prim_type.as_deref().unwrap_or(""), name);

        let mut node = Map::new();
        node.insert("def".to_string(), Value::String(specifier));
        if let Some(prim_type) = prim_type {
            node.insert("type".to_string(), Value::String(prim_type));
        }
        node.insert("name".to_string(), Value::String(name));
        node.insert("attributes".to_string(), Value::Object(attributes));
        node.insert("children".to_string(), Value::Array(children));
        Ok(Value::Object(node))
    }

    /// Parse `[qualifiers] type[[]] name [= value] [(metadata)]`.
    ///
    /// A declaration without a value maps to `null`.
    fn parse_assignment(&mut self) -> ParseResult<(String, Value)> {
        let mut word = self.expect_ident()?;
        while QUALIFIERS.contains(&word.as_str()) {
            word = self.expect_ident()?;
        }

        if self.eat_punct('[') {
            self.expect_punct(']')?;
        }

        // `type name` or, for untyped metadata-like statements, just `name`
        let key = match self.peek() {
            Some(Token::Ident(_)) => self.expect_ident()?,
            _ => word,
        };

        let value = if self.eat_punct('=') {
            if self.at_punct('{') {
                return self.error(format!("Dictionary values are not supported ({})", key));
            }
            self.parse_value()?
        } else {
            Value::Null
        };

        if self.at_punct('(') {
            self.parse_metadata()?;
        }

        Ok((key, value))
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        let (line, token) = self.next()?;
        match token {
            Token::Str(text) | Token::Asset(text) => Ok(Value::String(text)),
            Token::Reference(target) => {
                let mut reference = Map::new();
                reference.insert("ref".to_string(), Value::String(target));
                Ok(Value::Object(reference))
            }
            Token::Number(text) => parse_number(&text, line),
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                "None" => Ok(Value::Null),
                _ => error_at(line, format!("Unexpected value '{}'", word)),
            },
            Token::Punct(open @ ('[' | '(')) => {
                let close = if open == '[' { ']' } else { ')' };
                let mut items = Vec::new();
                loop {
                    if self.eat_punct(close) {
                        break;
                    }
                    items.push(self.parse_value()?);
                    if !self.eat_punct(',') {
                        self.expect_punct(close)?;
                        break;
                    }
                }
                Ok(Value::Array(items))
            }
            other => error_at(line, format!("Expected a value, found {}", other.describe())),
        }
    }
}

fn error_at<T>(line: usize, message: impl Into<String>) -> ParseResult<T> {
    Err(ParseError::Parse {
        line,
        message: message.into(),
    })
}

fn parse_number(text: &str, line: usize) -> ParseResult<Value> {
    let invalid = || ParseError::InvalidNumber {
        line,
        text: text.to_string(),
    };

    if text.contains(['.', 'e', 'E']) {
        let value: f64 = text.parse().map_err(|_| invalid())?;
        Ok(Value::from(value))
    } else {
        let value: i64 = text.parse().map_err(|_| invalid())?;
        Ok(Value::from(value))
    }
}

/// Convert USDA text into its JSON layer document.
pub fn usda_to_json(content: &str) -> ParseResult<Value> {
    UsdaParser::new(content)?.parse_document()
}

/// Parse USDA text into a layer document.
pub fn parse_usda(content: &str) -> ParseResult<SceneNode> {
    Ok(serde_json::from_value(usda_to_json(content)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::node::{MaterialBinding, NodeType};
    use strata_math::Vec3;

    const PANEL: &str = r#"#usda 1.0
(
    defaultPrim = "World"
    upAxis = "Y"
    doc = """Two faces,
    one mesh"""
)

def Xform "World" (
    kind = "component"
)
{
    matrix4d xformOp:transform = ( (1, 0, 0, 0), (0, 1, 0, 0), (0, 0, 1, 0), (0, 0, 5, 1) )
    uniform token[] xformOpOrder = ["xformOp:transform"]

    def Mesh "Panel"
    {
        int[] faceVertexCounts = [4, 4]
        int[] faceVertexIndices = [0, 1, 2, 3, 3, 2, 5, 4]
        normal3f[] normals = [(0, 0, 1), (0, 0, 1), (0, 0, 1), (0, 0, 1), (0, 0, 1), (0, 0, 1)] (
            interpolation = "vertex"
        )
        point3f[] points = [(0, 0, 0), (2, 0, 0), (2, 1, 0), (0, 1, 0), (0, 2, 0), (2, 2, 0)]
        rel material:binding = </World/Looks/Grey>
    }

    def Scope "Looks"
    {
        def Material "Grey"
        {
            token outputs:surface.connect = </World/Looks/Grey/Surface.outputs:surface>

            def Shader "Surface"
            {
                uniform token info:id = "UsdPreviewSurface"
                color3f inputs:diffuseColor = (0.5, 0.5, 0.5)
                token outputs:surface
            }
        }
    }
}
"#;

    #[test]
    fn test_converter_json_shape() {
        let json = usda_to_json(PANEL).unwrap();

        assert_eq!(json["defaultPrim"], "World");
        let world = &json["children"][0];
        assert_eq!(world["def"], "def");
        assert_eq!(world["type"], "Xform");
        assert_eq!(world["name"], "World");
        assert_eq!(world["attributes"]["xformOpOrder"][0], "xformOp:transform");

        let panel = &world["children"][0];
        assert_eq!(panel["attributes"]["faceVertexCounts"], serde_json::json!([4, 4]));
        assert_eq!(
            panel["attributes"]["material:binding"],
            serde_json::json!({"ref": "</World/Looks/Grey>"})
        );

        // Integers stay integers, fractions become floats
        assert!(panel["attributes"]["faceVertexIndices"][0].is_i64());
        let shader = &world["children"][1]["children"][0]["children"][0];
        assert!(shader["attributes"]["inputs:diffuseColor"][0].is_f64());
        assert!(shader["attributes"]["outputs:surface"].is_null());
    }

    #[test]
    fn test_parse_into_scene_node() {
        let root = parse_usda(PANEL).unwrap();

        assert_eq!(root.default_prim.as_deref(), Some("World"));
        let world = root.child("World").unwrap();
        assert_eq!(world.node_type, NodeType::Xform);
        assert_eq!(world.attributes.transform.unwrap()[3][2], 5.0);

        let panel = root.find("World/Panel").unwrap();
        assert_eq!(panel.node_type, NodeType::Mesh);
        assert_eq!(panel.attributes.points.as_ref().unwrap().len(), 6);
        assert_eq!(
            panel.attributes.material_binding,
            Some(MaterialBinding::Ref {
                target: "</World/Looks/Grey>".to_string()
            })
        );

        let shader = root.find("World/Looks/Grey/Surface").unwrap();
        assert_eq!(shader.attributes.diffuse_color, Some(Vec3::splat(0.5)));
    }

    #[test]
    fn test_over_without_type() {
        let usda = r#"
over "World"
{
    over "Panel"
    {
        def GeomSubset "Lower"
        {
            uniform token elementType = "face"
            int[] indices = [0]
            rel material:binding = </World/Looks/Red>
        }
    }
}
"#;
        let root = parse_usda(usda).unwrap();

        let world = root.child("World").unwrap();
        assert_eq!(world.specifier.as_deref(), Some("over"));
        assert!(world.node_type.is_untyped());

        let subset = root.find("World/Panel/Lower").unwrap();
        assert_eq!(subset.node_type, NodeType::GeomSubset);
        assert_eq!(subset.attributes.indices, Some(vec![0]));
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(parse_number("42", 1).unwrap(), Value::from(42));
        assert_eq!(parse_number("-1.5e2", 1).unwrap(), Value::from(-150.0));
        assert!(matches!(
            parse_number("1.2.3", 7),
            Err(ParseError::InvalidNumber { line: 7, .. })
        ));
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        let usda = "def Xform \"World\"\n{\n    float x = ]\n}\n";
        match usda_to_json(usda) {
            Err(ParseError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("Expected parse error, got {:?}", other),
        }

        let unclosed = "def Xform \"World\"\n{\n    def Mesh \"Box\" {\n";
        assert!(matches!(usda_to_json(unclosed), Err(ParseError::UnclosedBlock(3))));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let usda = r#"def Mesh "Box" { int[] faceVertexIndices = ["a"] }"#;
        assert!(matches!(parse_usda(usda), Err(ParseError::Shape(_))));
    }

    #[test]
    fn test_dictionary_values_rejected() {
        let usda = r#"def Xform "World" {
    double3 xformOp:translate.timeSamples = { 1: (0, 0, 0) }
}"#;
        assert!(usda_to_json(usda).is_err());
    }
}
