use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use xml::reader::{EventReader, XmlEvent};
use xml::ParserConfig;

use super::error::StructuralError;

/// Struct members, ordered by name so encoding is canonical.
pub type StructValue = BTreeMap<String, Value>;

/// A native value on either side of the wire.
///
/// The supported set is closed: strings, 32-bit integers, booleans, ordered
/// arrays, and string-keyed structs, nested without limit.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(String),
    Int(i32),
    Bool(bool),
    Array(Vec<Value>),
    Struct(StructValue),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Self {
        Value::Struct(v)
    }
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }
}

// Encoding emits the bare type-tagged fragment. Array entries and struct
// members wrap nested fragments in <value>; parameters hold the fragment
// directly.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(v) => {
                write!(f, "<string>")?;
                write_cdata(f, v)?;
                write!(f, "</string>")
            }
            Value::Int(v) => write!(f, "<int>{}</int>", v),
            Value::Bool(v) => write!(f, "<boolean>{}</boolean>", if *v { 1 } else { 0 }),
            Value::Array(items) => {
                write!(f, "<array><data>")?;
                for item in items {
                    write!(f, "<value>{}</value>", item)?;
                }
                write!(f, "</data></array>")
            }
            Value::Struct(members) => {
                write!(f, "<struct>")?;
                for (name, value) in members {
                    write!(f, "<member><name>{}</name><value>{}</value></member>", name, value)?;
                }
                write!(f, "</struct>")
            }
        }
    }
}

// Text goes out in a CDATA section; a literal "]]>" is split across two
// sections so the terminator never appears in the content.
fn write_cdata(f: &mut fmt::Formatter, text: &str) -> fmt::Result {
    write!(f, "<![CDATA[")?;
    let mut rest = text;
    while let Some(index) = rest.find("]]>") {
        f.write_str(&rest[..index + 2])?;
        write!(f, "]]><![CDATA[")?;
        rest = &rest[index + 2..];
    }
    f.write_str(rest)?;
    write!(f, "]]>")
}

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf8"?>"#;

/// A `methodCall` document: method name plus ordered parameters.
///
/// Built fresh per call and serialized once via `Display`. When the
/// parameter list is empty the `<params>` element is omitted entirely,
/// which some servers require.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Vec<Value>,
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}<methodCall><methodName>{}</methodName>",
            XML_HEADER, self.method
        )?;
        if !self.params.is_empty() {
            write!(f, "<params>")?;
            for param in &self.params {
                write!(f, "<param>{}</param>", param)?;
            }
            write!(f, "</params>")?;
        }
        write!(f, "</methodCall>")
    }
}

/// A classified `methodResponse` body.
#[derive(Clone, Debug, PartialEq)]
pub enum MethodResponse {
    /// The `<params>` branch, one decoded value per `<param>`.
    Params(Vec<Value>),
    /// The `<fault>` branch.
    Fault { code: i32, message: String },
}

/// Parses a raw `methodResponse` document and classifies it.
///
/// Exactly one `<params>` child is the success path. With no `<params>`,
/// exactly one `<fault>` holding a `<value><struct>` with `faultCode` and
/// `faultString` members is the fault path. Every other shape is rejected
/// with the full raw text attached for diagnosis.
pub fn parse_response(raw: &str) -> Result<MethodResponse, StructuralError> {
    parse_response_tree(raw).map_err(|err| match err {
        already @ StructuralError::BadResponse { .. } => already,
        other => StructuralError::BadResponse {
            reason: other.to_string(),
            raw: raw.to_owned(),
        },
    })
}

fn parse_response_tree(raw: &str) -> Result<MethodResponse, StructuralError> {
    let root = Tree::parse(raw.as_bytes())?;
    let children = match root {
        Tree::Node(_, children) => children,
        Tree::Leaf(_) => {
            return Err(StructuralError::malformed(
                "response document has no root element",
            ))
        }
    };

    let mut params = Vec::new();
    let mut faults = Vec::new();
    for child in children {
        if let Tree::Node(key, kids) = child {
            match key.as_str() {
                "params" => params.push(kids),
                "fault" => faults.push(kids),
                _ => {}
            }
        }
    }

    if params.len() == 1 {
        // A single params node wins even next to a stray fault node.
        return decode_params(params.pop().unwrap());
    }
    if !params.is_empty() {
        return Err(StructuralError::malformed(
            "response contains more than one params node",
        ));
    }
    if faults.len() == 1 {
        return decode_fault(faults.pop().unwrap());
    }
    Err(StructuralError::malformed(
        "response has neither a params node nor exactly one fault node",
    ))
}

fn decode_params(children: Vec<Tree>) -> Result<MethodResponse, StructuralError> {
    let mut values = Vec::new();
    for child in children {
        let mut kids = match child {
            Tree::Node(key, kids) => {
                if key != "param" {
                    return Err(StructuralError::malformed(format!(
                        "params may only contain param nodes, found '{}'",
                        key
                    )));
                }
                kids
            }
            Tree::Leaf(_) => {
                return Err(StructuralError::malformed(
                    "unexpected text between param nodes",
                ))
            }
        };
        if kids.len() != 1 {
            return Err(StructuralError::malformed(format!(
                "param must contain exactly one value, found {} children",
                kids.len()
            )));
        }
        // Length checked, so the pop cannot fail
        values.push(Value::decode(kids.pop().unwrap())?);
    }
    Ok(MethodResponse::Params(values))
}

fn decode_fault(mut children: Vec<Tree>) -> Result<MethodResponse, StructuralError> {
    if children.len() != 1 {
        return Err(StructuralError::malformed(
            "fault must contain exactly one value node",
        ));
    }
    let members = match Value::decode(children.pop().unwrap().peel("value")?)? {
        Value::Struct(members) => members,
        _ => {
            return Err(StructuralError::malformed(
                "fault value must hold a struct",
            ))
        }
    };
    let code = match members.get("faultCode") {
        Some(Value::Int(code)) => *code,
        _ => {
            return Err(StructuralError::malformed(
                "fault struct is missing an integer faultCode member",
            ))
        }
    };
    let message = match members.get("faultString") {
        Some(Value::String(message)) => message.clone(),
        _ => {
            return Err(StructuralError::malformed(
                "fault struct is missing a string faultString member",
            ))
        }
    };
    Ok(MethodResponse::Fault { code, message })
}

/// Recognized fragment tags. `Value` is the generic indirection that
/// unwraps to its single child and redispatches.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Tag {
    String,
    Int,
    Boolean,
    Array,
    Struct,
    Value,
}

impl Tag {
    fn from_name(name: &str) -> Option<Tag> {
        match name {
            "string" => Some(Tag::String),
            "int" => Some(Tag::Int),
            "boolean" => Some(Tag::Boolean),
            "array" => Some(Tag::Array),
            "struct" => Some(Tag::Struct),
            "value" => Some(Tag::Value),
            _ => None,
        }
    }
}

impl Value {
    /// Parses a single type-tagged fragment out of raw XML.
    pub fn parse<R: Read>(body: R) -> Result<Value, StructuralError> {
        Value::decode(Tree::parse(body)?)
    }

    pub(crate) fn decode(tree: Tree) -> Result<Value, StructuralError> {
        let (key, mut children) = match tree {
            Tree::Node(key, children) => (key, children),
            Tree::Leaf(_) => {
                return Err(StructuralError::malformed(
                    "expected a type-tagged element, found bare text",
                ))
            }
        };
        match Tag::from_name(&key) {
            None => Err(StructuralError::UnsupportedTag { tag: key }),
            Some(Tag::Value) => {
                if children.len() != 1 {
                    return Err(StructuralError::malformed(
                        "value node must contain exactly one child",
                    ));
                }
                // Length checked, so the pop cannot fail
                Value::decode(children.pop().unwrap())
            }
            Some(Tag::String) => scalar_text(&key, children).map(Value::String),
            Some(Tag::Int) => {
                let text = scalar_text(&key, children)?;
                match text.trim().parse() {
                    Ok(number) => Ok(Value::Int(number)),
                    Err(_) => Err(StructuralError::MalformedInt { text }),
                }
            }
            Some(Tag::Boolean) => {
                let text = scalar_text(&key, children)?;
                match text.trim().parse::<i32>() {
                    Ok(number) => Ok(Value::Bool(number != 0)),
                    Err(_) => Err(StructuralError::MalformedBoolean { text }),
                }
            }
            Some(Tag::Array) => decode_array(children),
            Some(Tag::Struct) => decode_struct(children),
        }
    }
}

fn scalar_text(key: &str, mut children: Vec<Tree>) -> Result<String, StructuralError> {
    if children.len() > 1 {
        return Err(StructuralError::malformed(format!(
            "node '{}' can't have more than one child",
            key
        )));
    }
    match children.pop() {
        None => Ok(String::new()),
        Some(Tree::Leaf(text)) => Ok(text),
        Some(Tree::Node(..)) => Err(StructuralError::malformed(format!(
            "node '{}' must contain just text",
            key
        ))),
    }
}

fn decode_array(children: Vec<Tree>) -> Result<Value, StructuralError> {
    let mut entries = None;
    for child in children {
        match child {
            Tree::Node(key, kids) => {
                if key != "data" {
                    return Err(StructuralError::malformed(format!(
                        "unexpected node '{}' inside array",
                        key
                    )));
                }
                if entries.replace(kids).is_some() {
                    return Err(StructuralError::malformed(
                        "array contains more than one data node",
                    ));
                }
            }
            Tree::Leaf(_) => {
                return Err(StructuralError::malformed("unexpected text inside array"))
            }
        }
    }
    let entries =
        entries.ok_or_else(|| StructuralError::malformed("array is missing its data node"))?;
    entries
        .into_iter()
        .map(|entry| {
            if let Tree::Node(key, _) = &entry {
                if key == "value" {
                    return Value::decode(entry);
                }
            }
            Err(StructuralError::malformed(
                "array entries must be wrapped in value nodes",
            ))
        })
        .collect::<Result<Vec<Value>, StructuralError>>()
        .map(Value::Array)
}

fn decode_struct(children: Vec<Tree>) -> Result<Value, StructuralError> {
    let mut members = StructValue::new();
    for child in children {
        let (name, value) = decode_member(child)?;
        // Duplicate member names are allowed on decode; the later one wins.
        members.insert(name, value);
    }
    Ok(Value::Struct(members))
}

fn decode_member(tree: Tree) -> Result<(String, Value), StructuralError> {
    let children = match tree {
        Tree::Node(key, children) => {
            if key != "member" {
                return Err(StructuralError::malformed(format!(
                    "struct may only contain member nodes, found '{}'",
                    key
                )));
            }
            children
        }
        Tree::Leaf(_) => {
            return Err(StructuralError::malformed("unexpected text inside struct"))
        }
    };

    let mut name = None;
    let mut value = None;
    for child in children {
        match child {
            Tree::Node(key, kids) => match key.as_str() {
                "name" => {
                    if name.replace(member_name(kids)?).is_some() {
                        return Err(StructuralError::malformed(
                            "struct member has more than one name",
                        ));
                    }
                }
                "value" => {
                    if value.replace(kids).is_some() {
                        return Err(StructuralError::malformed(
                            "struct member has more than one value",
                        ));
                    }
                }
                other => {
                    return Err(StructuralError::malformed(format!(
                        "unexpected node '{}' in struct member",
                        other
                    )))
                }
            },
            Tree::Leaf(_) => {
                return Err(StructuralError::malformed(
                    "unexpected text in struct member",
                ))
            }
        }
    }

    let name = name
        .ok_or_else(|| StructuralError::malformed("struct member is missing its name"))?;
    let mut fragments = value
        .ok_or_else(|| StructuralError::malformed("struct member is missing its value"))?;
    if fragments.len() != 1 {
        return Err(StructuralError::malformed(format!(
            "value of struct member '{}' must contain exactly one fragment",
            name
        )));
    }
    // Length checked, so the pop cannot fail
    Value::decode(fragments.pop().unwrap()).map(|value| (name, value))
}

fn member_name(mut children: Vec<Tree>) -> Result<String, StructuralError> {
    if children.len() > 1 {
        return Err(StructuralError::malformed(
            "struct member name can't have more than one child",
        ));
    }
    match children.pop() {
        None => Ok(String::new()),
        Some(Tree::Leaf(text)) => Ok(text),
        Some(Tree::Node(..)) => Err(StructuralError::malformed(
            "struct member name must be plain text",
        )),
    }
}

pub(crate) enum Tree {
    Leaf(String),
    Node(String, Vec<Tree>),
}

impl Tree {
    pub(crate) fn parse<R: Read>(body: R) -> Result<Tree, StructuralError> {
        let mut reader = ParserConfig::new()
            .cdata_to_characters(true)
            .create_reader(body);
        parse_tree(&mut reader)?
            .ok_or_else(|| StructuralError::malformed("XML data started with a closing tag"))
    }

    fn peel(self, name: &str) -> Result<Tree, StructuralError> {
        if let Tree::Node(key, mut children) = self {
            if key == name && children.len() == 1 {
                // Popping from a vector of length 1 cannot fail
                return Ok(children.pop().unwrap());
            }
        }
        Err(StructuralError::malformed(format!(
            "expected a node named '{}' with one child",
            name
        )))
    }
}

enum XmlNode {
    Open(String),
    Data(String),
    Close,
}

fn parse_tree<R: Read>(reader: &mut EventReader<R>) -> Result<Option<Tree>, StructuralError> {
    match next_node(reader)? {
        XmlNode::Close => Ok(None),
        XmlNode::Data(text) => Ok(Some(Tree::Leaf(text))),
        XmlNode::Open(name) => {
            let mut children = Vec::new();
            while let Some(child) = parse_tree(reader)? {
                children.push(child);
            }
            Ok(Some(Tree::Node(name, children)))
        }
    }
}

fn next_node<R: Read>(reader: &mut EventReader<R>) -> Result<XmlNode, StructuralError> {
    loop {
        match reader.next()? {
            XmlEvent::StartElement { name, .. } => return Ok(XmlNode::Open(name.local_name)),
            XmlEvent::Characters(text) => return Ok(XmlNode::Data(text)),
            XmlEvent::EndElement { .. } => return Ok(XmlNode::Close),
            XmlEvent::EndDocument => {
                return Err(StructuralError::malformed("unexpected end of XML document"))
            }
            _ => {}
        }
    }
}
