//! Reader and writer for the OpenStep (ASCII) property-list dialect used by
//! `project.pbxproj`.
//!
//! Dictionaries keep insertion order. On write, the root `objects` table is
//! grouped into `/* Begin <isa> section */` blocks sorted by isa, then id,
//! so re-serializing a parsed document is stable. Object ids are followed by
//! the same `/* name */` annotations Xcode writes; the reader skips them.

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PbxValue {
    String(String),
    Data(Vec<u8>),
    Array(Vec<PbxValue>),
    Dict(PbxDict),
}

impl PbxValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PbxValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<PbxValue>> {
        match self {
            PbxValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<PbxValue>> {
        match self {
            PbxValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PbxDict> {
        match self {
            PbxValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut PbxDict> {
        match self {
            PbxValue::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl From<&str> for PbxValue {
    fn from(s: &str) -> Self {
        PbxValue::String(s.to_string())
    }
}

impl From<String> for PbxValue {
    fn from(s: String) -> Self {
        PbxValue::String(s)
    }
}

impl From<PbxDict> for PbxValue {
    fn from(d: PbxDict) -> Self {
        PbxValue::Dict(d)
    }
}

/// Insertion-ordered dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PbxDict {
    entries: Vec<(String, PbxValue)>,
}

impl PbxDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&PbxValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PbxValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PbxValue::as_str)
    }

    pub fn get_dict(&self, key: &str) -> Option<&PbxDict> {
        self.get(key).and_then(PbxValue::as_dict)
    }

    pub fn get_dict_mut(&mut self, key: &str) -> Option<&mut PbxDict> {
        self.get_mut(key).and_then(PbxValue::as_dict_mut)
    }

    pub fn get_array(&self, key: &str) -> Option<&Vec<PbxValue>> {
        self.get(key).and_then(PbxValue::as_array)
    }

    pub fn get_array_mut(&mut self, key: &str) -> Option<&mut Vec<PbxValue>> {
        self.get_mut(key).and_then(PbxValue::as_array_mut)
    }

    /// Insert or replace in place. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PbxValue>) -> Option<PbxValue> {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<PbxValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Nested dictionary at `key`, created empty when absent.
    /// Returns `None` if the key holds something other than a dictionary.
    pub fn dict_entry(&mut self, key: &str) -> Option<&mut PbxDict> {
        if !self.contains_key(key) {
            self.entries.push((key.to_string(), PbxValue::Dict(PbxDict::new())));
        }
        self.get_dict_mut(key)
    }

    /// Nested array at `key`, created empty when absent.
    pub fn array_entry(&mut self, key: &str) -> Option<&mut Vec<PbxValue>> {
        if !self.contains_key(key) {
            self.entries.push((key.to_string(), PbxValue::Array(Vec::new())));
        }
        self.get_array_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PbxValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Parse an OpenStep property list.
pub fn parse(text: &str) -> Result<PbxValue, ParseError> {
    let mut parser = Parser {
        src: text.as_bytes(),
        pos: 0,
    };
    parser.skip_trivia()?;
    let value = parser.value()?;
    parser.skip_trivia()?;
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected trailing content"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> ParseError {
        let consumed = &self.src[..self.pos.min(self.src.len())];
        let line = consumed.iter().filter(|b| **b == b'\n').count() + 1;
        let column = consumed
            .iter()
            .rev()
            .take_while(|b| **b != b'\n')
            .count()
            + 1;
        ParseError {
            line,
            column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'*') => {
                    let start = self.pos;
                    self.pos += 2;
                    loop {
                        if self.pos + 1 >= self.src.len() {
                            self.pos = start;
                            return Err(self.error("unterminated block comment"));
                        }
                        if self.src[self.pos] == b'*' && self.src[self.pos + 1] == b'/' {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.src.get(self.pos + 1) == Some(&b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        self.skip_trivia()?;
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn value(&mut self) -> Result<PbxValue, ParseError> {
        self.skip_trivia()?;
        match self.peek() {
            Some(b'{') => self.dict().map(PbxValue::Dict),
            Some(b'(') => self.array().map(PbxValue::Array),
            Some(b'<') => self.data().map(PbxValue::Data),
            Some(b'"') | Some(b'\'') => self.quoted().map(PbxValue::String),
            Some(b) if is_unquoted_byte(b) => Ok(PbxValue::String(self.unquoted())),
            Some(b) => Err(self.error(format!("unexpected character '{}'", b as char))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn dict(&mut self) -> Result<PbxDict, ParseError> {
        self.pos += 1;
        let mut dict = PbxDict::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(dict);
                }
                None => return Err(self.error("unterminated dictionary")),
                _ => {}
            }
            let key = match self.value()? {
                PbxValue::String(s) => s,
                _ => return Err(self.error("dictionary key must be a string")),
            };
            self.expect(b'=')?;
            let value = self.value()?;
            self.expect(b';')?;
            dict.insert(key, value);
        }
    }

    fn array(&mut self) -> Result<Vec<PbxValue>, ParseError> {
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(items);
                }
                None => return Err(self.error("unterminated array")),
                _ => {}
            }
            items.push(self.value()?);
            self.skip_trivia()?;
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b')') => {}
                _ => return Err(self.error("expected ',' or ')' in array")),
            }
        }
    }

    fn data(&mut self) -> Result<Vec<u8>, ParseError> {
        self.pos += 1;
        let mut digits = Vec::new();
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b) if b.is_ascii_hexdigit() => {
                    digits.push(b);
                    self.pos += 1;
                }
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(_) => return Err(self.error("invalid character in data literal")),
                None => return Err(self.error("unterminated data literal")),
            }
        }
        if digits.len() % 2 != 0 {
            return Err(self.error("odd number of hex digits in data literal"));
        }
        Ok(digits
            .chunks(2)
            .map(|pair| (hex_val(pair[0]) << 4) | hex_val(pair[1]))
            .collect())
    }

    fn quoted(&mut self) -> Result<String, ParseError> {
        let quote = self.src[self.pos];
        let start = self.pos;
        self.pos += 1;
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string"));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.escape(&mut buf)?;
                }
                Some(b) => {
                    buf.push(b);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(buf).map_err(|_| self.error("string is not valid UTF-8"))
    }

    /// Decode one escape sequence; the cursor sits just past the backslash.
    fn escape(&mut self, buf: &mut Vec<u8>) -> Result<(), ParseError> {
        let escaped = self
            .peek()
            .ok_or_else(|| self.error("unterminated escape sequence"))?;
        match escaped {
            b'U' => {
                self.pos += 1;
                let unit = self.utf16_unit()?;
                let c = if (0xD800..0xDC00).contains(&unit) {
                    if self.src.get(self.pos..self.pos + 2) != Some(b"\\U".as_slice()) {
                        return Err(self.error("unpaired UTF-16 surrogate in \\U escape"));
                    }
                    self.pos += 2;
                    let low = self.utf16_unit()?;
                    char::decode_utf16([unit, low])
                        .next()
                        .and_then(Result::ok)
                        .ok_or_else(|| self.error("invalid UTF-16 surrogate pair in \\U escape"))?
                } else {
                    char::from_u32(u32::from(unit))
                        .ok_or_else(|| self.error("unpaired UTF-16 surrogate in \\U escape"))?
                };
                let mut utf8 = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                // Octal escapes above 0o177 name NeXTSTEP-encoded bytes.
                let byte = u8::try_from(value)
                    .ok()
                    .filter(u8::is_ascii)
                    .ok_or_else(|| self.error(format!("unsupported octal escape \\{value:o}")))?;
                buf.push(byte);
            }
            other => {
                self.pos += 1;
                buf.push(match other {
                    b'n' => b'\n',
                    b't' => b'\t',
                    b'r' => b'\r',
                    b'a' => 0x07,
                    b'b' => 0x08,
                    b'f' => 0x0c,
                    b'v' => 0x0b,
                    literal => literal,
                });
            }
        }
        Ok(())
    }

    fn utf16_unit(&mut self) -> Result<u16, ParseError> {
        let digits = self
            .src
            .get(self.pos..self.pos + 4)
            .filter(|d| d.iter().all(u8::is_ascii_hexdigit))
            .ok_or_else(|| self.error("\\U escape needs four hex digits"))?;
        let unit = digits
            .iter()
            .fold(0u16, |acc, d| (acc << 4) | u16::from(hex_val(*d)));
        self.pos += 4;
        Ok(unit)
    }

    fn unquoted(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !is_unquoted_byte(b) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}

fn is_unquoted_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'/' | b':' | b'.' | b'-' | b'+' | b'~')
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        _ => b - b'A' + 10,
    }
}

/// Serialize a document in Xcode's layout, including the UTF-8 marker line.
pub fn to_string(root: &PbxValue) -> String {
    to_string_named(root, None)
}

/// Like [`to_string`], naming the project in its configuration-list annotation.
pub fn to_string_named(root: &PbxValue, project_name: Option<&str>) -> String {
    let notes = Annotations::collect(root, project_name);
    let mut out = String::from("// !$*UTF8*$!\n");
    match root {
        PbxValue::Dict(dict) => write_root(&mut out, dict, &notes),
        other => write_value(&mut out, other, 0, &notes),
    }
    out.push('\n');
    out
}

/// Comment written after each occurrence of an object id.
#[derive(Debug)]
struct Annotations<'a>(BTreeMap<&'a str, String>);

static NO_ANNOTATIONS: Annotations<'static> = Annotations(BTreeMap::new());

impl<'a> Annotations<'a> {
    fn collect(root: &'a PbxValue, project_name: Option<&str>) -> Self {
        let mut names = BTreeMap::new();
        let Some(objects) = root.as_dict().and_then(|r| r.get_dict("objects")) else {
            return Self(names);
        };

        for (id, object) in objects.iter() {
            let Some(object) = object.as_dict() else {
                continue;
            };
            if let Some(name) = object_name(object) {
                names.insert(id, name);
            }
        }

        for (_, owner) in objects.iter() {
            let Some(owner) = owner.as_dict() else {
                continue;
            };
            let (Some(isa), Some(list)) = (owner.get_str("isa"), owner.get_str("buildConfigurationList"))
            else {
                continue;
            };
            let owner_name = match isa {
                "PBXProject" => project_name,
                _ => owner.get_str("name"),
            };
            let note = match owner_name {
                Some(name) => format!("Build configuration list for {isa} \"{name}\""),
                None => format!("Build configuration list for {isa}"),
            };
            names.insert(list, note);
        }

        let mut build_files = Vec::new();
        for (phase_id, phase) in objects.iter() {
            let (Some(phase), Some(phase_name)) = (phase.as_dict(), names.get(phase_id)) else {
                continue;
            };
            for file in phase.get_array("files").into_iter().flatten() {
                let Some(file) = file.as_str() else {
                    continue;
                };
                let file_name = objects
                    .get_dict(file)
                    .and_then(|f| f.get_str("fileRef"))
                    .and_then(|file_ref| names.get(file_ref));
                if let Some(file_name) = file_name {
                    build_files.push((file, format!("{file_name} in {phase_name}")));
                }
            }
        }
        names.extend(build_files);

        names.retain(|_, note| !note.contains("*/"));
        Self(names)
    }

    fn annotate(&self, out: &mut String, id: &str) {
        if let Some(note) = self.0.get(id) {
            let _ = write!(out, " /* {note} */");
        }
    }
}

fn object_name(object: &PbxDict) -> Option<String> {
    let name = object.get_str("name");
    let named = match object.get_str("isa")? {
        "PBXFileReference" | "PBXGroup" | "PBXVariantGroup" | "PBXReferenceProxy" => {
            name.or(object.get_str("path"))?
        }
        "PBXNativeTarget" | "PBXAggregateTarget" | "PBXLegacyTarget" | "XCBuildConfiguration" => {
            name?
        }
        "PBXProject" => "Project object",
        "PBXFrameworksBuildPhase" => "Frameworks",
        "PBXSourcesBuildPhase" => "Sources",
        "PBXResourcesBuildPhase" => "Resources",
        "PBXHeadersBuildPhase" => "Headers",
        "PBXShellScriptBuildPhase" => name.unwrap_or("ShellScript"),
        "PBXCopyFilesBuildPhase" => name.unwrap_or("CopyFiles"),
        isa @ ("PBXTargetDependency" | "PBXContainerItemProxy") => isa,
        _ => return None,
    };
    Some(named.to_string())
}

/// Values under these keys are ids Xcode leaves unannotated.
fn notes_for<'n>(key: &str, notes: &'n Annotations<'n>) -> &'n Annotations<'n> {
    match key {
        "remoteGlobalIDString" => &NO_ANNOTATIONS,
        _ => notes,
    }
}

fn write_root(out: &mut String, dict: &PbxDict, notes: &Annotations) {
    out.push_str("{\n");
    for (key, value) in dict.iter() {
        out.push('\t');
        write_string(out, key);
        out.push_str(" = ");
        match (key, value) {
            ("objects", PbxValue::Dict(objects)) => write_objects(out, objects, notes),
            _ => write_value(out, value, 1, notes),
        }
        out.push_str(";\n");
    }
    out.push('}');
}

fn write_objects(out: &mut String, objects: &PbxDict, notes: &Annotations) {
    let mut sections: BTreeMap<&str, Vec<(&str, &PbxValue)>> = BTreeMap::new();
    let mut loose: Vec<(&str, &PbxValue)> = Vec::new();
    for (id, object) in objects.iter() {
        match object.as_dict().and_then(|d| d.get_str("isa")) {
            Some(isa) => sections.entry(isa).or_default().push((id, object)),
            None => loose.push((id, object)),
        }
    }

    out.push_str("{\n");
    for (isa, mut entries) in sections {
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let _ = write!(out, "\n/* Begin {isa} section */\n");
        let inline = matches!(isa, "PBXBuildFile" | "PBXFileReference");
        for (id, object) in entries {
            write_object(out, id, object, inline, notes);
        }
        let _ = writeln!(out, "/* End {isa} section */");
    }
    loose.sort_by(|a, b| a.0.cmp(b.0));
    for (id, object) in loose {
        write_object(out, id, object, false, notes);
    }
    out.push('\t');
    out.push('}');
}

fn write_object(out: &mut String, id: &str, object: &PbxValue, inline: bool, notes: &Annotations) {
    out.push_str("\t\t");
    write_string(out, id);
    notes.annotate(out, id);
    out.push_str(" = ");
    if inline {
        write_inline(out, object, notes);
    } else {
        write_value(out, object, 2, notes);
    }
    out.push_str(";\n");
}

fn write_value(out: &mut String, value: &PbxValue, depth: usize, notes: &Annotations) {
    match value {
        PbxValue::String(s) => {
            write_string(out, s);
            notes.annotate(out, s);
        }
        PbxValue::Data(bytes) => write_data(out, bytes),
        PbxValue::Array(items) => {
            out.push_str("(\n");
            for item in items {
                indent(out, depth + 1);
                write_value(out, item, depth + 1, notes);
                out.push_str(",\n");
            }
            indent(out, depth);
            out.push(')');
        }
        PbxValue::Dict(dict) => {
            out.push_str("{\n");
            for (key, item) in dict.iter() {
                indent(out, depth + 1);
                write_string(out, key);
                out.push_str(" = ");
                write_value(out, item, depth + 1, notes_for(key, notes));
                out.push_str(";\n");
            }
            indent(out, depth);
            out.push('}');
        }
    }
}

fn write_inline(out: &mut String, value: &PbxValue, notes: &Annotations) {
    match value {
        PbxValue::String(s) => {
            write_string(out, s);
            notes.annotate(out, s);
        }
        PbxValue::Data(bytes) => write_data(out, bytes),
        PbxValue::Array(items) => {
            out.push('(');
            for item in items {
                write_inline(out, item, notes);
                out.push_str(", ");
            }
            out.push(')');
        }
        PbxValue::Dict(dict) => {
            out.push('{');
            for (key, item) in dict.iter() {
                write_string(out, key);
                out.push_str(" = ");
                write_inline(out, item, notes_for(key, notes));
                out.push_str("; ");
            }
            out.push('}');
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn write_data(out: &mut String, bytes: &[u8]) {
    out.push('<');
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out.push('>');
}

fn write_string(out: &mut String, s: &str) {
    if needs_quotes(s) {
        out.push('"');
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                c if u32::from(c) < 0x20 || c == '\u{7f}' => {
                    let _ = write!(out, "\\{:03o}", u32::from(c));
                }
                c => out.push(c),
            }
        }
        out.push('"');
    } else {
        out.push_str(s);
    }
}

fn needs_quotes(s: &str) -> bool {
    s.is_empty()
        || s.contains("//")
        || s.contains("/*")
        || !s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'/' | b':' | b'.'))
}
