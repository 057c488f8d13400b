//! Static metadata records
//!
//! `ClassInfo`, `MethodInfo` and `DataInfo` are created once at weave
//! time and never mutated after commit. Each knows how to render itself
//! as one tab-separated row of its append-only table and how to parse
//! that row back; the reader relies on the row format being stable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, TraceError};

use super::descriptor::Descriptor;
use super::event_type::EventType;

/// Instrumentation density applied to a class
///
/// A densely instrumented method can exceed the target runtime's maximum
/// method size; the weaver then retries at a reduced level. The registry
/// records which level actually succeeded so downstream analysis can
/// distinguish "never executed" from "not instrumented".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeavingLevel {
    /// Full instrumentation
    Normal,
    /// Array-store sites that only initialize a fresh array are skipped
    IgnoreArrayInitializer,
    /// Only method entry/exit sites are instrumented
    OnlyEntryExit,
}

impl WeavingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeavingLevel::Normal => "normal",
            WeavingLevel::IgnoreArrayInitializer => "ignore_array_initializer",
            WeavingLevel::OnlyEntryExit => "only_entry_exit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(WeavingLevel::Normal),
            "ignore_array_initializer" => Ok(WeavingLevel::IgnoreArrayInitializer),
            "only_entry_exit" => Ok(WeavingLevel::OnlyEntryExit),
            _ => Err(TraceError::CorruptMetadata {
                table: "classes".to_string(),
                reason: format!("unknown weaving level '{}'", s),
            }),
        }
    }
}

/// Insertion-ordered key→value attributes attached to a data id
///
/// The attribute text itself is free-form; only the key/value access
/// contract matters here. Keys are unique; a repeated `put` overwrites
/// in place, preserving the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs
    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        let mut attrs = Self::new();
        for (k, v) in pairs {
            attrs.put(k, v);
        }
        attrs
    }

    /// Insert or overwrite a key
    pub fn put<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `key=value,key=value`. Tabs, newlines and commas inside
    /// values are replaced with spaces; the table format reserves them.
    pub fn to_table_field(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", sanitize(k), sanitize(v)))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse the `key=value,key=value` table field
    pub fn from_table_field(field: &str) -> Self {
        let mut attrs = Self::new();
        if field.is_empty() {
            return attrs;
        }
        for pair in field.split(',') {
            match pair.split_once('=') {
                Some((k, v)) => attrs.put(k, v),
                None => attrs.put(pair, ""),
            }
        }
        attrs
    }
}

fn sanitize(s: &str) -> String {
    s.replace(['\t', '\n', '\r', ','], " ")
}

/// A class discovered during weaving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub class_id: i32,
    /// Directory or archive the class was loaded from
    pub container: String,
    /// File name within the container
    pub filename: String,
    pub class_name: String,
    pub weaving_level: WeavingLevel,
    /// Hex-encoded content hash of the pre-weave bytes; disambiguates
    /// same-named classes loaded by different loaders during one run
    pub content_hash: String,
    pub loader_ident: String,
}

impl ClassInfo {
    /// Content hash of pre-weave class bytes
    pub fn content_hash_of(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub(crate) fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.class_id,
            sanitize(&self.container),
            sanitize(&self.filename),
            sanitize(&self.class_name),
            self.weaving_level.as_str(),
            self.content_hash,
            sanitize(&self.loader_ident),
        )
    }

    pub(crate) fn from_row(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return Err(TraceError::CorruptMetadata {
                table: "classes".to_string(),
                reason: format!("expected 7 fields, found {}", fields.len()),
            });
        }
        Ok(Self {
            class_id: parse_id("classes", fields[0])?,
            container: fields[1].to_string(),
            filename: fields[2].to_string(),
            class_name: fields[3].to_string(),
            weaving_level: WeavingLevel::parse(fields[4])?,
            content_hash: fields[5].to_string(),
            loader_ident: fields[6].to_string(),
        })
    }
}

/// A method discovered during weaving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub class_id: i32,
    pub method_id: i32,
    pub class_name: String,
    pub method_name: String,
    pub method_desc: String,
    pub access: u32,
    pub source_file_name: Option<String>,
}

impl MethodInfo {
    /// True for constructor bodies, whose frames the call-stack
    /// validator tolerates closing out of strict LIFO order
    pub fn is_constructor(&self) -> bool {
        self.method_name == "<init>"
    }

    pub(crate) fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.class_id,
            self.method_id,
            sanitize(&self.class_name),
            sanitize(&self.method_name),
            sanitize(&self.method_desc),
            self.access,
            self.source_file_name.as_deref().map(sanitize).unwrap_or_default(),
        )
    }

    pub(crate) fn from_row(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return Err(TraceError::CorruptMetadata {
                table: "methods".to_string(),
                reason: format!("expected 7 fields, found {}", fields.len()),
            });
        }
        Ok(Self {
            class_id: parse_id("methods", fields[0])?,
            method_id: parse_id("methods", fields[1])?,
            class_name: fields[2].to_string(),
            method_name: fields[3].to_string(),
            method_desc: fields[4].to_string(),
            access: fields[5].parse().map_err(|_| TraceError::CorruptMetadata {
                table: "methods".to_string(),
                reason: format!("bad access flags '{}'", fields[5]),
            })?,
            source_file_name: if fields[6].is_empty() {
                None
            } else {
                Some(fields[6].to_string())
            },
        })
    }
}

/// One instrumentation site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub class_id: i32,
    pub method_id: i32,
    /// Globally unique, monotonically increasing across the whole run
    pub data_id: i32,
    pub line: i32,
    pub instruction_index: i32,
    pub event_type: EventType,
    pub value_desc: Descriptor,
    pub attributes: Attributes,
}

impl DataInfo {
    pub(crate) fn to_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.data_id,
            self.class_id,
            self.method_id,
            self.line,
            self.instruction_index,
            self.event_type.as_str(),
            self.value_desc.code(),
            self.attributes.to_table_field(),
        )
    }

    pub(crate) fn from_row(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 8 {
            return Err(TraceError::CorruptMetadata {
                table: "dataids".to_string(),
                reason: format!("expected 8 fields, found {}", fields.len()),
            });
        }
        let desc_field = fields[6];
        let mut chars = desc_field.chars();
        let code = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(TraceError::CorruptMetadata {
                    table: "dataids".to_string(),
                    reason: format!("bad descriptor field '{}'", desc_field),
                })
            }
        };
        Ok(Self {
            data_id: parse_id("dataids", fields[0])?,
            class_id: parse_id("dataids", fields[1])?,
            method_id: parse_id("dataids", fields[2])?,
            line: parse_id("dataids", fields[3])?,
            instruction_index: parse_id("dataids", fields[4])?,
            event_type: fields[5].parse()?,
            value_desc: Descriptor::from_code(code)?,
            attributes: Attributes::from_table_field(fields[7]),
        })
    }
}

/// Number of declared parameters in a JVM method descriptor
///
/// Counts the types between the parentheses of e.g. `(I[JLjava/lang/String;)V`.
/// Malformed descriptors yield the count of whatever parsed cleanly
/// rather than an error; the caller treats the count as a hint.
pub fn descriptor_param_count(desc: &str) -> usize {
    let params = match desc.strip_prefix('(').and_then(|d| d.split_once(')')) {
        Some((params, _)) => params,
        None => return 0,
    };
    let bytes = params.as_bytes();
    let mut i = 0;
    let mut count = 0;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i] == b'[' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b'L' {
            while i < bytes.len() && bytes[i] != b';' {
                i += 1;
            }
        }
        i += 1;
        count += 1;
    }
    count
}

fn parse_id(table: &str, field: &str) -> Result<i32> {
    field.parse().map_err(|_| TraceError::CorruptMetadata {
        table: table.to_string(),
        reason: format!("bad numeric field '{}'", field),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_ordered_access() {
        let mut attrs = Attributes::new();
        attrs.put("desc", "(IJ)V");
        attrs.put("name", "compute");
        attrs.put("desc", "(I)V"); // overwrite keeps position

        assert_eq!(attrs.get("desc"), Some("(I)V"));
        assert_eq!(attrs.get("name"), Some("compute"));
        assert_eq!(attrs.get("missing"), None);

        let keys: Vec<&str> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["desc", "name"]);
    }

    #[test]
    fn test_attributes_table_round_trip() {
        let attrs = Attributes::from_pairs([("desc", "(II)I"), ("type", "int")]);
        let field = attrs.to_table_field();
        assert_eq!(field, "desc=(II)I,type=int");
        assert_eq!(Attributes::from_table_field(&field), attrs);
        assert!(Attributes::from_table_field("").is_empty());
    }

    #[test]
    fn test_class_row_round_trip() {
        let info = ClassInfo {
            class_id: 3,
            container: "build/classes".to_string(),
            filename: "com/example/Main.class".to_string(),
            class_name: "com/example/Main".to_string(),
            weaving_level: WeavingLevel::IgnoreArrayInitializer,
            content_hash: ClassInfo::content_hash_of(b"bytecode"),
            loader_ident: "app-loader".to_string(),
        };
        let parsed = ClassInfo::from_row(&info.to_row()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_method_row_round_trip() {
        let info = MethodInfo {
            class_id: 1,
            method_id: 9,
            class_name: "com/example/Main".to_string(),
            method_name: "<init>".to_string(),
            method_desc: "()V".to_string(),
            access: 0x0001,
            source_file_name: None,
        };
        let parsed = MethodInfo::from_row(&info.to_row()).unwrap();
        assert_eq!(parsed, info);
        assert!(parsed.is_constructor());
    }

    #[test]
    fn test_data_row_round_trip() {
        let info = DataInfo {
            class_id: 1,
            method_id: 2,
            data_id: 77,
            line: 41,
            instruction_index: 12,
            event_type: EventType::Call,
            value_desc: Descriptor::Object,
            attributes: Attributes::from_pairs([("desc", "(Ljava/lang/String;)V")]),
        };
        let parsed = DataInfo::from_row(&info.to_row()).unwrap();
        assert_eq!(parsed, info);
    }

    #[test]
    fn test_corrupt_rows_rejected() {
        assert!(ClassInfo::from_row("1\tonly\tfour\tfields").is_err());
        assert!(MethodInfo::from_row("x\t2\ta\tb\tc\t0\t").is_err());
        assert!(DataInfo::from_row("1\t2\t3\t4\t5\tno.such.event\tI\t").is_err());
    }

    #[test]
    fn test_descriptor_param_count() {
        assert_eq!(descriptor_param_count("()V"), 0);
        assert_eq!(descriptor_param_count("(I)V"), 1);
        assert_eq!(descriptor_param_count("(IJ)V"), 2);
        assert_eq!(descriptor_param_count("(Ljava/lang/String;I)V"), 2);
        assert_eq!(descriptor_param_count("([I[[Ljava/lang/Object;D)J"), 3);
        assert_eq!(descriptor_param_count("not-a-descriptor"), 0);
    }

    #[test]
    fn test_content_hash_stable() {
        let a = ClassInfo::content_hash_of(b"same");
        let b = ClassInfo::content_hash_of(b"same");
        let c = ClassInfo::content_hash_of(b"different");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
