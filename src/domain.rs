//! Domain records built from hdata rows.
//!
//! Conversions read fields by name and reject, rather than coerce, a field
//! of the wrong wire type. Optional fields fall back to empty values; the
//! fields that identify a record are required.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::dispatch::DispatchError;
use crate::protocol::{HdataRow, ObjectType, ValueError, WireValue};

/// One conversation context on the relay (channel, query, core buffer).
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    /// Last pointer of the row's path; stable key for the buffer.
    pub identity: String,
    /// Full name, e.g. `irc.libera.#rust`.
    pub full_name: String,
    /// Short name, e.g. `#rust`.
    pub short_name: String,
    /// Buffer title (channel topic).
    pub title: String,
    /// Buffer number as shown by the relay.
    pub number: i32,
    /// Whether the buffer has a nicklist.
    pub has_nicklist: bool,
    /// Buffer local variables (`plugin`, `name`, `nick`, ...).
    pub local_variables: HashMap<String, String>,
    /// Lines in the order the consumer appended them.
    pub lines: Vec<Line>,
}

impl Buffer {
    /// Build a buffer from a `listbuffers` / `_buffer_opened` row.
    pub fn from_row(row: &HdataRow) -> Result<Self, DispatchError> {
        let identity = row
            .identity()
            .ok_or(DispatchError::MissingPointerPath)?
            .to_string();
        let local_variables = match row.get("local_variables") {
            None => HashMap::new(),
            Some(value) => {
                let table = value.as_hashtable().map_err(field_type("local_variables"))?;
                table
                    .iter()
                    .filter_map(|(key, value)| {
                        let key = key.as_str()?;
                        let value = value.as_str().ok().flatten().unwrap_or_default();
                        Some((key.to_string(), value.to_string()))
                    })
                    .collect()
            }
        };

        Ok(Self {
            identity,
            full_name: required_str(row, "full_name")?,
            short_name: optional_str(row, "short_name")?,
            title: optional_str(row, "title")?,
            number: required(row, "number")?
                .as_integer()
                .map_err(field_type("number"))?,
            has_nicklist: flag(row, "nicklist")?,
            local_variables,
            lines: Vec::new(),
        })
    }

    /// Append a line to the buffer's history.
    pub fn push_line(&mut self, line: Line) {
        self.lines.push(line);
    }

    /// Name to show in a buffer list: short name if set, else full name.
    pub fn display_name(&self) -> &str {
        if self.short_name.is_empty() {
            &self.full_name
        } else {
            &self.short_name
        }
    }
}

/// One printed chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Identity of the owning buffer.
    pub buffer: String,
    /// When the line was printed.
    pub timestamp: DateTime<Utc>,
    /// Prefix column (usually the nick, with color codes).
    pub prefix: String,
    /// Message text.
    pub message: String,
    /// Whether the line passes the buffer's filters.
    pub displayed: bool,
    /// Whether the line is a highlight for the user.
    pub highlighted: bool,
    /// Line tags (`irc_privmsg`, `nick_alice`, ...).
    pub tags: Vec<String>,
}

impl Line {
    /// Build a line from a `listlines` / `_buffer_line_added` row.
    ///
    /// The owner comes from the row's `buffer` field, falling back to the
    /// first pointer of the row path.
    pub fn from_row(row: &HdataRow) -> Result<Self, DispatchError> {
        let buffer = match row.get("buffer") {
            Some(WireValue::Pointer(p) | WireValue::Str(Some(p))) if !p.is_empty() => p.clone(),
            Some(WireValue::Pointer(_) | WireValue::Str(_)) | None => row
                .pointers
                .first()
                .cloned()
                .ok_or(DispatchError::MissingPointerPath)?,
            Some(other) => {
                return Err(DispatchError::FieldType {
                    field: "buffer",
                    source: ValueError {
                        expected: ObjectType::Pointer,
                        actual: other.kind(),
                    },
                })
            }
        };

        let tags = match row.get("tags_array") {
            None => Vec::new(),
            Some(value) => value
                .as_array()
                .map_err(field_type("tags_array"))?
                .items
                .iter()
                .filter_map(|tag| tag.as_str().ok().flatten().map(str::to_string))
                .collect(),
        };

        Ok(Self {
            buffer,
            timestamp: timestamp(row, "date")?,
            prefix: optional_str(row, "prefix")?,
            message: optional_str(row, "message")?,
            displayed: flag(row, "displayed")?,
            highlighted: flag(row, "highlight")?,
            tags,
        })
    }
}

/// One nicklist row: a nick, or a group header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nick {
    /// Nick or group name.
    pub name: String,
    /// Mode prefix such as `@` or `+`.
    pub prefix: String,
    /// Color name for the nick.
    pub color: String,
    /// Whether this row is a group header rather than a user.
    pub is_group: bool,
    /// Whether the row is shown.
    pub visible: bool,
    /// Depth in the nick hierarchy.
    pub level: i32,
}

impl Nick {
    /// Build a nick from a `nicklist` / `_nicklist` row.
    pub fn from_row(row: &HdataRow) -> Result<Self, DispatchError> {
        Ok(Self {
            name: required_str(row, "name")?,
            prefix: optional_str(row, "prefix")?,
            color: optional_str(row, "color")?,
            is_group: flag(row, "group")?,
            visible: match row.get("visible") {
                None => true,
                Some(_) => flag(row, "visible")?,
            },
            level: match row.get("level") {
                None => 0,
                Some(value) => value.as_integer().map_err(field_type("level"))?,
            },
        })
    }
}

/// All nicklist rows of one buffer, groups included, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nicklist {
    /// Identity of the buffer the rows belong to.
    pub buffer: String,
    /// Rows in wire order.
    pub nicks: Vec<Nick>,
}

impl Nicklist {
    /// Addressable users, with group headers skipped.
    pub fn users(&self) -> impl Iterator<Item = &Nick> {
        self.nicks.iter().filter(|n| !n.is_group)
    }

    /// Group headers only.
    pub fn groups(&self) -> impl Iterator<Item = &Nick> {
        self.nicks.iter().filter(|n| n.is_group)
    }
}

fn field_type(field: &'static str) -> impl Fn(ValueError) -> DispatchError {
    move |source| DispatchError::FieldType { field, source }
}

fn required<'r>(row: &'r HdataRow, field: &'static str) -> Result<&'r WireValue, DispatchError> {
    row.get(field).ok_or(DispatchError::MissingField(field))
}

fn required_str(row: &HdataRow, field: &'static str) -> Result<String, DispatchError> {
    required(row, field)?
        .as_str_or_empty()
        .map(str::to_string)
        .map_err(field_type(field))
}

/// Missing and null both read as empty.
fn optional_str(row: &HdataRow, field: &'static str) -> Result<String, DispatchError> {
    match row.get(field) {
        None => Ok(String::new()),
        Some(value) => value
            .as_str_or_empty()
            .map(str::to_string)
            .map_err(field_type(field)),
    }
}

/// Boolean flags travel as `chr` (sometimes `int`); nonzero is true.
fn flag(row: &HdataRow, field: &'static str) -> Result<bool, DispatchError> {
    match row.get(field) {
        None => Ok(false),
        Some(WireValue::Char(c)) => Ok(*c != 0),
        Some(WireValue::Integer(i)) => Ok(*i != 0),
        Some(other) => Err(DispatchError::FieldType {
            field,
            source: ValueError {
                expected: ObjectType::Char,
                actual: other.kind(),
            },
        }),
    }
}

fn timestamp(row: &HdataRow, field: &'static str) -> Result<DateTime<Utc>, DispatchError> {
    let text = required(row, field)?.as_time().map_err(field_type(field))?;
    text.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| DispatchError::InvalidTimestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Array, FieldMap, HashKey, HashTable};

    fn row(pointers: &[&str], fields: Vec<(&str, WireValue)>) -> HdataRow {
        let mut map = FieldMap::default();
        for (name, value) in fields {
            map.push(name.to_string(), value);
        }
        HdataRow {
            pointers: pointers.iter().map(|p| (*p).to_string()).collect(),
            fields: map,
        }
    }

    fn s(text: &str) -> WireValue {
        WireValue::Str(Some(text.to_string()))
    }

    #[test]
    fn test_buffer_from_row() {
        let mut vars = HashTable::new(ObjectType::String, ObjectType::String);
        vars.insert(HashKey::Str(Some("plugin".into())), s("irc"));
        vars.insert(HashKey::Str(Some("nick".into())), s("alice"));

        let buffer = Buffer::from_row(&row(
            &["0x5581"],
            vec![
                ("number", WireValue::Integer(3)),
                ("full_name", s("irc.libera.#rust")),
                ("short_name", s("#rust")),
                ("type", WireValue::Integer(0)),
                ("nicklist", WireValue::Integer(1)),
                ("title", WireValue::Str(None)),
                ("local_variables", WireValue::HashTable(vars)),
            ],
        ))
        .unwrap();

        assert_eq!(buffer.identity, "0x5581");
        assert_eq!(buffer.number, 3);
        assert_eq!(buffer.display_name(), "#rust");
        assert_eq!(buffer.title, "");
        assert!(buffer.has_nicklist);
        assert_eq!(buffer.local_variables.get("nick").map(String::as_str), Some("alice"));
        assert!(buffer.lines.is_empty());
    }

    #[test]
    fn test_buffer_requires_identity_and_name() {
        let no_path = row(&[], vec![("full_name", s("x")), ("number", WireValue::Integer(1))]);
        assert_eq!(Buffer::from_row(&no_path), Err(DispatchError::MissingPointerPath));

        let no_name = row(&["b1"], vec![("number", WireValue::Integer(1))]);
        assert_eq!(
            Buffer::from_row(&no_name),
            Err(DispatchError::MissingField("full_name"))
        );
    }

    #[test]
    fn test_buffer_rejects_mistyped_number() {
        let bad = row(&["b1"], vec![("full_name", s("x")), ("number", s("1"))]);
        assert!(matches!(
            Buffer::from_row(&bad),
            Err(DispatchError::FieldType { field: "number", .. })
        ));
    }

    #[test]
    fn test_line_from_row() {
        let tags = WireValue::Array(Array {
            element_type: ObjectType::String,
            items: vec![s("irc_privmsg"), s("nick_bob")],
        });
        let line = Line::from_row(&row(
            &["b1", "own", "l9", "d9"],
            vec![
                ("buffer", WireValue::Pointer("0xbeef".into())),
                ("date", WireValue::Time("1700000000".into())),
                ("displayed", WireValue::Char(1)),
                ("highlight", WireValue::Char(0)),
                ("tags_array", tags),
                ("prefix", s("bob")),
                ("message", s("hi there")),
            ],
        ))
        .unwrap();

        assert_eq!(line.buffer, "0xbeef");
        assert_eq!(line.timestamp.timestamp(), 1_700_000_000);
        assert!(line.displayed);
        assert!(!line.highlighted);
        assert_eq!(line.tags, vec!["irc_privmsg", "nick_bob"]);
        assert_eq!(line.message, "hi there");
    }

    #[test]
    fn test_line_owner_falls_back_to_path() {
        let line = Line::from_row(&row(
            &["b7", "l1"],
            vec![("date", WireValue::Time("0".into())), ("message", s("m"))],
        ))
        .unwrap();
        assert_eq!(line.buffer, "b7");
    }

    #[test]
    fn test_line_invalid_timestamp() {
        let bad = row(&["b1"], vec![("date", WireValue::Time("yesterday".into()))]);
        assert_eq!(
            Line::from_row(&bad),
            Err(DispatchError::InvalidTimestamp("yesterday".into()))
        );
    }

    #[test]
    fn test_nick_from_row() {
        let nick = Nick::from_row(&row(
            &["b1", "n1"],
            vec![
                ("group", WireValue::Char(0)),
                ("visible", WireValue::Char(1)),
                ("level", WireValue::Integer(0)),
                ("name", s("alice")),
                ("color", s("lightgreen")),
                ("prefix", s("@")),
            ],
        ))
        .unwrap();
        assert_eq!(nick.name, "alice");
        assert_eq!(nick.prefix, "@");
        assert!(!nick.is_group);
        assert!(nick.visible);
    }

    #[test]
    fn test_nicklist_splits_users_and_groups() {
        let nick = |name: &str, is_group: bool| Nick {
            name: name.into(),
            prefix: String::new(),
            color: String::new(),
            is_group,
            visible: true,
            level: i32::from(is_group),
        };
        let list = Nicklist {
            buffer: "b1".into(),
            nicks: vec![nick("root", true), nick("alice", false), nick("bob", false)],
        };
        let users: Vec<_> = list.users().map(|n| n.name.as_str()).collect();
        assert_eq!(users, vec!["alice", "bob"]);
        assert_eq!(list.groups().count(), 1);
    }
}
