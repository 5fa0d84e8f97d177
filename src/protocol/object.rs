//! Wire object model.
//!
//! Every object on the wire is announced by a three-letter type tag and has a
//! payload whose shape is fully determined by that tag. [`WireValue`] is the
//! sum type over all of them; the typed accessors return a [`ValueError`]
//! instead of guessing when the caller asks for the wrong kind.

use std::collections::HashMap;
use std::fmt;

use super::error::DecodeError;

/// Three-letter object type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    /// `chr`: one signed byte.
    Char,
    /// `int`: 4-byte big-endian signed integer.
    Integer,
    /// `lon`: long integer sent as a short decimal string.
    LongInteger,
    /// `str`: length-prefixed string, may be null.
    String,
    /// `buf`: length-prefixed raw bytes, may be null.
    Buffer,
    /// `ptr`: short hex string.
    Pointer,
    /// `tim`: short decimal unix timestamp string.
    Time,
    /// `htb`: hashtable.
    HashTable,
    /// `hda`: hdata (rows sharing one schema).
    Hdata,
    /// `inf`: single name/value pair.
    Info,
    /// `inl`: infolist.
    InfoList,
    /// `arr`: array of one element type.
    Array,
}

impl ObjectType {
    /// Parse a three-byte type tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownTypeTag`] for anything that is not one of
    /// the twelve protocol tags.
    pub fn from_tag(tag: &[u8]) -> Result<Self, DecodeError> {
        match tag {
            b"chr" => Ok(Self::Char),
            b"int" => Ok(Self::Integer),
            b"lon" => Ok(Self::LongInteger),
            b"str" => Ok(Self::String),
            b"buf" => Ok(Self::Buffer),
            b"ptr" => Ok(Self::Pointer),
            b"tim" => Ok(Self::Time),
            b"htb" => Ok(Self::HashTable),
            b"hda" => Ok(Self::Hdata),
            b"inf" => Ok(Self::Info),
            b"inl" => Ok(Self::InfoList),
            b"arr" => Ok(Self::Array),
            other => Err(DecodeError::UnknownTypeTag(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// The three-letter wire tag.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Char => "chr",
            Self::Integer => "int",
            Self::LongInteger => "lon",
            Self::String => "str",
            Self::Buffer => "buf",
            Self::Pointer => "ptr",
            Self::Time => "tim",
            Self::HashTable => "htb",
            Self::Hdata => "hda",
            Self::Info => "inf",
            Self::InfoList => "inl",
            Self::Array => "arr",
        }
    }

    /// Whether values of this type may be used as hashtable keys.
    pub fn is_hashable(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::Integer
                | Self::LongInteger
                | Self::String
                | Self::Pointer
                | Self::Time
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Typed access to a [`WireValue`] of the wrong kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueError {
    /// Kind the caller asked for.
    pub expected: ObjectType,
    /// Kind actually held by the value.
    pub actual: ObjectType,
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {} object, found {}", self.expected, self.actual)
    }
}

impl std::error::Error for ValueError {}

/// A decoded wire object.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Single byte.
    Char(u8),
    /// 32-bit signed integer.
    Integer(i32),
    /// Long integer, kept as its decimal text.
    LongInteger(String),
    /// String; `None` is the null string, distinct from `Some("")`.
    Str(Option<String>),
    /// Raw bytes; `None` is the null buffer.
    Buffer(Option<Vec<u8>>),
    /// Pointer as hex digits, possibly empty.
    Pointer(String),
    /// Unix timestamp as decimal text.
    Time(String),
    /// Hashtable.
    HashTable(HashTable),
    /// Hdata.
    Hdata(Hdata),
    /// Info pair.
    Info(Info),
    /// Infolist.
    InfoList(InfoList),
    /// Array.
    Array(Array),
}

impl WireValue {
    /// The wire type of this value.
    pub fn kind(&self) -> ObjectType {
        match self {
            Self::Char(_) => ObjectType::Char,
            Self::Integer(_) => ObjectType::Integer,
            Self::LongInteger(_) => ObjectType::LongInteger,
            Self::Str(_) => ObjectType::String,
            Self::Buffer(_) => ObjectType::Buffer,
            Self::Pointer(_) => ObjectType::Pointer,
            Self::Time(_) => ObjectType::Time,
            Self::HashTable(_) => ObjectType::HashTable,
            Self::Hdata(_) => ObjectType::Hdata,
            Self::Info(_) => ObjectType::Info,
            Self::InfoList(_) => ObjectType::InfoList,
            Self::Array(_) => ObjectType::Array,
        }
    }

    fn mismatch(&self, expected: ObjectType) -> ValueError {
        ValueError {
            expected,
            actual: self.kind(),
        }
    }

    /// Byte of a `chr` value.
    pub fn as_char(&self) -> Result<u8, ValueError> {
        match self {
            Self::Char(c) => Ok(*c),
            other => Err(other.mismatch(ObjectType::Char)),
        }
    }

    /// Value of an `int`.
    pub fn as_integer(&self) -> Result<i32, ValueError> {
        match self {
            Self::Integer(i) => Ok(*i),
            other => Err(other.mismatch(ObjectType::Integer)),
        }
    }

    /// Decimal text of a `lon`.
    pub fn as_long_integer(&self) -> Result<&str, ValueError> {
        match self {
            Self::LongInteger(s) => Ok(s),
            other => Err(other.mismatch(ObjectType::LongInteger)),
        }
    }

    /// Content of a `str`, `None` for the null string.
    pub fn as_str(&self) -> Result<Option<&str>, ValueError> {
        match self {
            Self::Str(s) => Ok(s.as_deref()),
            other => Err(other.mismatch(ObjectType::String)),
        }
    }

    /// Content of a `str`, with the null string read as empty.
    pub fn as_str_or_empty(&self) -> Result<&str, ValueError> {
        self.as_str().map(Option::unwrap_or_default)
    }

    /// Content of a `buf`, `None` for the null buffer.
    pub fn as_buffer(&self) -> Result<Option<&[u8]>, ValueError> {
        match self {
            Self::Buffer(b) => Ok(b.as_deref()),
            other => Err(other.mismatch(ObjectType::Buffer)),
        }
    }

    /// Hex digits of a `ptr`.
    pub fn as_pointer(&self) -> Result<&str, ValueError> {
        match self {
            Self::Pointer(p) => Ok(p),
            other => Err(other.mismatch(ObjectType::Pointer)),
        }
    }

    /// Decimal text of a `tim`.
    pub fn as_time(&self) -> Result<&str, ValueError> {
        match self {
            Self::Time(t) => Ok(t),
            other => Err(other.mismatch(ObjectType::Time)),
        }
    }

    /// Borrow a hashtable.
    pub fn as_hashtable(&self) -> Result<&HashTable, ValueError> {
        match self {
            Self::HashTable(h) => Ok(h),
            other => Err(other.mismatch(ObjectType::HashTable)),
        }
    }

    /// Borrow an hdata.
    pub fn as_hdata(&self) -> Result<&Hdata, ValueError> {
        match self {
            Self::Hdata(h) => Ok(h),
            other => Err(other.mismatch(ObjectType::Hdata)),
        }
    }

    /// Take ownership of an hdata.
    pub fn into_hdata(self) -> Result<Hdata, ValueError> {
        match self {
            Self::Hdata(h) => Ok(h),
            other => Err(other.mismatch(ObjectType::Hdata)),
        }
    }

    /// Borrow an info pair.
    pub fn as_info(&self) -> Result<&Info, ValueError> {
        match self {
            Self::Info(i) => Ok(i),
            other => Err(other.mismatch(ObjectType::Info)),
        }
    }

    /// Borrow an infolist.
    pub fn as_infolist(&self) -> Result<&InfoList, ValueError> {
        match self {
            Self::InfoList(i) => Ok(i),
            other => Err(other.mismatch(ObjectType::InfoList)),
        }
    }

    /// Borrow an array.
    pub fn as_array(&self) -> Result<&Array, ValueError> {
        match self {
            Self::Array(a) => Ok(a),
            other => Err(other.mismatch(ObjectType::Array)),
        }
    }
}

/// Hashtable key. Only the scalar kinds can appear here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// `chr` key.
    Char(u8),
    /// `int` key.
    Integer(i32),
    /// `lon` key.
    LongInteger(String),
    /// `str` key.
    Str(Option<String>),
    /// `ptr` key.
    Pointer(String),
    /// `tim` key.
    Time(String),
}

impl HashKey {
    /// Convert a decoded scalar into a key; `None` for non-hashable kinds.
    pub fn from_value(value: WireValue) -> Option<Self> {
        match value {
            WireValue::Char(c) => Some(Self::Char(c)),
            WireValue::Integer(i) => Some(Self::Integer(i)),
            WireValue::LongInteger(s) => Some(Self::LongInteger(s)),
            WireValue::Str(s) => Some(Self::Str(s)),
            WireValue::Pointer(p) => Some(Self::Pointer(p)),
            WireValue::Time(t) => Some(Self::Time(t)),
            WireValue::Buffer(_)
            | WireValue::HashTable(_)
            | WireValue::Hdata(_)
            | WireValue::Info(_)
            | WireValue::InfoList(_)
            | WireValue::Array(_) => None,
        }
    }

    /// Text of a string key, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => s.as_deref(),
            _ => None,
        }
    }
}

/// Ordered hashtable. A repeated key overwrites the earlier value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct HashTable {
    /// Declared key type.
    pub key_type: ObjectType,
    /// Declared value type.
    pub value_type: ObjectType,
    entries: Vec<(HashKey, WireValue)>,
    /// Position of each key in `entries`.
    index: HashMap<HashKey, usize>,
}

impl HashTable {
    /// Empty table with the given declared types.
    pub fn new(key_type: ObjectType, value_type: ObjectType) -> Self {
        Self {
            key_type,
            value_type,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert, returning the replaced value for a repeated key.
    pub fn insert(&mut self, key: HashKey, value: WireValue) -> Option<WireValue> {
        if let Some(&position) = self.index.get(&key) {
            let slot = &mut self.entries[position].1;
            return Some(std::mem::replace(slot, value));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        None
    }

    /// Look up by key.
    pub fn get(&self, key: &HashKey) -> Option<&WireValue> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    /// Look up by string key.
    pub fn get_str(&self, key: &str) -> Option<&WireValue> {
        self.get(&HashKey::Str(Some(key.to_string())))
    }

    /// Entries in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &(HashKey, WireValue)> {
        self.entries.iter()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Array of values sharing one declared element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    /// Declared element type.
    pub element_type: ObjectType,
    /// Elements in wire order.
    pub items: Vec<WireValue>,
}

/// Single name/value pair (`inf`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    /// Info name.
    pub name: Option<String>,
    /// Info value.
    pub value: Option<String>,
}

/// Infolist (`inl`).
#[derive(Debug, Clone, PartialEq)]
pub struct InfoList {
    /// Infolist name.
    pub name: Option<String>,
    /// Items in wire order.
    pub items: Vec<FieldMap>,
}

/// Ordered name → value dictionary, as used by infolist items and hdata rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: Vec<(String, WireValue)>,
}

impl FieldMap {
    /// Empty map with room for `capacity` fields.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Append a field. Lookups return the first field with a given name.
    pub fn push(&mut self, name: String, value: WireValue) {
        self.fields.push((name, value));
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fields in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, WireValue)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One declared hdata field: `name:type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdataKey {
    /// Field name.
    pub name: String,
    /// Field type.
    pub kind: ObjectType,
}

impl HdataKey {
    /// Parse the comma-separated `name:type` schema of an hdata.
    ///
    /// An empty schema yields no keys.
    ///
    /// # Errors
    ///
    /// [`DecodeError::MalformedHdataKeys`] for a pair without `:`, and
    /// [`DecodeError::UnknownTypeTag`] for an unknown type.
    pub fn parse_list(keys: &str) -> Result<Vec<Self>, DecodeError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        keys.split(',')
            .map(|pair| {
                let (name, tag) = pair
                    .split_once(':')
                    .ok_or_else(|| DecodeError::MalformedHdataKeys(keys.to_string()))?;
                Ok(Self {
                    name: name.to_string(),
                    kind: ObjectType::from_tag(tag.as_bytes())?,
                })
            })
            .collect()
    }
}

/// One hdata row: its pointer path plus the declared fields.
#[derive(Debug, Clone, PartialEq)]
pub struct HdataRow {
    /// One pointer per hpath segment, outermost first.
    pub pointers: Vec<String>,
    /// Field values in declared order.
    pub fields: FieldMap,
}

impl HdataRow {
    /// Stable identity of the row: the last pointer of its path.
    pub fn identity(&self) -> Option<&str> {
        self.pointers.last().map(String::as_str)
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&WireValue> {
        self.fields.get(name)
    }
}

/// Hdata (`hda`): rows sharing one schema, tagged with their hpath.
#[derive(Debug, Clone, PartialEq)]
pub struct Hdata {
    /// Slash-separated class-name chain, e.g. `buffer/lines/line/line_data`.
    pub hpath: String,
    /// Declared row schema.
    pub keys: Vec<HdataKey>,
    /// Rows in wire order.
    pub rows: Vec<HdataRow>,
}

impl Hdata {
    /// Number of pointers each row carries for a given hpath.
    pub fn pointer_count(hpath: &str) -> usize {
        if hpath.is_empty() {
            0
        } else {
            hpath.split('/').count()
        }
    }

    /// Whether the hdata has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip_for_every_type() {
        for tag in [
            "chr", "int", "lon", "str", "buf", "ptr", "tim", "htb", "hda", "inf", "inl", "arr",
        ] {
            let kind = ObjectType::from_tag(tag.as_bytes()).unwrap();
            assert_eq!(kind.tag(), tag);
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(
            ObjectType::from_tag(b"zzz"),
            Err(DecodeError::UnknownTypeTag("zzz".to_string()))
        );
    }

    #[test]
    fn test_accessor_mismatch_is_an_error() {
        let value = WireValue::Integer(7);
        assert_eq!(value.as_integer(), Ok(7));
        assert_eq!(
            value.as_str(),
            Err(ValueError {
                expected: ObjectType::String,
                actual: ObjectType::Integer,
            })
        );
        assert!(value.into_hdata().is_err());
    }

    #[test]
    fn test_null_string_reads_as_empty() {
        let value = WireValue::Str(None);
        assert_eq!(value.as_str(), Ok(None));
        assert_eq!(value.as_str_or_empty(), Ok(""));
    }

    #[test]
    fn test_hashtable_last_write_wins_in_place() {
        let mut table = HashTable::new(ObjectType::String, ObjectType::Integer);
        table.insert(HashKey::Str(Some("a".into())), WireValue::Integer(1));
        table.insert(HashKey::Str(Some("b".into())), WireValue::Integer(2));
        let old = table.insert(HashKey::Str(Some("a".into())), WireValue::Integer(3));

        assert_eq!(old, Some(WireValue::Integer(1)));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_str("a"), Some(&WireValue::Integer(3)));
        let keys: Vec<_> = table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec![Some("a"), Some("b")]);
    }

    #[test]
    fn test_hashtable_large_table_keeps_order_and_lookups() {
        let mut table = HashTable::new(ObjectType::Integer, ObjectType::Char);
        for i in 0..100_000 {
            table.insert(HashKey::Integer(i), WireValue::Char(0));
        }
        // Rewrite every other key; positions must not move
        for i in (0..100_000).step_by(2) {
            table.insert(HashKey::Integer(i), WireValue::Char(1));
        }

        assert_eq!(table.len(), 100_000);
        assert_eq!(table.get(&HashKey::Integer(99_998)), Some(&WireValue::Char(1)));
        assert_eq!(table.get(&HashKey::Integer(99_999)), Some(&WireValue::Char(0)));
        assert_eq!(table.get(&HashKey::Integer(100_000)), None);
        assert!(table
            .iter()
            .enumerate()
            .all(|(i, (k, _))| *k == HashKey::Integer(i as i32)));
    }

    #[test]
    fn test_get_str_only_matches_string_keys() {
        let mut table = HashTable::new(ObjectType::Pointer, ObjectType::Integer);
        table.insert(HashKey::Pointer("abc".into()), WireValue::Integer(1));
        assert_eq!(table.get_str("abc"), None);
        assert_eq!(
            table.get(&HashKey::Pointer("abc".into())),
            Some(&WireValue::Integer(1))
        );
    }

    #[test]
    fn test_compound_values_are_not_keys() {
        let value = WireValue::Array(Array {
            element_type: ObjectType::Integer,
            items: vec![],
        });
        assert_eq!(HashKey::from_value(value), None);
        assert_eq!(
            HashKey::from_value(WireValue::Pointer("1a".into())),
            Some(HashKey::Pointer("1a".into()))
        );
    }

    #[test]
    fn test_parse_hdata_keys() {
        let keys = HdataKey::parse_list("number:int,full_name:str,local_variables:htb").unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].name, "number");
        assert_eq!(keys[2].kind, ObjectType::HashTable);
        assert!(HdataKey::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_hdata_keys_rejects_missing_type() {
        assert!(matches!(
            HdataKey::parse_list("number:int,full_name"),
            Err(DecodeError::MalformedHdataKeys(_))
        ));
    }

    #[test]
    fn test_pointer_count_follows_hpath_segments() {
        assert_eq!(Hdata::pointer_count("buffer"), 1);
        assert_eq!(Hdata::pointer_count("buffer/lines/line/line_data"), 4);
        assert_eq!(Hdata::pointer_count(""), 0);
    }

    #[test]
    fn test_row_identity_is_last_pointer() {
        let row = HdataRow {
            pointers: vec!["a1".into(), "b2".into(), "c3".into()],
            fields: FieldMap::default(),
        };
        assert_eq!(row.identity(), Some("c3"));
    }
}
