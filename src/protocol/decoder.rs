//! Recursive-descent decoder for relay frames.
//!
//! # Frame layout
//!
//! ```text
//! [u32 BE total length, counts itself] [u8 compression flag] [payload]
//! payload = [str identifier] [3-byte type tag] [object]
//! ```
//!
//! Each object grammar consumes a known-shape prefix of the remaining bytes
//! and leaves the cursor on the next object. Bytes left over after the
//! top-level object are ignored.

use std::borrow::Cow;

use super::compression::{self, Compression};
use super::error::DecodeError;
use super::message::Message;
use super::object::{
    Array, FieldMap, HashKey, HashTable, Hdata, HdataKey, HdataRow, Info, InfoList, ObjectType,
    WireValue,
};
use crate::constants::{
    FRAME_HEADER_LEN, LENGTH_FIELD_LEN, MAX_FRAME_SIZE, MAX_NESTING_DEPTH, TYPE_TAG_LEN,
};

/// Decoder settings, passed explicitly instead of read from global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Log a summary of every decoded message at `trace` level.
    pub trace: bool,
    /// Deepest object nesting to follow before giving up.
    pub max_depth: usize,
    /// Largest payload a compressed frame may inflate to.
    pub max_payload: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            trace: false,
            max_depth: MAX_NESTING_DEPTH,
            max_payload: MAX_FRAME_SIZE,
        }
    }
}

/// Turns complete frames into [`Message`]s.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    config: DecoderConfig,
}

impl Decoder {
    /// Create a decoder with the given settings.
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Decode one complete frame, length prefix included.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] for a malformed header, a corrupt zlib
    /// stream, or an object that does not match its grammar.
    pub fn decode(&self, frame: &[u8]) -> Result<Message, DecodeError> {
        let mut header = Cursor::new(frame);
        let total_size = header.read_u32("frame length")?;
        let total = total_size as usize;
        if total < FRAME_HEADER_LEN {
            return Err(DecodeError::InvalidLength {
                context: "frame",
                length: i64::from(total_size),
            });
        }
        let compression = Compression::from_flag(header.read_u8("compression flag")?)?;
        let body = header.take(total - FRAME_HEADER_LEN, "frame payload")?;

        let payload: Cow<'_, [u8]> = match compression {
            Compression::None => Cow::Borrowed(body),
            Compression::Zlib => Cow::Owned(compression::inflate(body, self.config.max_payload)?),
        };

        let mut parser = Parser {
            cursor: Cursor::new(&payload),
            max_depth: self.config.max_depth,
        };
        let identifier = parser
            .cursor
            .read_string("message identifier")?
            .unwrap_or_default();
        let kind = parser.cursor.read_type("object type")?;
        let object = parser.object(kind, 0)?;

        if self.config.trace {
            log::trace!(
                "[Decoder] id={:?} type={} size={} compressed={} payload={} unread={}",
                identifier,
                kind,
                total_size,
                compression == Compression::Zlib,
                payload.len(),
                parser.cursor.remaining()
            );
        }

        Ok(Message {
            total_size,
            compressed: compression == Compression::Zlib,
            payload_size: payload.len(),
            identifier,
            object,
        })
    }
}

/// Read position over a byte slice.
#[derive(Debug)]
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fixed-size read; running out is [`DecodeError::Truncated`].
    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        let truncated = DecodeError::Truncated {
            context,
            needed: n,
            available: self.remaining(),
        };
        let end = self.pos.checked_add(n).ok_or_else(|| truncated.clone())?;
        let bytes = self.data.get(self.pos..end).ok_or(truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    /// Read of a length declared on the wire; running out is
    /// [`DecodeError::InvalidLength`].
    fn take_declared(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::InvalidLength {
                context,
                length: n as i64,
            });
        }
        self.take(n, context)
    }

    fn read_u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, context)?[0])
    }

    fn read_array4(&mut self, context: &'static str) -> Result<[u8; 4], DecodeError> {
        let bytes = self.take(LENGTH_FIELD_LEN, context)?;
        let mut out = [0u8; 4];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        self.read_array4(context).map(u32::from_be_bytes)
    }

    fn read_i32(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        self.read_array4(context).map(i32::from_be_bytes)
    }

    fn read_type(&mut self, context: &'static str) -> Result<ObjectType, DecodeError> {
        ObjectType::from_tag(self.take(TYPE_TAG_LEN, context)?)
    }

    /// Signed 32-bit element count; negative counts are rejected, and so
    /// are counts whose elements cannot fit in the bytes left.
    ///
    /// `min_element_len` is the smallest wire size of one element; it is
    /// taken as at least 1 so zero-width elements are still bounded.
    fn read_count(
        &mut self,
        context: &'static str,
        min_element_len: usize,
    ) -> Result<usize, DecodeError> {
        let count = self.read_i32(context)?;
        let invalid = DecodeError::InvalidLength {
            context,
            length: i64::from(count),
        };
        let count = usize::try_from(count).map_err(|_| invalid.clone())?;
        if count.saturating_mul(min_element_len.max(1)) > self.remaining() {
            return Err(invalid);
        }
        Ok(count)
    }

    /// `str`/`buf` body: -1 is null, 0 is empty, other negatives are invalid.
    fn read_sized(&mut self, context: &'static str) -> Result<Option<&'a [u8]>, DecodeError> {
        match self.read_i32(context)? {
            -1 => Ok(None),
            length if length < 0 => Err(DecodeError::InvalidLength {
                context,
                length: i64::from(length),
            }),
            length => self.take_declared(length as usize, context).map(Some),
        }
    }

    fn read_string(&mut self, context: &'static str) -> Result<Option<String>, DecodeError> {
        Ok(self
            .read_sized(context)?
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
    }

    /// `ptr`/`tim`/`lon` body: one length byte, then that many ASCII bytes.
    fn read_short(&mut self, context: &'static str) -> Result<String, DecodeError> {
        let length = self.read_u8(context)?;
        let bytes = self.take_declared(usize::from(length), context)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Object grammar over a cursor, with a nesting bound.
#[derive(Debug)]
struct Parser<'a> {
    cursor: Cursor<'a>,
    max_depth: usize,
}

impl Parser<'_> {
    fn object(&mut self, kind: ObjectType, depth: usize) -> Result<WireValue, DecodeError> {
        if depth > self.max_depth {
            return Err(DecodeError::NestingTooDeep(self.max_depth));
        }
        let value = match kind {
            ObjectType::Char => WireValue::Char(self.cursor.read_u8("char")?),
            ObjectType::Integer => WireValue::Integer(self.cursor.read_i32("integer")?),
            ObjectType::LongInteger => {
                WireValue::LongInteger(self.cursor.read_short("long integer")?)
            }
            ObjectType::String => WireValue::Str(self.cursor.read_string("string")?),
            ObjectType::Buffer => {
                WireValue::Buffer(self.cursor.read_sized("buffer")?.map(<[u8]>::to_vec))
            }
            ObjectType::Pointer => WireValue::Pointer(self.cursor.read_short("pointer")?),
            ObjectType::Time => WireValue::Time(self.cursor.read_short("time")?),
            ObjectType::HashTable => WireValue::HashTable(self.hashtable(depth)?),
            ObjectType::Hdata => WireValue::Hdata(self.hdata(depth)?),
            ObjectType::Info => WireValue::Info(Info {
                name: self.cursor.read_string("info name")?,
                value: self.cursor.read_string("info value")?,
            }),
            ObjectType::InfoList => WireValue::InfoList(self.infolist(depth)?),
            ObjectType::Array => WireValue::Array(self.array(depth)?),
        };
        Ok(value)
    }

    fn hashtable(&mut self, depth: usize) -> Result<HashTable, DecodeError> {
        let key_type = self.cursor.read_type("hashtable key type")?;
        let value_type = self.cursor.read_type("hashtable value type")?;
        if !key_type.is_hashable() {
            return Err(DecodeError::UnsupportedKeyType(key_type));
        }
        let count = self.cursor.read_count(
            "hashtable count",
            min_wire_len(key_type) + min_wire_len(value_type),
        )?;

        let mut table = HashTable::new(key_type, value_type);
        for _ in 0..count {
            let key = HashKey::from_value(self.object(key_type, depth + 1)?)
                .ok_or(DecodeError::UnsupportedKeyType(key_type))?;
            let value = self.object(value_type, depth + 1)?;
            table.insert(key, value);
        }
        Ok(table)
    }

    fn array(&mut self, depth: usize) -> Result<Array, DecodeError> {
        let element_type = self.cursor.read_type("array element type")?;
        let count = self
            .cursor
            .read_count("array count", min_wire_len(element_type))?;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.object(element_type, depth + 1)?);
        }
        Ok(Array {
            element_type,
            items,
        })
    }

    fn infolist(&mut self, depth: usize) -> Result<InfoList, DecodeError> {
        let name = self.cursor.read_string("infolist name")?;
        let count = self
            .cursor
            .read_count("infolist count", INFOLIST_ITEM_MIN_LEN)?;

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let field_count = self
                .cursor
                .read_count("infolist item count", INFOLIST_FIELD_MIN_LEN)?;
            let mut fields = FieldMap::with_capacity(field_count);
            for _ in 0..field_count {
                let field_name = self
                    .cursor
                    .read_string("infolist field name")?
                    .unwrap_or_default();
                let kind = self.cursor.read_type("infolist field type")?;
                fields.push(field_name, self.object(kind, depth + 1)?);
            }
            items.push(fields);
        }
        Ok(InfoList { name, items })
    }

    fn hdata(&mut self, depth: usize) -> Result<Hdata, DecodeError> {
        let hpath = self.cursor.read_string("hdata path")?.unwrap_or_default();
        let keys_raw = self.cursor.read_string("hdata keys")?.unwrap_or_default();
        let keys = HdataKey::parse_list(&keys_raw)?;
        let pointer_count = Hdata::pointer_count(&hpath);
        let row_len = pointer_count + keys.iter().map(|k| min_wire_len(k.kind)).sum::<usize>();
        let count = self.cursor.read_count("hdata count", row_len)?;

        let mut rows = Vec::with_capacity(count);
        for _ in 0..count {
            let mut pointers = Vec::with_capacity(pointer_count);
            for _ in 0..pointer_count {
                pointers.push(self.cursor.read_short("hdata pointer")?);
            }
            let mut fields = FieldMap::with_capacity(keys.len());
            for key in &keys {
                fields.push(key.name.clone(), self.object(key.kind, depth + 1)?);
            }
            rows.push(HdataRow { pointers, fields });
        }
        Ok(Hdata { hpath, keys, rows })
    }
}

/// Infolist item: its field count.
const INFOLIST_ITEM_MIN_LEN: usize = 4;

/// Infolist field: name length, type tag, smallest value.
const INFOLIST_FIELD_MIN_LEN: usize = 4 + TYPE_TAG_LEN + 1;

/// Fewest bytes an object of `kind` takes on the wire.
fn min_wire_len(kind: ObjectType) -> usize {
    match kind {
        ObjectType::Char | ObjectType::LongInteger | ObjectType::Pointer | ObjectType::Time => 1,
        ObjectType::Integer | ObjectType::String | ObjectType::Buffer => 4,
        ObjectType::Array => TYPE_TAG_LEN + 4,
        ObjectType::Info | ObjectType::InfoList => 8,
        ObjectType::HashTable => 2 * TYPE_TAG_LEN + 4,
        ObjectType::Hdata => 12,
    }
}
