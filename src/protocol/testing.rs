//! Test-only encoder for building relay frames.
//!
//! Mirrors the decoder grammar so tests can describe messages field by field
//! instead of hand-writing byte arrays.

use super::compression;

/// Appends wire objects to a byte buffer.
#[derive(Debug, Default)]
pub(crate) struct ObjectWriter {
    buf: Vec<u8>,
}

impl ObjectWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tag(&mut self, tag: &str) -> &mut Self {
        self.buf.extend_from_slice(tag.as_bytes());
        self
    }

    pub(crate) fn int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub(crate) fn chr(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// `str` object; `None` is written with the -1 null length.
    pub(crate) fn str(&mut self, value: Option<&str>) -> &mut Self {
        self.buf(value.map(str::as_bytes))
    }

    pub(crate) fn buf(&mut self, value: Option<&[u8]>) -> &mut Self {
        match value {
            None => self.int(-1),
            Some(bytes) => {
                self.int(i32::try_from(bytes.len()).expect("test string fits in i32"));
                self.raw(bytes)
            }
        }
    }

    /// One-byte length prefix form used by `ptr`, `tim` and `lon`.
    pub(crate) fn short(&mut self, value: &str) -> &mut Self {
        self.buf
            .push(u8::try_from(value.len()).expect("short string fits in u8"));
        self.raw(value.as_bytes())
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Typed hdata field value for [`hdata`].
#[derive(Debug, Clone, Copy)]
pub(crate) enum Field<'a> {
    Chr(u8),
    Int(i32),
    Str(Option<&'a str>),
    Ptr(&'a str),
    Tim(&'a str),
    StrArray(&'a [&'a str]),
    StrTable(&'a [(&'a str, &'a str)]),
}

impl Field<'_> {
    fn write(&self, w: &mut ObjectWriter) {
        match *self {
            Field::Chr(c) => {
                w.chr(c);
            }
            Field::Int(i) => {
                w.int(i);
            }
            Field::Str(s) => {
                w.str(s);
            }
            Field::Ptr(p) | Field::Tim(p) => {
                w.short(p);
            }
            Field::StrArray(items) => {
                w.tag("str").int(len_i32(items.len()));
                for item in items {
                    w.str(Some(*item));
                }
            }
            Field::StrTable(pairs) => {
                w.tag("str").tag("str").int(len_i32(pairs.len()));
                for (k, v) in pairs {
                    w.str(Some(*k)).str(Some(*v));
                }
            }
        }
    }
}

/// One hdata row for [`hdata`].
#[derive(Debug)]
pub(crate) struct Row<'a> {
    pointers: Vec<&'a str>,
    fields: Vec<Field<'a>>,
}

pub(crate) fn row<'a>(pointers: &[&'a str], fields: Vec<Field<'a>>) -> Row<'a> {
    Row {
        pointers: pointers.to_vec(),
        fields,
    }
}

/// Tagged hdata object. `keys` must declare the fields in the order given.
pub(crate) fn hdata(hpath: &str, keys: &str, rows: &[Row<'_>]) -> Vec<u8> {
    let mut w = ObjectWriter::new();
    w.tag("hda")
        .str(Some(hpath))
        .str(Some(keys))
        .int(len_i32(rows.len()));
    for row in rows {
        for pointer in &row.pointers {
            w.short(pointer);
        }
        for field in &row.fields {
            field.write(&mut w);
        }
    }
    w.into_bytes()
}

/// Uncompressed frame around a tagged object.
pub(crate) fn frame(id: Option<&str>, object: &[u8]) -> Vec<u8> {
    wrap(0, &payload(id, object))
}

/// zlib-compressed frame around a tagged object.
pub(crate) fn compressed_frame(id: Option<&str>, object: &[u8]) -> Vec<u8> {
    let compressed = compression::deflate(&payload(id, object)).expect("deflate");
    wrap(1, &compressed)
}

fn payload(id: Option<&str>, object: &[u8]) -> Vec<u8> {
    let mut w = ObjectWriter::new();
    w.str(id).raw(object);
    w.into_bytes()
}

fn wrap(flag: u8, payload: &[u8]) -> Vec<u8> {
    let total = u32::try_from(payload.len() + 5).expect("frame fits in u32");
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.extend_from_slice(&total.to_be_bytes());
    out.push(flag);
    out.extend_from_slice(payload);
    out
}

fn len_i32(len: usize) -> i32 {
    i32::try_from(len).expect("count fits in i32")
}
