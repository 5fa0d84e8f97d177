//! Shared helpers for integration tests: build relay frames by hand and
//! stand up a fake relay on a local TCP port.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;

/// hdata field value.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Int(i32),
    Chr(u8),
    Str(&'a str),
    Ptr(&'a str),
    Tim(&'a str),
}

impl Value<'_> {
    fn write(self, out: &mut Vec<u8>) {
        match self {
            Self::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            Self::Chr(v) => out.push(v),
            Self::Str(s) => put_str(out, s),
            Self::Ptr(s) | Self::Tim(s) => {
                out.push(u8::try_from(s.len()).unwrap());
                out.extend_from_slice(s.as_bytes());
            }
        }
    }
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&i32::try_from(s.len()).unwrap().to_be_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Frame carrying one hdata object. `keys` is the wire key list
/// (`name:type,...`); each row is its pointer path plus values in key order.
pub fn hdata_frame(id: &str, hpath: &str, keys: &str, rows: &[(&[&str], &[Value<'_>])]) -> Vec<u8> {
    let mut payload = Vec::new();
    put_str(&mut payload, id);
    payload.extend_from_slice(b"hda");
    put_str(&mut payload, hpath);
    put_str(&mut payload, keys);
    payload.extend_from_slice(&i32::try_from(rows.len()).unwrap().to_be_bytes());
    for (pointers, values) in rows {
        for p in *pointers {
            Value::Ptr(p).write(&mut payload);
        }
        for v in *values {
            v.write(&mut payload);
        }
    }
    frame(&payload)
}

/// Uncompressed frame around a payload.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let total = u32::try_from(payload.len() + 5).unwrap();
    let mut out = total.to_be_bytes().to_vec();
    out.push(0);
    out.extend_from_slice(payload);
    out
}

/// Fixed two-buffer listing.
pub fn listbuffers_frame() -> Vec<u8> {
    hdata_frame(
        "listbuffers",
        "buffer",
        "number:int,full_name:str,short_name:str,nicklist:int,title:str",
        &[
            (
                &["0x1000"],
                &[
                    Value::Int(1),
                    Value::Str("core.weechat"),
                    Value::Str("weechat"),
                    Value::Int(0),
                    Value::Str("WeeChat"),
                ],
            ),
            (
                &["0x2000"],
                &[
                    Value::Int(2),
                    Value::Str("irc.libera.#rust"),
                    Value::Str("#rust"),
                    Value::Int(1),
                    Value::Str("Rust talk"),
                ],
            ),
        ],
    )
}

/// History for buffer 0x2000, newest first as the relay sends it.
pub fn listlines_frame() -> Vec<u8> {
    hdata_frame(
        "listlines",
        "buffer/lines/line/line_data",
        "date:tim,displayed:chr,prefix:str,message:str,buffer:ptr",
        &[
            (
                &["0x2000", "0xa", "0xb3", "0xc3"],
                &[
                    Value::Tim("1700000030"),
                    Value::Chr(1),
                    Value::Str("carol"),
                    Value::Str("third"),
                    Value::Ptr("0x2000"),
                ],
            ),
            (
                &["0x2000", "0xa", "0xb2", "0xc2"],
                &[
                    Value::Tim("1700000020"),
                    Value::Chr(1),
                    Value::Str("bob"),
                    Value::Str("second"),
                    Value::Ptr("0x2000"),
                ],
            ),
            (
                &["0x2000", "0xa", "0xb1", "0xc1"],
                &[
                    Value::Tim("1700000010"),
                    Value::Chr(1),
                    Value::Str("alice"),
                    Value::Str("first"),
                    Value::Ptr("0x2000"),
                ],
            ),
        ],
    )
}

/// Bind a listener on an ephemeral local port.
pub async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    (listener, address)
}

/// Read `count` newline-terminated command lines from the client.
pub async fn read_commands(reader: &mut BufReader<OwnedReadHalf>, count: usize) -> Vec<String> {
    let mut commands = Vec::with_capacity(count);
    for _ in 0..count {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        commands.push(line.trim_end().to_string());
    }
    commands
}
