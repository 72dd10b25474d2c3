//! Minimal pickle protocol-2 encoder
//!
//! Graphite-web consumes `find` and `render` responses as pickled Python
//! objects. Only the handful of shapes those responses need is supported:
//! `None`, booleans, integers, floats, strings, lists, and string-keyed
//! dicts.

/// A Python value to be pickled.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Insertion-ordered string-keyed mapping.
    Dict(Vec<(&'static str, Value)>),
}

// Protocol-2 opcodes.
const PROTO: u8 = 0x80;
const STOP: u8 = b'.';
const NONE: u8 = b'N';
const NEWTRUE: u8 = 0x88;
const NEWFALSE: u8 = 0x89;
const BININT: u8 = b'J';
const BININT1: u8 = b'K';
const LONG1: u8 = 0x8a;
const BINFLOAT: u8 = b'G';
const BINUNICODE: u8 = b'X';
const EMPTY_LIST: u8 = b']';
const EMPTY_DICT: u8 = b'}';
const MARK: u8 = b'(';
const APPENDS: u8 = b'e';
const SETITEMS: u8 = b'u';

/// Serialize a value as a protocol-2 pickle stream.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(PROTO);
    buf.push(2);
    write_value(&mut buf, value);
    buf.push(STOP);
    buf
}

fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::None => buf.push(NONE),
        Value::Bool(true) => buf.push(NEWTRUE),
        Value::Bool(false) => buf.push(NEWFALSE),
        Value::Int(v) => write_int(buf, *v),
        Value::Float(v) => {
            buf.push(BINFLOAT);
            buf.extend_from_slice(&v.to_be_bytes());
        }
        Value::Str(s) => {
            buf.push(BINUNICODE);
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        Value::List(items) => {
            buf.push(EMPTY_LIST);
            if !items.is_empty() {
                buf.push(MARK);
                for item in items {
                    write_value(buf, item);
                }
                buf.push(APPENDS);
            }
        }
        Value::Dict(pairs) => {
            buf.push(EMPTY_DICT);
            if !pairs.is_empty() {
                buf.push(MARK);
                for (key, item) in pairs {
                    write_value(buf, &Value::Str((*key).to_string()));
                    write_value(buf, item);
                }
                buf.push(SETITEMS);
            }
        }
    }
}

fn write_int(buf: &mut Vec<u8>, v: i64) {
    if (0..=255).contains(&v) {
        buf.push(BININT1);
        buf.push(v as u8);
    } else if let Ok(small) = i32::try_from(v) {
        buf.push(BININT);
        buf.extend_from_slice(&small.to_le_bytes());
    } else {
        // Minimal little-endian two's complement.
        let mut bytes = v.to_le_bytes().to_vec();
        let fill = if v < 0 { 0xff } else { 0x00 };
        while bytes.len() > 1 && bytes[bytes.len() - 1] == fill {
            let sign_ok = if v < 0 {
                bytes[bytes.len() - 2] & 0x80 != 0
            } else {
                bytes[bytes.len() - 2] & 0x80 == 0
            };
            if !sign_ok {
                break;
            }
            bytes.pop();
        }
        buf.push(LONG1);
        buf.push(bytes.len() as u8);
        buf.extend_from_slice(&bytes);
    }
}
