//! Protobuf wire encoding
//!
//! Hand-encoded responses in the carbonzipper message shapes. The `protobuf`
//! format writes proto2-style unpacked repeated scalars; `protobuf3` packs
//! them. Field numbers:
//!
//! ```text
//! ListMetricsResponse { metrics = 1 }
//! GlobMatch           { path = 1, is_leaf = 2 }
//! GlobResponse        { name = 1, matches = 2 }
//! FetchResponse       { name = 1, start_time = 2, stop_time = 3,
//!                       step_time = 4, values = 5, is_absent = 6 }
//! MultiFetchResponse  { metrics = 1 }
//! Retention           { seconds_per_point = 1, number_of_points = 2 }
//! InfoResponse        { name = 1, aggregation_method = 2, max_retention = 3,
//!                       x_files_factor = 4, retentions = 5 }
//! ```

use crate::api::encode::MetricInfo;
use crate::fetch::PointVector;
use crate::glob::GlobMatch;

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LEN: u32 = 2;
const WIRE_FIXED32: u32 = 5;

fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let mut byte = (v & 0x7f) as u8;
        v >>= 7;
        if v != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if v == 0 {
            return;
        }
    }
}

fn put_key(buf: &mut Vec<u8>, field: u32, wire: u32) {
    put_varint(buf, u64::from(field << 3 | wire));
}

fn put_string(buf: &mut Vec<u8>, field: u32, s: &str) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// int32 encodes as a varint, sign-extended to 64 bits when negative.
fn put_int32(buf: &mut Vec<u8>, field: u32, v: i32) {
    put_key(buf, field, WIRE_VARINT);
    put_varint(buf, v as i64 as u64);
}

fn put_bool(buf: &mut Vec<u8>, field: u32, v: bool) {
    put_key(buf, field, WIRE_VARINT);
    buf.push(u8::from(v));
}

fn put_double(buf: &mut Vec<u8>, field: u32, v: f64) {
    put_key(buf, field, WIRE_FIXED64);
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_float(buf: &mut Vec<u8>, field: u32, v: f32) {
    put_key(buf, field, WIRE_FIXED32);
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_message(buf: &mut Vec<u8>, field: u32, body: &[u8]) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, body.len() as u64);
    buf.extend_from_slice(body);
}

/// ListMetricsResponse; identical on both protobuf variants.
pub fn list_response(metrics: &[String]) -> Vec<u8> {
    let mut buf = Vec::new();
    for metric in metrics {
        put_string(&mut buf, 1, metric);
    }
    buf
}

/// GlobResponse; identical on both protobuf variants.
pub fn glob_response(name: &str, matches: &[GlobMatch]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_string(&mut buf, 1, name);
    for m in matches {
        let mut body = Vec::new();
        put_string(&mut body, 1, &m.path);
        put_bool(&mut body, 2, m.is_leaf);
        put_message(&mut buf, 2, &body);
    }
    buf
}

fn fetch_response(metric: &PointVector, packed: bool) -> Vec<u8> {
    let mut body = Vec::new();
    put_string(&mut body, 1, &metric.name);
    put_int32(&mut body, 2, metric.start_time);
    put_int32(&mut body, 3, metric.stop_time);
    put_int32(&mut body, 4, metric.step_time);

    if packed {
        if !metric.values.is_empty() {
            put_key(&mut body, 5, WIRE_LEN);
            put_varint(&mut body, metric.values.len() as u64 * 8);
            for v in &metric.values {
                body.extend_from_slice(&v.to_le_bytes());
            }

            put_key(&mut body, 6, WIRE_LEN);
            put_varint(&mut body, metric.is_absent.len() as u64);
            for absent in &metric.is_absent {
                body.push(u8::from(*absent));
            }
        }
    } else {
        for v in &metric.values {
            put_double(&mut body, 5, *v);
        }
        for absent in &metric.is_absent {
            put_bool(&mut body, 6, *absent);
        }
    }
    body
}

/// MultiFetchResponse. `packed` selects the proto3 repeated-scalar layout.
pub fn multi_fetch_response(metrics: &[PointVector], packed: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    for metric in metrics {
        let body = fetch_response(metric, packed);
        put_message(&mut buf, 1, &body);
    }
    buf
}

/// InfoResponse; identical on both protobuf variants.
pub fn info_response(info: &MetricInfo) -> Vec<u8> {
    let mut buf = Vec::new();
    put_string(&mut buf, 1, &info.name);
    put_string(&mut buf, 2, &info.aggregation_method);
    put_int32(&mut buf, 3, info.max_retention);
    put_float(&mut buf, 4, info.x_files_factor);
    for r in &info.retentions {
        let mut body = Vec::new();
        put_int32(&mut body, 1, r.seconds_per_point);
        put_int32(&mut body, 2, r.number_of_points);
        put_message(&mut buf, 5, &body);
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::encode::InfoRetention;

    #[test]
    fn test_varint_boundaries() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 0);
        assert_eq!(buf, vec![0x00]);

        buf.clear();
        put_varint(&mut buf, 127);
        assert_eq!(buf, vec![0x7f]);

        buf.clear();
        put_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xac, 0x02]);
    }

    #[test]
    fn test_negative_int32_sign_extends() {
        let mut buf = Vec::new();
        put_int32(&mut buf, 2, -1);
        // key 0x10, then ten 0xff..0x01 varint bytes.
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf.len(), 11);
        assert_eq!(buf[10], 0x01);
    }

    #[test]
    fn test_list_response_bytes() {
        let encoded = list_response(&["a.b".to_string()]);
        assert_eq!(encoded, vec![0x0a, 3, b'a', b'.', b'b']);
    }

    #[test]
    fn test_glob_response_bytes() {
        let matches = vec![GlobMatch {
            path: "a".to_string(),
            is_leaf: true,
        }];
        let encoded = glob_response("a", &matches);
        assert_eq!(
            encoded,
            vec![
                0x0a, 1, b'a', // name
                0x12, 5, // matches[0], 5 bytes
                0x0a, 1, b'a', // path
                0x10, 1, // is_leaf = true
            ]
        );
    }

    fn sample_vector() -> PointVector {
        PointVector {
            name: "m".to_string(),
            start_time: 1,
            stop_time: 3,
            step_time: 1,
            values: vec![0.0, 2.5],
            is_absent: vec![true, false],
        }
    }

    #[test]
    fn test_fetch_response_unpacked() {
        let encoded = multi_fetch_response(&[sample_vector()], false);
        // metrics[0] header.
        assert_eq!(encoded[0], 0x0a);
        let body = &encoded[2..];
        // Two unpacked doubles under field 5 / fixed64.
        assert_eq!(body.iter().filter(|&&b| b == 0x29).count(), 2);
        // Two unpacked bools under field 6 / varint (0x30 01, 0x30 00).
        let bools: Vec<usize> = body
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == 0x30)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(bools.len(), 2);
        assert_eq!(body[bools[0] + 1], 1);
        assert_eq!(body[bools[1] + 1], 0);
    }

    #[test]
    fn test_fetch_response_packed() {
        let encoded = multi_fetch_response(&[sample_vector()], true);
        let body = &encoded[2..];
        // Packed doubles: key 0x2a, length 16.
        let at = body.iter().position(|&b| b == 0x2a).unwrap();
        assert_eq!(body[at + 1], 16);
        assert_eq!(&body[at + 2..at + 10], &0.0f64.to_le_bytes());
        assert_eq!(&body[at + 10..at + 18], &2.5f64.to_le_bytes());
        // Packed bools: key 0x32, length 2, values 1 0.
        assert_eq!(&body[at + 18..], &[0x32, 2, 1, 0]);
    }

    #[test]
    fn test_info_response_bytes() {
        let info = MetricInfo {
            name: "m".to_string(),
            aggregation_method: "average".to_string(),
            max_retention: 3600,
            x_files_factor: 0.5,
            retentions: vec![InfoRetention {
                seconds_per_point: 10,
                number_of_points: 360,
            }],
        };
        let encoded = info_response(&info);

        let mut expected = vec![0x0a, 1, b'm'];
        expected.extend_from_slice(&[0x12, 7, b'a', b'v', b'e', b'r', b'a', b'g', b'e']);
        // max_retention = 3600 varint.
        expected.extend_from_slice(&[0x18, 0x90, 0x1c]);
        // x_files_factor fixed32.
        expected.push(0x25);
        expected.extend_from_slice(&0.5f32.to_le_bytes());
        // retentions[0]: field 5 message, spp 10, points 360.
        expected.extend_from_slice(&[0x2a, 5, 0x08, 10, 0x10, 0xe8, 0x02]);
        assert_eq!(encoded, expected);
    }
}
