//! Typed pairing (`OuterMessage`) and remote-control (`RemoteMessage`)
//! messages, hand-rolled protobuf encode/decode over `wire.rs`.
//!
//! No generalized protobuf library is used: each type owns its own
//! `encode`/`decode` built directly on varints, tags, and length-delimited
//! sub-messages. Field numbers and tag bytes below MUST match the ones the
//! TV expects exactly; see the literal test vectors at the bottom of this
//! file.

use crate::error::{ProtocolError, Result};
use crate::wire::{
    decode_tag, decode_varint, encode_tag, encode_varint, skip_field, WIRE_TYPE_LENGTH_DELIMITED,
    WIRE_TYPE_VARINT,
};

/// One decoded field: its number, wire type, and the raw value bytes (the
/// varint itself, or the payload for a length-delimited field — the tag
/// and any length prefix are already stripped).
struct Field<'a> {
    number: u64,
    wire_type: u64,
    value: &'a [u8],
}

/// Splits `buf` into its top-level fields, tolerating and preserving
/// unknown field numbers so callers can skip what they don't recognize
/// without erroring.
fn decode_fields(buf: &[u8]) -> Result<Vec<Field<'_>>> {
    let mut fields = Vec::new();
    let mut i = 0;
    while i < buf.len() {
        let (number, wire_type, tag_len) = decode_tag(&buf[i..])?;
        if tag_len == 0 {
            return Err(ProtocolError::Decode("truncated field tag".into()));
        }
        i += tag_len;
        let rest = &buf[i..];

        let consumed = match skip_field(wire_type, rest)? {
            Some(consumed) => consumed,
            None => {
                // Wire type this protocol never uses (anything but
                // 0/1/2/5): skip it without erroring, per spec. We can no
                // longer locate the end of this field's value, so there's
                // no way to resume parsing further fields after it.
                break;
            }
        };

        let value = match wire_type {
            WIRE_TYPE_LENGTH_DELIMITED => {
                let (_, len_len) = decode_varint(rest)?;
                &rest[len_len..consumed]
            }
            _ => &rest[..consumed],
        };
        fields.push(Field {
            number,
            wire_type,
            value,
        });
        i += consumed;
    }
    Ok(fields)
}

fn field_varint(value: &[u8]) -> Result<u64> {
    let (v, len) = decode_varint(value)?;
    if len != value.len() {
        return Err(ProtocolError::Decode("malformed varint field".into()));
    }
    Ok(v)
}

fn field_string(value: &[u8]) -> Result<String> {
    String::from_utf8(value.to_vec())
        .map_err(|e| ProtocolError::Decode(format!("field is not valid UTF-8: {e}")))
}

fn encode_varint_field(out: &mut Vec<u8>, field_number: u64, value: u64) {
    out.extend(encode_tag(field_number, WIRE_TYPE_VARINT));
    out.extend(encode_varint(value));
}

fn encode_bytes_field(out: &mut Vec<u8>, field_number: u64, value: &[u8]) {
    out.extend(encode_tag(field_number, WIRE_TYPE_LENGTH_DELIMITED));
    out.extend(encode_varint(value.len() as u64));
    out.extend_from_slice(value);
}

fn encode_string_field(out: &mut Vec<u8>, field_number: u64, value: &str) {
    encode_bytes_field(out, field_number, value.as_bytes());
}

fn encode_message_field(out: &mut Vec<u8>, field_number: u64, nested: &[u8]) {
    encode_bytes_field(out, field_number, nested);
}

/// `model, vendor, unknown, version, package_name, app_version` at fields
/// 1..6. `unknown` has no known purpose beyond echoing the constant the
/// original app sends; this client always sends `1`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    pub model: String,
    pub vendor: String,
    pub unknown: u64,
    pub version: String,
    pub package_name: String,
    pub app_version: String,
}

impl DeviceInfo {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_string_field(&mut out, 1, &self.model);
        encode_string_field(&mut out, 2, &self.vendor);
        encode_varint_field(&mut out, 3, self.unknown);
        encode_string_field(&mut out, 4, &self.version);
        encode_string_field(&mut out, 5, &self.package_name);
        encode_string_field(&mut out, 6, &self.app_version);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut info = DeviceInfo {
            unknown: 1,
            ..Default::default()
        };
        for field in decode_fields(buf)? {
            match field.number {
                1 => info.model = field_string(field.value)?,
                2 => info.vendor = field_string(field.value)?,
                3 => info.unknown = field_varint(field.value)?,
                4 => info.version = field_string(field.value)?,
                5 => info.package_name = field_string(field.value)?,
                6 => info.app_version = field_string(field.value)?,
                _ => {} // unknown field, silently ignored
            }
        }
        Ok(info)
    }
}

/// `ProtoEncoding { type: 1, symbol_length: 2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtoEncoding {
    pub r#type: u64,
    pub symbol_length: u64,
}

impl ProtoEncoding {
    /// The encoding this client advertises and uses: `type=3, symbol_length=6`.
    pub const CLIENT: ProtoEncoding = ProtoEncoding {
        r#type: 3,
        symbol_length: 6,
    };

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint_field(&mut out, 1, self.r#type);
        encode_varint_field(&mut out, 2, self.symbol_length);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut enc = ProtoEncoding::default();
        for field in decode_fields(buf)? {
            match field.number {
                1 => enc.r#type = field_varint(field.value)?,
                2 => enc.symbol_length = field_varint(field.value)?,
                _ => {}
            }
        }
        Ok(enc)
    }
}

/// `PairingRequest { client_name: string=1, service_name: string=2, device_info: DeviceInfo=3 }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairingRequest {
    pub client_name: String,
    pub service_name: String,
    pub device_info: DeviceInfo,
}

impl PairingRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_string_field(&mut out, 1, &self.client_name);
        encode_string_field(&mut out, 2, &self.service_name);
        encode_message_field(&mut out, 3, &self.device_info.encode());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut req = PairingRequest::default();
        for field in decode_fields(buf)? {
            match field.number {
                1 => req.client_name = field_string(field.value)?,
                2 => req.service_name = field_string(field.value)?,
                3 => req.device_info = DeviceInfo::decode(field.value)?,
                _ => {}
            }
        }
        Ok(req)
    }
}

/// `Options { input_encodings: repeated=1, output_encodings: repeated=2, preferred_role: varint=3 }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Options {
    pub input_encodings: Vec<ProtoEncoding>,
    pub output_encodings: Vec<ProtoEncoding>,
    pub preferred_role: u64,
}

impl Options {
    /// What this client sends: a single input/output encoding of
    /// `type=3, symbol_length=6`, `preferred_role=1`.
    pub fn client_default() -> Self {
        Options {
            input_encodings: vec![ProtoEncoding::CLIENT],
            output_encodings: vec![ProtoEncoding::CLIENT],
            preferred_role: 1,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for enc in &self.input_encodings {
            encode_message_field(&mut out, 1, &enc.encode());
        }
        for enc in &self.output_encodings {
            encode_message_field(&mut out, 2, &enc.encode());
        }
        encode_varint_field(&mut out, 3, self.preferred_role);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut opts = Options::default();
        for field in decode_fields(buf)? {
            match field.number {
                1 => opts.input_encodings.push(ProtoEncoding::decode(field.value)?),
                2 => opts
                    .output_encodings
                    .push(ProtoEncoding::decode(field.value)?),
                3 => opts.preferred_role = field_varint(field.value)?,
                _ => {}
            }
        }
        Ok(opts)
    }
}

/// `Configuration { encoding: ProtoEncoding=1, client_role: varint=2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Configuration {
    pub encoding: ProtoEncoding,
    pub client_role: u64,
}

impl Configuration {
    pub fn client_default() -> Self {
        Configuration {
            encoding: ProtoEncoding::CLIENT,
            client_role: 1,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_message_field(&mut out, 1, &self.encoding.encode());
        encode_varint_field(&mut out, 2, self.client_role);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut conf = Configuration::default();
        for field in decode_fields(buf)? {
            match field.number {
                1 => conf.encoding = ProtoEncoding::decode(field.value)?,
                2 => conf.client_role = field_varint(field.value)?,
                _ => {}
            }
        }
        Ok(conf)
    }
}

/// `PairingSecret { secret: bytes=1 }`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PairingSecret {
    pub secret: Vec<u8>,
}

impl PairingSecret {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_bytes_field(&mut out, 1, &self.secret);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut secret = PairingSecret::default();
        for field in decode_fields(buf)? {
            if field.number == 1 {
                secret.secret = field.value.to_vec();
            }
        }
        Ok(secret)
    }
}

/// Which field the TV used as its "ack step" discriminator — the first
/// field tag present after the mandatory `protocol_version=2, status=200`
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OuterBody {
    PairingRequest(PairingRequest),
    Options(Options),
    Configuration(Configuration),
    Secret(PairingSecret),
    None,
}

/// Pairing-port message. `protocol_version` is always 2; `status` is 200
/// on every client outbound message (the TV uses 402 to signal a bad
/// secret).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterMessage {
    pub protocol_version: u64,
    pub status: u64,
    pub body: OuterBody,
}

impl OuterMessage {
    pub fn pairing_request(req: PairingRequest) -> Self {
        OuterMessage {
            protocol_version: 2,
            status: 200,
            body: OuterBody::PairingRequest(req),
        }
    }

    pub fn options(options: Options) -> Self {
        OuterMessage {
            protocol_version: 2,
            status: 200,
            body: OuterBody::Options(options),
        }
    }

    pub fn configuration(config: Configuration) -> Self {
        OuterMessage {
            protocol_version: 2,
            status: 200,
            body: OuterBody::Configuration(config),
        }
    }

    pub fn secret(secret: PairingSecret) -> Self {
        OuterMessage {
            protocol_version: 2,
            status: 200,
            body: OuterBody::Secret(secret),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint_field(&mut out, 1, self.protocol_version);
        encode_varint_field(&mut out, 2, self.status);
        match &self.body {
            OuterBody::PairingRequest(req) => encode_message_field(&mut out, 10, &req.encode()),
            OuterBody::Options(opts) => encode_message_field(&mut out, 20, &opts.encode()),
            OuterBody::Configuration(conf) => encode_message_field(&mut out, 30, &conf.encode()),
            OuterBody::Secret(secret) => encode_message_field(&mut out, 40, &secret.encode()),
            OuterBody::None => {}
        }
        out
    }

    /// Decodes a pairing-port frame, tolerating any additional fields the
    /// TV includes beyond the mandatory prefix.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut protocol_version = 0;
        let mut status = 0;
        let mut body = OuterBody::None;
        for field in decode_fields(buf)? {
            match field.number {
                1 => protocol_version = field_varint(field.value)?,
                2 => status = field_varint(field.value)?,
                10 => body = OuterBody::PairingRequest(PairingRequest::decode(field.value)?),
                20 => body = OuterBody::Options(Options::decode(field.value)?),
                30 => body = OuterBody::Configuration(Configuration::decode(field.value)?),
                40 => body = OuterBody::Secret(PairingSecret::decode(field.value)?),
                _ => {} // unknown field, ignored
            }
        }
        Ok(OuterMessage {
            protocol_version,
            status,
            body,
        })
    }
}

/// `RemoteConfigure { code1: varint=1, device_info: DeviceInfo=2 }` — the
/// same shape is used both for the client's initial configure and the
/// TV's acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteConfigure {
    pub code1: u64,
    pub device_info: DeviceInfo,
}

impl RemoteConfigure {
    /// The client's default `code1`; the spec notes any value works since
    /// the field is only echoed back.
    pub const DEFAULT_CODE1: u64 = 622;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint_field(&mut out, 1, self.code1);
        encode_message_field(&mut out, 2, &self.device_info.encode());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut configure = RemoteConfigure::default();
        for field in decode_fields(buf)? {
            match field.number {
                1 => configure.code1 = field_varint(field.value)?,
                2 => configure.device_info = DeviceInfo::decode(field.value)?,
                _ => {}
            }
        }
        Ok(configure)
    }
}

/// `PingRequest { id: varint=1 }` / `PingResponse { id: varint=1 }` share a
/// shape; kept as distinct types so callers can't accidentally reply to a
/// response or initiate a request (the client MUST NOT initiate pings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingRequest {
    pub id: u64,
}

impl PingRequest {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint_field(&mut out, 1, self.id);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut ping = PingRequest::default();
        for field in decode_fields(buf)? {
            if field.number == 1 {
                ping.id = field_varint(field.value)?;
            }
        }
        Ok(ping)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PingResponse {
    pub id: u64,
}

impl PingResponse {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint_field(&mut out, 1, self.id);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut pong = PingResponse::default();
        for field in decode_fields(buf)? {
            if field.number == 1 {
                pong.id = field_varint(field.value)?;
            }
        }
        Ok(pong)
    }
}

/// Android `KEYCODE_*` constants this client knows how to send. Not
/// exhaustive — anything else can still be sent as a raw `u32`.
pub mod keycode {
    pub const HOME: u32 = 3;
    pub const BACK: u32 = 4;
    pub const DPAD_UP: u32 = 19;
    pub const DPAD_DOWN: u32 = 20;
    pub const DPAD_LEFT: u32 = 21;
    pub const DPAD_RIGHT: u32 = 22;
    pub const DPAD_CENTER: u32 = 23;
    pub const POWER: u32 = 26;
    pub const VOLUME_UP: u32 = 24;
    pub const VOLUME_DOWN: u32 = 25;
    pub const SEARCH: u32 = 84;
    pub const PLAY_PAUSE: u32 = 85;
    pub const MUTE: u32 = 164;
}

/// Key event direction: `1` = down, `2` = up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down = 1,
    Up = 2,
}

/// `RemoteKeyInject { keycode: varint=1, direction: varint=2 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteKeyInject {
    pub keycode: u32,
    pub direction: KeyDirection,
}

impl RemoteKeyInject {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint_field(&mut out, 1, self.keycode as u64);
        encode_varint_field(&mut out, 2, self.direction as u64);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut keycode = 0u64;
        let mut direction = 1u64;
        for field in decode_fields(buf)? {
            match field.number {
                1 => keycode = field_varint(field.value)?,
                2 => direction = field_varint(field.value)?,
                _ => {}
            }
        }
        Ok(RemoteKeyInject {
            keycode: keycode as u32,
            direction: if direction == 2 {
                KeyDirection::Up
            } else {
                KeyDirection::Down
            },
        })
    }
}

/// Control-port message body. Only fields 1, 2, 8, 9, 10 carry meaning for
/// this client; anything else decodes to `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBody {
    Configure(RemoteConfigure),
    ConfigureAck(RemoteConfigure),
    PingRequest(PingRequest),
    PingResponse(PingResponse),
    KeyInject(RemoteKeyInject),
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub body: RemoteBody,
}

impl RemoteMessage {
    pub fn configure(configure: RemoteConfigure) -> Self {
        RemoteMessage {
            body: RemoteBody::Configure(configure),
        }
    }

    pub fn configure_ack(configure: RemoteConfigure) -> Self {
        RemoteMessage {
            body: RemoteBody::ConfigureAck(configure),
        }
    }

    pub fn ping_response(response: PingResponse) -> Self {
        RemoteMessage {
            body: RemoteBody::PingResponse(response),
        }
    }

    pub fn key_inject(inject: RemoteKeyInject) -> Self {
        RemoteMessage {
            body: RemoteBody::KeyInject(inject),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match &self.body {
            RemoteBody::Configure(c) => {
                let mut out = Vec::new();
                encode_message_field(&mut out, 1, &c.encode());
                out
            }
            RemoteBody::ConfigureAck(c) => {
                let mut out = Vec::new();
                encode_message_field(&mut out, 2, &c.encode());
                out
            }
            RemoteBody::PingRequest(p) => {
                let mut out = Vec::new();
                encode_message_field(&mut out, 8, &p.encode());
                out
            }
            RemoteBody::PingResponse(p) => {
                let mut out = Vec::new();
                encode_message_field(&mut out, 9, &p.encode());
                out
            }
            RemoteBody::KeyInject(k) => {
                let mut out = Vec::new();
                encode_message_field(&mut out, 10, &k.encode());
                out
            }
            RemoteBody::Other => Vec::new(),
        }
    }

    /// Decodes a control-port frame. The TV is free to include fields this
    /// client doesn't recognize; unknown field numbers decode to `Other`
    /// rather than erroring, per the "log and ignore" rule.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        for field in decode_fields(buf)? {
            let body = match field.number {
                1 => RemoteBody::Configure(RemoteConfigure::decode(field.value)?),
                2 => RemoteBody::ConfigureAck(RemoteConfigure::decode(field.value)?),
                8 => RemoteBody::PingRequest(PingRequest::decode(field.value)?),
                9 => RemoteBody::PingResponse(PingResponse::decode(field.value)?),
                10 => RemoteBody::KeyInject(RemoteKeyInject::decode(field.value)?),
                _ => continue,
            };
            return Ok(RemoteMessage { body });
        }
        Ok(RemoteMessage {
            body: RemoteBody::Other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_inject_matches_spec_literal_bytes() {
        let inject = RemoteKeyInject {
            keycode: 23,
            direction: KeyDirection::Down,
        };
        assert_eq!(inject.encode(), vec![0x08, 0x17, 0x10, 0x01]);
    }

    #[test]
    fn pairing_secret_matches_spec_literal_bytes() {
        let secret = PairingSecret {
            secret: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        assert_eq!(
            secret.encode(),
            vec![0x0A, 0x04, 0xDE, 0xAD, 0xBE, 0xEF]
        );
    }

    #[test]
    fn outer_message_pairing_request_starts_with_spec_prefix() {
        let msg = OuterMessage::pairing_request(PairingRequest {
            client_name: "atvremote".to_string(),
            service_name: "atvremote".to_string(),
            device_info: DeviceInfo::default(),
        });
        let encoded = msg.encode();
        assert_eq!(&encoded[..5], &[0x08, 0x02, 0x10, 0xC8, 0x01]);
        assert_eq!(encoded[5], 0x52);
    }

    #[test]
    fn remote_key_inject_roundtrip() {
        let inject = RemoteKeyInject {
            keycode: keycode::VOLUME_UP,
            direction: KeyDirection::Up,
        };
        let msg = RemoteMessage::key_inject(inject);
        let encoded = msg.encode();
        let decoded = RemoteMessage::decode(&encoded).unwrap();
        assert_eq!(
            decoded.body,
            RemoteBody::KeyInject(RemoteKeyInject {
                keycode: keycode::VOLUME_UP,
                direction: KeyDirection::Up,
            })
        );
    }

    #[test]
    fn ping_request_tag_is_0x42_and_response_is_0x4a() {
        let ping = RemoteMessage {
            body: RemoteBody::PingRequest(PingRequest { id: 1 }),
        };
        assert_eq!(ping.encode()[0], 0x42);

        let pong = RemoteMessage::ping_response(PingResponse { id: 1 });
        assert_eq!(pong.encode()[0], 0x4A);
    }

    #[test]
    fn ping_echo_preserves_id() {
        let request = RemoteMessage {
            body: RemoteBody::PingRequest(PingRequest { id: 42 }),
        };
        let encoded = request.encode();
        let decoded = RemoteMessage::decode(&encoded).unwrap();
        let id = match decoded.body {
            RemoteBody::PingRequest(p) => p.id,
            other => panic!("expected PingRequest, got {other:?}"),
        };
        let response = RemoteMessage::ping_response(PingResponse { id });
        let decoded_response = RemoteMessage::decode(&response.encode()).unwrap();
        assert_eq!(
            decoded_response.body,
            RemoteBody::PingResponse(PingResponse { id: 42 })
        );
    }

    #[test]
    fn unknown_field_is_skipped_and_later_fields_still_parse() {
        let mut buf = Vec::new();
        // unknown field 99, varint value 7
        encode_varint_field(&mut buf, 99, 7);
        // known field 8: ping request id=5
        encode_message_field(&mut buf, 8, &PingRequest { id: 5 }.encode());
        let decoded = RemoteMessage::decode(&buf).unwrap();
        assert_eq!(decoded.body, RemoteBody::PingRequest(PingRequest { id: 5 }));
    }

    #[test]
    fn device_info_roundtrip() {
        let info = DeviceInfo {
            model: "Shield".to_string(),
            vendor: "Nvidia".to_string(),
            unknown: 1,
            version: "11".to_string(),
            package_name: "atvremote".to_string(),
            app_version: "1.0".to_string(),
        };
        let decoded = DeviceInfo::decode(&info.encode()).unwrap();
        assert_eq!(decoded, info);
    }
}
