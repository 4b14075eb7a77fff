use thiserror::Error;

pub const FRAME_SIZE: usize = 9;

const INSERT_TYPE: u8 = b'I';
const QUERY_TYPE: u8 = b'Q';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPacket {
    Insert { timestamp: i32, price: i32 },
    Query { min_time: i32, max_time: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPacket {
    QueryResponse { mean_price: i32 },
}

impl ClientPacket {
    /// Decodes one frame: a type byte followed by two big-endian i32 fields.
    pub fn parse(frame: &[u8; FRAME_SIZE]) -> Result<ClientPacket, PacketError> {
        let field1 = read_i32(&frame[1..5]);
        let field2 = read_i32(&frame[5..9]);

        match frame[0] {
            INSERT_TYPE => Ok(ClientPacket::Insert {
                timestamp: field1,
                price: field2,
            }),
            QUERY_TYPE => Ok(ClientPacket::Query {
                min_time: field1,
                max_time: field2,
            }),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    #[cfg(test)]
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let (message_type, field1, field2) = match *self {
            ClientPacket::Insert { timestamp, price } => (INSERT_TYPE, timestamp, price),
            ClientPacket::Query { min_time, max_time } => (QUERY_TYPE, min_time, max_time),
        };

        let mut frame = [0; FRAME_SIZE];
        frame[0] = message_type;
        frame[1..5].copy_from_slice(&field1.to_be_bytes());
        frame[5..9].copy_from_slice(&field2.to_be_bytes());
        frame
    }
}

impl ServerPacket {
    pub fn to_bytes(&self) -> [u8; 4] {
        match self {
            ServerPacket::QueryResponse { mean_price } => encode_average(*mean_price),
        }
    }
}

pub fn encode_average(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

fn read_i32(data: &[u8]) -> i32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(data);
    i32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INT_BYTES: [(i32, [u8; 4]); 4] = [
        (12345, [0x00, 0x00, 0x30, 0x39]),
        (0, [0x00, 0x00, 0x00, 0x00]),
        (-12345, [0xff, 0xff, 0xcf, 0xc7]),
        (-1, [0xff, 0xff, 0xff, 0xff]),
    ];

    #[test]
    fn encode_average_is_big_endian_twos_complement() {
        for (value, bytes) in INT_BYTES {
            assert_eq!(encode_average(value), bytes);
        }
    }

    #[test]
    fn parse_insert() {
        let data = b"\x49\x00\x00\x30\x39\x00\x00\x00\x65";
        let result = ClientPacket::parse(data).unwrap();
        assert_eq!(
            result,
            ClientPacket::Insert {
                timestamp: 12345,
                price: 101
            }
        );
    }

    #[test]
    fn parse_query() {
        let data = b"\x51\x00\x00\x03\xe8\x00\x01\x86\xa0";
        let result = ClientPacket::parse(data).unwrap();
        assert_eq!(
            result,
            ClientPacket::Query {
                min_time: 1000,
                max_time: 100000
            }
        );
    }

    #[test]
    fn parse_negative_fields() {
        let data = b"\x49\xff\xff\xcf\xc7\xff\xff\xff\xff";
        let result = ClientPacket::parse(data).unwrap();
        assert_eq!(
            result,
            ClientPacket::Insert {
                timestamp: -12345,
                price: -1
            }
        );
    }

    #[test]
    fn parse_unknown_type_errors() {
        let data = b"\x58\x00\x00\x30\x39\x00\x00\x00\x65";
        assert_eq!(
            ClientPacket::parse(data),
            Err(PacketError::UnknownType(b'X'))
        );

        let data = b"\x69\x00\x00\x30\x39\x00\x00\x00\x65";
        assert!(ClientPacket::parse(data).is_err());
    }

    #[test]
    fn serialize_query_response() {
        let packet = ServerPacket::QueryResponse { mean_price: 101 };
        assert_eq!(packet.to_bytes(), *b"\x00\x00\x00\x65");
    }

    #[test]
    fn int32_extremes_survive_decoding() {
        for value in [i32::MIN, i32::MIN + 1, -1, 0, 1, i32::MAX - 1, i32::MAX] {
            let frame = ClientPacket::Query {
                min_time: value,
                max_time: value,
            }
            .to_bytes();
            assert_eq!(
                ClientPacket::parse(&frame).unwrap(),
                ClientPacket::Query {
                    min_time: value,
                    max_time: value
                }
            );
        }
    }
}
