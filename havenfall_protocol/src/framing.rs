// Length-delimited message framing over TCP.
//
// Wire format: a 4-byte big-endian length prefix followed by a JSON payload.
// `write_frame`/`read_frame` move raw bytes; `send`/`recv` layer the typed
// JSON encode/decode on top so call sites never repeat the
// serialize-then-frame dance.
//
// `MAX_FRAME_SIZE` (8 MB) bounds allocation from a malformed or hostile
// length prefix. Property-bag replays to late joiners are the largest
// expected frames and stay far below this.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};

/// Upper bound on a single frame's payload size.
pub const MAX_FRAME_SIZE: u32 = 8 * 1024 * 1024;

/// Write one length-delimited frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    if len > MAX_FRAME_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-delimited frame.
///
/// Returns `UnexpectedEof` if the stream closes before or during a frame,
/// `InvalidData` if the length prefix exceeds `MAX_FRAME_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {len} bytes (max {MAX_FRAME_SIZE})"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Serialize a message to JSON and write it as one frame.
pub fn send<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(io::Error::other)?;
    write_frame(writer, &json)
}

/// Read one frame and deserialize its JSON payload.
pub fn recv<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let payload = read_frame(reader)?;
    serde_json::from_slice(&payload).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_roundtrip() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"hello, relay").unwrap();
        let mut cursor = Cursor::new(&wire);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"hello, relay");
    }

    #[test]
    fn empty_frame_roundtrip() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"").unwrap();
        let mut cursor = Cursor::new(&wire);
        assert_eq!(read_frame(&mut cursor).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn oversized_write_is_rejected() {
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];
        let mut wire = Vec::new();
        let err = write_frame(&mut wire, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let prefix = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(prefix.to_vec());
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn short_stream_is_eof() {
        let mut cursor = Cursor::new(vec![0u8, 0]);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        // Length prefix present, payload truncated.
        let mut wire = Vec::new();
        write_frame(&mut wire, b"full payload").unwrap();
        wire.truncate(wire.len() - 3);
        let mut cursor = Cursor::new(wire);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn typed_send_recv_roundtrip() {
        use crate::message::ClientMessage;

        let msg = ClientMessage::Ping { nonce: 77 };
        let mut wire = Vec::new();
        send(&mut wire, &msg).unwrap();
        let mut cursor = Cursor::new(&wire);
        let recovered: ClientMessage = recv(&mut cursor).unwrap();
        assert_eq!(recovered, msg);
    }

    #[test]
    fn garbage_json_is_an_error() {
        let mut wire = Vec::new();
        write_frame(&mut wire, b"not json at all").unwrap();
        let mut cursor = Cursor::new(&wire);
        let result: io::Result<crate::message::ServerMessage> = recv(&mut cursor);
        assert!(result.is_err());
    }

    #[test]
    fn back_to_back_frames_read_in_order() {
        let mut wire = Vec::new();
        for payload in [b"first".as_slice(), b"second", b"third"] {
            write_frame(&mut wire, payload).unwrap();
        }
        let mut cursor = Cursor::new(&wire);
        assert_eq!(read_frame(&mut cursor).unwrap(), b"first");
        assert_eq!(read_frame(&mut cursor).unwrap(), b"second");
        assert_eq!(read_frame(&mut cursor).unwrap(), b"third");
    }
}
