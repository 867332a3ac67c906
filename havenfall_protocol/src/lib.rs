// havenfall_protocol — wire protocol for peer-relay communication.
//
// This crate defines the message types, framing, and serialization used by
// the relay coordinator (`havenfall_relay`) and peer engines
// (`havenfall_replication`) to communicate over TCP. It is shared between
// both sides and has no dependency on the world crate.
//
// Module overview:
// - `types.rs`:   `ActorId`, `CommandSeq` — relay-scoped identifiers.
// - `message.rs`: ClientMessage / ServerMessage enums, `PropertyEntry`,
//                 `PeerInfo`.
// - `framing.rs`: Length-delimited framing (4-byte big-endian prefix + JSON)
//                 with typed `send`/`recv` helpers.
//
// Design decisions:
// - **JSON serialization.** Matches the world crate's serde_json usage.
//   Binary framing can be swapped in later if bandwidth matters.
// - **Commands and frames as opaque `Vec<u8>`.** The relay never inspects
//   world payloads, so the protocol crate stays world-agnostic.
// - **No async runtime.** `std::io::Read`/`Write` framing works with
//   blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_FRAME_SIZE, read_frame, recv, send, write_frame};
pub use message::{ClientMessage, PeerInfo, PropertyEntry, ServerMessage};
pub use types::{ActorId, CommandSeq};

/// Bumped whenever the wire vocabulary changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn client_roundtrip(msg: &ClientMessage) {
        let mut wire = Vec::new();
        send(&mut wire, msg).unwrap();
        let mut cursor = Cursor::new(&wire);
        let recovered: ClientMessage = recv(&mut cursor).unwrap();
        assert_eq!(&recovered, msg);
    }

    fn server_roundtrip(msg: &ServerMessage) {
        let mut wire = Vec::new();
        send(&mut wire, msg).unwrap();
        let mut cursor = Cursor::new(&wire);
        let recovered: ServerMessage = recv(&mut cursor).unwrap();
        assert_eq!(&recovered, msg);
    }

    #[test]
    fn roundtrip_hello() {
        client_roundtrip(&ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            peer_name: "Tessa".into(),
            world_version_hash: 0xDEAD_BEEF,
            config_hash: 0xCAFE_BABE,
            session_password: Some("driftwood".into()),
        });
        client_roundtrip(&ClientMessage::Hello {
            protocol_version: PROTOCOL_VERSION,
            peer_name: "Tessa".into(),
            world_version_hash: 1,
            config_hash: 2,
            session_password: None,
        });
    }

    #[test]
    fn roundtrip_command() {
        client_roundtrip(&ClientMessage::Command {
            sequence: CommandSeq(42),
            payload: vec![1, 2, 3, 4, 5],
        });
    }

    #[test]
    fn roundtrip_stream_frame() {
        client_roundtrip(&ClientMessage::StreamFrame {
            target: Some(ActorId(3)),
            payload: vec![0xAB; 64],
        });
        client_roundtrip(&ClientMessage::StreamFrame {
            target: None,
            payload: vec![],
        });
    }

    #[test]
    fn roundtrip_property_set() {
        client_roundtrip(&ClientMessage::PropertySet {
            entries: vec![
                PropertyEntry {
                    key: "Structure_1_Health".into(),
                    value: "250".into(),
                },
                PropertyEntry {
                    key: "Resource_4_Depleted".into(),
                    value: "true".into(),
                },
            ],
        });
    }

    #[test]
    fn roundtrip_snapshot_sync() {
        client_roundtrip(&ClientMessage::SnapshotSync {
            tile_count: 40,
            structure_count: 3,
            resource_count: 5,
        });
        server_roundtrip(&ServerMessage::SnapshotSync {
            from: ActorId(2),
            tile_count: 40,
            structure_count: 3,
            resource_count: 5,
        });
    }

    #[test]
    fn roundtrip_focus_and_ping() {
        client_roundtrip(&ClientMessage::Focus {
            position: [12.5, 0.0, -3.25],
        });
        client_roundtrip(&ClientMessage::Ping { nonce: 99 });
        server_roundtrip(&ServerMessage::Focus {
            from: ActorId(1),
            position: [12.5, 0.0, -3.25],
        });
        server_roundtrip(&ServerMessage::Pong { nonce: 99 });
    }

    #[test]
    fn roundtrip_goodbye() {
        client_roundtrip(&ClientMessage::Goodbye);
    }

    #[test]
    fn roundtrip_welcome() {
        server_roundtrip(&ServerMessage::Welcome {
            actor_id: ActorId(2),
            session_name: "driftwood-cove".into(),
            peers: vec![
                PeerInfo {
                    id: ActorId(1),
                    name: "Host".into(),
                },
                PeerInfo {
                    id: ActorId(2),
                    name: "Guest".into(),
                },
            ],
        });
    }

    #[test]
    fn roundtrip_rejected() {
        server_roundtrip(&ServerMessage::Rejected {
            reason: "config hash mismatch".into(),
        });
    }

    #[test]
    fn roundtrip_server_command() {
        server_roundtrip(&ServerMessage::Command {
            issuer: ActorId(1),
            sequence: CommandSeq(7),
            payload: vec![10, 20, 30],
        });
    }

    #[test]
    fn roundtrip_server_stream_frame() {
        server_roundtrip(&ServerMessage::StreamFrame {
            from: ActorId(1),
            payload: vec![0xFF; 128],
        });
    }

    #[test]
    fn roundtrip_property_update() {
        server_roundtrip(&ServerMessage::PropertyUpdate {
            entries: vec![PropertyEntry {
                key: "Structure_2_Type".into(),
                value: "Wall".into(),
            }],
        });
    }

    #[test]
    fn roundtrip_membership_events() {
        server_roundtrip(&ServerMessage::PeerJoined {
            peer: PeerInfo {
                id: ActorId(3),
                name: "Newcomer".into(),
            },
        });
        server_roundtrip(&ServerMessage::PeerLeft {
            actor_id: ActorId(2),
            name: "Leaver".into(),
        });
    }
}
