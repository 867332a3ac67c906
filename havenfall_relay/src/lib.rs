// havenfall_relay — broadcast relay coordinator.
//
// The relay is the transport every Havenfall session runs over: it admits
// peers, fans commands out in a single serialized order, forwards stream
// frames and snapshot syncs, stores the shared property bag, and answers
// RTT probes. It never runs world logic — command and frame payloads stay
// opaque bytes end to end.
//
// - `session.rs`: membership, fan-out, and the property bag.
// - `server.rs`:  TCP listener, reader threads, and the single-threaded
//                 main loop that gives the session its ordering guarantee.
//
// The `relay` binary (`main.rs`) wraps this library with a small CLI.

pub mod server;
pub mod session;
