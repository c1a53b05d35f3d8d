//! Chordal: a Chord ring overlay engine.
//!
//! A set of processes organizes itself along a single virtual
//! circular identifier space, continuously repairs itself under
//! churn, and answers key→successor lookups in O(log N) hops.
//!
//! - [dht](crate::dht) holds the protocol core: identifier
//!   arithmetic modulo 2^m, the per-vnode state machine
//!   (predecessor, successor list, finger table) and the periodic
//!   stabilization steps.
//! - [Ring](crate::ring::Ring) is the process-level participant. It
//!   owns one or more virtual nodes, fans out scheduling and
//!   shutdown, and exposes [Ring::lookup](crate::ring::Ring::lookup).
//! - [transport](crate::transport) defines the capability set a wire
//!   transport must provide. The engine itself never opens sockets;
//!   RPCs targeting vnodes registered in-process are short-circuited
//!   by [LocalTransport](crate::transport::local::LocalTransport).
//! - [Delegate](crate::delegate::Delegate) callbacks observe
//!   membership events, serialized through a single consumer task.
//!
//! # Starting a ring
//!
//! ```no_run
//! use chordal::{Config, Ring};
//!
//! # async fn run() -> chordal::Result<()> {
//! let ring = Ring::create(Config::new("alpha:9000"), None)?;
//! let owners = ring.lookup(3, b"some-key").await?;
//! # Ok(())
//! # }
//! ```
//!
//! Joining an existing overlay instead goes through
//! [Ring::join](crate::ring::Ring::join) with a seed host. All
//! processes of one overlay must share the same hash function and
//! successor-list length.

pub mod config;
pub mod delegate;
pub mod dht;
pub mod error;
pub mod ring;
pub mod transport;

pub use config::rand_stabilize;
pub use config::CandidatePolicy;
pub use config::Config;
pub use config::HashFactory;
pub use delegate::Delegate;
pub use dht::Vnode;
pub use error::Error;
pub use error::Result;
pub use ring::Ring;
pub use transport::local::BlackholeTransport;
pub use transport::local::LocalTransport;
pub use transport::Transport;
pub use transport::VnodeHandler;
