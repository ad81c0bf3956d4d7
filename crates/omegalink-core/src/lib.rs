//! Omegalink core types
//!
//! Transaction-side primitives shared by every Omegalink connector:
//!
//! - **Context**: service identity and transaction-type selection
//! - **Events**: the ordered Saga and TCC lifecycle events
//! - **Responses**: the coordinator's reply contract (abort flag, directive)
//! - **Flow guards**: per-transaction state machines that reject
//!   out-of-order events before they reach the wire
//! - **Payload codec**: the pluggable encoding seam for compensation and
//!   confirm/cancel arguments
//!
//! The connector crates (e.g. `omegalink-grpc`) bind these types to a
//! concrete transport; nothing in this crate performs I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod context;
pub mod error;
pub mod response;
pub mod saga;
pub mod tcc;

pub use codec::{JsonPayloadCodec, PayloadCodec};
pub use context::{ServiceConfig, TransactionType};
pub use error::{ProtocolError, ProtocolResult};
pub use response::{AlphaResponse, CoordinateCommand, TransactionStatus};
pub use saga::SagaFlow;
pub use tcc::TccFlow;
