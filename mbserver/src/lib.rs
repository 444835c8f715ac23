//! A Modbus server engine for TCP and RTU (serial) using [Tokio](https://docs.rs/tokio)
//! and Rust's `async/await` syntax.
//!
//! # Features
//!
//! * One register store with four 65536-entry banks shared by every transport
//! * Any number of TCP listeners and serial ports feeding a single request queue
//! * Requests executed one at a time, in arrival order
//! * Panic-free parsing of untrusted frames
//! * Serial reassembly that resynchronizes after line noise and corrupted frames
//! * Configurable protocol decoding via [`tracing`](https://docs.rs/tracing)
//!
//! # Supported Functions
//!
//! * Read Coils
//! * Read Discrete Inputs
//! * Read Holding Registers
//! * Read Input Registers
//! * Write Single Coil
//! * Write Single Register
//! * Write Multiple Coils
//! * Write Multiple Registers
//!
//! # Example
//!
//! ```no_run
//! use mbserver::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::spawn(ServerConfig::default());
//!
//!     // provision some values before clients connect
//!     server.store().holding_registers.write(0, &[0xCAFE, 0xBEEF]);
//!
//!     server.listen_tcp("127.0.0.1:502".parse()?).await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```

mod common;
mod constants;
/// CRC-16/MODBUS checksum used by RTU frames
pub mod crc;
mod decode;
mod error;
mod exception;
mod retry;
mod serial;
mod server;
mod shutdown;
mod tcp;
mod types;

pub use crate::common::frame::{register_count_payload, register_values_payload, Frame};
pub use crate::constants::{limits, BANK_CAPACITY};
pub use crate::decode::*;
pub use crate::error::*;
pub use crate::exception::*;
pub use crate::retry::*;
pub use crate::serial::frame::RtuFrame;
pub use crate::serial::reassembler::Reassembler;
pub use crate::serial::{DataBits, FlowControl, Parity, SerialSettings, StopBits};
pub use crate::server::*;
pub use crate::tcp::frame::TcpFrame;
pub use crate::types::{AddressMode, AddressRange, Indexed, UnitId};
