//! relay-services — journal writer, decimator, and the relay loop.

pub mod block_writer;
pub mod decimator;
pub mod relay_loop;
pub mod stats;
pub mod transport;

pub use block_writer::{BlockWriter, WriterError, WriterOptions};
pub use decimator::Decimator;
pub use relay_loop::{LoopExit, LoopReport, LoopSettings, RelayError, RelayLoop};
pub use stats::RelayStats;
pub use transport::{PacketSink, PacketSource};
