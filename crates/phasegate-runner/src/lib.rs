//! External process execution for phase tasks
//!
//! Every task is launched from a [`CommandSpec`] with argv-style arguments;
//! no shell is involved. [`NativeRunner`] waits for the process under a
//! timeout and a cancellation token, capturing bounded stdout/stderr tails
//! in [`RingBuffer`]s.

pub mod command_spec;
pub mod error;
pub mod native;
pub mod process;
pub mod ring_buffer;

pub use command_spec::CommandSpec;
pub use error::{RunnerError, timeout_millis};
pub use native::NativeRunner;
pub use process::ProcessOutput;
pub use ring_buffer::RingBuffer;
