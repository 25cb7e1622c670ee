//! Interactive debugger sessions paused at the assertion placeholder
//!
//! Java tasks run Surefire under JDWP and attach `jdb`; Python tasks run
//! pytest with IPython's debugger on an inserted `breakpoint()`. Either way
//! the agents only see locals and evaluated expressions.

pub mod backend;
pub mod expect;
pub mod ports;
pub mod session;
pub mod state;

pub use backend::{DebugBackend, IpdbBackend, JdbBackend};
pub use session::{debug_file_content, DebuggerSession};
pub use state::{SessionEvent, SessionState};
