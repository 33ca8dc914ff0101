//! rigctld-compatible front end
//!
//! Speaks enough of hamlib's `rigctld` text protocol for logging and digital
//! mode software to control the transceiver through the gateway:
//!
//! | Short | Long | Reply |
//! |-------|------|-------|
//! | `f` | `get_freq` | frequency in Hz |
//! | `F <hz>` | `set_freq` | `RPRT 0` |
//! | `m` | `get_mode` | mode name, passband |
//! | `M <mode> <passband>` | `set_mode` | `RPRT 0` |
//! | `t` | `get_ptt` | `0` / `1` |
//! | `T <0/1>` | `set_ptt` | `RPRT 0` |
//! | `l <level>` | `get_level` | `STRENGTH`, `RFPOWER`, `SWR` |
//! | `v` | `get_vfo` | `VFOA` |
//! | | `chk_vfo` | `0` |
//! | `q` | `quit` | connection closed |
//!
//! Failures are reported as `RPRT <negative hamlib code>` and leave the
//! connection open.

pub mod command;
pub mod error;
pub mod levels;
pub mod server;

pub use command::{Level, RigctlCommand};
pub use error::RigctlError;
pub use server::{Response, RigctlServer, DEFAULT_RIGCTLD_PORT, MAX_LINE_LEN};
