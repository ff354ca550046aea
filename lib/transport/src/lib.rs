//! Session/stream transport (C3, §4.3): a TCP connection to a sinful-
//! string address carrying length-framed CEDAR messages.

pub mod sinful;
pub mod stream;

pub use sinful::{SinfulString, parse as parse_sinful};
pub use stream::CedarStream;
