//! The AT command engine: transport, framing, response classification and
//! field tokenizing.

pub mod channel;
pub mod line;
pub mod port;
pub mod response;
pub mod timeout;
pub mod tok;
