//! Drives the whole bridge against a simulated modem.

mod harness;
mod lifecycle;
mod requests;
mod unsolicited;
