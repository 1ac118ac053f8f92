use tracing::warn;

/// Longest line the channel accepts, terminator excluded.
pub const MAX_AT_RESPONSE: usize = 0x1000;

/// Splits the raw byte stream coming from the modem into lines.
///
/// Lines end at `\r` or `\n`; empty lines are skipped. The SMS prompt `"> "`
/// has no terminator and is returned as a line of its own. Lines longer than
/// [`MAX_AT_RESPONSE`] are dropped up to their terminator so that framing of
/// whatever follows is unaffected.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    discarding: bool,
}

impl LineFramer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<String> {
        loop {
            if self.discarding {
                let end = self.buf.iter().position(|b| is_terminator(*b));
                match end {
                    Some(end) => {
                        self.buf.drain(..=end);
                        self.discarding = false;
                    }
                    None => {
                        self.buf.clear();
                        return None;
                    }
                }
            }

            let start = self
                .buf
                .iter()
                .position(|b| !is_terminator(*b))
                .unwrap_or(self.buf.len());
            self.buf.drain(..start);

            if self.buf.starts_with(b"> ") {
                self.buf.drain(..2);
                return Some("> ".to_owned());
            }

            match self.buf.iter().position(|b| is_terminator(*b)) {
                Some(end) if end > MAX_AT_RESPONSE => {
                    warn!("dropping {end} byte AT line, longer than {MAX_AT_RESPONSE}");
                    self.buf.drain(..=end);
                }
                Some(end) => {
                    let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
                    self.buf.drain(..=end);
                    return Some(line);
                }
                None if self.buf.len() > MAX_AT_RESPONSE => {
                    warn!(
                        "AT line exceeds {MAX_AT_RESPONSE} bytes, discarding until next terminator"
                    );
                    self.buf.clear();
                    self.discarding = true;
                    return None;
                }
                None => return None,
            }
        }
    }
}

fn is_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}
