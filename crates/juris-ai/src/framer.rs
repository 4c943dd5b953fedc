//! Reassembles JSON objects from an unframed byte stream
//!
//! The upstream streaming endpoint writes a JSON array of response objects
//! with no guarantee about where read boundaries fall: an object can span
//! several chunks, and a chunk can end in the middle of a string. The framer
//! tracks brace depth together with string-literal and escape state, so a
//! `}` inside a quoted value never closes an object, and hands back each
//! top-level object once its closing brace arrives. Anything between objects
//! (`[`, `,`, `]`, whitespace) is skipped.

/// Incremental top-level JSON object extractor
#[derive(Debug, Default)]
pub struct JsonObjectFramer {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl JsonObjectFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every object it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut complete = Vec::new();

        for &byte in chunk {
            if self.depth == 0 {
                // Between objects: only an opening brace starts a candidate
                if byte == b'{' {
                    self.buf.clear();
                    self.buf.push(byte);
                    self.depth = 1;
                    self.in_string = false;
                    self.escaped = false;
                }
                continue;
            }

            self.buf.push(byte);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        complete.push(String::from_utf8_lossy(&self.buf).into_owned());
                        self.buf.clear();
                    }
                }
                _ => {}
            }
        }

        complete
    }

    /// Bytes of an object that has started but not yet closed
    pub fn pending(&self) -> usize {
        if self.depth == 0 { 0 } else { self.buf.len() }
    }

    /// Whether the framer is between objects
    pub fn is_idle(&self) -> bool {
        self.depth == 0
    }
}
