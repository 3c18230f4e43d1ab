//! Minimal RFC 7468 PEM codec with RFC 1421 style headers.
//!
//! Key files carry their key id as a `kid: <value>` header between the
//! `-----BEGIN` line and the base64 body, which the PEM support of the RSA
//! and EC crates rejects. This module splits the envelope so the DER body can
//! be handed to those crates.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::KeyError;

/// PEM header holding the key identifier.
pub const HEADER_KEY_ID: &str = "kid";

const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";
const DASHES: &str = "-----";

/// A decoded PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    /// Block label, e.g. `RSA PRIVATE KEY`.
    pub label: String,
    /// Headers in file order.
    pub headers: Vec<(String, String)>,
    /// DER contents.
    pub contents: Vec<u8>,
}

impl PemBlock {
    /// Creates a block without headers.
    pub fn new(label: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            headers: Vec::new(),
            contents,
        }
    }

    /// Adds a header, builder style.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup. Empty values count as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// The `kid` header, if present.
    pub fn key_id(&self) -> Option<&str> {
        self.header(HEADER_KEY_ID)
    }

    /// Parses the first PEM block in `input`.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let mut lines = input.lines().map(str::trim);

        let label = lines
            .by_ref()
            .find_map(|line| {
                line.strip_prefix(BEGIN)
                    .and_then(|rest| rest.strip_suffix(DASHES))
            })
            .ok_or_else(|| KeyError::MalformedPem("missing BEGIN line".to_string()))?
            .to_string();

        let mut headers = Vec::new();
        let mut body = String::new();
        let mut in_body = false;
        let mut terminated = false;

        for line in lines {
            if let Some(rest) = line.strip_prefix(END) {
                if rest.strip_suffix(DASHES) != Some(label.as_str()) {
                    return Err(KeyError::MalformedPem(format!(
                        "END line does not match {label}"
                    )));
                }
                terminated = true;
                break;
            }
            if !in_body {
                if line.is_empty() {
                    in_body = true;
                    continue;
                }
                if let Some((name, value)) = line.split_once(':') {
                    headers.push((name.trim().to_string(), value.trim().to_string()));
                    continue;
                }
                in_body = true;
            }
            body.push_str(line);
        }

        if !terminated {
            return Err(KeyError::MalformedPem(format!("missing END line for {label}")));
        }

        let contents = STANDARD
            .decode(body.as_bytes())
            .map_err(|e| KeyError::MalformedPem(format!("invalid base64 body: {e}")))?;

        Ok(Self {
            label,
            headers,
            contents,
        })
    }

    /// Encodes the block with 64 column body lines and a trailing newline.
    pub fn encode(&self) -> String {
        let mut out = format!("{BEGIN}{}{DASHES}\n", self.label);
        if !self.headers.is_empty() {
            for (name, value) in &self.headers {
                out.push_str(&format!("{name}: {value}\n"));
            }
            out.push('\n');
        }
        let body = STANDARD.encode(&self.contents);
        for chunk in body.as_bytes().chunks(64) {
            // base64 output is ASCII
            out.push_str(&String::from_utf8_lossy(chunk));
            out.push('\n');
        }
        out.push_str(&format!("{END}{}{DASHES}\n", self.label));
        out
    }
}
