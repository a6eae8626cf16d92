//! Markdown script codec
//!
//! One block per interaction, in index order:
//!
//! ````text
//! ## Interaction 0: GET /path
//!
//! ### Request headers recorded for playback:
//!
//! ```
//! Name: value
//! ```
//!
//! ### Request body recorded for playback (content/type):
//!
//! ```
//! body
//! ```
//!
//! ### Response headers recorded for playback:
//!
//! ```
//! Name: value
//! ```
//!
//! ### Response body recorded for playback (200: content/type):
//!
//! ```
//! body
//! ```
//! ````
//!
//! Fenced content is verbatim, with three exceptions that do not survive a
//! write and read back:
//!
//! * a body containing a line that holds only the fence ends the block early;
//! * empty header lines are dropped, so `[]` and `[""]` read back as `[]`;
//! * a text body starting with [`BASE64_PREFIX`] reads back as binary.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::interaction::{Body, Interaction};
use crate::{Result, ScriptError};

/// Marker that opens every interaction block
pub const INTERACTION_MARKER: &str = "## Interaction";

/// Fence around every section's content
pub const FENCE: &str = "```";

/// Prefix of a binary body rendered as base64
pub const BASE64_PREFIX: &str = "//SERVIRTIUM+Base64: ";

const REQUEST_HEADERS_HEADING: &str = "### Request headers recorded for playback:";
const REQUEST_BODY_HEADING: &str = "### Request body recorded for playback (";
const RESPONSE_HEADERS_HEADING: &str = "### Response headers recorded for playback:";
const RESPONSE_BODY_HEADING: &str = "### Response body recorded for playback (";

/// Render interactions as a script
#[must_use]
pub fn serialize(interactions: &[Interaction]) -> String {
    let mut out = String::new();
    for interaction in interactions {
        write_interaction(&mut out, interaction);
    }
    out
}

fn write_interaction(out: &mut String, interaction: &Interaction) {
    out.push_str(&format!(
        "{INTERACTION_MARKER} {}: {} {}\n\n",
        interaction.index, interaction.method, interaction.url
    ));

    write_section(
        out,
        REQUEST_HEADERS_HEADING,
        &interaction.request_headers.join("\n"),
    );
    write_section(
        out,
        &format!(
            "{REQUEST_BODY_HEADING}{}):",
            interaction.request_content_type
        ),
        &render_body(&interaction.request_body),
    );
    write_section(
        out,
        RESPONSE_HEADERS_HEADING,
        &interaction.response_headers.join("\n"),
    );
    write_section(
        out,
        &format!(
            "{RESPONSE_BODY_HEADING}{}: {}):",
            interaction.response_status, interaction.response_content_type
        ),
        &render_body(&interaction.response_body),
    );
}

fn write_section(out: &mut String, heading: &str, content: &str) {
    out.push_str(heading);
    out.push_str("\n\n");
    out.push_str(FENCE);
    out.push('\n');
    out.push_str(content);
    out.push('\n');
    out.push_str(FENCE);
    out.push_str("\n\n");
}

fn render_body(body: &Body) -> String {
    match body {
        Body::Text(text) => text.clone(),
        Body::Binary(bytes) => format!("{BASE64_PREFIX}{}", STANDARD.encode(bytes)),
    }
}

/// Parse a script into its interactions
///
/// # Errors
///
/// Returns [`ScriptError::Format`] if the text holds no interaction block, a
/// section is missing or unterminated, a number cannot be parsed, or the
/// blocks are not numbered 0, 1, 2, ...
pub fn parse(text: &str) -> Result<Vec<Interaction>> {
    let Some(start) = first_marker(text) else {
        return Err(ScriptError::Format(format!(
            "No 'Interaction' marker found in conversation '{text}'. Wrong/empty script file?"
        )));
    };

    let mut cursor = Cursor { text, pos: start };
    let mut interactions = Vec::new();

    loop {
        cursor.skip_blank_lines();
        if cursor.at_end() {
            break;
        }
        let interaction = parse_interaction(&mut cursor, interactions.len())?;
        interactions.push(interaction);
    }

    Ok(interactions)
}

/// Offset of the first marker that starts a line
fn first_marker(text: &str) -> Option<usize> {
    if text.starts_with(INTERACTION_MARKER) {
        return Some(0);
    }
    text.match_indices(&format!("\n{INTERACTION_MARKER}"))
        .next()
        .map(|(offset, _)| offset + 1)
}

fn parse_interaction(cursor: &mut Cursor<'_>, expected: usize) -> Result<Interaction> {
    let heading = cursor.next_line().unwrap_or_default();
    let rest = heading
        .strip_prefix(INTERACTION_MARKER)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or_else(|| {
            ScriptError::Format(format!(
                "Expected '{INTERACTION_MARKER} {expected}: ...' but found '{heading}'"
            ))
        })?;

    let (index, request_line) = rest.split_once(": ").ok_or_else(|| {
        ScriptError::Format(format!("Malformed interaction heading '{heading}'"))
    })?;
    let index: usize = index.trim().parse().map_err(|_| {
        ScriptError::Format(format!(
            "Interaction index '{index}' is not a number in '{heading}'"
        ))
    })?;
    if index != expected {
        return Err(ScriptError::Format(format!(
            "Interaction {index} found where interaction {expected} was expected"
        )));
    }

    let (method, url) = request_line.split_once(' ').unwrap_or((request_line, ""));
    let mut interaction = Interaction::new(index, method, url);

    cursor.expect_heading(REQUEST_HEADERS_HEADING, index)?;
    interaction.request_headers = header_lines(cursor.fenced_block(index)?);

    let request_type = cursor.expect_body_heading(REQUEST_BODY_HEADING, index)?;
    interaction.request_content_type = request_type.to_string();
    interaction.request_body = parse_body(cursor.fenced_block(index)?, index)?;

    cursor.expect_heading(RESPONSE_HEADERS_HEADING, index)?;
    interaction.response_headers = header_lines(cursor.fenced_block(index)?);

    let response_info = cursor.expect_body_heading(RESPONSE_BODY_HEADING, index)?;
    let (status, content_type) = response_info.split_once(": ").unwrap_or((response_info, ""));
    interaction.response_status = status.trim().parse().map_err(|_| {
        ScriptError::Format(format!(
            "Response status '{status}' is not a number in interaction {index}"
        ))
    })?;
    interaction.response_content_type = content_type.to_string();
    interaction.response_body = parse_body(cursor.fenced_block(index)?, index)?;

    Ok(interaction)
}

fn header_lines(content: &str) -> Vec<String> {
    content
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_body(content: &str, index: usize) -> Result<Body> {
    match content.strip_prefix(BASE64_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded.trim())
            .map(Body::Binary)
            .map_err(|e| {
                ScriptError::Format(format!(
                    "Invalid base64 body in interaction {index}: {e}"
                ))
            }),
        None => Ok(Body::Text(content.to_string())),
    }
}

/// Line-oriented reader over script text
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn next_line(&mut self) -> Option<&'a str> {
        if self.at_end() {
            return None;
        }
        let rest = self.rest();
        match rest.find('\n') {
            Some(end) => {
                self.pos += end + 1;
                Some(&rest[..end])
            }
            None => {
                self.pos = self.text.len();
                Some(rest)
            }
        }
    }

    fn skip_blank_lines(&mut self) {
        while self.rest().starts_with('\n') {
            self.pos += 1;
        }
    }

    fn expect_heading(&mut self, heading: &str, index: usize) -> Result<()> {
        self.skip_blank_lines();
        match self.next_line() {
            Some(line) if line == heading => Ok(()),
            found => Err(ScriptError::Format(format!(
                "Expected '{heading}' in interaction {index} but found '{}'",
                found.unwrap_or_default()
            ))),
        }
    }

    /// Read a body heading and return the text between its parentheses
    fn expect_body_heading(&mut self, prefix: &str, index: usize) -> Result<&'a str> {
        self.skip_blank_lines();
        let line = self.next_line().unwrap_or_default();
        line.strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix("):"))
            .ok_or_else(|| {
                ScriptError::Format(format!(
                    "Expected '{prefix}...):' in interaction {index} but found '{line}'"
                ))
            })
    }

    fn fenced_block(&mut self, index: usize) -> Result<&'a str> {
        self.skip_blank_lines();
        match self.next_line() {
            Some(FENCE) => {}
            found => {
                return Err(ScriptError::Format(format!(
                    "Expected an opening {FENCE} in interaction {index} but found '{}'",
                    found.unwrap_or_default()
                )))
            }
        }

        let rest = self.rest();
        let mut from = 0;
        while let Some(offset) = rest[from..].find(FENCE) {
            let fence_at = from + offset;
            let after = fence_at + FENCE.len();
            let line_start = fence_at == 0 || rest.as_bytes()[fence_at - 1] == b'\n';
            let line_end = after == rest.len() || rest.as_bytes()[after] == b'\n';
            if line_start && line_end && fence_at > 0 {
                self.pos += (after + 1).min(rest.len());
                return Ok(&rest[..fence_at - 1]);
            }
            from = after;
        }

        Err(ScriptError::Format(format!(
            "Unterminated {FENCE} block in interaction {index}"
        )))
    }
}
