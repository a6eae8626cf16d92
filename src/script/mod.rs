//! Markdown scripts: codec and persistence

mod codec;
mod store;

pub use codec::{parse, serialize, BASE64_PREFIX, FENCE, INTERACTION_MARKER};
pub use store::{read_script, FileSink, MemorySink, ScriptSink};
