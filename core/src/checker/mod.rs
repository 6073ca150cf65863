//! Static checker protocol
//!
//! Input generation and output parsing for an external educational SQL checker
//! driven through its line-oriented text API. Running the checker process is
//! the engine's job; this module is pure text in, annotations out.

mod protocol;

pub use protocol::{
    build_input, parse_command, parse_output, partition_unrecognized, Annotation, CheckMode, Severity,
    PROMPT, UNRECOGNIZED_INPUT,
};
