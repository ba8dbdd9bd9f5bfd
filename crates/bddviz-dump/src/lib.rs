//! Conversion of [BuDDy] node dumps into the [DDDMP] format
//!
//! BuDDy writes a diagram as a header line, a line describing the variable
//! order, and one line per inner node. Over time, two tools produced two
//! incompatible variants of this layout (see [`Dialect`]). Both are read into
//! a [`dddmp::Dump`], which is then written as an ASCII mode DDDMP file with a
//! single root.
//!
//! ```
//! use bddviz_dump::{convert, Dialect};
//!
//! let dddmp = convert(Dialect::Direct, "2 2\n1 0\n2 1 0 1\n3 0 0 2\n", None).unwrap();
//! assert!(dddmp.starts_with(".ver DDDMP-2.0\n"));
//! assert!(dddmp.ends_with("3 0 0 2\n.end"));
//! ```
//!
//! [BuDDy]: https://sourceforge.net/projects/buddy/
//! [DDDMP]: https://github.com/ivmai/cudd/tree/release/dddmp
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::fmt;
use std::io;

pub mod buddy;
pub mod dddmp;

pub use buddy::{Dialect, SourceDump, VarNames};

// spell-checker:ignore nnodes,nvars

/// Error for input that does not follow the BuDDy dump layout
///
/// A conversion either succeeds completely or fails with this error; no
/// partial output is ever produced.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MalformedInput {
    /// 1-based line number, if the problem is tied to a line
    line: Option<usize>,
    reason: String,
}

impl MalformedInput {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            line: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn at_line(line_no: usize, reason: impl Into<String>) -> Self {
        Self {
            line: Some(line_no),
            reason: reason.into(),
        }
    }

    /// Attach `line_no` unless a line number is already present
    pub(crate) fn with_line(mut self, line_no: usize) -> Self {
        self.line.get_or_insert(line_no);
        self
    }

    /// The 1-based number of the offending line, if there is one
    #[inline]
    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Description of the problem
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for MalformedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line_no) => write!(f, "malformed input: {} (line {line_no})", self.reason),
            None => write!(f, "malformed input: {}", self.reason),
        }
    }
}
impl std::error::Error for MalformedInput {}

impl From<MalformedInput> for io::Error {
    fn from(err: MalformedInput) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Convert the BuDDy dump `data` into DDDMP text
///
/// `vars` is an optional list of variable names, separated by whitespace
/// (usually one name per line). An absent or blank list means that names are
/// synthesized. The caller chooses the `dialect`, it is never guessed from
/// the input.
///
/// The result uses the default [`dddmp::ExportSettings`]. Use
/// [`Dialect::read()`] and [`dddmp::Dump::export()`] to customize the output.
pub fn convert(dialect: Dialect, data: &str, vars: Option<&str>) -> Result<String, MalformedInput> {
    let source = SourceDump::parse(data)?;
    let names = vars.and_then(VarNames::parse);
    let dump = dialect.read(&source, names.as_ref())?;
    tracing::debug!(
        %dialect,
        nnodes = dump.nnodes(),
        nvars = dump.nvars(),
        named = names.is_some(),
        "converted BuDDy dump"
    );
    Ok(dump.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn malformed_input_display() {
        let err = MalformedInput::new("too few lines");
        assert_eq!(err.to_string(), "malformed input: too few lines");
        assert_eq!(err.line(), None);

        let err = err.with_line(2);
        assert_eq!(err.to_string(), "malformed input: too few lines (line 2)");

        // the first line number wins
        let err = MalformedInput::at_line(4, "bad record").with_line(2);
        assert_eq!(err.line(), Some(4));
    }

    #[test]
    fn malformed_input_into_io_error() {
        let err: io::Error = MalformedInput::new("oops").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
