//! Reading BuDDy node dumps
//!
//! A dump consists of
//!
//! 1. a header line (ignored),
//! 2. a line of space-separated integers describing the variable order, and
//! 3. one line per inner node with four integers. The last node is the root.
//!
//! The meaning of the second line and of the node fields depends on the
//! [`Dialect`].

use std::fmt;
use std::str::FromStr;

use bitvec::prelude::*;

use crate::dddmp::{Dump, Node};
use crate::MalformedInput;

// spell-checker:ignore permids,suppvarnames,orderedvarnames

/// Line number of the variable order line (1-based)
const PERMUTATION_LINE: usize = 2;

/// Root name used by the [inverted index][InvertedIndex] dialect
const PLACEHOLDER_ROOT_NAME: &str = "f";

/// A BuDDy dump split into its variable order and node lines
///
/// Node lines are kept as text, each dialect parses them into its own record
/// type.
#[derive(Clone, Debug)]
pub struct SourceDump<'a> {
    permutation: Vec<u32>,
    /// Non-blank node lines with their (1-based) line numbers
    nodes: Vec<(usize, &'a str)>,
}

impl<'a> SourceDump<'a> {
    /// Split `data` into lines and parse the variable order line
    ///
    /// Fails if there are fewer than two lines, if the second line is not a
    /// list of unsigned integers, or if there is no node line. Blank node
    /// lines (e.g., due to a trailing newline) are skipped.
    pub fn parse(data: &'a str) -> Result<Self, MalformedInput> {
        let mut lines = data
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .zip(1usize..);

        let (Some(_header), Some((perm_line, line_no))) = (lines.next(), lines.next()) else {
            return Err(MalformedInput::new(
                "expected a header line and a variable order line",
            ));
        };
        let permutation = parse_u32_list(perm_line, line_no)?;

        let nodes: Vec<(usize, &str)> = lines
            .filter(|(line, _)| !line.trim().is_empty())
            .map(|(line, line_no)| (line_no, line))
            .collect();
        if nodes.is_empty() {
            return Err(MalformedInput::new("the dump does not contain any nodes"));
        }

        Ok(Self { permutation, nodes })
    }

    /// The integers of the variable order line
    #[inline]
    pub fn permutation(&self) -> &[u32] {
        &self.permutation
    }

    /// Number of node lines
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Parse every node line as record type `R`
    fn records<R: Record>(&self) -> impl Iterator<Item = Result<R, MalformedInput>> + '_ {
        self.nodes.iter().map(|&(line_no, line)| {
            let [a, b, c, d] = parse_fields(line, line_no)?;
            Ok(R::from_fields(a, b, c, d))
        })
    }
}

/// Variable names supplied alongside a dump
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VarNames(Vec<String>);

impl VarNames {
    /// Split `text` at whitespace
    ///
    /// Returns `None` if `text` does not contain any name.
    pub fn parse(text: &str) -> Option<Self> {
        Self::from_names(text.split_whitespace())
    }

    /// Collect the given names, returns `None` if there are none
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Option<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            None
        } else {
            Some(Self(names))
        }
    }

    /// Number of names
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`, there is at least one name
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The names in declaration order
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// A node line with exactly four fields
trait Record: Sized {
    fn from_fields(a: u32, b: u32, c: u32, d: u32) -> Self;
}

/// Node line of the [direct permutation][DirectPermutation] dialect
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct DirectRecord {
    id: u32,
    level: u32,
    low: u32,
    high: u32,
}

impl Record for DirectRecord {
    fn from_fields(id: u32, level: u32, low: u32, high: u32) -> Self {
        Self {
            id,
            level,
            low,
            high,
        }
    }
}

/// Node line of the [inverted index][InvertedIndex] dialect
///
/// Note the order of the children, which is swapped compared to
/// [`DirectRecord`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct IndexedRecord {
    id: u32,
    /// Index into the variable order line
    index: u32,
    high: u32,
    low: u32,
}

impl Record for IndexedRecord {
    fn from_fields(id: u32, index: u32, high: u32, low: u32) -> Self {
        Self {
            id,
            index,
            high,
            low,
        }
    }
}

/// Strategy for turning a [`SourceDump`] into a [`Dump`]
pub trait BuddyDialect {
    /// Read `source`, using `names` as variable names if present
    fn read(
        &self,
        source: &SourceDump<'_>,
        names: Option<&VarNames>,
    ) -> Result<Dump, MalformedInput>;
}

/// The direct permutation dialect
///
/// The variable order line lists, for every position, the variable ID at that
/// position. It is used as `.permids` as is. Node lines are
/// `<id> <level> <low> <high>` and are copied unchanged. Support and ordered
/// variable names are the same list: the given names or, if absent, the
/// variable order line itself. The root name is the root ID.
#[derive(Clone, Copy, Default, Debug)]
pub struct DirectPermutation;

impl BuddyDialect for DirectPermutation {
    fn read(
        &self,
        source: &SourceDump<'_>,
        names: Option<&VarNames>,
    ) -> Result<Dump, MalformedInput> {
        let permids = source.permutation().to_vec();
        let mut ids = permids.clone();
        ids.sort_unstable();

        let nodes = source
            .records::<DirectRecord>()
            .map(|record| {
                record.map(|r| Node {
                    id: r.id,
                    level: r.level,
                    low: r.low,
                    high: r.high,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let var_names: Vec<String> = match names {
            Some(names) => names.as_slice().to_vec(),
            None => permids.iter().map(u32::to_string).collect(),
        };

        let root = root_id(&nodes)?;
        Ok(Dump {
            varnames: var_names.clone(),
            suppvarnames: var_names.clone(),
            orderedvarnames: var_names,
            ids,
            permids,
            root,
            root_name: root.to_string(),
            nodes,
        })
    }
}

/// The inverted index dialect
///
/// The variable order line lists, for every level, the position this level
/// maps to. The `.permids` are obtained via [`invert_permutation()`]. Node
/// lines are `<id> <index> <high> <low>`, where `index` refers to an entry of
/// the variable order line, which is the node's level. The given names (or
/// `x0`, `x1`, ... if absent) are the ordered variable names, the support
/// variable names are reindexed through the `.permids`. Surplus names are
/// dropped. The root name is a fixed placeholder.
#[derive(Clone, Copy, Default, Debug)]
pub struct InvertedIndex;

impl BuddyDialect for InvertedIndex {
    fn read(
        &self,
        source: &SourceDump<'_>,
        names: Option<&VarNames>,
    ) -> Result<Dump, MalformedInput> {
        let indices = source.permutation();
        let permids =
            invert_permutation(indices).map_err(|err| err.with_line(PERMUTATION_LINE))?;
        let mut ids = permids.clone();
        ids.sort_unstable();

        let orderedvarnames: Vec<String> = match names {
            Some(names) if names.len() < permids.len() => {
                return Err(MalformedInput::new(format!(
                    "expected at least {} variable names, got {}",
                    permids.len(),
                    names.len()
                )));
            }
            // names beyond the variable count are not referenced
            Some(names) => names.as_slice()[..permids.len()].to_vec(),
            None => ids.iter().map(|id| format!("x{id}")).collect(),
        };
        // `permids` is a permutation of `0..n`, so indexing cannot fail
        let suppvarnames = permids
            .iter()
            .map(|&var| orderedvarnames[var as usize].clone())
            .collect();

        let nodes = source
            .nodes
            .iter()
            .zip(source.records::<IndexedRecord>())
            .map(|(&(line_no, _), record)| {
                let r = record?;
                let Some(&level) = indices.get(r.index as usize) else {
                    return Err(MalformedInput::at_line(
                        line_no,
                        format!(
                            "permutation index {} out of range for {} variables",
                            r.index,
                            indices.len()
                        ),
                    ));
                };
                Ok(Node {
                    id: r.id,
                    level,
                    low: r.low,
                    high: r.high,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dump {
            varnames: orderedvarnames.clone(),
            suppvarnames,
            orderedvarnames,
            ids,
            permids,
            root: root_id(&nodes)?,
            root_name: PLACEHOLDER_ROOT_NAME.to_string(),
            nodes,
        })
    }
}

/// Source dump dialect
///
/// The two dialects stem from two different tools. They are selected
/// explicitly by the caller, there is no detection based on the content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub enum Dialect {
    /// See [`DirectPermutation`]
    #[default]
    Direct,
    /// See [`InvertedIndex`]
    Inverted,
}

impl Dialect {
    /// All dialects
    pub const ALL: [Dialect; 2] = [Dialect::Direct, Dialect::Inverted];

    /// Read `source` using this dialect's strategy
    pub fn read(
        self,
        source: &SourceDump<'_>,
        names: Option<&VarNames>,
    ) -> Result<Dump, MalformedInput> {
        match self {
            Dialect::Direct => DirectPermutation.read(source, names),
            Dialect::Inverted => InvertedIndex.read(source, names),
        }
    }

    /// Lowercase name as accepted by [`FromStr`]
    pub fn as_str(self) -> &'static str {
        match self {
            Dialect::Direct => "direct",
            Dialect::Inverted => "inverted",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`Dialect`] name
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParseDialectError(String);

impl fmt::Display for ParseDialectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown dialect '{}' (expected 'direct' or 'inverted')",
            self.0
        )
    }
}
impl std::error::Error for ParseDialectError {}

impl FromStr for Dialect {
    type Err = ParseDialectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" | "a" | "A" => Ok(Dialect::Direct),
            "inverted" | "b" | "B" => Ok(Dialect::Inverted),
            _ => Err(ParseDialectError(s.to_string())),
        }
    }
}

/// Invert a mapping from levels to positions
///
/// Returns `perm` such that `perm[indices[level]] == level` for every level.
/// Fails if `indices` is not a permutation of `0..indices.len()`. Applying the
/// function twice yields the original mapping.
pub fn invert_permutation(indices: &[u32]) -> Result<Vec<u32>, MalformedInput> {
    let n = indices.len();
    let mut perm = vec![0; n];
    let mut filled = bitvec![0; n];
    for (level, &pos) in (0u32..).zip(indices) {
        let pos_idx = pos as usize;
        if pos_idx >= n {
            return Err(MalformedInput::new(format!(
                "position {pos} out of range for {n} variables"
            )));
        }
        if filled.replace(pos_idx, true) {
            return Err(MalformedInput::new(format!(
                "position {pos} occurs more than once"
            )));
        }
        perm[pos_idx] = level;
    }
    Ok(perm)
}

/// ID of the last node, which is the root by convention
fn root_id(nodes: &[Node]) -> Result<u32, MalformedInput> {
    match nodes.last() {
        Some(node) => Ok(node.id),
        None => Err(MalformedInput::new("the dump does not contain any nodes")),
    }
}

/// Parse the first four fields of a node line
///
/// Additional fields are ignored.
fn parse_fields(line: &str, line_no: usize) -> Result<[u32; 4], MalformedInput> {
    let mut fields = [0; 4];
    let mut tokens = line.split_whitespace();
    for (i, field) in fields.iter_mut().enumerate() {
        let Some(token) = tokens.next() else {
            return Err(MalformedInput::at_line(
                line_no,
                format!("expected 4 fields in node record, found {i}"),
            ));
        };
        *field = parse_u32(token, line_no)?;
    }
    Ok(fields)
}

/// Parse a single unsigned integer (no spaces etc. allowed)
fn parse_u32(token: &str, line_no: usize) -> Result<u32, MalformedInput> {
    let mut res: u32 = 0;
    for c in token.chars() {
        let Some(digit) = c.to_digit(10) else {
            return Err(MalformedInput::at_line(
                line_no,
                format!("unexpected char '{c}' in integer '{token}'"),
            ));
        };
        res = match res.checked_mul(10).and_then(|v| v.checked_add(digit)) {
            Some(v) => v,
            None => {
                return Err(MalformedInput::at_line(
                    line_no,
                    format!("integer '{token}' too large"),
                ))
            }
        };
    }
    if token.is_empty() {
        return Err(MalformedInput::at_line(line_no, "expected an integer"));
    }
    Ok(res)
}

/// Parse a space (or tab) separated, non-empty list of integers
fn parse_u32_list(input: &str, line_no: usize) -> Result<Vec<u32>, MalformedInput> {
    let list = input
        .split_whitespace()
        .map(|token| parse_u32(token, line_no))
        .collect::<Result<Vec<_>, _>>()?;
    if list.is_empty() {
        return Err(MalformedInput::at_line(
            line_no,
            "expected a space-separated list of integers",
        ));
    }
    Ok(list)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_u32() {
        assert_eq!(parse_u32("0", 1), Ok(0));
        assert_eq!(parse_u32("4294967295", 1), Ok(u32::MAX));
        assert!(parse_u32("4294967296", 1).is_err());
        assert!(parse_u32("-1", 1).is_err());
        assert!(parse_u32("1a", 1).is_err());
        assert_eq!(parse_u32("", 3).unwrap_err().line(), Some(3));
    }

    #[test]
    fn test_parse_u32_list() {
        assert_eq!(parse_u32_list("2 0 1", 2), Ok(vec![2, 0, 1]));
        assert_eq!(parse_u32_list(" 2\t0  1 ", 2), Ok(vec![2, 0, 1]));
        assert!(parse_u32_list("", 2).is_err());
        assert!(parse_u32_list("   ", 2).is_err());
        assert!(parse_u32_list("1 x 2", 2).is_err());
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(parse_fields("5 1 7 6", 3), Ok([5, 1, 7, 6]));
        assert_eq!(parse_fields("5 1 7 6 9", 3), Ok([5, 1, 7, 6]));
        let err = parse_fields("5 1 7", 4).unwrap_err();
        assert_eq!(err.line(), Some(4));
        assert_eq!(err.reason(), "expected 4 fields in node record, found 3");
    }

    #[test]
    fn source_dump_lines() {
        let dump = SourceDump::parse("2 2\r\n1 0\r\n2 1 0 1\r\n\r\n3 0 0 2\r\n").unwrap();
        assert_eq!(dump.permutation(), &[1, 0]);
        assert_eq!(dump.num_nodes(), 2);
        assert_eq!(dump.nodes, [(3, "2 1 0 1"), (5, "3 0 0 2")]);
    }

    #[test]
    fn source_dump_too_short() {
        assert!(SourceDump::parse("").is_err());
        assert!(SourceDump::parse("2 2").is_err());
        // no nodes
        assert!(SourceDump::parse("2 2\n0 1").is_err());
        assert!(SourceDump::parse("2 2\n0 1\n\n").is_err());
    }

    #[test]
    fn indexed_record_field_order() {
        let dump = SourceDump::parse("h\n0\n5 1 7 6").unwrap();
        let records: Vec<IndexedRecord> = dump
            .records::<IndexedRecord>()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            records,
            [IndexedRecord {
                id: 5,
                index: 1,
                high: 7,
                low: 6
            }]
        );
    }

    #[test]
    fn test_invert_permutation() {
        assert_eq!(invert_permutation(&[2, 0, 1]), Ok(vec![1, 2, 0]));
        assert_eq!(invert_permutation(&[1, 2, 0]), Ok(vec![2, 0, 1]));
        assert_eq!(invert_permutation(&[0]), Ok(vec![0]));
        assert_eq!(invert_permutation(&[]), Ok(vec![]));

        assert!(invert_permutation(&[0, 2]).is_err());
        assert!(invert_permutation(&[1, 1]).is_err());
    }

    #[test]
    fn var_names() {
        assert_eq!(VarNames::parse(""), None);
        assert_eq!(VarNames::parse(" \n\t"), None);
        let names = VarNames::parse("a\nb c\n").unwrap();
        assert_eq!(names.as_slice(), ["a", "b", "c"]);
        assert_eq!(names.len(), 3);
        assert!(!names.is_empty());
    }

    #[test]
    fn dialect_from_str() {
        for dialect in Dialect::ALL {
            assert_eq!(dialect.as_str().parse(), Ok(dialect));
        }
        assert_eq!("A".parse(), Ok(Dialect::Direct));
        assert_eq!("b".parse(), Ok(Dialect::Inverted));
        assert!("buddy".parse::<Dialect>().is_err());
    }
}
