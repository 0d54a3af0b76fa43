//! Parser for the DIMACS CNF and WCNF file formats.
use std::io::Read;

use thiserror::Error;

use crate::lit::{Lit, Var};

use super::{TokenKind, Tokenizer};

/// Error while parsing a DIMACS CNF or WCNF file.
#[derive(Error, Debug)]
pub enum ParseError {
    /// Error while parsing an input line.
    #[error("{line}: {message}")]
    ParseError {
        /// Line number where an error was encountered.
        line: usize,
        /// Description of the encountered error.
        message: String,
    },
    /// IO error while reading the input file.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Whether an input file carries clause weights.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FormulaKind {
    /// `p cnf` — every clause has weight 1.
    Cnf,
    /// `p wcnf` — every clause is prefixed by a positive integer weight.
    Wcnf,
}

/// Header data of a DIMACS CNF or WCNF file.
#[derive(Copy, Clone, Debug)]
pub struct Header {
    /// Whether the file is weighted.
    pub kind: FormulaKind,
    /// Upper bound on the number of variables present in the formula.
    pub var_count: usize,
    /// Number of clauses present in the formula.
    pub clause_count: usize,
    /// The hard-clause weight some WCNF files declare as a fourth header
    /// field. Parsed so such files load, but otherwise ignored: every clause
    /// is treated as soft.
    pub top: Option<u64>,
}

/// A parsed clause: its literals and its weight.
///
/// The weight is 1 for every clause of a CNF file.
#[derive(Copy, Clone, Debug)]
pub struct ParsedClause<'a> {
    /// Literals of the clause, in input order.
    pub lits: &'a [Lit],
    /// Weight of the clause.
    pub weight: u64,
}

/// Parser for the DIMACS CNF and WCNF file formats.
pub struct Parser<'a> {
    tokenizer: Tokenizer<'a>,
    header: Option<Header>,
    parsed_clauses: usize,
    clause: Vec<Lit>,
}

macro_rules! parse_error {
    ($self:ident, $token:ident, $($args:expr),*) => {
        let err = ParseError::ParseError {
            line: $token.line,
            message: format!($($args),*),
        };
        $self.tokenizer.check_io_error()?;
        return Err(err);
    };
}

impl<'a> Parser<'a> {
    /// Initialize a [`Parser`] from a [`Tokenizer`].
    pub fn new(tokenizer: Tokenizer<'a>) -> Self {
        Parser {
            tokenizer,
            header: None,
            parsed_clauses: 0,
            clause: vec![],
        }
    }

    /// Initialize a [`Parser`] with an underlying [`Read`] instance.
    pub fn from_read(read: impl Read + 'a) -> Self {
        Self::new(Tokenizer::from_read(read))
    }

    /// Parse and return the header.
    ///
    /// This caches the result and can be called at any point during parsing.
    pub fn header(&mut self) -> Result<Header, ParseError> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        loop {
            let token = self.tokenizer.current_token();
            match token.kind {
                TokenKind::Comment | TokenKind::Newline => self.tokenizer.advance(),
                TokenKind::Word if token.bytes == "p" => {
                    self.tokenizer.advance();
                    let header = self.parse_header_fields()?;
                    self.header = Some(header);
                    return Ok(header);
                }
                _ => {
                    parse_error!(self, token, "unexpected {}, expected file header", token);
                }
            }
        }
    }

    fn parse_header_fields(&mut self) -> Result<Header, ParseError> {
        let mut token = self.tokenizer.current_token();
        let kind = if token.bytes == "cnf" {
            FormulaKind::Cnf
        } else if token.bytes == "wcnf" {
            FormulaKind::Wcnf
        } else {
            parse_error!(self, token, "unexpected {}, expected \"cnf\" or \"wcnf\"", token);
        };
        self.tokenizer.advance();

        token = self.tokenizer.current_token();
        let var_count = match token.kind {
            TokenKind::Int if token.value >= 0 && token.value <= Var::MAX_DIMACS as i64 => {
                token.value as usize
            }
            _ => {
                parse_error!(self, token, "unexpected {}, expected variable count", token);
            }
        };
        self.tokenizer.advance();

        token = self.tokenizer.current_token();
        let clause_count = match token.kind {
            TokenKind::Int if token.value >= 0 => token.value as usize,
            _ => {
                parse_error!(self, token, "unexpected {}, expected clause count", token);
            }
        };
        self.tokenizer.advance();

        let mut top = None;
        token = self.tokenizer.current_token();
        if kind == FormulaKind::Wcnf && token.kind == TokenKind::Int && token.value > 0 {
            top = Some(token.value as u64);
            self.tokenizer.advance();
            token = self.tokenizer.current_token();
        }

        match token.kind {
            TokenKind::Newline | TokenKind::EndOfFile => {
                self.tokenizer.advance();
                Ok(Header {
                    kind,
                    var_count,
                    clause_count,
                    top,
                })
            }
            _ => {
                parse_error!(self, token, "unexpected {}, expected end of line", token);
            }
        }
    }

    /// Parse and return the next clause with its weight.
    ///
    /// Returns `Ok(None)` on end of file.
    pub fn next_clause(&mut self) -> Result<Option<ParsedClause>, ParseError> {
        let header = self.header()?;
        self.clause.clear();

        let mut weight = match header.kind {
            FormulaKind::Cnf => 1,
            // The weight of a WCNF clause is read once its first token shows
            // up, so blank and comment lines in between are still skipped.
            FormulaKind::Wcnf => 0,
        };

        loop {
            let mut token = self.tokenizer.current_token();
            match token.kind {
                TokenKind::Comment | TokenKind::Newline => self.tokenizer.advance(),
                TokenKind::EndOfFile
                    if self.clause.is_empty()
                        && (header.kind == FormulaKind::Cnf || weight == 0) =>
                {
                    if self.parsed_clauses != header.clause_count {
                        parse_error!(
                            self,
                            token,
                            "unexpected end of file, expected further clauses"
                        );
                    }
                    return Ok(None);
                }
                TokenKind::Int if weight == 0 => {
                    // First integer of a WCNF clause: its weight.
                    if token.value <= 0 {
                        parse_error!(self, token, "invalid clause weight {}", token);
                    }
                    weight = token.value as u64;
                    self.tokenizer.advance();
                }
                TokenKind::Int if token.value == 0 => {
                    self.tokenizer.advance();
                    token = self.tokenizer.current_token();
                    if !matches!(token.kind, TokenKind::Newline | TokenKind::EndOfFile) {
                        parse_error!(self, token, "unexpected {}, expected end of line", token);
                    }
                    self.parsed_clauses += 1;
                    if self.parsed_clauses > header.clause_count {
                        parse_error!(self, token, "unexpected clause, expected end of file");
                    }
                    self.tokenizer.advance();
                    return Ok(Some(ParsedClause {
                        lits: &self.clause,
                        weight,
                    }));
                }
                TokenKind::Int if token.value.unsigned_abs() <= header.var_count as u64 => {
                    self.clause.push(Lit::from_dimacs(token.value as isize));
                    self.tokenizer.advance();
                }
                TokenKind::Int => {
                    parse_error!(self, token, "literal {} outside specified range", token);
                }
                _ => {
                    parse_error!(self, token, "unexpected {}, expected literal", token);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    macro_rules! clause {
        ($($lit:expr),*) => {
            vec![$(Lit::from_dimacs($lit)),*]
        };
    }

    macro_rules! assert_matches {
        ($value:expr, $matches:pat) => {
            let value = $value;
            assert!(
                matches!(&value, &$matches),
                "{:?} does not match {}",
                value,
                stringify!($matches)
            );
        };
    }

    fn collect(input: &str) -> Result<(Header, Vec<(Vec<Lit>, u64)>), ParseError> {
        let mut parser = Parser::from_read(input.as_bytes());
        let header = parser.header()?;
        let mut clauses = vec![];
        while let Some(clause) = parser.next_clause()? {
            clauses.push((clause.lits.to_vec(), clause.weight));
        }
        Ok((header, clauses))
    }

    #[test]
    fn empty_cnf() -> Result<()> {
        let (header, clauses) = collect("p cnf 0 0\n")?;
        assert_eq!(header.kind, FormulaKind::Cnf);
        assert_eq!(header.var_count, 0);
        assert_eq!(header.clause_count, 0);
        assert!(clauses.is_empty());
        Ok(())
    }

    #[test]
    fn simple_cnf() -> Result<()> {
        let (header, clauses) = collect("p cnf 3 2\n1 2 -3 0\n-1 3 0\n")?;
        assert_eq!(header.var_count, 3);
        assert_eq!(
            clauses,
            vec![(clause![1, 2, -3], 1), (clause![-1, 3], 1)]
        );
        Ok(())
    }

    #[test]
    fn eof_terminates_last_clause() -> Result<()> {
        let (_, clauses) = collect("p cnf 2 1\n1 -2 0")?;
        assert_eq!(clauses, vec![(clause![1, -2], 1)]);
        Ok(())
    }

    #[test]
    fn clauses_split_across_lines() -> Result<()> {
        let (_, clauses) = collect("p cnf 3 2\n1 2\n-3 0\n-1\n3\n0\n")?;
        assert_eq!(
            clauses,
            vec![(clause![1, 2, -3], 1), (clause![-1, 3], 1)]
        );
        Ok(())
    }

    #[test]
    fn comments_between_clauses() -> Result<()> {
        let (_, clauses) = collect("c head\np cnf 2 2\nc mid 0\n1 0\nc tail\n-2 0\n")?;
        assert_eq!(clauses, vec![(clause![1], 1), (clause![-2], 1)]);
        Ok(())
    }

    #[test]
    fn crlf_newlines() -> Result<()> {
        let (_, clauses) = collect("p cnf 2 1\r\n1 -2 0\r\n")?;
        assert_eq!(clauses, vec![(clause![1, -2], 1)]);
        Ok(())
    }

    #[test]
    fn simple_wcnf() -> Result<()> {
        let (header, clauses) = collect("p wcnf 2 2\n5 1 0\n3 -1 2 0\n")?;
        assert_eq!(header.kind, FormulaKind::Wcnf);
        assert_eq!(clauses, vec![(clause![1], 5), (clause![-1, 2], 3)]);
        Ok(())
    }

    #[test]
    fn wcnf_top_is_parsed_and_ignored() -> Result<()> {
        let (header, clauses) = collect("p wcnf 2 2 100\n5 1 0\n3 -1 2 0\n")?;
        assert_eq!(header.top, Some(100));
        assert_eq!(clauses.len(), 2);
        Ok(())
    }

    #[test]
    fn wcnf_clause_split_after_weight() -> Result<()> {
        let (_, clauses) = collect("p wcnf 2 1\n7\n1 -2\n0\n")?;
        assert_eq!(clauses, vec![(clause![1, -2], 7)]);
        Ok(())
    }

    #[test]
    fn err_missing_header() {
        let mut parser = Parser::from_read("1 2 0\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 1, .. })
        );
    }

    #[test]
    fn err_wrong_format_name() {
        let mut parser = Parser::from_read("p dnf 2 1\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 1, .. })
        );
    }

    #[test]
    fn err_negative_var_count() {
        let mut parser = Parser::from_read("p cnf -1 0\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 1, .. })
        );
    }

    #[test]
    fn err_extra_header_field() {
        let mut parser = Parser::from_read("p cnf 2 1 2\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 1, .. })
        );
    }

    #[test]
    fn err_missing_clauses() -> Result<()> {
        let mut parser = Parser::from_read("p cnf 3 2\n1 -2 3 0\n".as_bytes());
        assert!(parser.next_clause()?.is_some());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 3, .. })
        );
        Ok(())
    }

    #[test]
    fn err_extra_clauses() -> Result<()> {
        let mut parser = Parser::from_read("p cnf 3 1\n1 0\n2 0\n".as_bytes());
        assert!(parser.next_clause()?.is_some());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 3, .. })
        );
        Ok(())
    }

    #[test]
    fn err_literal_out_of_range() -> Result<()> {
        let mut parser = Parser::from_read("p cnf 3 2\n1 -2 3 0\n2 -4 0\n".as_bytes());
        assert!(parser.next_clause()?.is_some());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 3, .. })
        );
        Ok(())
    }

    #[test]
    fn err_unterminated_clause() -> Result<()> {
        let mut parser = Parser::from_read("p cnf 3 2\n1 -2 3 0\n2 -3".as_bytes());
        assert!(parser.next_clause()?.is_some());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 3, .. })
        );
        Ok(())
    }

    #[test]
    fn err_dangling_literal() -> Result<()> {
        let mut parser = Parser::from_read("p cnf 3 2\n1 -2 3 0\n2 -3 0 1 0\n".as_bytes());
        assert!(parser.next_clause()?.is_some());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 3, .. })
        );
        Ok(())
    }

    #[test]
    fn err_zero_wcnf_weight() {
        let mut parser = Parser::from_read("p wcnf 2 1\n0 1 0\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 2, .. })
        );
    }

    #[test]
    fn err_negative_wcnf_weight() {
        let mut parser = Parser::from_read("p wcnf 2 1\n-5 1 0\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 2, .. })
        );
    }

    #[test]
    fn err_word_in_clause() {
        let mut parser = Parser::from_read("p cnf 2 1\n1 x 0\n".as_bytes());
        assert_matches!(
            parser.next_clause(),
            Err(ParseError::ParseError { line: 2, .. })
        );
    }
}
