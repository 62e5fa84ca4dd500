//! SQL statement sniffing
//!
//! The MySQL detector only accepts a `COM_QUERY` or `COM_STMT_PREPARE`
//! packet on an unknown connection if its body looks like SQL. The check is
//! a cheap prefix match, not a parser.

/// Bytes of the body examined for a statement keyword
pub const SQL_SCAN_WINDOW: usize = 64;

/// Statement keywords recognized at the start of a body
const SQL_KEYWORDS: &[&[u8]] = &[
    b"SELECT", b"INSERT", b"UPDATE", b"DELETE", b"REPLACE", b"CREATE", b"DROP", b"ALTER",
    b"TRUNCATE", b"WITH", b"CALL", b"SHOW", b"SET", b"USE", b"BEGIN", b"START", b"COMMIT",
    b"ROLLBACK", b"EXPLAIN", b"DESCRIBE", b"DESC", b"GRANT", b"REVOKE", b"PREPARE", b"EXECUTE",
];

/// Decides whether a byte slice starts with a SQL statement
#[cfg_attr(test, mockall::automock)]
pub trait SqlSniffer: Send + Sync {
    /// Whether `buf` begins with something that looks like a SQL statement
    fn contains_sql_statement(&self, buf: &[u8]) -> bool;
}

/// Default sniffer: case-insensitive keyword match
///
/// Leading whitespace, opening parentheses and comments (`/* */`, `--`,
/// `#`) are skipped. Only the first [`SQL_SCAN_WINDOW`] bytes are looked at.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSniffer;

impl KeywordSniffer {
    /// Create a new keyword sniffer
    pub fn new() -> Self {
        Self
    }
}

impl SqlSniffer for KeywordSniffer {
    fn contains_sql_statement(&self, buf: &[u8]) -> bool {
        let window = &buf[..buf.len().min(SQL_SCAN_WINDOW)];
        let rest = &window[skip_preamble(window)..];

        SQL_KEYWORDS.iter().any(|keyword| starts_with_keyword(rest, keyword))
    }
}

/// Offset of the first byte after whitespace, parentheses and comments
fn skip_preamble(buf: &[u8]) -> usize {
    let mut i = 0;
    while i < buf.len() {
        match buf[i] {
            b' ' | b'\t' | b'\r' | b'\n' | b'(' => i += 1,
            b'/' if buf.get(i + 1) == Some(&b'*') => match find(&buf[i + 2..], b"*/") {
                Some(end) => i += 2 + end + 2,
                None => return buf.len(),
            },
            b'-' if buf.get(i + 1) == Some(&b'-') => i = skip_line(buf, i),
            b'#' => i = skip_line(buf, i),
            _ => break,
        }
    }
    i.min(buf.len())
}

fn skip_line(buf: &[u8], from: usize) -> usize {
    match buf[from..].iter().position(|&b| b == b'\n') {
        Some(newline) => from + newline + 1,
        None => buf.len(),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn starts_with_keyword(buf: &[u8], keyword: &[u8]) -> bool {
    if buf.len() < keyword.len() || !buf[..keyword.len()].eq_ignore_ascii_case(keyword) {
        return false;
    }
    // A keyword cut by the window still counts
    match buf.get(keyword.len()) {
        Some(&next) => !(next.is_ascii_alphanumeric() || next == b'_'),
        None => true,
    }
}
