use std::io::{BufRead, BufReader, Read};

use crate::formatted::error::ChangeLogParseError;

/// Reads lines from a byte stream, tracking 1-based line numbers and
/// normalising both LF and CRLF endings (handled by `std::io::Lines`).
pub struct LineScanner {
    lines: std::io::Lines<BufReader<Box<dyn Read>>>,
    line_no: usize,
}

impl LineScanner {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            line_no: 0,
        }
    }

    pub fn read_line(&mut self) -> Result<Option<(usize, String)>, ChangeLogParseError> {
        match self.lines.next() {
            None => Ok(None),
            Some(Ok(line)) => {
                self.line_no += 1;
                Ok(Some((self.line_no, line)))
            }
            Some(Err(e)) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn counts_lines_across_endings() {
        let data = b"one\r\ntwo\nthree".to_vec();
        let mut scanner = LineScanner::new(Box::new(Cursor::new(data)));
        assert_eq!(scanner.read_line().unwrap(), Some((1, "one".to_string())));
        assert_eq!(scanner.read_line().unwrap(), Some((2, "two".to_string())));
        assert_eq!(scanner.read_line().unwrap(), Some((3, "three".to_string())));
        assert_eq!(scanner.read_line().unwrap(), None);
    }
}
