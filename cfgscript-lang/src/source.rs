//! Source files and byte-offset to line/column mapping

use cfgscript_core::Position;
use std::sync::Arc;

/// A module's name together with the line table of its text.
#[derive(Debug)]
pub struct SourceFile {
    name: Arc<str>,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: impl Into<Arc<str>>, text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            name: name.into(),
            line_starts,
        }
    }

    /// The module path this source was loaded from
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Map a byte offset to a 1-based line and column
    pub fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = offset - self.line_starts[line];
        Position::new(self.name.clone(), line as u32 + 1, column as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions() {
        let file = SourceFile::new("a.cfg", "x = 1\ny = 2\n\nz = 3");
        assert_eq!(file.position(0).to_string(), "a.cfg:1:1");
        assert_eq!(file.position(4).to_string(), "a.cfg:1:5");
        assert_eq!(file.position(6).to_string(), "a.cfg:2:1");
        assert_eq!(file.position(13).to_string(), "a.cfg:4:1");
    }
}
