use std::ops::Range;

/// Handle to one source file registered in a [`SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Byte range inside one source file. Every AST node and definition carries
/// one; diagnostics resolve them back to file/line/column at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub source_id: SourceId,
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(source_id: SourceId, start: usize, end: usize) -> Self {
        Self {
            source_id,
            start,
            end,
        }
    }

    /// Synthetic span for definitions injected by the platform strategy.
    /// Not backed by any source in the map.
    pub const fn builtin() -> Self {
        Self {
            source_id: SourceId(u32::MAX),
            start: 0,
            end: 0,
        }
    }

    pub fn as_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// One registered source: display name, full text, and the byte offset of
/// each line start (always at least the offset 0 for line one).
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
    line_offsets: Vec<usize>,
}

impl SourceFile {
    fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let line_offsets = std::iter::once(0)
            .chain(
                text.bytes()
                    .enumerate()
                    .filter(|&(_, byte)| byte == b'\n')
                    .map(|(offset, _)| offset + 1),
            )
            .collect();

        Self {
            name: name.into(),
            text,
            line_offsets,
        }
    }

    /// One-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(exact) => exact,
            Err(next) => next - 1,
        };
        (line + 1, offset - self.line_offsets[line] + 1)
    }

    pub fn slice(&self, span: Span) -> &str {
        &self.text[span.start..span.end]
    }
}

/// All sources participating in one build, addressed by [`SourceId`].
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn add_source(&mut self, name: impl Into<String>, text: impl Into<String>) -> SourceId {
        let id = SourceId(self.files.len() as u32);
        self.files.push(SourceFile::new(name, text));
        id
    }

    pub fn get(&self, source_id: SourceId) -> Option<&SourceFile> {
        self.files.get(source_id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_line_and_column() {
        let mut map = SourceMap::default();
        let source_id = map.add_source("test", "first\nsecond\nthird");
        let file = map.get(source_id).expect("file");
        assert_eq!(file.line_col(0), (1, 1));
        assert_eq!(file.line_col(6), (2, 1));
        assert_eq!(file.line_col(7), (2, 2));
        assert_eq!(file.line_col(14), (3, 2));
    }

    #[test]
    fn slices_by_span() {
        let mut map = SourceMap::default();
        let source_id = map.add_source("test", "let x = 5");
        let file = map.get(source_id).expect("file");
        assert_eq!(file.slice(Span::new(source_id, 4, 5)), "x");
    }

    #[test]
    fn builtin_span_has_no_source() {
        let map = SourceMap::default();
        assert!(map.get(Span::builtin().source_id).is_none());
    }
}
