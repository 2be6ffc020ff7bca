use std::collections::BTreeMap;
use std::fmt;

use crate::source::Span;

/// Size of the state set after each validated statement, grouped by file in
/// validation order. Loop bodies and generic functions show up once per
/// validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatesLog {
    files: BTreeMap<String, Vec<(usize, usize)>>,
}

impl StatesLog {
    pub fn record(&mut self, span: &Span, states: usize) {
        self.files
            .entry(span.file.to_string())
            .or_default()
            .push((span.start.line, states));
    }

    pub fn entries(&self, file: &str) -> &[(usize, usize)] {
        self.files.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[(usize, usize)])> {
        self.files
            .iter()
            .map(|(file, entries)| (file.as_str(), entries.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn peak(&self, file: &str, line: usize) -> Option<usize> {
        self.entries(file)
            .iter()
            .filter(|(l, _)| *l == line)
            .map(|(_, states)| *states)
            .max()
    }
}

impl fmt::Display for StatesLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (file, entries) in &self.files {
            writeln!(f, "{}", file)?;
            for (line, states) in entries {
                writeln!(f, "{}: {}", line, states)?;
            }
        }
        Ok(())
    }
}
