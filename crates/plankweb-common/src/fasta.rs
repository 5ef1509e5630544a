//! Minimal FASTA reading and writing.

/// One FASTA entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub header: String,
    pub sequence: String,
}

const LINE_WIDTH: usize = 80;

/// Parse FASTA text. Sequence lines before any header form an unnamed record.
pub fn parse(text: &str) -> Vec<FastaRecord> {
    let mut records = Vec::new();
    let mut current: Option<FastaRecord> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(header) = line.strip_prefix('>') {
            if let Some(done) = current.take() {
                records.push(done);
            }
            current = Some(FastaRecord { header: header.trim().to_string(), sequence: String::new() });
        } else {
            current
                .get_or_insert_with(|| FastaRecord { header: String::new(), sequence: String::new() })
                .sequence
                .extend(line.chars().filter(|c| !c.is_whitespace()).map(|c| c.to_ascii_uppercase()));
        }
    }
    if let Some(done) = current {
        records.push(done);
    }
    records.retain(|r| !r.sequence.is_empty());
    records
}

/// First sequence in the text, if any.
pub fn first_sequence(text: &str) -> Option<String> {
    parse(text).into_iter().next().map(|r| r.sequence)
}

/// Render a single record, wrapping at 80 columns.
pub fn render_record(header: &str, sequence: &str) -> String {
    let mut out = String::with_capacity(sequence.len() + header.len() + 8);
    out.push('>');
    out.push_str(header);
    out.push('\n');
    let bytes = sequence.as_bytes();
    for chunk in bytes.chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_record() {
        let records = parse(">one\nMKV\nLL\n\n>two\nggg\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, "MKVLL");
        assert_eq!(records[1].header, "two");
        assert_eq!(records[1].sequence, "GGG");
    }

    #[test]
    fn test_headerless_sequence() {
        assert_eq!(first_sequence("MKV\n").as_deref(), Some("MKV"));
        assert!(first_sequence(">only header\n").is_none());
    }

    #[test]
    fn test_render_wraps_long_sequences() {
        let seq = "A".repeat(170);
        let text = render_record("chains A", &seq);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].len(), 80);
        assert_eq!(parse(&text)[0].sequence, seq);
    }
}
