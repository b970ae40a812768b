use super::normalizer::ProviderEnvelope;
use crate::error::{ReconcileError, Result};
use std::io::{BufRead, BufReader, Read};

/// Reads webhook envelopes from a JSON-lines source, one delivery per line.
///
/// A bad line yields an error item and the stream moves on, so one corrupt
/// delivery never hides the rest. Blank lines are ignored.
pub struct EventReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> EventReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Lazily yields `(line_number, envelope)` pairs.
    pub fn envelopes(self) -> impl Iterator<Item = (usize, Result<ProviderEnvelope>)> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(index, line)| {
                let line_number = index + 1;
                match line {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some((line_number, ProviderEnvelope::parse(line.as_bytes()))),
                    Err(e) => Some((line_number, Err(ReconcileError::from(e)))),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let data = concat!(
            r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#,
            "\n\n",
            r#"{"id":"evt_2","type":"charge.failed","data":{"object":{"payment_intent":"pi_2"}}}"#,
            "\n"
        );
        let results: Vec<_> = EventReader::new(data.as_bytes()).envelopes().collect();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1].0, 3);
        assert_eq!(results[1].1.as_ref().unwrap().event_type, "charge.failed");
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "{broken\n{\"type\":\"x\",\"data\":{\"object\":{}}}\n";
        let results: Vec<_> = EventReader::new(data.as_bytes()).envelopes().collect();

        assert!(matches!(results[0].1, Err(ReconcileError::Malformed(_))));
        assert!(results[1].1.is_ok());
    }
}
