use thiserror::Error;

/// Failures a cursor can report to its caller.
///
/// These cover reads that no amount of pulling from the source can satisfy.
/// Exhaustion of the source itself is not an error, it is observable through
/// [`Cursor::is_empty`](crate::Cursor::is_empty).
#[derive(Debug, Error)]
pub enum RewindError {
    #[error("cursor at offset {0} has no element to read, source is exhausted")]
    EndOfSource(usize),

    #[error("cursor at offset {offset} cannot reach element {index}, only {available} available")]
    OutOfRange {
        offset: usize,
        index: usize,
        available: usize,
    },

    #[error("cannot reach element {index} from offset {offset}, position would overflow")]
    IndexOverflow { offset: usize, index: usize },
}
