//! Simulated incremental delivery.
//!
//! The backend call is not streaming. Its reply is re-emitted as
//! whitespace-delimited chunks with a small fixed delay so clients render
//! text progressively.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use futures::stream;

pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(15);

/// Each chunk keeps its trailing whitespace, so the chunks concatenate to `text`.
pub fn split_chunks(text: &str) -> Vec<String> {
    text.split_inclusive(char::is_whitespace)
        .map(str::to_string)
        .collect()
}

pub fn chunk_stream(
    text: &str,
    delay: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static + use<> {
    let chunks = split_chunks(text).into_iter();

    stream::unfold((chunks, true), move |(mut chunks, first)| async move {
        let chunk = chunks.next()?;
        if !first && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some((Ok(Bytes::from(chunk)), (chunks, false)))
    })
}
