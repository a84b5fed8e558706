//! Session id generation
//!
//! Ids correlate a capture session with the artifact the server stores for
//! it. They only need to be practically unique, not unguessable.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random id of exactly `length` characters from `[A-Za-z0-9]`.
pub fn generate(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
