//! Content digests for partition and dedup keys
//!
//! MD5 rendered as 32 lowercase hex characters. Each thread keeps one hasher
//! and resets it after every digest.

use md5::{Digest, Md5};
use std::cell::RefCell;

thread_local! {
    static HASHER: RefCell<Md5> = RefCell::new(Md5::new());
}

/// Length of a rendered digest
pub const DIGEST_HEX_LEN: usize = 32;

/// MD5 of `input` as lowercase hex
pub fn digest(input: &str) -> String {
    digest_bytes(input.as_bytes())
}

/// MD5 of raw bytes as lowercase hex
pub fn digest_bytes(input: &[u8]) -> String {
    HASHER.with(|hasher| {
        let mut hasher = hasher.borrow_mut();
        hasher.update(input);
        hex::encode(hasher.finalize_reset())
    })
}
