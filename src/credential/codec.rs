//! Sequence commitment codec.
//!
//! Image references are opaque URLs and may contain any character, so they are
//! framed by length instead of joined with a delimiter: every element is written
//! as its byte length (u64, big-endian) followed by its UTF-8 bytes. The framed
//! bytes are hashed with SHA-256 and hex encoded.

use sha2::{Digest, Sha256};

use super::{CredentialDigest, OrderedSelection};

/// Commit an ordered selection to its digest.
#[must_use]
pub fn commit(selection: &OrderedSelection) -> CredentialDigest {
    CredentialDigest::from_bytes(&digest_images(selection.images()))
}

/// Frame and hash an arbitrary image list, returning lowercase hex.
///
/// No cardinality or uniqueness checks are applied here; use [`commit`] with an
/// [`OrderedSelection`] for credential material.
#[must_use]
pub fn commit_images<S: AsRef<str>>(images: &[S]) -> String {
    hex::encode(digest_images(images))
}

fn digest_images<S: AsRef<str>>(images: &[S]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for image in images {
        let bytes = image.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    }
    hasher.finalize().into()
}
