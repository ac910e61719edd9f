//! User Supplied Secret (USS) derivation.
//!
//! The secret sent in the load handshake is the BLAKE2s-256 hash of raw user
//! input. The input is hashed as-is: no trimming, no encoding normalization,
//! trailing newlines included.
//!
//! Two sources can provide the input, the interactive prompt and a file (or
//! standard input when the file name is `-`). When both are requested, the
//! file wins and the prompt is skipped.

use std::fmt;
use std::fs;
use std::io::{self, Read};

use blake2::{Blake2s256, Digest};
use dialoguer::{theme::ColorfulTheme, Password};
use log::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

// =============================================================================
// Public Interface
// =============================================================================

pub const SECRET_LEN: usize = 32;

/// File name standing for standard input.
pub const STDIN_SENTINEL: &str = "-";

/// A derived secret. Wiped from memory when dropped and never printed.
#[derive(Clone, Eq, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_LEN]);
impl Secret {
    pub fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }
}
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// Hash `input` into a secret.
pub fn derive_secret(input: &[u8]) -> Secret {
    let mut hasher = Blake2s256::new();
    hasher.update(input);
    let mut secret = [0; SECRET_LEN];
    secret.copy_from_slice(&hasher.finalize());
    Secret(secret)
}

/// Where the secret input comes from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SecretSource {
    Prompt,
    File(String),
}
impl SecretSource {
    /// Pick the source for a load. A file always takes precedence over the
    /// prompt.
    pub fn select(enter: bool, file: Option<&str>) -> Option<SecretSource> {
        match (enter, file) {
            (true, Some(path)) => {
                warn!("both a USS file and USS entry were requested, using `{}`", path);
                Some(SecretSource::File(path.to_owned()))
            }
            (_, Some(path)) => Some(SecretSource::File(path.to_owned())),
            (true, None) => Some(SecretSource::Prompt),
            (false, None) => None,
        }
    }

    /// Read the raw input from the source and derive the secret from it.
    pub fn read(&self) -> Result<Secret> {
        let mut input = match self {
            SecretSource::Prompt => prompt_phrase(),
            SecretSource::File(path) => read_file(path),
        }
        .map_err(Error::Secret)?;
        if input.is_empty() {
            return Err(Error::Secret(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty input is not a secret",
            )));
        }

        debug!("hashing {} bytes of USS input", input.len());
        let secret = derive_secret(&input);
        input.zeroize();
        Ok(secret)
    }
}

/// Resolve the requested sources into a secret, if any was requested.
pub fn resolve(enter: bool, file: Option<&str>) -> Result<Option<Secret>> {
    SecretSource::select(enter, file)
        .map(|source| source.read())
        .transpose()
}

// =============================================================================
// Private stuff
// =============================================================================

fn read_file(path: &str) -> io::Result<Vec<u8>> {
    if path == STDIN_SENTINEL {
        let mut input = Vec::new();
        io::stdin().lock().read_to_end(&mut input)?;
        Ok(input)
    } else {
        fs::read(path)
    }
}

fn prompt_phrase() -> io::Result<Vec<u8>> {
    let phrase = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Enter phrase for the USS")
        .with_confirmation("Repeat the phrase", "Phrases do not match, try again")
        .interact()?;
    Ok(phrase.into_bytes())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn derivation_is_deterministic() {
        let input = b"line one\nline two\n";
        assert_eq!(derive_secret(input), derive_secret(input));
    }

    #[test]
    fn input_is_not_normalized() {
        assert_ne!(derive_secret(b"phrase"), derive_secret(b"phrase\n"));
        assert_ne!(derive_secret(b"phrase"), derive_secret(b"phrase\r\n"));
    }

    #[test]
    fn derivation_is_blake2s() {
        // BLAKE2s-256 of the empty input.
        let expected = [
            0x69, 0x21, 0x7a, 0x30, 0x79, 0x90, 0x80, 0x94, 0xe1, 0x11, 0x21, 0xd0, 0x42, 0x35,
            0x4a, 0x7c, 0x1f, 0x55, 0xb6, 0x48, 0x2c, 0xa1, 0xa5, 0x1e, 0x1b, 0x25, 0x0d, 0xfd,
            0x1e, 0xd0, 0xee, 0xf9,
        ];
        assert_eq!(derive_secret(b"").as_bytes(), &expected);
    }

    #[test]
    fn debug_does_not_leak() {
        assert_eq!(format!("{:?}", derive_secret(b"x")), "Secret(..)");
    }

    #[test]
    fn file_takes_precedence() {
        assert_eq!(
            SecretSource::select(true, Some("uss.txt")),
            Some(SecretSource::File("uss.txt".into()))
        );
        assert_eq!(SecretSource::select(true, None), Some(SecretSource::Prompt));
        assert_eq!(SecretSource::select(false, None), None);
    }

    #[test]
    fn file_content_is_hashed_unmodified() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"my secret\n").unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let secret = resolve(false, Some(&path)).unwrap().unwrap();
        assert_eq!(secret, derive_secret(b"my secret\n"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = resolve(false, Some("/nonexistent/uss")).unwrap_err();
        assert!(matches!(err, Error::Secret(_)));
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_owned();

        let err = resolve(false, Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Secret(_)));
    }

    #[test]
    fn nothing_requested() {
        assert!(resolve(false, None).unwrap().is_none());
    }
}
