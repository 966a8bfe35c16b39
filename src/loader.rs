//! Hex-dump memory image loader: reads `@addr` / byte tokens from any
//! `impl std::io::Read` and populates a [`Memory`] before the first cycle.

use std::io::Read;

use thiserror::Error;

use crate::memory::Memory;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("input stream is not valid UTF-8")]
    NotUtf8,
    #[error("malformed address token {0:?}: expected @ followed by hex digits")]
    BadAddress(String),
    #[error("malformed byte token {0:?}: expected exactly two hex digits")]
    BadByte(String),
}

/// Read whitespace-separated tokens from `reader` and write them into
/// `memory`, advancing an implicit cursor address. Returns the number of
/// bytes written. Runs to EOF; aborts on the first malformed token.
pub fn load(mut reader: impl Read, memory: &mut Memory) -> Result<usize, LoaderError> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|_| LoaderError::NotUtf8)?;

    let mut addr: u32 = 0;
    let mut bytes_written = 0usize;

    for token in text.split_ascii_whitespace() {
        if let Some(hex) = token.strip_prefix('@') {
            addr = u32::from_str_radix(hex, 16)
                .map_err(|_| LoaderError::BadAddress(token.to_string()))?;
            continue;
        }

        if token.len() != 2 {
            return Err(LoaderError::BadByte(token.to_string()));
        }
        let byte =
            u8::from_str_radix(token, 16).map_err(|_| LoaderError::BadByte(token.to_string()))?;
        memory.write_byte(addr, byte);
        addr = addr.wrapping_add(1);
        bytes_written += 1;
    }

    log::info!("loaded {bytes_written} bytes");
    Ok(bytes_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Wordsize;
    use pretty_assertions::assert_eq;

    #[test]
    fn loads_bytes_at_explicit_address() {
        let mut mem = Memory::new();
        let n = load("@100 de ad be ef".as_bytes(), &mut mem).unwrap();
        assert_eq!(n, 4);
        assert_eq!(mem.read(0x100, Wordsize::Word), 0xefbeadde);
    }

    #[test]
    fn address_advances_implicitly_between_tokens() {
        let mut mem = Memory::new();
        load("@0 13 05 00 00".as_bytes(), &mut mem).unwrap();
        assert_eq!(mem.read_byte(0), 0x13);
        assert_eq!(mem.read_byte(1), 0x05);
        assert_eq!(mem.read_byte(2), 0x00);
        assert_eq!(mem.read_byte(3), 0x00);
    }

    #[test]
    fn defaults_to_address_zero_without_an_at_token() {
        let mut mem = Memory::new();
        load("ff".as_bytes(), &mut mem).unwrap();
        assert_eq!(mem.read_byte(0), 0xff);
    }

    #[test]
    fn rejects_odd_length_byte_token() {
        let mut mem = Memory::new();
        let err = load("@0 f".as_bytes(), &mut mem).unwrap_err();
        assert_eq!(err, LoaderError::BadByte("f".to_string()));
    }

    #[test]
    fn rejects_non_hex_byte_token() {
        let mut mem = Memory::new();
        let err = load("@0 zz".as_bytes(), &mut mem).unwrap_err();
        assert_eq!(err, LoaderError::BadByte("zz".to_string()));
    }

    #[test]
    fn rejects_malformed_address_token() {
        let mut mem = Memory::new();
        let err = load("@zz 00".as_bytes(), &mut mem).unwrap_err();
        assert_eq!(err, LoaderError::BadAddress("@zz".to_string()));
    }
}
