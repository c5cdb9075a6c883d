use bytes::{Buf, BufMut, Bytes};

use crate::postgres::PayloadError;

/// Integer signess in postgres docs is awful.
pub trait UsizeExt {
    /// Length is `usize` in rust, while sometime postgres want `u32`,
    /// this will panic when overflow instead of wrapping.
    fn to_u32(self) -> u32;
    /// Length is `usize` in rust, while sometime postgres want `u16`,
    /// this will panic when overflow instead of wrapping.
    fn to_u16(self) -> u16;
}

/// Nul string operation.
pub trait StrExt {
    /// String length plus nul (1).
    fn nul_string_len(&self) -> u32;
}

/// Nul string operation in [`BufMut`]
pub trait BufMutExt {
    /// Write string and nul termination.
    fn put_nul_string(&mut self, string: &str);
}

/// Checked reads from a message payload.
///
/// Every read reports a [`PayloadError`] instead of panicking when the payload is too short,
/// the backend cannot be trusted to send well formed messages.
pub trait BytesExt {
    /// Read nul terminated utf8 string.
    fn get_nul_string(&mut self) -> Result<String, PayloadError>;

    /// Read nul terminated raw bytes.
    fn get_nul_bytes(&mut self) -> Result<Bytes, PayloadError>;

    /// Read exactly `len` bytes.
    fn get_exact(&mut self, len: usize) -> Result<Bytes, PayloadError>;

    fn get_u8_checked(&mut self) -> Result<u8, PayloadError>;

    fn get_i16_checked(&mut self) -> Result<i16, PayloadError>;

    fn get_i32_checked(&mut self) -> Result<i32, PayloadError>;

    fn get_u32_checked(&mut self) -> Result<u32, PayloadError>;
}

/// Helper trait to [`Display`][std::fmt::Display] bytes.
pub trait FmtExt {
    /// Lossy [`Display`][std::fmt::Display] bytes.
    fn lossy(&self) -> LossyFmt<'_>;
}

/// Lossy [`Display`][std::fmt::Display] implementation for bytes.
pub struct LossyFmt<'a>(pub &'a [u8]);

impl UsizeExt for usize {
    fn to_u32(self) -> u32 {
        self.try_into().expect("message size too large for protocol")
    }

    fn to_u16(self) -> u16 {
        self.try_into().expect("message size too large for protocol")
    }
}

impl StrExt for str {
    fn nul_string_len(&self) -> u32 {
        self.len().to_u32() + 1/* nul */
    }
}

impl<B: BufMut> BufMutExt for B {
    fn put_nul_string(&mut self, string: &str) {
        self.put(string.as_bytes());
        self.put_u8(b'\0');
    }
}

impl BytesExt for Bytes {
    fn get_nul_string(&mut self) -> Result<String, PayloadError> {
        let bytes = self.get_nul_bytes()?;
        match std::str::from_utf8(&bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(err) => Err(PayloadError::Utf8(err)),
        }
    }

    fn get_nul_bytes(&mut self) -> Result<Bytes, PayloadError> {
        let Some(end) = self.iter().position(|e| matches!(e, b'\0')) else {
            return Err(PayloadError::Unterminated);
        };
        let me = self.split_to(end);
        Buf::advance(self, 1); // nul
        Ok(me)
    }

    fn get_exact(&mut self, len: usize) -> Result<Bytes, PayloadError> {
        if self.len() < len {
            return Err(PayloadError::Truncated { requested: len, available: self.len() });
        }
        Ok(self.split_to(len))
    }

    fn get_u8_checked(&mut self) -> Result<u8, PayloadError> {
        Ok(self.try_get_u8()?)
    }

    fn get_i16_checked(&mut self) -> Result<i16, PayloadError> {
        Ok(self.try_get_i16()?)
    }

    fn get_i32_checked(&mut self) -> Result<i32, PayloadError> {
        Ok(self.try_get_i32()?)
    }

    fn get_u32_checked(&mut self) -> Result<u32, PayloadError> {
        Ok(self.try_get_u32()?)
    }
}

impl FmtExt for [u8] {
    fn lossy(&self) -> LossyFmt<'_> {
        LossyFmt(self)
    }
}

impl std::fmt::Display for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LossyFmt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b\"{self}\"")
    }
}
