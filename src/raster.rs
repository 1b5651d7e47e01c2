//! The PGM (binary P5) raster collaborator (spec.md §6.2).
//!
//! Mirrors `read_pgm_file`/`init_pixmap`/`from_pixmap_to_pgm` from the
//! original `pixmap.c`: a rectangular grid of 8-bit grayscale samples with a
//! declared maximum value, read from and written to binary PGM.

use std::io::{self, Read, Write};

use crate::error::QtcError;

/// A rectangular grid of 8-bit grayscale samples, row-major, with a declared
/// maximum sample value `max_val` (PGM's "grey level").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub max_val: u8,
    pub samples: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, max_val: u8) -> Self {
        Raster {
            width,
            height,
            max_val,
            samples: vec![0u8; (width as usize) * (height as usize)],
        }
    }

    pub fn sample(&self, row: u32, col: u32) -> u8 {
        self.samples[(row * self.width + col) as usize]
    }

    pub fn set_sample(&mut self, row: u32, col: u32, value: u8) {
        let idx = (row * self.width + col) as usize;
        self.samples[idx] = value;
    }

    /// The sample at `(row, col)`, normalized from `[0, max_val]` to
    /// `[0, 255]` by `floor(s * 255 / max_val)` (spec.md §3).
    pub fn normalized_sample(&self, row: u32, col: u32) -> u8 {
        let s = self.sample(row, col);
        if self.max_val == 255 || self.max_val == 0 {
            s
        } else {
            ((s as u32 * 255) / self.max_val as u32) as u8
        }
    }

    /// Validates that this raster is square with a power-of-two side and
    /// returns the quadtree level `L` such that `side = 2^L`.
    pub fn level(&self) -> Result<u8, QtcError> {
        if self.width != self.height {
            return Err(QtcError::NonSquare {
                width: self.width,
                height: self.height,
            });
        }
        if !self.width.is_power_of_two() {
            return Err(QtcError::NotPowerOfTwo(self.width));
        }
        Ok(self.width.trailing_zeros() as u8)
    }

    /// Reads a binary (P5) PGM image. Comment lines (`#` to end of line) are
    /// permitted anywhere in the header, matching the original reader's
    /// tolerance.
    pub fn read_pgm<R: Read>(r: R) -> Result<Raster, QtcError> {
        let mut tok = Tokenizer::new(r);

        let magic = tok
            .next_token()?
            .ok_or_else(|| QtcError::MalformedPgm("empty file".to_string()))?;
        if magic != "P5" {
            return Err(QtcError::MalformedPgm(format!(
                "unexpected magic number {:?}, expected \"P5\"",
                magic
            )));
        }

        let width = tok.next_uint("width")?;
        let height = tok.next_uint("height")?;
        let max_val = tok.next_uint("grey level")?;
        if max_val > 255 {
            return Err(QtcError::MalformedPgm(format!(
                "grey level {} exceeds 255",
                max_val
            )));
        }

        let expected = (width as usize) * (height as usize);
        let mut samples = Vec::with_capacity(expected);
        for _ in 0..expected {
            match tok.next_byte()? {
                Some(b) => samples.push(b),
                None => {
                    return Err(QtcError::MalformedPgm(
                        "truncated pixel data".to_string(),
                    ))
                }
            }
        }

        Ok(Raster {
            width,
            height,
            max_val: max_val as u8,
            samples,
        })
    }

    /// Writes this raster as binary (P5) PGM.
    pub fn write_pgm<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "P5")?;
        writeln!(w, "# Created by qtc {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(w, "{} {}", self.width, self.height)?;
        writeln!(w, "{}", self.max_val)?;
        w.write_all(&self.samples)
    }
}

/// A minimal whitespace/comment-aware tokenizer over a byte stream, used
/// only for parsing the PGM ASCII header before switching to raw binary
/// reads for the pixel data.
struct Tokenizer<R: Read> {
    bytes: std::io::Bytes<R>,
}

impl<R: Read> Tokenizer<R> {
    fn new(r: R) -> Self {
        Tokenizer { bytes: r.bytes() }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        self.bytes.next().transpose()
    }

    /// Reads the next whitespace-delimited token, skipping `#`-introduced
    /// comment lines wherever they appear.
    fn next_token(&mut self) -> io::Result<Option<String>> {
        let mut token = String::new();
        loop {
            match self.next_byte()? {
                None => {
                    return Ok(if token.is_empty() { None } else { Some(token) });
                }
                Some(b'#') => {
                    while let Some(c) = self.next_byte()? {
                        if c == b'\n' {
                            break;
                        }
                    }
                    if !token.is_empty() {
                        return Ok(Some(token));
                    }
                }
                Some(b) if (b as char).is_ascii_whitespace() => {
                    if !token.is_empty() {
                        return Ok(Some(token));
                    }
                }
                Some(b) => token.push(b as char),
            }
        }
    }

    fn next_uint(&mut self, field: &str) -> Result<u32, QtcError> {
        let token = self
            .next_token()
            .map_err(QtcError::Io)?
            .ok_or_else(|| QtcError::MalformedPgm(format!("missing {}", field)))?;
        token
            .parse()
            .map_err(|_| QtcError::MalformedPgm(format!("invalid {}: {:?}", field, token)))
    }
}
