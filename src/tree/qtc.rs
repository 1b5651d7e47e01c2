//! The QTC wire format: header + conditional, parent-driven traversal
//! (spec.md §4.4, §4.5, §6.1).

use std::io::{self, Read, Write};

use crate::bitstream::{BitReader, BitWriter};
use crate::error::QtcError;

use super::{Node, QuadTree};

/// Result of a successful encode: how many body bits were emitted (before
/// padding) and the compression rate written into the header comment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodeReport {
    pub bits_emitted: u64,
    pub compression_rate_percent: f64,
}

/// A sink for the node-emission pass: either a real bit writer, or nothing
/// (the dry run just wants the count).
trait BitSink {
    fn write_bit(&mut self, bit: bool) -> io::Result<()>;
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
}

impl<W: Write> BitSink for BitWriter<W> {
    fn write_bit(&mut self, bit: bool) -> io::Result<()> {
        BitWriter::write_bit(self, bit)
    }
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        BitWriter::write_byte(self, byte)
    }
}

impl QuadTree {
    /// Emits (or, if `sink` is `None`, merely tallies) the per-node bits per
    /// the rule in spec.md §4.4. Returns the number of bits the pass
    /// produced, before closing-byte padding.
    fn emit_nodes(&self, mut sink: Option<&mut dyn BitSink>) -> io::Result<u64> {
        let n = self.nodes.len();
        let mut bits = 0u64;

        for i in 0..n {
            if i > 0 {
                let p = QuadTree::parent(i);
                if self.nodes[p].u {
                    continue;
                }
            }

            let node = self.nodes[i];

            if self.is_leaf(i) {
                // Leaf. The root (i == 0) has no parent to reconstruct it
                // from, so it is always explicit even though 0 % 4 == 0.
                if i == 0 || i % 4 != 0 {
                    if let Some(s) = sink.as_deref_mut() {
                        s.write_byte(node.color)?;
                    }
                    bits += 8;
                }
                continue;
            }

            // Internal node, or the root.
            if i == 0 || i % 4 != 0 {
                if let Some(s) = sink.as_deref_mut() {
                    s.write_byte(node.color)?;
                }
                bits += 8;
            }
            if let Some(s) = sink.as_deref_mut() {
                s.write_bit((node.e >> 1) & 1 != 0)?;
                s.write_bit(node.e & 1 != 0)?;
            }
            bits += 2;
            if node.e == 0 {
                if let Some(s) = sink.as_deref_mut() {
                    s.write_bit(node.u)?;
                }
                bits += 1;
            }
        }

        Ok(bits)
    }

    /// Encodes this tree as a QTC file: `"Q1\n"`, comment lines (a timestamp
    /// comment when `timestamp` is given, always a compression-rate
    /// comment), the level byte, and the packed node traversal
    /// (spec.md §4.4, §6.1).
    pub fn encode<W: Write>(
        &self,
        mut w: W,
        timestamp: Option<&str>,
    ) -> Result<EncodeReport, QtcError> {
        // Dry run: count bits without touching the writer (spec.md §4.4).
        let body_bits = self.emit_nodes(None)?;
        let padded_bits = (body_bits + 7) / 8 * 8;
        let side = self.side() as u64;
        let total_raw_bits = 8 * side * side;
        let rate = if total_raw_bits == 0 {
            0.0
        } else {
            100.0 * padded_bits as f64 / total_raw_bits as f64
        };

        // Header: raw ASCII text, written directly (not through the bit
        // buffer) before the level byte.
        write!(w, "Q1\n")?;
        if let Some(ts) = timestamp {
            write!(w, "# {}\n", ts)?;
        }
        write!(w, "# compression rate {:.2}%\n", rate)?;

        let mut bit_writer = BitWriter::new(w);
        bit_writer.write_byte(self.level)?;
        self.emit_nodes(Some(&mut bit_writer as &mut dyn BitSink))?;
        bit_writer.finish()?;

        Ok(EncodeReport {
            bits_emitted: body_bits,
            compression_rate_percent: rate,
        })
    }

    /// Decodes a QTC file: magic, comments, level byte, then the
    /// reconstruction pass (spec.md §4.5).
    pub fn decode<R: Read>(r: R) -> Result<QuadTree, QtcError> {
        let mut reader = BitReader::new(r);

        let q = read_byte(&mut reader)?;
        let one = read_byte(&mut reader)?;
        if q != b'Q' || one != b'1' {
            return Err(QtcError::MissingMagic);
        }
        // The newline terminating the magic line.
        read_byte(&mut reader)?;

        let level = loop {
            let b = read_byte(&mut reader)?;
            if b == b'#' {
                let mut comment = Vec::new();
                loop {
                    let c = read_byte(&mut reader)?;
                    if c == b'\n' {
                        break;
                    }
                    comment.push(c);
                }
                log::debug!("comment: #{}", String::from_utf8_lossy(&comment));
            } else {
                break b;
            }
        };

        let n = QuadTree::size_from_level(level);
        let mut tree = QuadTree {
            nodes: vec![Node::default(); n],
            level,
        };

        for i in 0..n {
            let p = QuadTree::parent(i.max(1));
            if i > 0 && tree.nodes[p].u {
                tree.nodes[i] = Node {
                    color: tree.nodes[p].color,
                    e: 0,
                    u: true,
                    variance: 0.0,
                };
                continue;
            }

            let is_fourth_child = i > 0 && i % 4 == 0;

            if tree.is_leaf(i) {
                // Leaf.
                let color = if is_fourth_child {
                    fourth_child_color(&tree, p, i)
                } else {
                    read_byte(&mut reader)?
                };
                tree.nodes[i] = Node {
                    color,
                    e: 0,
                    u: true,
                    variance: 0.0,
                };
                continue;
            }

            // Internal node, or the root.
            let color = if is_fourth_child {
                fourth_child_color(&tree, p, i)
            } else {
                read_byte(&mut reader)?
            };
            let e_hi = read_bit(&mut reader)?;
            let e_lo = read_bit(&mut reader)?;
            let e = ((e_hi as u8) << 1) | (e_lo as u8);
            let u = if e == 0 { read_bit(&mut reader)? } else { false };

            tree.nodes[i] = Node {
                color,
                e,
                u,
                variance: 0.0,
            };
        }

        Ok(tree)
    }
}

/// `m4 = 4*m + e - (m1 + m2 + m3)`, in wrapping 8-bit arithmetic
/// (spec.md §3, §9 "Residual arithmetic").
fn fourth_child_color(tree: &QuadTree, parent: usize, i: usize) -> u8 {
    let p = tree.nodes[parent];
    p.color
        .wrapping_mul(4)
        .wrapping_add(p.e)
        .wrapping_sub(tree.nodes[i - 3].color)
        .wrapping_sub(tree.nodes[i - 2].color)
        .wrapping_sub(tree.nodes[i - 1].color)
}

fn read_byte<R: Read>(r: &mut BitReader<R>) -> Result<u8, QtcError> {
    r.read_byte()?.ok_or(QtcError::UnexpectedEof)
}

fn read_bit<R: Read>(r: &mut BitReader<R>) -> Result<bool, QtcError> {
    r.read_bit()?.ok_or(QtcError::UnexpectedEof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;
    use std::io::Cursor;

    fn round_trip(tree: &QuadTree) -> QuadTree {
        let mut buf = Vec::new();
        tree.encode(&mut buf, None).unwrap();
        QuadTree::decode(Cursor::new(buf)).unwrap()
    }

    #[test]
    fn single_pixel_scenario_1() {
        let mut raster = Raster::new(1, 1, 255);
        raster.set_sample(0, 0, 42);
        let tree = QuadTree::build(&raster).unwrap();

        let mut buf = Vec::new();
        tree.encode(&mut buf, None).unwrap();
        // "Q1\n" + "# compression rate ...%\n" + level byte + 0x2A + pad
        assert!(buf.ends_with(&[0x2A]));

        let decoded = QuadTree::decode(Cursor::new(buf)).unwrap();
        assert_eq!(decoded.nodes[0].color, 42);
    }

    #[test]
    fn uniform_2x2_scenario_2() {
        let mut raster = Raster::new(2, 2, 255);
        for s in raster.samples.iter_mut() {
            *s = 10;
        }
        let tree = QuadTree::build(&raster).unwrap();
        assert_eq!(tree.nodes[0].color, 10);
        assert_eq!(tree.nodes[0].e, 0);
        assert!(tree.nodes[0].u);

        let decoded = round_trip(&tree);
        for i in 0..decoded.len() {
            assert_eq!(decoded.nodes[i].color, 10);
        }
    }

    #[test]
    fn non_uniform_2x2_scenario_3_reconstructs_fourth_child() {
        let mut raster = Raster::new(2, 2, 255);
        raster.set_sample(0, 0, 0);
        raster.set_sample(0, 1, 0);
        raster.set_sample(1, 0, 0);
        raster.set_sample(1, 1, 1);
        let tree = QuadTree::build(&raster).unwrap();

        let decoded = round_trip(&tree);
        assert_eq!(decoded.nodes[0].color, 0);
        // children: TL=1, TR=2, BR=3, BL=4 (fourth child, reconstructed)
        assert_eq!(decoded.nodes[1].color, tree.nodes[1].color);
        assert_eq!(decoded.nodes[2].color, tree.nodes[2].color);
        assert_eq!(decoded.nodes[3].color, tree.nodes[3].color);
        assert_eq!(decoded.nodes[4].color, tree.nodes[4].color);
    }

    #[test]
    fn uniform_4x4_scenario_4_emits_only_root() {
        let mut raster = Raster::new(4, 4, 255);
        for s in raster.samples.iter_mut() {
            *s = 200;
        }
        let tree = QuadTree::build(&raster).unwrap();
        assert!(tree.nodes[0].u);

        let mut buf = Vec::new();
        let report = tree.encode(&mut buf, None).unwrap();
        // color (8) + e (2) + u (1) = 11 bits, padded to 16.
        assert_eq!(report.bits_emitted, 11);

        let decoded = QuadTree::decode(Cursor::new(buf)).unwrap();
        for i in 0..decoded.len() {
            assert_eq!(decoded.nodes[i].color, 200);
        }
    }

    #[test]
    fn round_trip_is_exact_for_arbitrary_image() {
        let mut raster = Raster::new(8, 8, 255);
        for (i, s) in raster.samples.iter_mut().enumerate() {
            *s = ((i * 37 + 11) % 256) as u8;
        }
        let tree = QuadTree::build(&raster).unwrap();
        let decoded = round_trip(&tree);
        let rendered = crate::tree::render::to_raster(&decoded);
        for r in 0..8 {
            for c in 0..8 {
                assert_eq!(rendered.sample(r, c), raster.sample(r, c));
            }
        }
    }

    #[test]
    fn decode_rejects_missing_magic() {
        let buf = b"XX\nnoise".to_vec();
        assert!(matches!(
            QuadTree::decode(Cursor::new(buf)),
            Err(QtcError::MissingMagic)
        ));
    }

    #[test]
    fn decode_accepts_multiple_comment_lines() {
        let mut raster = Raster::new(1, 1, 255);
        raster.set_sample(0, 0, 7);
        let tree = QuadTree::build(&raster).unwrap();
        let mut buf = Vec::new();
        tree.encode(&mut buf, Some("Tue Jan 9 00:00:00 2025")).unwrap();
        let decoded = QuadTree::decode(Cursor::new(buf)).unwrap();
        assert_eq!(decoded.nodes[0].color, 7);
    }

    #[test]
    fn compression_rate_matches_formula() {
        let mut raster = Raster::new(4, 4, 255);
        for s in raster.samples.iter_mut() {
            *s = 200;
        }
        let tree = QuadTree::build(&raster).unwrap();
        let mut buf = Vec::new();
        let report = tree.encode(&mut buf, None).unwrap();
        let padded = ((report.bits_emitted + 7) / 8) * 8;
        let expected = 100.0 * padded as f64 / (8.0 * 16.0);
        assert!((report.compression_rate_percent - expected).abs() < 1e-9);
    }
}
