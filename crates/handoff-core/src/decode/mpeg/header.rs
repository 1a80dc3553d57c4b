//! MPEG audio Layer III frame headers and stream synchronisation

use crate::types::Channels;

/// Header size in bytes
pub const HEADER_LEN: usize = 4;

/// Longest possible Layer III frame (MPEG-1, 320 kbps, 32 kHz, padded)
pub const MAX_FRAME_LEN: usize = 1441;

/// ID3v1 tags are a fixed 128 bytes
pub const ID3V1_LEN: usize = 128;

const ID3V2_HEADER_LEN: usize = 10;

const BITRATES_MPEG1: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_MPEG2: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const SAMPLE_RATES_MPEG1: [u32; 3] = [44100, 48000, 32000];
const SAMPLE_RATES_MPEG2: [u32; 3] = [22050, 24000, 16000];
const SAMPLE_RATES_MPEG25: [u32; 3] = [11025, 12000, 8000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Parsed Layer III frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: MpegVersion,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub padding: bool,
    /// A CRC follows the header
    pub protected: bool,
    pub channels: Channels,
    /// Whole frame length including the header
    pub frame_len: usize,
}

impl FrameHeader {
    /// Parse the four header bytes at the start of `bytes`
    ///
    /// Returns `None` for anything that is not a Layer III header this player
    /// can decode (bad sync, reserved fields, free-format bitrate).
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let &[b0, b1, b2, b3, ..] = bytes else {
            return None;
        };

        if b0 != 0xFF || b1 & 0xE0 != 0xE0 {
            return None;
        }

        let version = match (b1 >> 3) & 0x03 {
            0b00 => MpegVersion::Mpeg25,
            0b10 => MpegVersion::Mpeg2,
            0b11 => MpegVersion::Mpeg1,
            _ => return None,
        };

        // Layer III only
        if (b1 >> 1) & 0x03 != 0b01 {
            return None;
        }
        let protected = b1 & 0x01 == 0;

        let bitrate_index = (b2 >> 4) as usize;
        let rate_index = ((b2 >> 2) & 0x03) as usize;
        if bitrate_index == 0 || bitrate_index == 15 || rate_index == 3 {
            return None;
        }
        let padding = (b2 >> 1) & 0x01 == 1;

        let (bitrate_kbps, sample_rate, coefficient) = match version {
            MpegVersion::Mpeg1 => (
                BITRATES_MPEG1[bitrate_index],
                SAMPLE_RATES_MPEG1[rate_index],
                144,
            ),
            MpegVersion::Mpeg2 => (
                BITRATES_MPEG2[bitrate_index],
                SAMPLE_RATES_MPEG2[rate_index],
                72,
            ),
            MpegVersion::Mpeg25 => (
                BITRATES_MPEG2[bitrate_index],
                SAMPLE_RATES_MPEG25[rate_index],
                72,
            ),
        };

        let channels = if b3 >> 6 == 0b11 {
            Channels::Mono
        } else {
            Channels::Stereo
        };

        let frame_len =
            (coefficient * bitrate_kbps * 1000 / sample_rate) as usize + padding as usize;

        Some(Self {
            version,
            bitrate_kbps,
            sample_rate,
            padding,
            protected,
            channels,
            frame_len,
        })
    }

    /// PCM samples per channel this frame decodes to
    pub fn samples_per_frame(&self) -> usize {
        match self.version {
            MpegVersion::Mpeg1 => 1152,
            MpegVersion::Mpeg2 | MpegVersion::Mpeg25 => 576,
        }
    }

    /// Whether `other` can belong to the same stream
    fn is_compatible(&self, other: &FrameHeader) -> bool {
        self.version == other.version && self.sample_rate == other.sample_rate
    }
}

/// Total length of an ID3v2 tag starting at `bytes`, if one starts there
///
/// Needs the full ten-byte tag header.
pub fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < ID3V2_HEADER_LEN || &bytes[..3] != b"ID3" {
        return None;
    }
    if bytes[3] == 0xFF || bytes[4] == 0xFF {
        return None;
    }

    // Syncsafe: seven bits per byte
    let mut size = 0usize;
    for &b in &bytes[6..10] {
        if b & 0x80 != 0 {
            return None;
        }
        size = (size << 7) | b as usize;
    }

    let footer = if bytes[5] & 0x10 != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };
    Some(ID3V2_HEADER_LEN + size + footer)
}

/// Result of scanning the input window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// A whole frame starts at `offset`
    Frame { offset: usize, header: FrameHeader },
    /// A metadata tag of `len` bytes starts at `offset` (it may extend past
    /// the window)
    Tag { offset: usize, len: usize },
    /// Nothing decodable yet; the first `discard` bytes can never start one
    NeedMore { discard: usize },
}

/// Find the next frame or tag in `buf`
///
/// A frame header only counts once the header right after the frame also
/// checks out. At end of stream a frame is also taken when whatever follows
/// it is too short to be another frame (an APE or Lyrics trailer).
/// `window_full` says `buf` cannot grow, so a frame at its front that can
/// not be confirmed either way is taken as well.
pub fn scan(buf: &[u8], at_eof: bool, window_full: bool) -> Scan {
    for i in 0..buf.len() {
        let rest = &buf[i..];

        if rest.starts_with(b"ID3") {
            if rest.len() < ID3V2_HEADER_LEN {
                return Scan::NeedMore { discard: i };
            }
            if let Some(len) = id3v2_len(rest) {
                return Scan::Tag { offset: i, len };
            }
            continue;
        }

        if rest.starts_with(b"TAG") {
            return Scan::Tag {
                offset: i,
                len: ID3V1_LEN,
            };
        }

        if rest[0] != 0xFF {
            continue;
        }
        if rest.len() < HEADER_LEN {
            return Scan::NeedMore { discard: i };
        }
        let Some(header) = FrameHeader::parse(rest) else {
            continue;
        };

        let end = header.frame_len;
        if rest.len() < end + HEADER_LEN {
            if at_eof && rest.len() >= end {
                return Scan::Frame { offset: i, header };
            }
            return Scan::NeedMore { discard: i };
        }

        let next = &rest[end..];
        let confirmed = next.starts_with(b"ID3")
            || next.starts_with(b"TAG")
            || FrameHeader::parse(next).is_some_and(|n| header.is_compatible(&n));
        if confirmed {
            return Scan::Frame { offset: i, header };
        }

        // The bytes after the frame may be a trailer or the start of the
        // next frame split across reads
        if next.len() < end {
            if at_eof || (window_full && i == 0) {
                return Scan::Frame { offset: i, header };
            }
            return Scan::NeedMore { discard: i };
        }
    }

    // Keep a possible partial tag marker
    Scan::NeedMore {
        discard: buf.len().saturating_sub(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1 Layer III, 128 kbps, 44.1 kHz, joint stereo
    const HEADER_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];

    fn frame(header: [u8; 4]) -> Vec<u8> {
        let len = FrameHeader::parse(&header).unwrap().frame_len;
        let mut out = header.to_vec();
        out.resize(len, 0);
        out
    }

    #[test]
    fn test_parse_mpeg1_header() {
        let header = FrameHeader::parse(&HEADER_128K).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg1);
        assert_eq!(header.bitrate_kbps, 128);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channels, Channels::Stereo);
        assert!(!header.protected);
        assert_eq!(header.frame_len, 417);
        assert_eq!(header.samples_per_frame(), 1152);
    }

    #[test]
    fn test_padding_adds_one_byte() {
        let header = FrameHeader::parse(&[0xFF, 0xFB, 0x92, 0x64]).unwrap();
        assert!(header.padding);
        assert_eq!(header.frame_len, 418);
    }

    #[test]
    fn test_parse_mpeg2_mono() {
        let header = FrameHeader::parse(&[0xFF, 0xF3, 0x80, 0xC0]).unwrap();
        assert_eq!(header.version, MpegVersion::Mpeg2);
        assert_eq!(header.bitrate_kbps, 64);
        assert_eq!(header.sample_rate, 22050);
        assert_eq!(header.channels, Channels::Mono);
        assert_eq!(header.frame_len, 208);
        assert_eq!(header.samples_per_frame(), 576);
    }

    #[test]
    fn test_largest_frame_fits_constant() {
        // MPEG-1, 320 kbps, 32 kHz, padded
        let header = FrameHeader::parse(&[0xFF, 0xFB, 0xEA, 0x00]).unwrap();
        assert_eq!(header.frame_len, MAX_FRAME_LEN);
    }

    #[test]
    fn test_rejects_invalid_headers() {
        // Layer II
        assert!(FrameHeader::parse(&[0xFF, 0xFD, 0x90, 0x64]).is_none());
        // Reserved version
        assert!(FrameHeader::parse(&[0xFF, 0xEB, 0x90, 0x64]).is_none());
        // Free format and bad bitrate
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0x00, 0x64]).is_none());
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0xF0, 0x64]).is_none());
        // Reserved sample rate
        assert!(FrameHeader::parse(&[0xFF, 0xFB, 0x9C, 0x64]).is_none());
        // Too short
        assert!(FrameHeader::parse(&[0xFF, 0xFB]).is_none());
    }

    #[test]
    fn test_id3v2_length() {
        let tag = [b'I', b'D', b'3', 4, 0, 0x00, 0x00, 0x00, 0x02, 0x01];
        assert_eq!(id3v2_len(&tag), Some(10 + 257));

        let mut with_footer = tag;
        with_footer[5] = 0x10;
        assert_eq!(id3v2_len(&with_footer), Some(10 + 257 + 10));

        let mut bad = tag;
        bad[8] = 0x80;
        assert_eq!(id3v2_len(&bad), None);
    }

    #[test]
    fn test_scan_confirms_with_next_header() {
        let mut buf = frame(HEADER_128K);
        buf.extend_from_slice(&frame(HEADER_128K));

        let header = FrameHeader::parse(&HEADER_128K).unwrap();
        assert_eq!(buf.len(), 2 * header.frame_len);
        assert_eq!(scan(&buf, false, false), Scan::Frame { offset: 0, header });
    }

    #[test]
    fn test_scan_skips_garbage() {
        let mut buf = vec![0x00, 0x12, 0xFF, 0x00, 0x34];
        buf.extend_from_slice(&frame(HEADER_128K));
        buf.extend_from_slice(&HEADER_128K);

        match scan(&buf, false, false) {
            Scan::Frame { offset, .. } => assert_eq!(offset, 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_scan_incomplete_frame_needs_more() {
        let buf = frame(HEADER_128K);
        // Cannot confirm without the next header
        assert_eq!(scan(&buf, false, false), Scan::NeedMore { discard: 0 });
        // ...unless the stream is over
        assert!(matches!(scan(&buf, true, false), Scan::Frame { offset: 0, .. }));
        // Truncated frame at end of stream is never returned
        assert_eq!(scan(&buf[..300], true, false), Scan::NeedMore { discard: 0 });
    }

    #[test]
    fn test_scan_finds_tags() {
        let mut buf = vec![0u8; 3];
        buf.extend_from_slice(&[b'I', b'D', b'3', 3, 0, 0, 0, 0, 0, 20]);
        assert_eq!(scan(&buf, false, false), Scan::Tag { offset: 3, len: 30 });

        let mut v1 = b"TAG".to_vec();
        v1.resize(ID3V1_LEN, b' ');
        assert_eq!(
            scan(&v1, true, false),
            Scan::Tag {
                offset: 0,
                len: ID3V1_LEN
            }
        );
    }

    #[test]
    fn test_scan_last_frame_before_trailer() {
        let mut buf = frame(HEADER_128K);
        buf.extend_from_slice(b"LYRICSBEGIN");
        buf.resize(buf.len() + 24, 0);

        // More data may still be on its way
        assert_eq!(scan(&buf, false, false), Scan::NeedMore { discard: 0 });
        assert!(matches!(
            scan(&buf, true, false),
            Scan::Frame { offset: 0, .. }
        ));
        // A full window cannot wait for more
        assert!(matches!(
            scan(&buf, false, true),
            Scan::Frame { offset: 0, .. }
        ));
    }

    #[test]
    fn test_scan_unconfirmed_frame_moves_to_front() {
        let mut buf = vec![0u8; 7];
        buf.extend_from_slice(&frame(HEADER_128K));
        buf.extend_from_slice(&[0x11; 16]);
        assert_eq!(scan(&buf, false, true), Scan::NeedMore { discard: 7 });
    }

    #[test]
    fn test_scan_rejects_frame_followed_by_garbage() {
        let mut buf = frame(HEADER_128K);
        buf.resize(3 * buf.len(), 0x11);
        assert_eq!(
            scan(&buf, true, true),
            Scan::NeedMore {
                discard: buf.len() - 2
            }
        );
    }

    #[test]
    fn test_scan_keeps_partial_markers() {
        assert_eq!(scan(b"\x00\x00\x00ID", false, false), Scan::NeedMore { discard: 3 });
        assert_eq!(scan(b"\x00\x00ID3\x04", false, false), Scan::NeedMore { discard: 2 });
        assert_eq!(scan(&[0u8, 0, 0xFF, 0xFB], false, false), Scan::NeedMore { discard: 2 });
        assert_eq!(scan(&[], false, false), Scan::NeedMore { discard: 0 });
    }
}
