/*!
 # Wire framing for strip controllers

 Pure functions that turn a rendered pixel slice into the byte stream a
 controller accepts: a little-endian pixel-data message, optionally
 wrapped in a DEFLATE-compressed envelope. Decoders for both framings
 live here too; the server itself never reads frames back, but tests and
 diagnostic tools do.
*/

use std::io::{Read, Write};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::graphics::Rgb;
use crate::{Error, Result};

/// Command word of the pixel-data message
pub const WIFI_COMMAND_PIXELDATA64: u16 = 3;

/// Leading magic of the compressed envelope
pub const COMPRESSED_FRAME_MAGIC: u32 = 0x4441_5645;

/// Constant tag in the envelope header, validated by the controller
pub const COMPRESSED_FRAME_TAG: u32 = 0x1234_5678;

/// How far ahead of "now" frames are timestamped so the controller can
/// buffer them and smooth network jitter
pub const BUFFER_LATENCY: Duration = Duration::from_secs(1);

/// Byte length of the inner message header
const HEADER_LEN: usize = 2 + 2 + 4 + 8 + 8;

/// Byte length of the compressed envelope header
const ENVELOPE_LEN: usize = 4 + 4 + 4 + 4;

/// A decoded pixel-data message, as a controller would see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Which output channels on the controller receive the payload
    pub channel_mask: u16,
    /// Intended presentation time (UTC)
    pub present: DateTime<Utc>,
    /// Pixel data in strip order
    pub pixels: Vec<Rgb>,
}

/// Encodes `pixels` into the bytes sent to one controller.
///
/// `present` is the intended presentation time; callers derive it as
/// `now + BUFFER_LATENCY`. When `compress` is set the pixel message is
/// DEFLATE-compressed (raw, no zlib header) and wrapped in the envelope
/// framing.
pub fn encode_frame(
    pixels: &[Rgb],
    channel_mask: u16,
    present: DateTime<Utc>,
    compress: bool,
) -> Result<Bytes> {
    let inner = encode_pixel_data(pixels, channel_mask, present)?;
    if !compress {
        return Ok(inner.freeze());
    }

    let mut encoder = DeflateEncoder::new(Vec::with_capacity(inner.len()), Compression::default());
    encoder.write_all(&inner)?;
    let blob = encoder.finish()?;

    let mut out = BytesMut::with_capacity(ENVELOPE_LEN + blob.len());
    out.put_u32_le(COMPRESSED_FRAME_MAGIC);
    out.put_u32_le(blob.len() as u32);
    out.put_u32_le(inner.len() as u32);
    out.put_u32_le(COMPRESSED_FRAME_TAG);
    out.put_slice(&blob);
    Ok(out.freeze())
}

fn encode_pixel_data(pixels: &[Rgb], channel_mask: u16, present: DateTime<Utc>) -> Result<BytesMut> {
    if pixels.len() > (u32::MAX as usize) / 3 {
        return Err(Error::FrameTooLarge(pixels.len()));
    }

    let mut out = BytesMut::with_capacity(HEADER_LEN + pixels.len() * 3);
    out.put_u16_le(WIFI_COMMAND_PIXELDATA64);
    out.put_u16_le(channel_mask);
    out.put_u32_le(pixels.len() as u32);
    out.put_u64_le(present.timestamp().max(0) as u64);
    out.put_u64_le(present.timestamp_subsec_micros() as u64);
    for px in pixels {
        out.put_u8(px.r);
        out.put_u8(px.g);
        out.put_u8(px.b);
    }
    Ok(out)
}

/// Decodes one message from the front of `buf`, sniffing the framing
/// from the first word. Returns the frame and the bytes consumed.
pub fn decode_any(buf: &[u8]) -> Result<(Frame, usize)> {
    let mut head = buf;
    if buf.len() >= 4 && head.get_u32_le() == COMPRESSED_FRAME_MAGIC {
        decode_compressed_frame(buf)
    } else {
        decode_frame(buf)
    }
}

/// Decodes one uncompressed pixel-data message from the front of `buf`.
/// Returns the frame and the bytes consumed.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.len() < HEADER_LEN {
        return Err(Error::MalformedFrame("truncated header"));
    }
    let mut cursor = buf;
    let command = cursor.get_u16_le();
    if command != WIFI_COMMAND_PIXELDATA64 {
        return Err(Error::MalformedFrame("unknown command word"));
    }
    let channel_mask = cursor.get_u16_le();
    let length = cursor.get_u32_le() as usize;
    let seconds = cursor.get_u64_le();
    let micros = cursor.get_u64_le();
    if micros >= 1_000_000 {
        return Err(Error::MalformedFrame("microseconds out of range"));
    }
    if cursor.remaining() < length * 3 {
        return Err(Error::MalformedFrame("truncated payload"));
    }

    let present = Utc
        .timestamp_opt(seconds as i64, (micros * 1_000) as u32)
        .single()
        .ok_or(Error::MalformedFrame("timestamp out of range"))?;

    let mut pixels = Vec::with_capacity(length);
    for _ in 0..length {
        let r = cursor.get_u8();
        let g = cursor.get_u8();
        let b = cursor.get_u8();
        pixels.push(Rgb::new(r, g, b));
    }

    Ok((
        Frame {
            channel_mask,
            present,
            pixels,
        },
        HEADER_LEN + length * 3,
    ))
}

/// Decodes one compressed envelope from the front of `buf`: validates
/// the header, inflates the blob and parses the inner pixel message.
/// Returns the frame and the bytes consumed.
pub fn decode_compressed_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.len() < ENVELOPE_LEN {
        return Err(Error::MalformedFrame("truncated envelope"));
    }
    let mut cursor = buf;
    if cursor.get_u32_le() != COMPRESSED_FRAME_MAGIC {
        return Err(Error::MalformedFrame("bad envelope magic"));
    }
    let compressed_size = cursor.get_u32_le() as usize;
    let uncompressed_size = cursor.get_u32_le() as usize;
    if cursor.get_u32_le() != COMPRESSED_FRAME_TAG {
        return Err(Error::MalformedFrame("bad envelope tag"));
    }
    if cursor.remaining() < compressed_size {
        return Err(Error::MalformedFrame("truncated envelope blob"));
    }

    let mut inner = Vec::with_capacity(uncompressed_size);
    DeflateDecoder::new(&cursor[..compressed_size]).read_to_end(&mut inner)?;
    if inner.len() != uncompressed_size {
        return Err(Error::MalformedFrame("inflated size mismatch"));
    }

    let (frame, used) = decode_frame(&inner)?;
    if used != inner.len() {
        return Err(Error::MalformedFrame("trailing bytes inside envelope"));
    }
    Ok((frame, ENVELOPE_LEN + compressed_size))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pixels(n: usize) -> Vec<Rgb> {
        (0..n)
            .map(|i| Rgb::new(i as u8, (i * 3) as u8, 255 - i as u8))
            .collect()
    }

    #[test]
    fn solid_red_frame_bytes_are_exact() {
        // Ten red pixels presented one second after t = 1_700_000_000.
        let enqueue = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let present = enqueue + chrono::Duration::seconds(1);
        let pixels = vec![Rgb::new(255, 0, 0); 10];

        let bytes = encode_frame(&pixels, 0xFFFF, present, false).unwrap();

        let mut expect = Vec::new();
        expect.extend_from_slice(&3u16.to_le_bytes());
        expect.extend_from_slice(&0xFFFFu16.to_le_bytes());
        expect.extend_from_slice(&10u32.to_le_bytes());
        expect.extend_from_slice(&1_700_000_001u64.to_le_bytes());
        expect.extend_from_slice(&0u64.to_le_bytes());
        for _ in 0..10 {
            expect.extend_from_slice(&[0xFF, 0x00, 0x00]);
        }
        assert_eq!(&bytes[..], &expect[..]);
        // Command word leads the stream
        assert_eq!(&bytes[..2], &[0x03, 0x00]);
    }

    #[test]
    fn uncompressed_round_trip() {
        let present = Utc.timestamp_opt(1_700_000_123, 456_789_000).unwrap();
        let pixels = sample_pixels(37);

        let bytes = encode_frame(&pixels, 0x0005, present, false).unwrap();
        let (frame, used) = decode_frame(&bytes).unwrap();

        assert_eq!(used, bytes.len());
        assert_eq!(frame.channel_mask, 0x0005);
        assert_eq!(frame.present, present);
        assert_eq!(frame.pixels, pixels);
    }

    #[test]
    fn compressed_round_trip() {
        let present = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let pixels = sample_pixels(144);

        let bytes = encode_frame(&pixels, 0xFFFF, present, true).unwrap();

        // Envelope header fields
        assert_eq!((&bytes[0..4]).get_u32_le(), COMPRESSED_FRAME_MAGIC);
        let compressed_size = (&bytes[4..8]).get_u32_le() as usize;
        let uncompressed_size = (&bytes[8..12]).get_u32_le() as usize;
        assert_eq!((&bytes[12..16]).get_u32_le(), COMPRESSED_FRAME_TAG);
        assert_eq!(bytes.len(), 16 + compressed_size);

        // The blob inflates to exactly the uncompressed framing
        let plain = encode_frame(&pixels, 0xFFFF, present, false).unwrap();
        assert_eq!(uncompressed_size, plain.len());
        let mut inflated = Vec::new();
        DeflateDecoder::new(&bytes[16..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(&inflated[..], &plain[..]);

        let (frame, used) = decode_compressed_frame(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.pixels, pixels);
        assert_eq!(frame.present, present);
    }

    #[test]
    fn decode_any_sniffs_both_framings() {
        let present = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let pixels = sample_pixels(8);

        for compress in [false, true] {
            let bytes = encode_frame(&pixels, 0x0001, present, compress).unwrap();
            let (frame, used) = decode_any(&bytes).unwrap();
            assert_eq!(used, bytes.len());
            assert_eq!(frame.pixels, pixels);
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_frame(&[0x03]),
            Err(Error::MalformedFrame(_))
        ));
        let mut bogus = vec![0u8; 24];
        bogus[0] = 0x09; // not a pixel-data command
        assert!(matches!(
            decode_frame(&bogus),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn micros_field_carries_subseconds() {
        let present = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let bytes = encode_frame(&sample_pixels(1), 1, present, false).unwrap();
        assert_eq!((&bytes[16..24]).get_u64_le(), 123_456);
    }
}
