//! Avatar images: deterministic identicons and header-only size checks.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

/// Edge length of generated avatars in pixels
pub const DEFAULT_AVATAR_SIZE: u32 = 290;
const GRID: u32 = 5;

/// Hex SHA-256 of arbitrary bytes
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash used as the avatar of an email address (lowercased, trimmed)
pub fn hash_email(email: &str) -> String {
    hash_bytes(email.trim().to_lowercase().as_bytes())
}

/// Storage key of a custom avatar uploaded by `user_id`
pub fn custom_avatar_key(user_id: i64, data: &[u8]) -> String {
    hash_bytes(format!("{}-{}", user_id, hash_bytes(data)).as_bytes())
}

/// Render a mirrored 5x5 identicon for `seed` as a PNG
pub fn random_image(seed: &[u8]) -> std::io::Result<Vec<u8>> {
    let hash = Sha256::digest(seed);
    // keep colours away from white so the pattern is visible on light themes
    let color = [hash[29] % 200, hash[30] % 200, hash[31] % 200];
    let background = [0xf0u8, 0xf0, 0xf0];

    let mut cells = [[false; GRID as usize]; GRID as usize];
    for row in 0..GRID as usize {
        for col in 0..3 {
            let on = hash[row * 3 + col] & 1 == 1;
            cells[row][col] = on;
            cells[row][GRID as usize - 1 - col] = on;
        }
    }

    let size = DEFAULT_AVATAR_SIZE;
    let cell = size / GRID;
    let mut raw = Vec::with_capacity(((size * 3 + 1) * size) as usize);
    for y in 0..size {
        raw.push(0); // filter: none
        let row = (y / cell).min(GRID - 1) as usize;
        for x in 0..size {
            let col = (x / cell).min(GRID - 1) as usize;
            let px = if cells[row][col] { color } else { background };
            raw.extend_from_slice(&px);
        }
    }

    encode_png_rgb(size, size, &raw)
}

fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = crc32fast::Hasher::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
}

/// `raw` holds filtered scanlines: one filter byte followed by RGB triples
fn encode_png_rgb(width: u32, height: u32, raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]); // 8-bit RGB, no interlace
    png_chunk(&mut out, b"IHDR", &ihdr);

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    png_chunk(&mut out, b"IDAT", &encoder.finish()?);

    png_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

/// Width and height read from the image header (PNG, GIF, JPEG, WebP)
pub fn image_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") && data.len() >= 24 && &data[12..16] == b"IHDR" {
        let w = u32::from_be_bytes(data[16..20].try_into().ok()?);
        let h = u32::from_be_bytes(data[20..24].try_into().ok()?);
        return Some((w, h));
    }
    if (data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a")) && data.len() >= 10 {
        let w = u16::from_le_bytes([data[6], data[7]]) as u32;
        let h = u16::from_le_bytes([data[8], data[9]]) as u32;
        return Some((w, h));
    }
    if data.starts_with(&[0xff, 0xd8]) {
        return jpeg_dimensions(data);
    }
    if data.len() >= 30 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return webp_dimensions(data);
    }
    None
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xff {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xff {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xc0..=0xcf) && !matches!(marker, 0xc4 | 0xc8 | 0xcc);
        if is_sof {
            let seg = data.get(pos + 4..pos + 9)?;
            let h = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let w = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            return Some((w, h));
        }
        pos += 2 + len;
    }
    None
}

fn webp_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let u24 = |b: &[u8]| b[0] as u32 | (b[1] as u32) << 8 | (b[2] as u32) << 16;
    match &data[12..16] {
        b"VP8 " => {
            let w = u16::from_le_bytes([data[26], data[27]]) as u32 & 0x3fff;
            let h = u16::from_le_bytes([data[28], data[29]]) as u32 & 0x3fff;
            Some((w, h))
        }
        b"VP8L" => {
            let b = data.get(21..25)?;
            let w = 1 + (b[0] as u32 | ((b[1] as u32 & 0x3f) << 8));
            let h = 1 + ((b[1] as u32 >> 6) | ((b[2] as u32) << 2) | ((b[3] as u32 & 0x0f) << 10));
            Some((w, h))
        }
        b"VP8X" => Some((1 + u24(&data[24..27]), 1 + u24(&data[27..30]))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_random_image_is_deterministic_png() {
        let a = random_image(b"alice@example.com").unwrap();
        let b = random_image(b"alice@example.com").unwrap();
        let c = random_image(b"bob@example.com").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        assert_eq!(image_dimensions(&a), Some((290, 290)));
        assert!(crate::typesniffer::detect_content_type(&a).is_image());

        // IDAT inflates to exactly height * (1 + width * 3) bytes
        let idat_len = u32::from_be_bytes(a[33..37].try_into().unwrap()) as usize;
        assert_eq!(&a[37..41], b"IDAT");
        let mut raw = Vec::new();
        flate2::read::ZlibDecoder::new(&a[41..41 + idat_len])
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw.len(), 290 * (1 + 290 * 3));
    }

    #[test]
    fn test_png_crc() {
        let png = random_image(b"seed").unwrap();
        // IHDR chunk: length(4) type(4) data(13) crc(4) starting at offset 8
        let mut crc = crc32fast::Hasher::new();
        crc.update(&png[12..29]);
        assert_eq!(crc.finalize().to_be_bytes(), png[29..33]);
    }

    #[test]
    fn test_gif_and_jpeg_dimensions() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0x40, 0x01, 0xf0, 0x00]);
        assert_eq!(image_dimensions(&gif), Some((320, 240)));

        let jpeg = [
            0xff, 0xd8, // SOI
            0xff, 0xe0, 0x00, 0x04, 0x00, 0x00, // APP0 with 2 bytes payload
            0xff, 0xc0, 0x00, 0x11, 0x08, 0x02, 0x58, 0x03, 0x20, // SOF0 600x800
        ];
        assert_eq!(image_dimensions(&jpeg), Some((800, 600)));

        assert_eq!(image_dimensions(b"not an image"), None);
    }

    #[test]
    fn test_avatar_keys() {
        assert_eq!(hash_email(" Alice@Example.com "), hash_email("alice@example.com"));
        assert_ne!(custom_avatar_key(1, b"x"), custom_avatar_key(2, b"x"));
        assert_eq!(custom_avatar_key(1, b"x").len(), 64);
    }
}
