use std::io::Cursor;

use anyhow::{anyhow, bail, Context, Result};
use image::{ImageFormat, RgbaImage};
use log::debug;

use crate::cache::{BitmapInfo, IconBitmap, MonoMask};

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} contains out-of-range value {value}"))
}

/// PNG-encodes the pixel buffer for the `icon` column.
pub fn encode_icon(icon: &IconBitmap) -> Result<Vec<u8>> {
    let image = RgbaImage::from_raw(icon.width(), icon.height(), icon.pixels().to_vec())
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", icon.width(), icon.height()))?;

    let mut encoded = Cursor::new(Vec::new());
    image
        .write_to(&mut encoded, ImageFormat::Png)
        .context("failed to encode icon as PNG")?;
    Ok(encoded.into_inner())
}

pub fn decode_icon(blob: &[u8]) -> Result<IconBitmap> {
    let image = image::load_from_memory_with_format(blob, ImageFormat::Png)
        .context("failed to decode icon blob")?
        .to_rgba8();
    let (width, height) = image.dimensions();
    IconBitmap::new(width, height, image.into_raw())
}

/// A mask whose length does not match the icon is dropped, not reported.
pub fn decode_mono(blob: &[u8], width: u32, height: u32) -> Option<MonoMask> {
    match MonoMask::new(width, height, blob.to_vec()) {
        Ok(mask) => Some(mask),
        Err(err) => {
            debug!("Discarding monochrome icon: {err}");
            None
        }
    }
}

pub fn decode_bitmap(
    icon: Option<&[u8]>,
    mono: Option<&[u8]>,
    color: u32,
    flags: u32,
) -> Result<BitmapInfo> {
    let Some(icon_blob) = icon else {
        bail!("row has no icon data");
    };
    let icon = decode_icon(icon_blob)?;
    let mono = mono.and_then(|blob| decode_mono(blob, icon.width(), icon.height()));

    let mut bitmap = BitmapInfo::high_res(icon, color).with_mono(mono);
    bitmap.flags = flags;
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icon_survives_png_encoding() {
        let icon = IconBitmap::solid(48, 48, [10, 20, 30, 255]);
        let blob = encode_icon(&icon).expect("encode");
        let decoded = decode_icon(&blob).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (48, 48));
        assert_eq!(decoded, icon);
    }

    #[test]
    fn mismatched_mono_is_discarded() {
        let blob = encode_icon(&IconBitmap::solid(8, 8, [0, 0, 0, 255])).expect("encode");

        let bitmap = decode_bitmap(Some(blob.as_slice()), Some(&[0u8; 63][..]), 0xFF00_0000, 0)
            .expect("decode");
        assert!(bitmap.is_high_res());
        assert!(bitmap.mono.is_none());

        let bitmap = decode_bitmap(Some(blob.as_slice()), Some(&[7u8; 64][..]), 0xFF00_0000, 0)
            .expect("decode");
        assert_eq!(bitmap.mono.as_ref().map(|m| m.alpha().len()), Some(64));
    }

    #[test]
    fn corrupt_icon_is_an_error() {
        assert!(decode_bitmap(Some(&b"not a png"[..]), None, 0, 0).is_err());
        assert!(decode_bitmap(None, None, 0, 0).is_err());
    }
}
