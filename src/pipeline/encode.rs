//! Image encoding: rendered page → base64 PNG wrapped in `ImageData`.
//!
//! PNG is lossless; JPEG ringing around small Cyrillic glyphs is enough to
//! make vision models confuse letters such as «ш» and «щ».

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the vision request.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encodes_png_that_decodes_back() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 4, Rgba([255, 255, 255, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");

        let bytes = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&bytes[1..4], b"PNG");
        let decoded = image::load_from_memory(&bytes).expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (8, 4));
    }
}
