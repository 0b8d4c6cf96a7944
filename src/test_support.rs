use std::io::{Cursor, Read};

use bytes::Bytes;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

use crate::models::UploadedImage;

pub fn upload(name: &str, data: Vec<u8>) -> UploadedImage {
    UploadedImage {
        file_name: name.to_string(),
        data: Bytes::from(data),
    }
}

fn encode(img: RgbImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buffer), format)
        .unwrap();
    buffer
}

pub fn solid_png(width: u32, height: u32) -> Vec<u8> {
    encode(
        RgbImage::from_pixel(width, height, Rgb([200, 40, 90])),
        ImageOutputFormat::Png,
    )
}

/// High-entropy pattern, so lossy encoders have something to throw away.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let seed = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ (x * y);
        Rgb([seed as u8, (seed >> 8) as u8, (seed >> 16) as u8])
    });
    encode(img, ImageOutputFormat::Png)
}

pub fn solid_jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(
        RgbImage::from_pixel(width, height, Rgb([10, 120, 220])),
        ImageOutputFormat::Jpeg(90),
    )
}

/// (name, contents) of every archive entry, in directory order.
pub fn read_archive(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|index| {
            let mut file = archive.by_index(index).unwrap();
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).unwrap();
            (file.name().to_string(), contents)
        })
        .collect()
}

/// Width and height from the `ispe` property of an AVIF file. The `image`
/// build here has no AVIF decoder.
pub fn avif_dimensions(avif: &[u8]) -> (u32, u32) {
    let start = avif
        .windows(4)
        .position(|window| window == b"ispe")
        .expect("no ispe box")
        + 8; // box type + version/flags
    let read = |at: usize| u32::from_be_bytes(avif[at..at + 4].try_into().unwrap());
    (read(start), read(start + 4))
}
