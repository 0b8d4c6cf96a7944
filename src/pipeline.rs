use log::info;

use crate::{
    archive::ArchiveWriter,
    codec::{Codec, OutputFormat},
    error::ConvertError,
    models::{ConversionRequest, ConvertedEntry},
};

/// Archive entry name for the `index`-th (0-based) upload.
///
/// Directory components (`/` or `\\` separated) are dropped, the final
/// `.ext` is removed, then `.` and the format text are appended as-is.
pub fn entry_name(original: &str, index: usize, format: &OutputFormat) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .unwrap_or_else(|| format!("image_{}", index + 1));

    format!("{}.{}", strip_extension(&base), format.extension())
}

/// Drops a trailing `.ext` where `ext` is non-empty and holds no `.` or `/`.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains('/') => &name[..dot],
        _ => name,
    }
}

/// Converts every image of the request, in order, into a finished zip.
///
/// Each entry is appended as soon as it is encoded; the first failure aborts
/// the batch and the partial archive is dropped.
pub fn convert_batch(
    request: &ConversionRequest,
    codec: &Codec,
    zip_level: i32,
) -> Result<Vec<u8>, ConvertError> {
    let mut archive = ArchiveWriter::new(zip_level);

    for (index, upload) in request.images.iter().enumerate() {
        let data = codec.convert(upload, &request.format, request.quality)?;
        let entry = ConvertedEntry {
            name: entry_name(&upload.file_name, index, &request.format),
            data,
        };
        archive.append(&entry)?;
    }

    let entries = archive.len();
    let bytes = archive.finish()?;
    info!(
        "Converted {} image(s) to {:?} at quality {} ({} bytes zipped)",
        entries,
        request.format.extension(),
        request.quality.get(),
        bytes.len()
    );
    Ok(bytes)
}
