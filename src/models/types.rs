use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{OutputFormat, Quality};

#[derive(Debug, Deserialize, Serialize)]
pub struct ResponseError {
    pub message: String,
    pub error: String,
}

/// One file part of the `images` field, held in memory for the request.
#[derive(Clone, Debug)]
pub struct UploadedImage {
    pub file_name: String,
    pub data: Bytes,
}

/// Request-scoped context handed from the handler to the conversion pipeline.
#[derive(Clone, Debug)]
pub struct ConversionRequest {
    /// Submission order is archive order.
    pub images: Vec<UploadedImage>,
    pub format: OutputFormat,
    pub quality: Quality,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedEntry {
    pub name: String,
    pub data: Vec<u8>,
}
