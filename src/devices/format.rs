// src/devices/format.rs

//! Mapping between the output formats the agent understands and the
//! interop layer's native format identifiers.
//!
//! The table is a plain exhaustive `match`; adding an `ImageFormat` variant
//! will not compile until it has a native id. Whether the interop actually
//! accepts a format is checked once, when a configuration is handed in, via
//! [`crate::devices::DeviceRegistry::supports_format`].

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Bmp,
    Png,
    Jpeg,
    Tiff,
    Gif,
}

/// Opaque native format id as exposed by the interop (WIA-style GUIDs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NativeFormat(pub &'static str);

impl NativeFormat {
    pub const BMP: NativeFormat = NativeFormat("{B96B3CAB-0728-11D3-9D7B-0000F81EF32E}");
    pub const PNG: NativeFormat = NativeFormat("{B96B3CAF-0728-11D3-9D7B-0000F81EF32E}");
    pub const JPEG: NativeFormat = NativeFormat("{B96B3CAE-0728-11D3-9D7B-0000F81EF32E}");
    pub const TIFF: NativeFormat = NativeFormat("{B96B3CB1-0728-11D3-9D7B-0000F81EF32E}");
    pub const GIF: NativeFormat = NativeFormat("{B96B3CB0-0728-11D3-9D7B-0000F81EF32E}");
}

impl fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl ImageFormat {
    pub const ALL: [ImageFormat; 5] = [
        ImageFormat::Bmp,
        ImageFormat::Png,
        ImageFormat::Jpeg,
        ImageFormat::Tiff,
        ImageFormat::Gif,
    ];

    pub fn native(self) -> NativeFormat {
        match self {
            ImageFormat::Bmp => NativeFormat::BMP,
            ImageFormat::Png => NativeFormat::PNG,
            ImageFormat::Jpeg => NativeFormat::JPEG,
            ImageFormat::Tiff => NativeFormat::TIFF,
            ImageFormat::Gif => NativeFormat::GIF,
        }
    }

    pub fn from_native(native: NativeFormat) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.native() == native)
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Bmp => "bmp",
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Tiff => "tiff",
            ImageFormat::Gif => "gif",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn native_ids_are_distinct() {
        let ids: HashSet<_> = ImageFormat::ALL.iter().map(|f| f.native()).collect();
        assert_eq!(ids.len(), ImageFormat::ALL.len());
    }

    #[test]
    fn unknown_native_id_has_no_format() {
        assert_eq!(ImageFormat::from_native(NativeFormat("{00000000-0000-0000-0000-000000000000}")), None);
        assert_eq!(ImageFormat::from_native(NativeFormat::TIFF), Some(ImageFormat::Tiff));
    }
}
