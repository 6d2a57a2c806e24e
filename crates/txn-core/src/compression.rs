//! Compression codec selection shared by the columnar and broker sinks.

use serde::{Deserialize, Serialize};

/// Compression codec for sink output.
///
/// Each sink maps this onto its own backend's codec type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    /// Fast general-purpose codec.
    #[default]
    Snappy,
    /// High compression ratio, slow.
    Gzip,
    Lz4,
    Zstd,
}

impl Compression {
    /// Name used in configuration files and client properties.
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Snappy => "snappy",
            Compression::Gzip => "gzip",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "uncompressed" | "" => Ok(Compression::None),
            "snappy" => Ok(Compression::Snappy),
            "gzip" => Ok(Compression::Gzip),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(format!("Unknown compression codec: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compression() {
        assert_eq!("snappy".parse::<Compression>().unwrap(), Compression::Snappy);
        assert_eq!("ZSTD".parse::<Compression>().unwrap(), Compression::Zstd);
        assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
        assert!("brotli".parse::<Compression>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for codec in [
            Compression::None,
            Compression::Snappy,
            Compression::Gzip,
            Compression::Lz4,
            Compression::Zstd,
        ] {
            assert_eq!(codec.to_string().parse::<Compression>().unwrap(), codec);
        }
    }
}
