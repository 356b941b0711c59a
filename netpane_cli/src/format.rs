//! Size and time display for request rows

use netpane_common::{constants::MEMORY_CACHE_THRESHOLD_MS, CompletedRecord};
use serde::Serialize;

/// Cache disposition reported by the observer's `end` message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub from_cache: bool,
    pub status_code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Disk,
}

impl CacheTier {
    fn from_elapsed(time_ms: f64) -> Self {
        if time_ms < MEMORY_CACHE_THRESHOLD_MS {
            CacheTier::Memory
        } else {
            CacheTier::Disk
        }
    }
}

/// What the size column shows for a completed request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SizeDisplay {
    /// Served from cache. `confirmed` when the observer reported it,
    /// otherwise inferred from the record.
    Cached { tier: CacheTier, confirmed: bool },
    Bytes { bytes: f64 },
}

impl SizeDisplay {
    /// Apply the size display policy
    ///
    /// Observer-confirmed cache hits win; then a zero transfer size with a
    /// 200 status and a non-empty body counts as a cache hit; then the
    /// transfer size, the content size and finally the body size.
    pub fn from_record(record: &CompletedRecord, cache: Option<&CacheInfo>) -> Self {
        let res = &record.response;
        let content_size = res.content.size;

        if cache.is_some_and(|c| c.from_cache) {
            return SizeDisplay::Cached {
                tier: CacheTier::from_elapsed(record.time),
                confirmed: true,
            };
        }

        match record.transfer_size() {
            Some(t) if t == 0.0 && res.status == 200 && content_size > 0 => SizeDisplay::Cached {
                tier: CacheTier::from_elapsed(record.time),
                confirmed: false,
            },
            Some(t) if t > 0.0 => SizeDisplay::Bytes { bytes: t },
            _ => {
                let fallback = if content_size != 0 {
                    content_size
                } else {
                    res.body_size
                };
                SizeDisplay::Bytes {
                    bytes: fallback as f64,
                }
            }
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, SizeDisplay::Cached { .. })
    }

    pub fn label(&self) -> String {
        match self {
            SizeDisplay::Cached {
                tier: CacheTier::Memory,
                confirmed: true,
            } => "(memory cache)".to_string(),
            SizeDisplay::Cached {
                tier: CacheTier::Disk,
                confirmed: true,
            } => "(disk cache)".to_string(),
            SizeDisplay::Cached {
                tier: CacheTier::Memory,
                confirmed: false,
            } => "(memory)".to_string(),
            SizeDisplay::Cached {
                tier: CacheTier::Disk,
                confirmed: false,
            } => "(disk)".to_string(),
            SizeDisplay::Bytes { bytes } => format_size(*bytes),
        }
    }
}

/// Format a byte count ("—" when not positive)
pub fn format_size(bytes: f64) -> String {
    if bytes <= 0.0 {
        "\u{2014}".to_string()
    } else if bytes < 1024.0 {
        format!("{} B", bytes)
    } else if bytes < 1024.0 * 1024.0 {
        format!("{:.1} kB", bytes / 1024.0)
    } else {
        format!("{:.1} MB", bytes / (1024.0 * 1024.0))
    }
}

/// Format an elapsed time in milliseconds ("—" when not positive)
pub fn format_time(ms: f64) -> String {
    if ms <= 0.0 {
        "\u{2014}".to_string()
    } else if ms < 1000.0 {
        format!("{} ms", ms.round())
    } else {
        format!("{:.2} s", ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: u16, transfer: Option<f64>, content_size: i64, time: f64) -> CompletedRecord {
        let mut record = CompletedRecord::default();
        record.response.status = status;
        record.response.content.size = content_size;
        record.transfer_size = transfer;
        record.time = time;
        record
    }

    #[test]
    fn test_transfer_size_shown() {
        let size = SizeDisplay::from_record(&record(200, Some(532.0), 1200, 48.0), None);
        assert_eq!(size.label(), "532 B");
    }

    #[test]
    fn test_inferred_cache_hit() {
        let memory = SizeDisplay::from_record(&record(200, Some(0.0), 4096, 3.0), None);
        assert_eq!(memory.label(), "(memory)");

        let disk = SizeDisplay::from_record(&record(200, Some(0.0), 4096, 25.0), None);
        assert_eq!(disk.label(), "(disk)");

        // A 304 with no transfer is not treated as a cache hit
        let revalidated = SizeDisplay::from_record(&record(304, Some(0.0), 4096, 3.0), None);
        assert_eq!(revalidated.label(), "4.0 kB");
    }

    #[test]
    fn test_confirmed_cache_wins() {
        let info = CacheInfo {
            from_cache: true,
            status_code: 200,
        };
        let size = SizeDisplay::from_record(&record(200, Some(900.0), 900, 4.0), Some(&info));
        assert_eq!(size.label(), "(memory cache)");

        let slow = SizeDisplay::from_record(&record(200, None, 900, 12.0), Some(&info));
        assert_eq!(slow.label(), "(disk cache)");

        let network = CacheInfo {
            from_cache: false,
            status_code: 200,
        };
        let size = SizeDisplay::from_record(&record(200, Some(900.0), 900, 4.0), Some(&network));
        assert_eq!(size.label(), "900 B");
    }

    #[test]
    fn test_fallback_to_content_then_body_size() {
        assert_eq!(
            SizeDisplay::from_record(&record(200, None, 2048, 10.0), None).label(),
            "2.0 kB"
        );

        let mut r = record(200, None, 0, 10.0);
        r.response.body_size = 77;
        assert_eq!(SizeDisplay::from_record(&r, None).label(), "77 B");

        r.response.body_size = -1;
        assert_eq!(SizeDisplay::from_record(&r, None).label(), "\u{2014}");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(0.0), "\u{2014}");
        assert_eq!(format_size(1023.0), "1023 B");
        assert_eq!(format_size(1536.0), "1.5 kB");
        assert_eq!(format_size(3.0 * 1024.0 * 1024.0), "3.0 MB");
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "\u{2014}");
        assert_eq!(format_time(3.4), "3 ms");
        assert_eq!(format_time(999.6), "1000 ms");
        assert_eq!(format_time(1234.0), "1.23 s");
    }
}
