//! Memory ceiling and worker recycling signal.
//!
//! # Responsibilities
//! - Parse the configured limit (`128M`, `1G`, `512K`, raw bytes, `-1`)
//! - Sample resident memory of the current process
//! - Decide whether the host should recycle this worker
//!
//! # Design Decisions
//! - The limit is parsed once when the application is built
//! - Recycling triggers at 90% of the limit; the host decides how to act
//! - An unreadable probe never triggers recycling

use std::fmt;

/// Fraction of the limit at which recycling is requested, in tenths.
const RECYCLE_THRESHOLD_TENTHS: u128 = 9;

/// Error returned for an unparsable memory limit string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid memory limit '{0}': expected digits with an optional K, M or G suffix")]
pub struct MemoryLimitError(pub String);

/// Process memory ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLimit {
    /// Limit in bytes.
    Bytes(u64),
    /// No ceiling; the worker is never recycled for memory.
    Unlimited,
}

impl MemoryLimit {
    /// Parse a limit string such as `128M`.
    pub fn parse(raw: &str) -> Result<Self, MemoryLimitError> {
        let value = raw.trim();
        if value == "-1" {
            return Ok(MemoryLimit::Unlimited);
        }

        let digits_end = value
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(value.len());
        let (digits, suffix) = value.split_at(digits_end);

        let number: u64 = digits
            .parse()
            .map_err(|_| MemoryLimitError(raw.to_string()))?;

        let exponent = match suffix.to_ascii_uppercase().as_str() {
            "" => 0,
            "K" => 1,
            "M" => 2,
            "G" => 3,
            _ => return Err(MemoryLimitError(raw.to_string())),
        };

        number
            .checked_mul(1024u64.pow(exponent))
            .map(MemoryLimit::Bytes)
            .ok_or_else(|| MemoryLimitError(raw.to_string()))
    }

    /// Limit in bytes, if bounded.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            MemoryLimit::Bytes(b) => Some(*b),
            MemoryLimit::Unlimited => None,
        }
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLimit::Bytes(b) => write!(f, "{} bytes", b),
            MemoryLimit::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Source of the current resident memory usage.
pub trait MemoryProbe: Send {
    /// Resident bytes, or `None` when unavailable on this platform.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Reads `VmRSS` from `/proc/self/status`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcStatusProbe;

impl MemoryProbe for ProcStatusProbe {
    fn resident_bytes(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kib * 1024)
}

/// Combines the cached limit with a probe.
pub struct MemoryGuard {
    limit: MemoryLimit,
    probe: Box<dyn MemoryProbe>,
}

impl MemoryGuard {
    pub fn new(limit: MemoryLimit, probe: Box<dyn MemoryProbe>) -> Self {
        Self { limit, probe }
    }

    pub fn limit(&self) -> MemoryLimit {
        self.limit
    }

    /// True when usage has reached 90% of the limit.
    pub fn should_recycle(&self) -> bool {
        let Some(limit) = self.limit.bytes() else {
            return false;
        };

        let Some(usage) = self.probe.resident_bytes() else {
            tracing::debug!("Resident memory unavailable, skipping recycle check");
            return false;
        };

        let over = (usage as u128) * 10 >= (limit as u128) * RECYCLE_THRESHOLD_TENTHS;
        tracing::trace!(usage, limit, over, "Memory check");
        over
    }
}

impl fmt::Debug for MemoryGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGuard")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<u64>);

    impl MemoryProbe for Fixed {
        fn resident_bytes(&self) -> Option<u64> {
            self.0
        }
    }

    #[test]
    fn parses_suffixes() {
        assert_eq!(MemoryLimit::parse("128M"), Ok(MemoryLimit::Bytes(128 * 1024 * 1024)));
        assert_eq!(MemoryLimit::parse("1G"), Ok(MemoryLimit::Bytes(1024 * 1024 * 1024)));
        assert_eq!(MemoryLimit::parse("512k"), Ok(MemoryLimit::Bytes(512 * 1024)));
        assert_eq!(MemoryLimit::parse("4096"), Ok(MemoryLimit::Bytes(4096)));
        assert_eq!(MemoryLimit::parse("-1"), Ok(MemoryLimit::Unlimited));
    }

    #[test]
    fn rejects_garbage() {
        assert!(MemoryLimit::parse("").is_err());
        assert!(MemoryLimit::parse("M").is_err());
        assert!(MemoryLimit::parse("12T").is_err());
        assert!(MemoryLimit::parse("12MB").is_err());
    }

    #[test]
    fn recycle_threshold() {
        let over = MemoryGuard::new(MemoryLimit::Bytes(100), Box::new(Fixed(Some(91))));
        assert!(over.should_recycle());

        let edge = MemoryGuard::new(MemoryLimit::Bytes(100), Box::new(Fixed(Some(90))));
        assert!(edge.should_recycle());

        let under = MemoryGuard::new(MemoryLimit::Bytes(100), Box::new(Fixed(Some(89))));
        assert!(!under.should_recycle());
    }

    #[test]
    fn unlimited_or_unknown_never_recycles() {
        let unlimited = MemoryGuard::new(MemoryLimit::Unlimited, Box::new(Fixed(Some(u64::MAX))));
        assert!(!unlimited.should_recycle());

        let unknown = MemoryGuard::new(MemoryLimit::Bytes(100), Box::new(Fixed(None)));
        assert!(!unknown.should_recycle());
    }

    #[test]
    fn vm_rss_parsing() {
        let status = "Name:\tworker\nVmPeak:\t  2000 kB\nVmRSS:\t  1500 kB\n";
        assert_eq!(parse_vm_rss(status), Some(1500 * 1024));
        assert_eq!(parse_vm_rss("Name:\tworker\n"), None);
    }
}
