//! Human-readable byte sizes for log fields.

use std::fmt;

const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

/// Displays a byte count in the largest IEC unit that keeps the value at or above one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scaled = self.0 as f64;
        let mut unit = 0;
        while scaled >= 1024.0 && unit + 1 < UNITS.len() {
            scaled /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            return write!(f, "{} B", self.0);
        }
        let rendered = format!("{scaled:.1}");
        let rendered = rendered.strip_suffix(".0").unwrap_or(&rendered);
        write!(f, "{rendered} {}", UNITS[unit])
    }
}
