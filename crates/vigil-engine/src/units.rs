//! Unit normalization and conversion for threshold evaluation.
//!
//! A policy may collect in one unit (`metric_unit`) and compare in another
//! (`calculation_unit`). Conversion is fail-open: units outside a common
//! convertible system leave the raw values untouched, because a unit
//! mismatch must never block alert evaluation.

/// Convertible unit family sharing a common base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    /// Bytes and bits, base unit: one byte.
    Data,
    /// Bytes/bits per second, base unit: one byte per second.
    DataRate,
    /// Base unit: one nanosecond.
    Time,
    /// Base unit: one hertz.
    Frequency,
    Percent,
}

/// Canonical unit -> (dimension, factor to the dimension's base unit).
fn unit_def(unit: &str) -> Option<(Dimension, f64)> {
    use Dimension::*;
    const KI: f64 = 1024.0;
    Some(match unit {
        "B" => (Data, 1.0),
        "KB" => (Data, 1e3),
        "MB" => (Data, 1e6),
        "GB" => (Data, 1e9),
        "TB" => (Data, 1e12),
        "PB" => (Data, 1e15),
        "KiB" => (Data, KI),
        "MiB" => (Data, KI * KI),
        "GiB" => (Data, KI * KI * KI),
        "TiB" => (Data, KI * KI * KI * KI),
        "PiB" => (Data, KI * KI * KI * KI * KI),
        "bit" => (Data, 0.125),
        "Kbit" => (Data, 125.0),
        "Mbit" => (Data, 125e3),
        "Gbit" => (Data, 125e6),
        "Tbit" => (Data, 125e9),
        "Kibit" => (Data, 128.0),
        "Mibit" => (Data, 128.0 * KI),
        "Gibit" => (Data, 128.0 * KI * KI),
        "Tibit" => (Data, 128.0 * KI * KI * KI),
        "B/s" => (DataRate, 1.0),
        "KB/s" => (DataRate, 1e3),
        "MB/s" => (DataRate, 1e6),
        "GB/s" => (DataRate, 1e9),
        "TB/s" => (DataRate, 1e12),
        "KiB/s" => (DataRate, KI),
        "MiB/s" => (DataRate, KI * KI),
        "GiB/s" => (DataRate, KI * KI * KI),
        "TiB/s" => (DataRate, KI * KI * KI * KI),
        "bit/s" => (DataRate, 0.125),
        "Kbit/s" => (DataRate, 125.0),
        "Mbit/s" => (DataRate, 125e3),
        "Gbit/s" => (DataRate, 125e6),
        "ns" => (Time, 1.0),
        "us" => (Time, 1e3),
        "ms" => (Time, 1e6),
        "s" => (Time, 1e9),
        "min" => (Time, 6e10),
        "h" => (Time, 3.6e12),
        "d" => (Time, 8.64e13),
        "Hz" => (Frequency, 1.0),
        "KHz" => (Frequency, 1e3),
        "MHz" => (Frequency, 1e6),
        "GHz" => (Frequency, 1e9),
        "%" => (Percent, 1.0),
        _ => return None,
    })
}

/// Maps common unit spellings to their canonical form; unmapped strings are
/// returned trimmed and unchanged.
pub fn normalize(unit: &str) -> String {
    let trimmed = unit.trim();
    let mapped = match trimmed.to_lowercase().as_str() {
        "bytes" | "byte" => "B",
        "kb" | "kilobyte" | "kilobytes" => "KB",
        "mb" | "megabyte" | "megabytes" => "MB",
        "gb" | "gigabyte" | "gigabytes" => "GB",
        "tb" | "terabyte" | "terabytes" => "TB",
        "pb" | "petabyte" | "petabytes" => "PB",
        "kib" | "kibibyte" | "kibibytes" => "KiB",
        "mib" | "mebibyte" | "mebibytes" => "MiB",
        "gib" | "gibibyte" | "gibibytes" => "GiB",
        "tib" | "tebibyte" | "tebibytes" => "TiB",
        "pib" | "pebibyte" | "pebibytes" => "PiB",
        "bits" => "bit",
        "kbit" | "kilobit" => "Kbit",
        "mbit" | "megabit" => "Mbit",
        "gbit" | "gigabit" => "Gbit",
        "tbit" | "terabit" => "Tbit",
        "kibit" | "kibibit" => "Kibit",
        "mibit" | "mebibit" => "Mibit",
        "gibit" | "gibibit" => "Gibit",
        "tibit" | "tebibit" => "Tibit",
        "bytes/s" | "bytes/sec" => "B/s",
        "kb/s" => "KB/s",
        "mb/s" => "MB/s",
        "gb/s" => "GB/s",
        "tb/s" => "TB/s",
        "kib/s" => "KiB/s",
        "mib/s" => "MiB/s",
        "gib/s" => "GiB/s",
        "tib/s" => "TiB/s",
        "nanosecond" | "nanoseconds" => "ns",
        "microsecond" | "microseconds" => "us",
        "millisecond" | "milliseconds" => "ms",
        "second" | "seconds" => "s",
        "minute" | "minutes" => "min",
        "hour" | "hours" => "h",
        "day" | "days" => "d",
        "hertz" => "Hz",
        "khz" => "KHz",
        "mhz" => "MHz",
        "ghz" => "GHz",
        "percent" | "percentage" => "%",
        _ => return trimmed.to_string(),
    };
    mapped.to_string()
}

/// Whether both units are known and belong to the same convertible system.
pub fn is_convertible(from: &str, to: &str) -> bool {
    match (unit_def(&normalize(from)), unit_def(&normalize(to))) {
        (Some((from_dim, _)), Some((to_dim, _))) => from_dim == to_dim,
        _ => false,
    }
}

/// Converts values between units of the same system; `None` when the pair is
/// not convertible. NaN values pass through untouched.
pub fn convert_values(values: &[f64], from: &str, to: &str) -> Option<Vec<f64>> {
    let from_n = normalize(from);
    let to_n = normalize(to);
    if from_n.eq_ignore_ascii_case(&to_n) {
        return Some(values.to_vec());
    }

    let (from_dim, from_factor) = unit_def(&from_n)?;
    let (to_dim, to_factor) = unit_def(&to_n)?;
    if from_dim != to_dim {
        return None;
    }

    let ratio = from_factor / to_factor;
    Some(values.iter().map(|v| v * ratio).collect())
}
