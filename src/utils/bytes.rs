const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

pub const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Human readable size using binary units, e.g. `1.5 GiB`
pub fn ibytes(bytes: i64) -> String {
    let bytes = bytes.max(0) as f64;
    if bytes < 10.0 {
        return format!("{} B", bytes as u64);
    }

    let exponent = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes / 1024f64.powi(exponent as i32);

    if value < 10.0 {
        format!("{:.1} {}", value, UNITS[exponent])
    } else {
        format!("{:.0} {}", value, UNITS[exponent])
    }
}

pub fn gib(bytes: i64) -> f64 {
    bytes as f64 / GIB
}
