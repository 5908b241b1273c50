// Size constants and human-readable formatting

pub const SZ_1K: u64 = 1024;
pub const SZ_4K: u64 = 4 * SZ_1K;
pub const SZ_16K: u64 = 16 * SZ_1K;
pub const SZ_64K: u64 = 64 * SZ_1K;
pub const SZ_1M: u64 = 1024 * SZ_1K;
pub const SZ_2M: u64 = 2 * SZ_1M;
pub const SZ_256M: u64 = 256 * SZ_1M;
pub const SZ_1G: u64 = 1024 * SZ_1M;

const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// Format a byte count with binary units, e.g. `10.00GiB`
pub fn pretty_size(bytes: u64) -> String {
    if bytes < SZ_1K {
        return format!("{}.00B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.2}{}", value, UNITS[unit])
}

/// Parse a size such as `4096`, `512k` or `10G`; suffixes are binary and
/// case-insensitive
pub fn parse_size(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, suffix) = input.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size: '{}'", input))?;

    let shift = match suffix.to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        "p" => 50,
        "e" => 60,
        _ => return Err(format!("unknown size suffix in '{}'", input)),
    };

    value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size out of range: '{}'", input))
}
