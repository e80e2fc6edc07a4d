//! Pure conversions between a channel's display, directory and key forms.
//!
//! Display: "WWV 10 MHz". Directory: "WWV_10_MHz". Key: "wwv10".

pub fn to_directory(display: &str) -> String {
    display.replace(' ', "_")
}

pub fn to_key(display: &str) -> String {
    display
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .replace("mhz", "")
}

pub fn format_display(station_prefix: &str, frequency_mhz: f64) -> String {
    if frequency_mhz.fract() == 0.0 {
        format!("{} {} MHz", station_prefix, frequency_mhz as u64)
    } else {
        format!("{} {} MHz", station_prefix, frequency_mhz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_replaces_spaces() {
        assert_eq!(to_directory("WWV 10 MHz"), "WWV_10_MHz");
    }

    #[test]
    fn key_strips_whitespace_and_unit() {
        assert_eq!(to_key("WWV 10 MHz"), "wwv10");
        assert_eq!(to_key("CHU 3.33 MHz"), "chu3.33");
    }

    #[test]
    fn display_formats_whole_and_fractional() {
        assert_eq!(format_display("WWV", 10.0), "WWV 10 MHz");
        assert_eq!(format_display("CHU", 3.33), "CHU 3.33 MHz");
    }
}
