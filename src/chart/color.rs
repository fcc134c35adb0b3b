use crate::render::Color;

/// Series colors used when a component gives no `stroke`/`fill`.
pub const DEFAULT_PALETTE: [u32; 8] = [
    0x8884d8, 0x82ca9d, 0xffc658, 0xff7300, 0x0088fe, 0x00c49f, 0xffbb28, 0xff8042,
];

#[must_use]
pub fn palette_color(index: usize) -> Color {
    rgb_hex(DEFAULT_PALETTE[index % DEFAULT_PALETTE.len()])
}

fn rgb_hex(value: u32) -> Color {
    let [_, red, green, blue] = value.to_be_bytes();
    Color::from_rgb8(red, green, blue)
}

/// Parses CSS color text: `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`,
/// `rgb(r, g, b)`, `rgba(r, g, b, a)` and a handful of named colors.
#[must_use]
pub fn parse_color(text: &str) -> Option<Color> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = text.to_ascii_lowercase();
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
    {
        return parse_rgb_args(args.strip_suffix(')')?);
    }
    named_color(&lower)
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |index: usize| u8::from_str_radix(&hex[index..=index], 16).ok().map(|v| v * 17);
    let byte = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16).ok();
    let (red, green, blue, alpha) = match hex.len() {
        3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
        4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
        6 => (byte(0)?, byte(2)?, byte(4)?, 255),
        8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
        _ => return None,
    };
    Some(Color::from_rgb8(red, green, blue).with_alpha(f64::from(alpha) / 255.0))
}

fn parse_rgb_args(args: &str) -> Option<Color> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |part: &str| -> Option<f64> {
        let value = match part.strip_suffix('%') {
            Some(percent) => percent.trim().parse::<f64>().ok()? / 100.0,
            None => part.parse::<f64>().ok()? / 255.0,
        };
        value.is_finite().then(|| value.clamp(0.0, 1.0))
    };
    let alpha = match parts.get(3) {
        Some(part) => {
            let value: f64 = part.parse().ok()?;
            if !value.is_finite() {
                return None;
            }
            value
        }
        None => 1.0,
    };
    Some(Color::rgba(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        alpha.clamp(0.0, 1.0),
    ))
}

fn named_color(name: &str) -> Option<Color> {
    let value = match name {
        "black" => 0x000000,
        "white" => 0xffffff,
        "red" => 0xff0000,
        "green" => 0x008000,
        "blue" => 0x0000ff,
        "yellow" => 0xffff00,
        "orange" => 0xffa500,
        "purple" => 0x800080,
        "gray" | "grey" => 0x808080,
        "teal" => 0x008080,
        "navy" => 0x000080,
        "crimson" => 0xdc143c,
        "steelblue" => 0x4682b4,
        "tomato" => 0xff6347,
        "gold" => 0xffd700,
        "transparent" => return Some(Color::rgba(0.0, 0.0, 0.0, 0.0)),
        _ => return None,
    };
    Some(rgb_hex(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_color("#8884d8"), Some(Color::from_rgb8(0x88, 0x84, 0xd8)));
        assert_eq!(parse_color("#fff"), Some(Color::from_rgb8(255, 255, 255)));
        let translucent = parse_color("#00000080").expect("color");
        assert_relative_eq!(translucent.alpha, 128.0 / 255.0);
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
    }

    #[test]
    fn parses_functional_and_named_forms() {
        let color = parse_color("rgba(255, 0, 0, 0.5)").expect("rgba");
        assert_relative_eq!(color.red, 1.0);
        assert_relative_eq!(color.alpha, 0.5);
        assert_eq!(parse_color("RGB(0,0,255)"), Some(Color::from_rgb8(0, 0, 255)));
        assert_eq!(parse_color("Teal"), Some(Color::from_rgb8(0, 128, 128)));
        assert_eq!(parse_color("var(--primary)"), None);
    }

    #[test]
    fn palette_wraps_around() {
        assert_eq!(palette_color(0), palette_color(DEFAULT_PALETTE.len()));
    }
}
