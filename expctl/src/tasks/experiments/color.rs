use anyhow::Result;
use log::error;
use plotters::prelude::RGBColor;

pub static FONT_SIZE: i32 = 20;
pub static STROKE_WIDTH: u32 = 2;

/// Colours handed out, in order, to labels that have no fixed colour.
static PALETTE: [RGBColor; 8] = [
    RGBColor(1, 6, 130),
    RGBColor(130, 1, 1),
    RGBColor(0, 97, 29),
    RGBColor(163, 99, 2),
    RGBColor(179, 176, 0),
    RGBColor(92, 0, 130),
    RGBColor(0, 120, 130),
    RGBColor(90, 90, 90),
];

pub fn get_color_from_label(label: &str) -> Result<RGBColor> {
    match label {
        "dark-blue" | "platform" | "success" => Ok(RGBColor(1, 6, 130)),
        "dark-red" | "os" | "unknown" => Ok(RGBColor(130, 1, 1)),
        "dark-green" | "os-version" | "mpi error" => Ok(RGBColor(0, 97, 29)),
        "dark-orange" | "descriptive" | "os abi issue" => Ok(RGBColor(163, 99, 2)),
        "dark-yellow" | "missing gpu" => Ok(RGBColor(179, 176, 0)),
        _ => {
            error!("unrecognized label for color (label={label})");
            anyhow::bail!("unrecognized label (label={label})");
        }
    }
}

/// Colour for the `idx`-th label of a sorted set of labels.
pub fn get_palette_color(idx: usize) -> RGBColor {
    PALETTE[idx % PALETTE.len()]
}
