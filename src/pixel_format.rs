use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Byte order of the three channels of a serialized LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ColorOrder {
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RBG")]
    Rbg,
    #[serde(rename = "BGR")]
    Bgr,
    #[serde(rename = "BRG")]
    Brg,
    #[serde(rename = "GBR")]
    Gbr,
    #[default]
    #[serde(rename = "GRB")]
    Grb,
}

impl ColorOrder {
    /// Serialize one color in this channel order
    pub fn apply(self, color: Color) -> [u8; 3] {
        let Color { r, g, b } = color;
        match self {
            ColorOrder::Rgb => [r, g, b],
            ColorOrder::Rbg => [r, b, g],
            ColorOrder::Bgr => [b, g, r],
            ColorOrder::Brg => [b, r, g],
            ColorOrder::Gbr => [g, b, r],
            ColorOrder::Grb => [g, r, b],
        }
    }
}

/// Fill `count` LEDs with one color ("Inline" layout)
pub fn create_color_array(color: Color, count: usize, order: ColorOrder) -> Vec<u8> {
    order.apply(color).repeat(count)
}

/// Reorder RGB pixel data in place. A trailing partial pixel is left untouched.
pub fn transform_pixels(mut data: Vec<u8>, order: ColorOrder) -> Vec<u8> {
    if order == ColorOrder::Rgb {
        return data;
    }

    for pixel in data.chunks_exact_mut(3) {
        let reordered = order.apply(Color::new(pixel[0], pixel[1], pixel[2]));
        pixel.copy_from_slice(&reordered);
    }

    data
}
