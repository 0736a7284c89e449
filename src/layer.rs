//! Layer display styles and the EBeam layer table.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::LayerId;

#[derive(Debug, Error, PartialEq)]
pub enum LayerError {
    #[error("Argument not recognized as a hex-valued RGBA color: {0:?}")]
    InvalidColor(String),
    #[error("Unrecognized fill pattern: {0:?}")]
    InvalidPattern(String),
}

/// RGBA color, serialized as `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    /// Parse `RGB`, `RGBA`, `RRGGBB` or `RRGGBBAA`, with or without a leading `#`.
    /// Short forms double each digit; missing alpha is opaque.
    pub fn from_hex(color: &str) -> Result<Rgba, LayerError> {
        let invalid = || LayerError::InvalidColor(color.to_owned());
        let hex = color.strip_prefix('#').unwrap_or(color);

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let byte = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
        let digits: Vec<String> = match hex.len() {
            3 | 4 => hex.chars().map(|c| format!("{c}{c}")).collect(),
            6 | 8 => (0..hex.len())
                .step_by(2)
                .map(|i| hex[i..i + 2].to_owned())
                .collect(),
            _ => return Err(invalid()),
        };

        let mut rgba = [255u8; 4];
        for (slot, d) in rgba.iter_mut().zip(digits.iter()) {
            *slot = byte(d)?;
        }

        Ok(Rgba(rgba))
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [r, g, b, a] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
    }
}

impl From<Rgba> for String {
    fn from(color: Rgba) -> String {
        color.to_string()
    }
}

impl TryFrom<String> for Rgba {
    type Error = LayerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgba::from_hex(&value)
    }
}

/// Fill pattern used when drawing a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    #[serde(rename = "solid")]
    Solid,
    #[serde(rename = "hollow")]
    Hollow,
    #[serde(rename = ":")]
    Dotted,
    #[serde(rename = ".")]
    CoarseDotted,
    #[serde(rename = "\\\\")]
    LeftHatched,
    #[serde(rename = "\\")]
    LightLeftHatched,
    #[serde(rename = "//")]
    RightHatched,
    #[serde(rename = "/")]
    LightRightHatched,
    #[serde(rename = "xx")]
    CrossHatched,
    #[serde(rename = "x")]
    LightCrossHatched,
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "++")]
    DoublePlus,
    #[serde(rename = "-")]
    Minus,
    #[serde(rename = "=")]
    Equals,
    #[serde(rename = "|")]
    Vertical,
    #[serde(rename = "||")]
    DoubleVertical,
}

impl Pattern {
    pub const ALL: [Pattern; 16] = [
        Pattern::Solid,
        Pattern::Hollow,
        Pattern::Dotted,
        Pattern::CoarseDotted,
        Pattern::LeftHatched,
        Pattern::LightLeftHatched,
        Pattern::RightHatched,
        Pattern::LightRightHatched,
        Pattern::CrossHatched,
        Pattern::LightCrossHatched,
        Pattern::Plus,
        Pattern::DoublePlus,
        Pattern::Minus,
        Pattern::Equals,
        Pattern::Vertical,
        Pattern::DoubleVertical,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Pattern::Solid => "solid",
            Pattern::Hollow => "hollow",
            Pattern::Dotted => ":",
            Pattern::CoarseDotted => ".",
            Pattern::LeftHatched => "\\\\",
            Pattern::LightLeftHatched => "\\",
            Pattern::RightHatched => "//",
            Pattern::LightRightHatched => "/",
            Pattern::CrossHatched => "xx",
            Pattern::LightCrossHatched => "x",
            Pattern::Plus => "+",
            Pattern::DoublePlus => "++",
            Pattern::Minus => "-",
            Pattern::Equals => "=",
            Pattern::Vertical => "|",
            Pattern::DoubleVertical => "||",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Pattern {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .iter()
            .find(|p| p.symbol() == s)
            .copied()
            .ok_or_else(|| LayerError::InvalidPattern(s.to_owned()))
    }
}

/// Display and grouping information for one mask layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub layer: LayerId,
    pub group: String,
    pub color: Rgba,
    pub pattern: Pattern,
}

impl LayerSpec {
    /// Build from the literal form used in the static table.
    ///
    /// # Panics
    /// Malformed color or pattern literal
    fn literal(layer: LayerId, group: &str, color: &str, pattern: &str) -> LayerSpec {
        LayerSpec {
            layer,
            group: group.to_owned(),
            color: Rgba::from_hex(color).unwrap_or_else(|e| panic!("{e}")),
            pattern: pattern.parse().unwrap_or_else(|e| panic!("{e}")),
        }
    }
}

pub const PIN_LAYER: LayerId = (1, 10);
pub const FIBER_TARGET_LAYER: LayerId = (81, 0);
pub const DEVICE_RECOGNITION_LAYER: LayerId = (68, 0);
pub const WAVEGUIDE_LAYER: LayerId = (1, 99);
pub const SI_LAYER: LayerId = (1, 0);
pub const SI_SLAB_LAYER: LayerId = (2, 0);
pub const SIN_LAYER: LayerId = (1, 5);

/// The EBeam layer table, in KLayout properties order.
pub fn ebeam_layers() -> IndexMap<String, LayerSpec> {
    #[rustfmt::skip]
    let table: [(&str, LayerId, &str, &str, &str); 26] = [
        ("Waveguide", (1, 99), "Waveguides", "#ff80a818", "\\"),
        ("Si", (1, 0), "Waveguides", "#ff80a818", "\\\\"),
        ("SiN", (1, 5), "Waveguides", "#a6cee318", "\\\\"),
        ("Si slab", (2, 0), "Waveguides", "#80a8ff18", "/"),
        ("Si Litho193nm", (1, 69), "Waveguides", "#cc80a818", "\\"),
        ("Oxide open (to BOX)", (6, 0), "Waveguides", "#ffae0018", "\\"),
        ("Text", (10, 0), "", "#0000ff18", "\\"),
        ("Si N", (20, 0), "Doping", "#7000FF18", "\\\\"),
        ("Si N++", (24, 0), "Doping", "#0000ff18", ":"),
        ("M1_heater", (11, 0), "Metal", "#ebc63418", "xx"),
        ("M2_router", (12, 0), "Metal", "#3471eb18", "xx"),
        ("M_Open", (13, 0), "Metal", "#00000018", "xx"),
        ("VC", (40, 0), "Metal", "#3a027f18", "xx"),
        ("FloorPlan", (99, 0), "Misc", "#8000ff18", "hollow"),
        ("Deep Trench", (201, 0), "Misc", "#c0c0c018", "solid"),
        ("Dicing", (210, 0), "Misc", "#a0a0c018", "solid"),
        ("Chip design area", (290, 0), "Misc", "#80005718", "hollow"),
        ("Keep out", (202, 0), "Misc", "#a0a0c018", "//"),
        ("SEM", (200, 0), "Misc", "#ff00ff18", "\\"),
        ("DevRec", (68, 0), "SiEPIC", "#00408018", "hollow"),
        ("PinRec", (1, 10), "SiEPIC", "#00408018", "/"),
        ("PinRecM", (1, 11), "SiEPIC", "#00408018", "/"),
        ("FbrTgt", (81, 0), "SiEPIC", "#00408018", "/"),
        ("Errors", (999, 0), "SiEPIC", "#00008018", "/"),
        ("FDTD", (733, 0), "SiEPIC", "#80005718", "hollow"),
        ("BlackBox", (998, 0), "SiEPIC", "#00408018", "solid"),
    ];

    table
        .iter()
        .map(|(name, layer, group, color, pattern)| {
            (
                name.to_string(),
                LayerSpec::literal(*layer, group, color, pattern),
            )
        })
        .collect()
}

/// Layer names as they appear in the KLayout layer properties file.
///
/// Two layers are renamed on import; waveguide definitions still refer to
/// them by their KLayout names.
pub fn klayout_layer_ids() -> IndexMap<String, LayerId> {
    ebeam_layers()
        .into_iter()
        .map(|(name, spec)| {
            let name = match name.as_str() {
                "Si slab" => "Si - 90 nm rib".to_owned(),
                "FDTD" => "Lumerical".to_owned(),
                "Si Litho193nm" => "Si_Litho193nm".to_owned(),
                _ => name,
            };
            (name, spec.layer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_in_all_lengths() {
        assert_eq!(Rgba::from_hex("#abc").unwrap(), Rgba([0xaa, 0xbb, 0xcc, 255]));
        assert_eq!(Rgba::from_hex("abcd").unwrap(), Rgba([0xaa, 0xbb, 0xcc, 0xdd]));
        assert_eq!(Rgba::from_hex("#ff80a8").unwrap(), Rgba([255, 0x80, 0xa8, 255]));
        assert_eq!(Rgba::from_hex("#7000FF18").unwrap(), Rgba([0x70, 0, 255, 0x18]));
    }

    #[test]
    fn bad_colors_are_rejected() {
        assert!(Rgba::from_hex("").is_err());
        assert!(Rgba::from_hex("#12345").is_err());
        assert!(Rgba::from_hex("#gg0000").is_err());
    }

    #[test]
    fn patterns_parse_from_symbols() {
        for pattern in Pattern::ALL {
            assert_eq!(pattern.symbol().parse::<Pattern>().unwrap(), pattern);
        }
        assert!("~".parse::<Pattern>().is_err());
    }

    #[test]
    fn layer_table_is_complete() {
        let layers = ebeam_layers();
        assert_eq!(layers.len(), 26);
        assert_eq!(layers["PinRec"].layer, PIN_LAYER);
        assert_eq!(layers["Si slab"].pattern, Pattern::LightRightHatched);
        assert_eq!(layers["Si N"].color, Rgba([0x70, 0x00, 0xff, 0x18]));
        assert_eq!(layers.get_index(0).unwrap().0, "Waveguide");
    }

    #[test]
    fn klayout_names_resolve() {
        let ids = klayout_layer_ids();
        assert_eq!(ids["Si - 90 nm rib"], SI_SLAB_LAYER);
        assert_eq!(ids["Lumerical"], (733, 0));
        assert_eq!(ids["DevRec"], DEVICE_RECOGNITION_LAYER);
    }

    #[test]
    fn color_serializes_as_hex() {
        let json = serde_json::to_string(&Rgba([0xff, 0x80, 0xa8, 0x18])).unwrap();
        assert_eq!(json, "\"#ff80a818\"");
    }
}
