//! Converts KLayout waveguide definitions (`WAVEGUIDES*.xml`) into port specifications.

use indexmap::IndexMap;
use regex::Regex;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::layer::{klayout_layer_ids, DEVICE_RECOGNITION_LAYER, WAVEGUIDE_LAYER};
use crate::port::{PathProfile, PortSpec};
use crate::technology::EbeamParams;
use crate::{vprintln, Float, LayerId, PdkError};

/// Margin added to the waveguide width when no DevRec profile gives the port width.
pub const PORT_MARGIN: Float = 2.0;

#[derive(Debug, Error)]
pub enum WaveguideError {
    #[error("Waveguide entry is missing <{0}>")]
    MissingField(String),
    #[error("Could not parse <{0}> from {1:?}")]
    InvalidNumber(String, String),
    #[error("Unknown layer {0:?}")]
    UnknownLayer(String),
    #[error("Unrecognized multimode waveguide {0}")]
    UnrecognizedMultimode(String),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Core material; selects the thickness that sets the vertical limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Core {
    Si,
    SiN,
}

impl Core {
    /// Name of the technology parameter holding the core thickness.
    pub fn thickness_parameter(&self) -> &'static str {
        match self {
            Core::Si => "si_thickness",
            Core::SiN => "sin_thickness",
        }
    }
}

/// Port specification derived from one `<waveguide>` definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveguideRecord {
    pub name: String,
    pub description: String,
    pub width: Float,
    pub core: Core,
    pub num_modes: u32,
    pub target_neff: Float,
    pub path_profiles: Vec<PathProfile>,
}

impl WaveguideRecord {
    pub fn limits(&self, params: &EbeamParams) -> (Float, Float) {
        let thickness = match self.core {
            Core::Si => params.si_thickness,
            Core::SiN => params.sin_thickness,
        };
        (-1.5, 1.5 + thickness)
    }

    pub fn port_spec(&self, params: &EbeamParams) -> PortSpec {
        PortSpec {
            description: self.description.clone(),
            width: self.width,
            limits: self.limits(params),
            num_modes: self.num_modes,
            target_neff: self.target_neff,
            path_profiles: self.path_profiles.clone(),
        }
    }
}

struct Naming {
    wavelength: Regex,
    width: Regex,
}

impl Naming {
    fn new() -> Result<Naming, WaveguideError> {
        Ok(Naming {
            wavelength: Regex::new(r"[^=](\d{3,4})")?,
            width: Regex::new(r"w=(\d*) nm")?,
        })
    }

    /// Port name from a waveguide description.
    ///
    /// `Multimode` becomes an `MM_` prefix, a non-strip type (Rib, Slot, SiN...)
    /// is kept as a prefix, followed by the polarization, wavelength and width:
    /// `"Rib (90 nm slab) TE 1550 nm, w=500 nm"` gives `Rib_TE_1550_500`.
    fn port_name(&self, description: &str) -> String {
        let mut name = String::new();
        let mut rest = description;

        if let Some(r) = rest.strip_prefix("Multimode ") {
            name.push_str("MM_");
            rest = r;
        }

        match rest.strip_prefix("Strip ") {
            Some(r) => rest = r,
            None => {
                let (kind, r) = rest.split_once(' ').unwrap_or((rest, ""));
                name.push_str(kind);
                name.push('_');
                rest = r;
            }
        }

        let mode = ["TE-TM", "TE", "TM"]
            .iter()
            .find_map(|m| rest.find(m).map(|i| (i, *m)));
        if let Some((i, m)) = mode {
            name.push_str(m);
            rest = &rest[i + m.len()..];
        }

        if let Some(c) = self.wavelength.captures(rest) {
            name.push('_');
            name.push_str(&c[1]);
        }
        if let Some(c) = self.width.captures(rest) {
            name.push('_');
            name.push_str(&c[1]);
        }

        name
    }
}

/// Port name derived from a waveguide description.
pub fn port_name(description: &str) -> Result<String, WaveguideError> {
    Ok(Naming::new()?.port_name(description))
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Result<&'a str, WaveguideError> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .map(str::trim)
        .ok_or_else(|| WaveguideError::MissingField(tag.to_owned()))
}

fn child_number(node: Node, tag: &str) -> Result<Float, WaveguideError> {
    let text = child_text(node, tag)?;
    text.parse()
        .map_err(|_| WaveguideError::InvalidNumber(tag.to_owned(), text.to_owned()))
}

fn convert(
    node: Node,
    naming: &Naming,
    layers: &IndexMap<String, LayerId>,
) -> Result<Option<WaveguideRecord>, WaveguideError> {
    let description = child_text(node, "name")?;
    let name = naming.port_name(description);

    let mut path_profiles = Vec::new();
    let mut dev_rec_width = 0.0;
    for comp in node.children().filter(|n| n.has_tag_name("component")) {
        let width = child_number(comp, "width")?;
        let offset = child_number(comp, "offset")?;
        let layer_name = child_text(comp, "layer")?;
        let layer = *layers
            .get(layer_name)
            .ok_or_else(|| WaveguideError::UnknownLayer(layer_name.to_owned()))?;

        match layer {
            DEVICE_RECOGNITION_LAYER => dev_rec_width = width,
            WAVEGUIDE_LAYER => {}
            _ => path_profiles.push(PathProfile::new(width, offset, layer)),
        }
    }

    // Definitions drawn only on the abstract waveguide layer yield no port
    if path_profiles.is_empty() {
        return Ok(None);
    }

    let width = if dev_rec_width > 0.0 {
        dev_rec_width
    } else {
        child_number(node, "width")? + PORT_MARGIN
    };

    let core = if name.contains("SiN") { Core::SiN } else { Core::Si };
    let target_neff = match core {
        Core::SiN => 2.1,
        Core::Si => 3.5,
    };

    let mut num_modes = if name.contains("TM") { 2 } else { 1 };
    if name.starts_with("MM_") {
        num_modes = if name.ends_with("_3000") {
            14
        } else if name.ends_with("_2000") {
            10
        } else {
            return Err(WaveguideError::UnrecognizedMultimode(name));
        };
    }

    Ok(Some(WaveguideRecord {
        name,
        description: description.to_owned(),
        width,
        core,
        num_modes,
        target_neff,
        path_profiles,
    }))
}

/// Convert every `<waveguide>` of a waveguide definition document.
///
/// `layers` resolves the KLayout layer names used by each `<component>`.
pub fn parse_waveguides(
    contents: &str,
    layers: &IndexMap<String, LayerId>,
) -> Result<Vec<WaveguideRecord>, PdkError> {
    let doc = Document::parse(contents)?;
    let naming = Naming::new()?;

    let mut records = Vec::new();
    for node in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("waveguide"))
    {
        if let Some(record) = convert(node, &naming, layers)? {
            records.push(record);
        }
    }

    Ok(records)
}

/// Read and convert waveguide definition files, in order.
pub fn read_waveguides(filenames: &[&Path], verbose: bool) -> Result<Vec<WaveguideRecord>, PdkError> {
    let layers = klayout_layer_ids();
    let mut records = Vec::new();

    for filename in filenames {
        let contents = fs::read_to_string(filename)?;
        let converted = parse_waveguides(&contents, &layers)?;
        vprintln!(verbose, "Read {} waveguides from {:?}", converted.len(), filename);
        records.extend(converted);
    }

    Ok(records)
}
