//! Serialization of converted tables and human-readable component summaries.

use chrono::Local;
use clap::ValueEnum;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::{metadata, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::component::Component;
use crate::converter::{CellRecord, ComponentTable};
use crate::layer::{LayerSpec, SIN_LAYER, SI_LAYER, SI_SLAB_LAYER};
use crate::lyp::LayerRecord;
use crate::matcher::PinResolution;
use crate::port::{Direction, Port};
use crate::registry::PortData;
use crate::waveguide::WaveguideRecord;
use crate::{infoln, query, round_to, Float, LayerId, PdkError, QueryDefault, VER};

/// Output format of the converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Table entries ready to paste into the crate sources
    Rust,
    Json,
    Yaml,
}

impl Format {
    /// Format implied by a file extension; Rust source otherwise.
    pub fn from_path(path: &Path) -> Format {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_lowercase();

        match ext.as_str() {
            "json" => Format::Json,
            "yaml" | "yml" => Format::Yaml,
            _ => Format::Rust,
        }
    }
}

/// Header naming the generator and the time of generation.
fn stamp(format: Format) -> String {
    let now = Local::now();
    let comment = match format {
        Format::Rust => "//",
        Format::Yaml => "#",
        Format::Json => return String::new(),
    };

    format!("{comment} ebeam-pdk {VER}\n{comment} Generated on {now}\n")
}

fn serialize<T: Serialize>(value: &T, format: Format) -> Result<String, PdkError> {
    let body = match format {
        Format::Json => serde_json::to_string_pretty(value)? + "\n",
        _ => serde_yaml::to_string(value)?,
    };
    Ok(stamp(format) + &body)
}

fn layer_literal(layer: LayerId) -> String {
    match layer {
        SI_LAYER => "si".to_owned(),
        SI_SLAB_LAYER => "slab".to_owned(),
        SIN_LAYER => "sin".to_owned(),
        (l, d) => format!("({l}, {d})"),
    }
}

fn direction_literal(direction: Direction) -> &'static str {
    match direction {
        Direction::East => "E",
        Direction::North => "N",
        Direction::West => "W",
        Direction::South => "S",
    }
}

/// Layer table entries, keyed by layer name.
pub fn fmt_layers(records: &[LayerRecord], format: Format) -> Result<String, PdkError> {
    if format != Format::Rust {
        let table: IndexMap<&str, &LayerSpec> =
            records.iter().map(|r| (r.name.as_str(), &r.spec)).collect();
        return serialize(&table, format);
    }

    let mut content = stamp(format);
    for r in records {
        writeln!(
            content,
            "({:?}, ({}, {}), {:?}, {:?}, {:?}),",
            r.name,
            r.spec.layer.0,
            r.spec.layer.1,
            r.spec.group,
            r.spec.color.to_string(),
            r.spec.pattern.symbol()
        )
        .map_err(io::Error::other)?;
    }

    Ok(content)
}

/// Port specification entries; vertical limits refer to the core thickness parameter.
pub fn fmt_waveguides(records: &[WaveguideRecord], format: Format) -> Result<String, PdkError> {
    if format != Format::Rust {
        let table: IndexMap<&str, &WaveguideRecord> =
            records.iter().map(|r| (r.name.as_str(), r)).collect();
        return serialize(&table, format);
    }

    let mut content = stamp(format);
    for r in records {
        let profiles: Vec<String> = r
            .path_profiles
            .iter()
            .map(|p| format!("({:?}, {:?}, {})", p.width, p.offset, layer_literal(p.layer)))
            .collect();

        writeln!(
            content,
            "({:?}, strip({:?}, {:?}, (-1.5, 1.5 + {}), {}, {:?}, &[{}])),",
            r.name,
            r.description,
            r.width,
            r.core.thickness_parameter(),
            r.num_modes,
            r.target_neff,
            profiles.join(", ")
        )
        .map_err(io::Error::other)?;
    }

    Ok(content)
}

/// Fiber tilt from the vertical, in degrees, recovered from the beam direction.
fn fiber_tilt(direction: &[Float; 3]) -> Float {
    direction[0].atan2(-direction[2]).to_degrees()
}

fn port_literal(port: &PortData) -> String {
    match port {
        PortData::Waveguide {
            center,
            direction,
            spec,
        } => format!(
            "wg({:?}, {:?}, {}, {:?})",
            center.0,
            center.1,
            direction_literal(*direction),
            spec
        ),
        PortData::Gaussian {
            center,
            direction,
            polarization_angle,
            ..
        } => format!(
            "fiber({:?}, {:?}, {:?}, {:?})",
            center.0,
            center.1,
            round_to(fiber_tilt(direction), 6),
            polarization_angle
        ),
    }
}

fn unresolved_comment(resolution: &PinResolution) -> Option<String> {
    match resolution {
        PinResolution::Resolved(_) => None,
        PinResolution::Missing(p) => Some(format!("// Missing port ({}, {})", p.x, p.y)),
        PinResolution::Ambiguous(p, candidates) => {
            let names: Vec<&str> = candidates.iter().map(|c| c.spec.as_str()).collect();
            Some(format!("// Ambiguous port ({}, {}): {}", p.x, p.y, names.join(", ")))
        }
    }
}

/// Registry entries for converted cells.
///
/// In Rust form, pins that did not resolve are listed as comments above the
/// entry. JSON and YAML carry them in an `unresolved` table next to the registry.
///
/// # Arguments
/// * `records` - Converted cells, in output order
/// * `format` - Output format
///
/// # Returns
/// * `Ok(String)` - Serialized entries, headed by a generation stamp where the format allows comments
/// * `Err(PdkError)` - Serialization failed
pub fn fmt_components(records: &[CellRecord], format: Format) -> Result<String, PdkError> {
    if format != Format::Rust {
        return serialize(&ComponentTable::from_records(records), format);
    }

    let mut content = stamp(format);
    for r in records {
        for comment in r.unresolved.iter().filter_map(unresolved_comment) {
            writeln!(content, "{comment}").map_err(io::Error::other)?;
        }

        let model = match r.entry.model {
            Some(_) => "Some(ModelConfig::new())",
            None => "None",
        };
        let ports: Vec<String> = r.entry.ports.iter().map(port_literal).collect();

        writeln!(
            content,
            "add({:?}, {:?}, {:?}, vec![{}], {});",
            r.name,
            r.entry.family,
            r.entry.library,
            ports.join(", "),
            model
        )
        .map_err(io::Error::other)?;
    }

    Ok(content)
}

/// Human-readable summary of an assembled component.
pub fn fmt_component(comp: &Component) -> String {
    let mut content = format!(
        "\nComponent: {}\n\
        Layers: {}  Polygons: {}\n\
        Ports:\n    \
        Name  | Type      | Center                 | Direction | Spec\n    \
        ------|-----------|------------------------|-----------|-----------------\n",
        comp.name,
        comp.layout.structures.len(),
        comp.layout.polygon_count()
    );

    for (i, port) in comp.ports.iter().enumerate() {
        let name = Component::port_name(i);
        let row = match port {
            Port::Waveguide(p) => format!(
                "    {:<5} | {:<9} | {:<22} | {:<9} | {}\n",
                name,
                "waveguide",
                format!("({}, {})", p.center.x, p.center.y),
                format!("{}°", p.direction),
                p.spec_name
            ),
            Port::Gaussian(p) => format!(
                "    {:<5} | {:<9} | {:<22} | {:<9} | waist {} μm, pol {}°\n",
                name,
                "gaussian",
                format!("({}, {}, {:.1})", p.center[0], p.center[1], p.center[2]),
                format!("{:.1}°", fiber_tilt(&p.direction)),
                p.waist_radius,
                p.polarization_angle
            ),
        };
        content.push_str(&row);
    }

    match &comp.model {
        Some(model) => {
            let keys: Vec<&str> = model.config.keys().map(String::as_str).collect();
            let _ = writeln!(content, "Model: {} [{}]", model.name, keys.join(", "));
        }
        None => content.push_str("Model: none\n"),
    }

    content
}

/// Write content to a file, or to stdout when no file is given.
///
/// # Arguments
/// * `content` - Text to write
/// * `filename` - Output path. If None, writes to stdout
/// * `interactive` - Whether to confirm before replacing an existing file
///
/// # Returns
/// * `Ok(())` - Written, or the user declined to overwrite
/// * `Err(PdkError)` - File I/O error or prompt failure
pub fn writeout(content: &str, filename: Option<&Path>, interactive: bool) -> Result<(), PdkError> {
    let Some(path) = filename else {
        io::stdout().write_all(content.as_bytes())?;
        return Ok(());
    };

    // If file already exists, prompt to overwrite
    if metadata(path).is_ok() {
        let allow = query(
            &format!("'{}' already exists. Overwrite?", path.to_string_lossy()),
            interactive,
            QueryDefault::Yes,
        )?;

        if !allow {
            infoln!("Aborting...");
            return Ok(());
        }
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
