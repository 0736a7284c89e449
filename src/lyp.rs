//! Reader for KLayout layer-properties (`.lyp`) files.

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::layer::{LayerSpec, Pattern, Rgba};
use crate::{vprintln, LayerId, PdkError};

/// Alpha appended to every `.lyp` fill color.
pub const FILL_ALPHA: &str = "18";

#[derive(Debug, Error, PartialEq)]
pub enum LypError {
    #[error("Layer entry is missing <{0}>")]
    MissingField(String),
    #[error("Invalid layer source {0:?}")]
    InvalidSource(String),
    #[error("Unknown dither pattern {0:?}")]
    UnknownDither(String),
}

/// KLayout dither index to the nearest fill pattern.
const DITHER_PATTERNS: [Pattern; 47] = {
    use Pattern::*;
    [
        Solid,              // 0  solid
        Hollow,             // 1  hollow
        Dotted,             // 2  dotted
        CoarseDotted,       // 3  coarsely dotted
        LeftHatched,        // 4  left-hatched
        LightLeftHatched,   // 5  lightly left-hatched
        LeftHatched,        // 6  strongly left-hatched dense
        LightLeftHatched,   // 7  strongly left-hatched sparse
        RightHatched,       // 8  right-hatched
        LightRightHatched,  // 9  lightly right-hatched
        RightHatched,       // 10 strongly right-hatched dense
        LightRightHatched,  // 11 strongly right-hatched sparse
        CrossHatched,       // 12 cross-hatched
        LightCrossHatched,  // 13 lightly cross-hatched
        Plus,               // 14 checkerboard
        LightCrossHatched,  // 15 strongly cross-hatched sparse
        CrossHatched,       // 16 heavy checkerboard
        LightCrossHatched,  // 17 hollow bubbles
        LightCrossHatched,  // 18 solid bubbles
        Plus,               // 19 pyramids
        Plus,               // 20 turned pyramids
        Plus,               // 21 plus
        Minus,              // 22 minus
        LightRightHatched,  // 23 22.5 degree down
        LightLeftHatched,   // 24 22.5 degree up
        RightHatched,       // 25 67.5 degree down
        LeftHatched,        // 26 67.5 degree up
        LightCrossHatched,  // 27 22.5 cross hatched
        LightCrossHatched,  // 28 zig zag
        LightCrossHatched,  // 29 sine
        Plus,               // 30 light heavy dithering
        Plus,               // 31 light frame dithering
        DoubleVertical,     // 32 vertical dense
        Vertical,           // 33 vertical
        DoubleVertical,     // 34 vertical thick
        Vertical,           // 35 vertical sparse
        Vertical,           // 36 vertical sparse, thick
        Equals,             // 37 horizontal dense
        Minus,              // 38 horizontal
        Equals,             // 39 horizontal thick
        Minus,              // 40 horizontal
        Minus,              // 41 horizontal
        DoublePlus,         // 42 grid dense
        Plus,               // 43 grid
        DoublePlus,         // 44 grid thick
        Plus,               // 45 grid sparse
        Plus,               // 46 grid sparse, thick
    ]
};

/// Map a `.lyp` dither attribute (`I<n>`) to a fill pattern.
pub fn dither_pattern(dither: &str) -> Result<Pattern, LypError> {
    let unknown = || LypError::UnknownDither(dither.to_owned());
    let index: usize = dither
        .get(1..)
        .and_then(|n| n.parse().ok())
        .ok_or_else(unknown)?;

    DITHER_PATTERNS.get(index).copied().ok_or_else(unknown)
}

/// Parse a layer source such as `1/0@1` into its layer and datatype.
pub fn parse_source(source: &str) -> Result<LayerId, LypError> {
    let invalid = || LypError::InvalidSource(source.to_owned());
    let spec = source.split('@').next().unwrap_or_default();
    let (layer, datatype) = spec.split_once('/').ok_or_else(invalid)?;

    Ok((
        layer.trim().parse().map_err(|_| invalid())?,
        datatype.trim().parse().map_err(|_| invalid())?,
    ))
}

/// Layer name used in the technology table.
fn rename(name: &str) -> &str {
    match name {
        "Si - 90 nm rib" => "Si slab",
        "Lumerical" => "FDTD",
        other => other,
    }
}

/// One converted `.lyp` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub name: String,
    pub spec: LayerSpec,
}

fn child_text<'a>(node: Node<'a, '_>, tag: &str) -> Result<&'a str, LypError> {
    node.children()
        .find(|c| c.has_tag_name(tag))
        .and_then(|c| c.text())
        .map(str::trim)
        .ok_or_else(|| LypError::MissingField(tag.to_owned()))
}

fn layer_record(node: Node, group: &str) -> Result<LayerRecord, PdkError> {
    let name = rename(child_text(node, "name")?);
    let layer = parse_source(child_text(node, "source")?)?;
    let color = Rgba::from_hex(&format!("{}{}", child_text(node, "fill-color")?, FILL_ALPHA))?;
    let pattern = dither_pattern(child_text(node, "dither-pattern")?)?;

    Ok(LayerRecord {
        name: name.to_owned(),
        spec: LayerSpec {
            layer,
            group: group.to_owned(),
            color,
            pattern,
        },
    })
}

/// Convert the top-level `<properties>` of a `.lyp` document.
///
/// Entries of a group inherit the group's name; the group itself is not a layer.
pub fn parse_lyp(contents: &str) -> Result<Vec<LayerRecord>, PdkError> {
    let doc = Document::parse(contents)?;
    let mut records = Vec::new();

    for prop in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("properties"))
    {
        let members: Vec<Node> = prop
            .children()
            .filter(|n| n.has_tag_name("group-members"))
            .collect();

        if members.is_empty() {
            records.push(layer_record(prop, "")?);
        } else {
            let group = child_text(prop, "name")?;
            for member in members {
                records.push(layer_record(member, group)?);
            }
        }
    }

    Ok(records)
}

pub fn read_lyp(filename: &Path, verbose: bool) -> Result<Vec<LayerRecord>, PdkError> {
    let contents = fs::read_to_string(filename)?;
    let records = parse_lyp(&contents)?;
    vprintln!(verbose, "Read {} layers from {:?}", records.len(), filename);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LYP: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<layer-properties>
 <properties>
  <frame-color>#0000ff</frame-color>
  <fill-color>#0000ff</fill-color>
  <dither-pattern>I5</dither-pattern>
  <name>Text</name>
  <source>10/0@1</source>
 </properties>
 <properties>
  <name>Waveguides</name>
  <group-members>
   <fill-color>#ff80a8</fill-color>
   <dither-pattern>I4</dither-pattern>
   <name>Si</name>
   <source>1/0@1</source>
  </group-members>
  <group-members>
   <fill-color>#80a8ff</fill-color>
   <dither-pattern>I9</dither-pattern>
   <name>Si - 90 nm rib</name>
   <source>2/0@1</source>
  </group-members>
 </properties>
 <properties>
  <name>SiEPIC</name>
  <group-members>
   <fill-color>#800057</fill-color>
   <dither-pattern>I1</dither-pattern>
   <name>Lumerical</name>
   <source>733/0@1</source>
  </group-members>
 </properties>
</layer-properties>
"##;

    #[test]
    fn groups_and_renames() {
        let records = parse_lyp(LYP).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["Text", "Si", "Si slab", "FDTD"]);

        assert_eq!(records[0].spec.group, "");
        assert_eq!(records[1].spec.group, "Waveguides");
        assert_eq!(records[2].spec.layer, (2, 0));
        assert_eq!(records[2].spec.pattern, Pattern::LightRightHatched);
        assert_eq!(records[1].spec.color, Rgba([0xff, 0x80, 0xa8, 0x18]));
        assert_eq!(records[3].spec.pattern, Pattern::Hollow);
    }

    #[test]
    fn converted_entries_match_the_layer_table() {
        let table = crate::layer::ebeam_layers();
        for record in parse_lyp(LYP).unwrap() {
            assert_eq!(table[&record.name], record.spec, "{}", record.name);
        }
    }

    #[test]
    fn dither_codes() {
        assert_eq!(dither_pattern("I0").unwrap(), Pattern::Solid);
        assert_eq!(dither_pattern("I46").unwrap(), Pattern::Plus);
        assert_eq!(dither_pattern("I32").unwrap(), Pattern::DoubleVertical);
        assert!(matches!(dither_pattern("I47"), Err(LypError::UnknownDither(_))));
        assert!(dither_pattern("").is_err());
        assert!(dither_pattern("Ix").is_err());
    }

    #[test]
    fn layer_sources() {
        assert_eq!(parse_source("81/0@1").unwrap(), (81, 0));
        assert_eq!(parse_source("1/99").unwrap(), (1, 99));
        assert!(parse_source("1@1").is_err());
        assert!(parse_source("a/0@1").is_err());
    }

    #[test]
    fn unknown_dither_is_fatal() {
        let bad = LYP.replace("I9", "I99");
        assert!(matches!(
            parse_lyp(&bad),
            Err(PdkError::Lyp(LypError::UnknownDither(_)))
        ));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("EBeam.lyp");
        fs::write(&path, LYP).unwrap();
        assert_eq!(read_lyp(&path, false).unwrap().len(), 4);
    }
}
