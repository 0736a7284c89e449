//! Builds component registry entries by scanning a GDS cell library.
//!
//! Each top-level cell has its pins (PinRec shapes) matched against the
//! technology's port specifications; fiber targets become Gaussian ports.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use gds21::GdsLibrary;

use crate::gds::{flatten_cell, top_level_cells, Layout, Point};
use crate::layer::{FIBER_TARGET_LAYER, PIN_LAYER, SI_LAYER, WAVEGUIDE_LAYER};
use crate::matcher::{resolve_ports, PinResolution};
use crate::port::PortSpec;
use crate::registry::{ComponentEntry, ModelConfig, PortData, Registry};
use crate::{vprintln, Float, PdkError};

/// Pin and fiber coordinates are rounded to this many decimals (nanometers).
pub const PIN_DECIMALS: i32 = 3;

/// Fiber tilt assigned to detected fiber targets until set by hand.
pub const DEFAULT_FIBER_TILT: Float = 0.0;
pub const DEFAULT_FIBER_POLARIZATION: Float = 90.0;

/// Fewer resolved ports than this and the cell gets no simulation model.
pub const MODEL_MIN_PORTS: usize = 2;

/// Registry entry produced for one cell, along with pins left unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRecord {
    pub name: String,
    pub entry: ComponentEntry,
    /// Missing or ambiguous pins, excluded from `entry.ports`.
    pub unresolved: Vec<PinResolution>,
}

/// Ports of one flattened cell and the pins that did not resolve.
pub fn convert_layout(
    layout: &mut Layout,
    specs: &IndexMap<String, PortSpec>,
) -> (Vec<PortData>, Vec<PinResolution>) {
    layout.remap_layers(&[(WAVEGUIDE_LAYER, SI_LAYER)]);

    let fibers = layout.centers(FIBER_TARGET_LAYER, PIN_DECIMALS);
    let pins = layout.centers(PIN_LAYER, PIN_DECIMALS);

    let mut ports = Vec::new();
    let mut unresolved = Vec::new();
    for resolution in resolve_ports(&pins, specs, layout) {
        match resolution {
            PinResolution::Resolved(c) => {
                ports.push(PortData::waveguide(c.pin.x, c.pin.y, c.direction, &c.spec))
            }
            other => unresolved.push(other),
        }
    }

    ports.extend(fibers.iter().map(|f| {
        PortData::fiber(f.x, f.y, DEFAULT_FIBER_TILT, DEFAULT_FIBER_POLARIZATION)
    }));

    (ports, unresolved)
}

fn record(name: &str, family: &str, library: &str, ports: Vec<PortData>, unresolved: Vec<PinResolution>) -> CellRecord {
    let model = (ports.len() >= MODEL_MIN_PORTS).then(ModelConfig::new);

    CellRecord {
        name: name.to_owned(),
        entry: ComponentEntry {
            family: family.to_owned(),
            library: library.to_owned(),
            ports,
            model,
        },
        unresolved,
    }
}

/// Convert every top-level cell of a parsed library, in name order.
///
/// Cells whose name starts with `$` are anonymous and skipped.
pub fn convert_library(
    lib: &GdsLibrary,
    family: &str,
    library: &str,
    specs: &IndexMap<String, PortSpec>,
) -> Result<Vec<CellRecord>, PdkError> {
    let mut records = Vec::new();

    for name in top_level_cells(lib) {
        if name.starts_with('$') {
            continue;
        }

        let mut layout = flatten_cell(lib, &name)?;
        let (ports, unresolved) = convert_layout(&mut layout, specs);
        records.push(record(&name, family, library, ports, unresolved));
    }

    Ok(records)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, PdkError> {
    let mut paths = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();
    Ok(paths)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Scan `<root>/<family>/*.gds` and convert every cell found.
///
/// Families and files are visited in name order.
///
/// # Arguments
/// * `root` - Library root holding one directory per family
/// * `specs` - Port specifications to match pins against
/// * `verbose` - Whether to print per-file progress
///
/// # Returns
/// * `Ok(Vec<CellRecord>)` - One record per top-level cell
/// * `Err(PdkError)` - Unreadable directory or GDS file, or a malformed cell
pub fn convert_components(
    root: &Path,
    specs: &IndexMap<String, PortSpec>,
    verbose: bool,
) -> Result<Vec<CellRecord>, PdkError> {
    let mut records = Vec::new();

    for family_dir in sorted_entries(root)? {
        if !family_dir.is_dir() {
            continue;
        }
        let family = stem(&family_dir);

        for gds in sorted_entries(&family_dir)? {
            let is_gds = gds
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("gds"));
            if !is_gds {
                continue;
            }

            let lib = GdsLibrary::load(&gds)?;
            let converted = convert_library(&lib, &family, &stem(&gds), specs)?;
            vprintln!(verbose, "Converted {} cells from {:?}", converted.len(), gds);
            records.extend(converted);
        }
    }

    Ok(records)
}

/// Collect converted records into a registry, keyed by cell name.
pub fn to_registry(records: &[CellRecord]) -> Registry {
    let mut registry = Registry::new();
    for r in records {
        registry.insert(&r.name, r.entry.clone());
    }
    registry
}

/// Converted registry with the pins left unresolved on each cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentTable {
    pub components: Registry,
    /// Cells without unresolved pins are omitted.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub unresolved: IndexMap<String, Vec<PinResolution>>,
}

impl ComponentTable {
    pub fn from_records(records: &[CellRecord]) -> ComponentTable {
        let unresolved = records
            .iter()
            .filter(|r| !r.unresolved.is_empty())
            .map(|r| (r.name.clone(), r.unresolved.clone()))
            .collect();

        ComponentTable {
            components: to_registry(records),
            unresolved,
        }
    }
}

/// Pins of a record that did not resolve to exactly one port.
pub fn unresolved_pins(record: &CellRecord) -> Vec<Point> {
    record.unresolved.iter().map(PinResolution::pin).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gds::tests::{boundary, cell, library, pin};
    use crate::port::{ebeam_ports, Direction, PathProfile};

    fn te_only() -> IndexMap<String, PortSpec> {
        ebeam_ports(0.22, 0.4)
            .into_iter()
            .filter(|(name, _)| name == "TE_1550_500")
            .collect()
    }

    /// Straight waveguide drawn on the abstract waveguide layer with a pin at each end.
    fn straight(name: &str) -> gds21::GdsStruct {
        cell(
            name,
            vec![
                boundary((1, 99), 0, -250, 10_000, 250),
                pin(-100, 0, 100, 0),
                pin(9_900, 0, 10_100, 0),
            ],
        )
    }

    #[test]
    fn waveguide_layer_is_remapped_before_matching() {
        let lib = library(vec![straight("wg")]);
        let records = convert_library(&lib, "EBeam", "wgs", &te_only()).unwrap();
        assert_eq!(records.len(), 1);

        let entry = &records[0].entry;
        assert_eq!(entry.family, "EBeam");
        assert_eq!(entry.library, "wgs");
        assert_eq!(
            entry.ports,
            [
                PortData::waveguide(0.0, 0.0, Direction::East, "TE_1550_500"),
                PortData::waveguide(10.0, 0.0, Direction::West, "TE_1550_500"),
            ]
        );
        assert!(entry.model.is_some());
        assert!(records[0].unresolved.is_empty());
    }

    #[test]
    fn model_needs_two_ports() {
        let one = cell(
            "terminator",
            vec![boundary((1, 0), 0, -250, 10_000, 250), pin(-100, 0, 100, 0)],
        );
        let two = cell(
            "gc",
            vec![
                boundary((1, 0), 0, -250, 10_000, 250),
                pin(-100, 0, 100, 0),
                boundary((81, 0), 20_000, -1_000, 22_000, 1_000),
            ],
        );
        let lib = library(vec![one, two]);
        let records = convert_library(&lib, "EBeam", "mixed", &te_only()).unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["gc", "terminator"]);

        let gc = &records[0].entry;
        assert_eq!(gc.ports.len(), 2);
        assert!(gc.model.is_some());
        assert_eq!(gc.ports[1], PortData::fiber(21.0, 0.0, 0.0, 90.0));

        assert_eq!(records[1].entry.ports.len(), 1);
        assert!(records[1].entry.model.is_none());
    }

    #[test]
    fn anonymous_and_referenced_cells_are_skipped() {
        let sref = gds21::GdsElement::GdsStructRef(gds21::GdsStructRef {
            name: "wg".into(),
            xy: gds21::GdsPoint::new(0, 0),
            ..Default::default()
        });
        let lib = library(vec![straight("wg"), cell("top", vec![sref]), straight("$anon")]);
        let records = convert_library(&lib, "EBeam", "lib", &te_only()).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["top"]);
        assert_eq!(records[0].entry.ports.len(), 2);
    }

    #[test]
    fn ambiguous_pins_are_kept_aside() {
        let lib = library(vec![straight("wg")]);
        let records = convert_library(&lib, "EBeam", "wgs", &ebeam_ports(0.22, 0.4)).unwrap();
        let record = &records[0];
        assert!(record.entry.ports.is_empty());
        assert_eq!(
            unresolved_pins(record),
            [Point::new(0.0, 0.0), Point::new(10.0, 0.0)]
        );
        assert!(matches!(record.unresolved[0], PinResolution::Ambiguous(..)));
        assert!(record.entry.model.is_none());
    }

    #[test]
    fn ambiguous_pin_does_not_count_towards_model() {
        // Strip on the left, 1 μm wide arm on the right
        let mixed = cell(
            "taper",
            vec![
                boundary((1, 0), 0, -250, 10_000, 250),
                boundary((1, 0), 10_000, -500, 20_000, 500),
                pin(-100, 0, 100, 0),
                pin(19_900, 0, 20_100, 0),
            ],
        );
        let mut specs: IndexMap<String, PortSpec> = ebeam_ports(0.22, 0.4)
            .into_iter()
            .filter(|(name, _)| name == "TE_1550_500" || name == "TM_1550_500")
            .collect();
        specs.insert(
            "wide".to_owned(),
            PortSpec {
                description: "wide".into(),
                width: 3.0,
                limits: (-1.5, 1.72),
                num_modes: 1,
                target_neff: 3.5,
                path_profiles: vec![PathProfile::new(1.0, 0.0, (1, 0))],
            },
        );

        let records = convert_library(&library(vec![mixed]), "EBeam", "tapers", &specs).unwrap();
        let record = &records[0];
        assert_eq!(
            record.entry.ports,
            [PortData::waveguide(20.0, 0.0, Direction::West, "wide")]
        );
        assert_eq!(record.unresolved.len(), 1);
        assert_eq!(record.unresolved[0].candidates().len(), 2);
        assert!(record.entry.model.is_none());
    }

    #[test]
    fn scans_family_directories_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for (family, file, cell_name) in [("EBeam_SiN", "b", "sin_wg"), ("EBeam", "z", "z_wg"), ("EBeam", "a", "a_wg")] {
            let path = dir.path().join(family);
            fs::create_dir_all(&path).unwrap();
            library(vec![straight(cell_name)])
                .save(path.join(format!("{file}.gds")))
                .unwrap();
        }
        fs::write(dir.path().join("EBeam").join("notes.txt"), "not a library").unwrap();

        let records = convert_components(dir.path(), &te_only(), false).unwrap();
        let seen: Vec<(&str, &str, &str)> = records
            .iter()
            .map(|r| (r.entry.family.as_str(), r.entry.library.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(
            seen,
            [("EBeam", "a", "a_wg"), ("EBeam", "z", "z_wg"), ("EBeam_SiN", "b", "sin_wg")]
        );
    }
}
