//! Static component registry: where each library cell lives, the ports
//! resolved on it and the simulation model it carries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::port::Direction;
use crate::Float;

/// Beam waist of the fiber mode, in micrometers.
pub const FIBER_WAIST: Float = 5.0;

/// Port permutation under which a device is symmetric.
///
/// The S-parameters from `source` are those from `target` with port names
/// exchanged according to `mapping`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSymmetry {
    pub source: String,
    pub target: String,
    pub mapping: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelValue {
    Bool(bool),
    Number(Float),
    Text(String),
    Vector([Float; 3]),
    /// Simulation bounds; `None` leaves that side automatic.
    Bounds([[Option<Float>; 3]; 2]),
    Symmetries(Vec<PortSymmetry>),
}

/// Ordered keyword configuration of a simulation model.
pub type ModelConfig = IndexMap<String, ModelValue>;

/// Merge `overrides` over `base`; overriding keys keep their base position.
pub fn merge_config(base: &ModelConfig, overrides: &ModelConfig) -> ModelConfig {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// A port recorded for a library cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PortData {
    Waveguide {
        center: (Float, Float),
        direction: Direction,
        spec: String,
    },
    /// Fiber port above a grating coupler. The height is set by the technology.
    Gaussian {
        center: (Float, Float),
        direction: [Float; 3],
        waist_radius: Float,
        polarization_angle: Float,
    },
}

impl PortData {
    pub fn waveguide(x: Float, y: Float, direction: Direction, spec: &str) -> PortData {
        PortData::Waveguide {
            center: (x, y),
            direction,
            spec: spec.to_owned(),
        }
    }

    /// Fiber tilted by `tilt` degrees from the vertical in the xz plane.
    pub fn fiber(x: Float, y: Float, tilt: Float, polarization_angle: Float) -> PortData {
        let angle = tilt.to_radians();
        PortData::Gaussian {
            center: (x, y),
            direction: [angle.sin(), 0.0, -angle.cos()],
            waist_radius: FIBER_WAIST,
            polarization_angle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentEntry {
    /// Library subdirectory.
    pub family: String,
    /// GDS file stem inside the family directory.
    pub library: String,
    pub ports: Vec<PortData>,
    pub model: Option<ModelConfig>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    entries: IndexMap<String, ComponentEntry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn insert(&mut self, name: &str, entry: ComponentEntry) {
        self.entries.insert(name.to_owned(), entry);
    }

    pub fn get(&self, name: &str) -> Option<&ComponentEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ComponentEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The SiEPIC EBeam component library.
    pub fn ebeam() -> Registry {
        use Direction::{East as E, North as N, South as S, West as W};

        let wg = PortData::waveguide;
        let fiber = PortData::fiber;

        let mut r = Registry::new();
        let mut add = |name: &str, family: &str, library: &str, ports: Vec<PortData>, model: Option<ModelConfig>| {
            r.insert(
                name,
                ComponentEntry {
                    family: family.to_owned(),
                    library: library.to_owned(),
                    ports,
                    model,
                },
            )
        };

        // Silicon nitride
        add(
            "ANT_MMI_1x2_te1550_3dB_BB",
            "EBeam_SiN",
            "ANT_MMI_1x2_te1550_3dB_BB",
            vec![
                wg(-12.88, 0.0, E, "SiN_TE_1550_750"),
                wg(12.88, -0.975, W, "SiN_TE_1550_750"),
                wg(12.88, 0.975, W, "SiN_TE_1550_750"),
            ],
            None,
        );
        add(
            "GC_SiN_TE_1550_8degOxide_BB",
            "EBeam_SiN",
            "GC_SiN_TE_1550_8degOxide_BB",
            vec![wg(0.0, 0.0, W, "SiN_TE_1550_750"), fiber(-29.7, 0.0, 8.0, 90.0)],
            None,
        );
        add(
            "ebeam_MMI_2x2_5050_te1310",
            "EBeam_SiN",
            "ULaval",
            vec![
                wg(-16.72, -1.2, E, "SiN_TE_1550_800"),
                wg(-16.72, 1.2, E, "SiN_TE_1550_800"),
                wg(16.72, -1.2, W, "SiN_TE_1550_800"),
                wg(16.72, 1.2, W, "SiN_TE_1550_800"),
            ],
            Some(with_symmetries(four_port())),
        );
        // No 1310 nm spec at 800 nm width; the 1550 nm one stands in.
        add(
            "ebeam_YBranch_te1310",
            "EBeam_SiN",
            "ULaval",
            vec![
                wg(-7.69, 0.0, E, "SiN_TE_1550_800"),
                wg(7.69, 0.7, W, "SiN_TE_1550_800"),
                wg(7.69, -0.7, W, "SiN_TE_1550_800"),
            ],
            Some(with_symmetries(three_port())),
        );
        add("ebeam_BondPad", "EBeam_SiN", "ebeam_BondPad", vec![], None);
        add(
            "ebeam_DC_2-1_te895",
            "EBeam_SiN",
            "ebeam_DC_2-1_te895",
            vec![
                wg(-14.56, -2.285, E, "SiN_TE_895_450"),
                wg(-14.56, 2.285, E, "SiN_TE_895_450"),
                wg(14.56, -2.285, W, "SiN_TE_895_450"),
                wg(14.56, 2.285, W, "SiN_TE_895_450"),
            ],
            Some(with_symmetries(four_port())),
        );
        add(
            "ebeam_DC_te895",
            "EBeam_SiN",
            "ebeam_DC_te895",
            vec![
                wg(-14.137, -2.285, E, "SiN_TE_895_450"),
                wg(-14.137, 2.285, E, "SiN_TE_895_450"),
                wg(14.137, -2.285, W, "SiN_TE_895_450"),
                wg(14.137, 2.285, W, "SiN_TE_895_450"),
            ],
            Some(with_symmetries(four_port())),
        );
        add(
            "ebeam_YBranch_895",
            "EBeam_SiN",
            "ebeam_YBranch_895",
            vec![
                wg(0.0, 0.0, E, "SiN_TE_895_450"),
                wg(15.0, -2.75, W, "SiN_TE_895_450"),
                wg(15.0, 2.75, W, "SiN_TE_895_450"),
            ],
            Some(with_symmetries(three_port())),
        );
        add(
            "ebeam_gc_te895",
            "EBeam_SiN",
            "ebeam_gc_te895",
            vec![wg(-24.2, 0.0, E, "SiN_TE_895_450"), fiber(8.0, 0.0, -7.0, 90.0)],
            Some(grating_model(
                [0.0, -1.0, 0.0],
                [[None, Some(-10.0), None], [Some(25.0), Some(10.0), None]],
            )),
        );
        add(
            "ebeam_terminator_SiN_1550",
            "EBeam_SiN",
            "ebeam_terminator_SiN_1550",
            vec![wg(0.0, 0.0, W, "SiN_TE_1550_750")],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_terminator_SiN_te895",
            "EBeam_SiN",
            "ebeam_terminator_SiN_te895",
            vec![wg(0.0, 0.0, W, "SiN_TE_895_450")],
            Some(ModelConfig::new()),
        );
        add(
            "taper_SiN_750_3000",
            "EBeam_SiN",
            "taper_SiN_750_3000",
            vec![
                wg(0.0, 0.0, E, "SiN_TE_1550_750"),
                wg(50.0, 0.0, W, "MM_SiN_TE_1550_3000"),
            ],
            Some(ModelConfig::new()),
        );

        // Silicon
        add(
            "GC_TE_1310_8degOxide_BB",
            "EBeam",
            "GCs_BB",
            vec![wg(0.0, 0.0, W, "TE_1310_350"), fiber(-20.4, 0.0, 8.0, 90.0)],
            None,
        );
        add(
            "GC_TE_1550_8degOxide_BB",
            "EBeam",
            "GCs_BB",
            vec![wg(0.0, 0.0, W, "TE_1550_500"), fiber(-20.4, 0.0, 8.0, 90.0)],
            None,
        );
        // No TM spec at 350 nm width; the TE one stands in.
        add(
            "GC_TM_1310_8degOxide_BB",
            "EBeam",
            "GCs_BB",
            vec![wg(0.0, 0.0, W, "TE_1310_350"), fiber(-20.4, 0.0, 8.0, 0.0)],
            None,
        );
        add(
            "GC_TM_1550_8degOxide_BB",
            "EBeam",
            "GCs_BB",
            vec![wg(0.0, 0.0, W, "TM_1550_500"), fiber(-20.4, 0.0, 8.0, 0.0)],
            None,
        );
        add(
            "ebeam_adiabatic_te1550",
            "EBeam",
            "ebeam_adiabatic_te1550",
            vec![
                wg(0.1, -1.5, E, "TE_1550_500"),
                wg(0.1, 1.5, E, "TE_1550_500"),
                wg(195.9, -1.5, W, "TE_1550_500"),
                wg(195.9, 1.5, W, "TE_1550_500"),
            ],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_adiabatic_tm1550",
            "EBeam",
            "ebeam_adiabatic_tm1550",
            vec![
                wg(0.1, -1.5, E, "TM_1550_500"),
                wg(0.1, 1.5, E, "TM_1550_500"),
                wg(217.9, -1.5, W, "TM_1550_500"),
                wg(217.9, 1.5, W, "TM_1550_500"),
            ],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_bdc_te1550",
            "EBeam",
            "ebeam_bdc_te1550",
            vec![
                wg(-35.45, -2.35, E, "TE_1550_500"),
                wg(-35.45, 2.35, E, "TE_1550_500"),
                wg(35.3, -2.35, W, "TE_1550_500"),
                wg(35.3, 2.35, W, "TE_1550_500"),
            ],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_crossing4",
            "EBeam",
            "ebeam_crossing4",
            vec![
                wg(-4.8, 0.0, E, "TE_1550_500"),
                wg(4.8, 0.0, W, "TE_1550_500"),
                wg(0.0, -4.8, N, "TE_1550_500"),
                wg(0.0, 4.8, S, "TE_1550_500"),
            ],
            Some(with_symmetries(crossing())),
        );
        add(
            "ebeam_gc_te1550",
            "EBeam",
            "ebeam_gc_te1550",
            vec![wg(0.0, 0.0, W, "TE_1550_500"), fiber(-20.4, 0.0, -21.0, 90.0)],
            Some(grating_model(
                [0.0, -1.0, 0.0],
                [[Some(-33.0), Some(-11.0), None], [None, Some(11.0), None]],
            )),
        );
        add(
            "ebeam_gc_tm1550",
            "EBeam",
            "ebeam_gc_tm1550",
            vec![wg(0.0, 0.0, W, "TM_1550_500"), fiber(-24.4, 0.0, 7.0, 0.0)],
            Some(grating_model(
                [0.0, 1.0, 0.0],
                [[None, Some(-11.0), None], [None, Some(11.0), None]],
            )),
        );
        add(
            "ebeam_splitter_swg_assist_te1310",
            "EBeam",
            "ebeam_splitter_swg_assist_te1310",
            vec![
                wg(-63.001, -2.0, E, "TE_1310_350"),
                wg(-63.001, 2.0, E, "TE_1310_350"),
                wg(63.001, -2.0, W, "TE_1310_350"),
                wg(63.001, 2.0, W, "TE_1310_350"),
            ],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_splitter_swg_assist_te1550",
            "EBeam",
            "ebeam_splitter_swg_assist_te1550",
            vec![
                wg(-63.001, -1.975, E, "TE_1550_500"),
                wg(-63.001, 1.975, E, "TE_1550_500"),
                wg(63.001, -1.975, W, "TE_1550_500"),
                wg(63.001, 1.975, W, "TE_1550_500"),
            ],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_terminator_te1310",
            "EBeam",
            "ebeam_terminator_te1310",
            vec![wg(0.0, 0.0, W, "TE_1310_350")],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_terminator_te1550",
            "EBeam",
            "ebeam_terminator_te1550",
            vec![wg(0.0, 0.0, W, "TE_1550_500")],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_terminator_tm1550",
            "EBeam",
            "ebeam_terminator_tm1550",
            vec![wg(0.0, 0.0, W, "TM_1550_500")],
            Some(ModelConfig::new()),
        );
        add(
            "ebeam_y_1550",
            "EBeam",
            "ebeam_y_1550",
            vec![
                wg(-7.4, 0.0, E, "TE_1550_500"),
                wg(7.4, -2.75, W, "TE_1550_500"),
                wg(7.4, 2.75, W, "TE_1550_500"),
            ],
            Some(with_symmetries(three_port())),
        );
        add(
            "ebeam_y_adiabatic",
            "EBeam",
            "ebeam_y_adiabatic",
            vec![
                wg(0.05, 0.0, E, "TE-TM_1550_450"),
                wg(50.05, -1.25, W, "TE-TM_1550_450"),
                wg(50.05, 1.25, W, "TE-TM_1550_450"),
            ],
            Some(with_symmetries(three_port())),
        );
        add(
            "ebeam_y_adiabatic_500pin",
            "EBeam",
            "ebeam_y_adiabatic_500pin",
            vec![
                wg(-1.0, 0.0, E, "TE_1550_500"),
                wg(51.0, -1.25, W, "TE_1550_500"),
                wg(51.0, 1.25, W, "TE_1550_500"),
            ],
            Some(with_symmetries(three_port())),
        );
        // No multimode TM spec at 1310 nm.
        add(
            "taper_si_simm_1310",
            "EBeam",
            "taper_si_simm_1310",
            vec![
                wg(50.0, 0.0, W, "MM_TE_1550_3000"),
                wg(0.0, 0.0, E, "TE_1310_350"),
            ],
            Some(ModelConfig::new()),
        );
        add(
            "taper_si_simm_1550",
            "EBeam",
            "taper_si_simm_1550",
            vec![
                wg(50.0, 0.0, W, "MM_TE_1550_3000"),
                wg(0.0, 0.0, E, "TE_1550_500"),
            ],
            Some(ModelConfig::new()),
        );

        r
    }
}

fn symmetry(source: &str, target: &str, mapping: &[(&str, &str)]) -> PortSymmetry {
    PortSymmetry {
        source: source.to_owned(),
        target: target.to_owned(),
        mapping: mapping
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect(),
    }
}

/// Mirror symmetry of a 1x2 splitter: outputs P1 and P2 swap.
fn three_port() -> Vec<PortSymmetry> {
    vec![symmetry("P1", "P2", &[("P0", "P0"), ("P2", "P1")])]
}

/// Symmetries of a 2x2 device: directional couplers and MMIs.
fn four_port() -> Vec<PortSymmetry> {
    vec![
        symmetry("P0", "P1", &[("P1", "P0"), ("P2", "P3"), ("P3", "P2")]),
        symmetry("P0", "P2", &[("P1", "P3"), ("P2", "P0"), ("P3", "P1")]),
        symmetry("P0", "P3", &[("P1", "P2"), ("P2", "P1"), ("P3", "P0")]),
    ]
}

/// Four-fold rotational symmetry of a waveguide crossing.
fn crossing() -> Vec<PortSymmetry> {
    vec![
        symmetry("P0", "P1", &[("P1", "P0"), ("P2", "P3"), ("P3", "P2")]),
        symmetry("P0", "P2", &[("P1", "P3"), ("P2", "P1"), ("P3", "P0")]),
        symmetry("P0", "P3", &[("P1", "P2"), ("P2", "P0"), ("P3", "P1")]),
    ]
}

fn with_symmetries(symmetries: Vec<PortSymmetry>) -> ModelConfig {
    let mut config = ModelConfig::new();
    config.insert("port_symmetries".to_owned(), ModelValue::Symmetries(symmetries));
    config
}

fn grating_model(symmetry: [Float; 3], bounds: [[Option<Float>; 3]; 2]) -> ModelConfig {
    let mut config = ModelConfig::new();
    config.insert("symmetry".to_owned(), ModelValue::Vector(symmetry));
    config.insert("bounds".to_owned(), ModelValue::Bounds(bounds));
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::technology::{ebeam, EbeamParams};
    use approx::assert_relative_eq;

    #[test]
    fn every_waveguide_port_names_a_known_spec() {
        let tech = ebeam(&EbeamParams::default());
        let registry = Registry::ebeam();
        assert_eq!(registry.len(), 32);

        for (name, entry) in registry.iter() {
            for port in &entry.ports {
                if let PortData::Waveguide { spec, .. } = port {
                    assert!(tech.ports.contains_key(spec), "{name}: {spec}");
                }
            }
        }
    }

    #[test]
    fn fiber_direction_is_a_unit_vector() {
        let PortData::Gaussian { direction, .. } = PortData::fiber(0.0, 0.0, -21.0, 90.0) else {
            panic!("expected a Gaussian port");
        };
        let norm: Float = direction.iter().map(|v| v * v).sum();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
        assert!(direction[0] < 0.0);
        assert!(direction[2] < 0.0);
    }

    #[test]
    fn overrides_replace_in_place() {
        let base = grating_model([0.0, -1.0, 0.0], [[None; 3]; 2]);
        let mut overrides = ModelConfig::new();
        overrides.insert("symmetry".to_owned(), ModelValue::Vector([0.0, 0.0, 0.0]));
        overrides.insert("verbose".to_owned(), ModelValue::Bool(true));

        let merged = merge_config(&base, &overrides);
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, ["symmetry", "bounds", "verbose"]);
        assert_eq!(merged["symmetry"], ModelValue::Vector([0.0, 0.0, 0.0]));
    }

    #[test]
    fn model_values_serialize_plainly() {
        let config = grating_model([0.0, 1.0, 0.0], [[None, Some(-11.0), None], [None, Some(11.0), None]]);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["symmetry"], serde_json::json!([0.0, 1.0, 0.0]));
        assert_eq!(json["bounds"][0][1], serde_json::json!(-11.0));
        assert!(json["bounds"][1][0].is_null());

        let back: ModelConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
