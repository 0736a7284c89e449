//! Technology definition for the EBeam PDK and its persistence.
//!
//! A [Technology] gathers the layer table, the extrusion rules that turn mask
//! layers into material slabs, the port specifications and the background
//! medium. It can be stored as YAML or JSON and loaded back unchanged.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::{fmt, fs, io};
use thiserror::Error;

use crate::layer::{ebeam_layers, LayerSpec, SIN_LAYER, SI_LAYER, SI_SLAB_LAYER};
use crate::port::{ebeam_ports, PortSpec};
use crate::{infoln, query, vprintln, Float, LayerId, PdkError, QueryDefault};

pub const TECHNOLOGY_NAME: &str = "SiEPIC EBeam";
pub const TECHNOLOGY_VERSION: &str = "0.4.5";

#[derive(Debug, Error)]
pub enum TechError {
    #[error("Unsupported file extension: {0}")]
    FileType(String),
    #[error("Port specification not found: {0}")]
    PortSpecNotFound(String),
    #[error("Medium must be given as material/variant: {0}")]
    InvalidMedium(String),
}

/// Entry of the simulation engine's material library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Medium {
    pub material: String,
    pub variant: String,
}

impl Medium {
    pub fn new(material: &str, variant: &str) -> Medium {
        Medium {
            material: material.to_owned(),
            variant: variant.to_owned(),
        }
    }

    pub fn sio2() -> Medium {
        Medium::new("SiO2", "Horiba")
    }

    pub fn si() -> Medium {
        Medium::new("cSi", "Li1993_293K")
    }

    pub fn sin() -> Medium {
        Medium::new("SiN", "Horiba")
    }
}

impl fmt::Display for Medium {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.material, self.variant)
    }
}

impl FromStr for Medium {
    type Err = TechError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((m, v)) if !m.trim().is_empty() && !v.trim().is_empty() => {
                Ok(Medium::new(m.trim(), v.trim()))
            }
            _ => Err(TechError::InvalidMedium(s.to_owned())),
        }
    }
}

/// Mask layer with an optional dilation applied before extrusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskSpec {
    pub layer: LayerId,
    pub dilation: Float,
}

/// Rule converting a 2D mask into a 3D material slab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrusionSpec {
    pub mask: MaskSpec,
    pub medium: Medium,
    /// Bottom and top of the slab.
    pub limits: (Float, Float),
    /// Sidewall angle in degrees.
    pub sidewall_angle: Float,
}

/// Monte Carlo variable over a technology parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomVariable {
    pub name: String,
    pub value: Float,
    pub stdev: Float,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub name: String,
    pub version: String,
    pub layers: IndexMap<String, LayerSpec>,
    pub extrusion_specs: Vec<ExtrusionSpec>,
    pub ports: IndexMap<String, PortSpec>,
    pub background_medium: Medium,
    /// Numeric parameters the technology was built with.
    pub parametric_kwargs: IndexMap<String, Float>,
    pub random_variables: Vec<RandomVariable>,
}

impl Technology {
    /// Looks up a port specification by name.
    ///
    /// # Arguments
    /// * `name` - Port specification name, e.g. `TE_1550_500`
    ///
    /// # Returns
    /// * `Ok(&PortSpec)` - The specification
    /// * `Err(TechError::PortSpecNotFound)` - The technology defines no such port
    pub fn port(&self, name: &str) -> Result<&PortSpec, TechError> {
        self.ports
            .get(name)
            .ok_or_else(|| TechError::PortSpecNotFound(name.to_owned()))
    }

    /// Whether the component library was drawn for this technology.
    pub fn is_compatible(&self) -> bool {
        self.name.starts_with(TECHNOLOGY_NAME)
    }

    /// Saves the technology as YAML or JSON, chosen by extension.
    pub fn save(&self, filename: &Path, verbose: bool) -> Result<(), PdkError> {
        let ext = extension(filename);
        if !matches!(ext.as_str(), "yaml" | "yml" | "json") {
            return Err(TechError::FileType(ext).into());
        }

        let mut file = fs::File::create(filename)?;
        match ext.as_str() {
            "json" => serde_json::to_writer_pretty(&mut file, self)?,
            _ => serde_yaml::to_writer(&mut file, self)?,
        }

        vprintln!(
            verbose,
            "Wrote {} layers, {} extrusion specs and {} port specs to {:?}",
            self.layers.len(),
            self.extrusion_specs.len(),
            self.ports.len(),
            filename
        );

        Ok(())
    }

    /// Loads a technology from a YAML or JSON file.
    pub fn load(filename: &Path) -> Result<Technology, PdkError> {
        let file = fs::File::open(filename)?;
        let rdr = io::BufReader::new(file);

        let tech = match extension(filename).as_str() {
            "yaml" | "yml" => serde_yaml::from_reader(rdr)?,
            "json" => serde_json::from_reader(rdr)?,
            other => return Err(TechError::FileType(other.to_owned()).into()),
        };

        Ok(tech)
    }
}

fn extension(filename: &Path) -> String {
    filename
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

/// Writes a technology, asking before overwriting an existing file.
///
/// # Arguments
/// * `tech` - Technology to write
/// * `filename` - Output path; the extension selects YAML or JSON
/// * `interactive` - Whether to prompt before replacing an existing file
/// * `verbose` - Whether to print progress
///
/// # Returns
/// * `Ok(())` - Written, or the user declined to overwrite
/// * `Err(PdkError)` - File I/O error, unsupported extension, or prompt failure
pub fn write_technology(
    tech: &Technology,
    filename: &Path,
    interactive: bool,
    verbose: bool,
) -> Result<(), PdkError> {
    if fs::metadata(filename).is_ok() {
        let allow = query(
            &format!("'{}' already exists. Overwrite?", filename.to_string_lossy()),
            interactive,
            QueryDefault::Yes,
        )?;

        if !allow {
            infoln!("Aborting...");
            return Ok(());
        }
    }

    tech.save(filename, verbose)
}

/// Physical parameters of the EBeam technology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbeamParams {
    pub si_thickness: Float,
    pub si_slab_thickness: Float,
    pub sin_thickness: Float,
    pub si_mask_dilation: Float,
    pub si_slab_mask_dilation: Float,
    pub sin_mask_dilation: Float,
    pub sidewall_angle: Float,
    pub sio2: Medium,
    pub si: Medium,
    pub sin: Medium,
}

impl Default for EbeamParams {
    fn default() -> Self {
        EbeamParams {
            si_thickness: 0.220,
            si_slab_thickness: 0.090,
            sin_thickness: 0.400,
            si_mask_dilation: 0.0,
            si_slab_mask_dilation: 0.0,
            sin_mask_dilation: 0.0,
            sidewall_angle: 8.0,
            sio2: Medium::sio2(),
            si: Medium::si(),
            sin: Medium::sin(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Number(Float),
    Medium(Medium),
}

/// Named technology parameter with its current value and description.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub value: ParamValue,
    pub tooltip: &'static str,
}

impl EbeamParams {
    /// Parameters in declaration order.
    pub fn parameters(&self) -> Vec<Parameter> {
        use ParamValue::{Medium as M, Number as N};

        let p = |name, value, tooltip| Parameter {
            name,
            value,
            tooltip,
        };

        vec![
            p("si_thickness", N(self.si_thickness), "Full silicon layer thickness."),
            p("si_slab_thickness", N(self.si_slab_thickness), "Partially etched slab thickness in silicon."),
            p("sin_thickness", N(self.sin_thickness), "SiN layer thickness."),
            p("si_mask_dilation", N(self.si_mask_dilation), "Mask dilation for the full-thickness Si layer."),
            p(
                "si_slab_mask_dilation",
                N(self.si_slab_mask_dilation),
                "Mask dilation for the partially etched Si layer.",
            ),
            p("sin_mask_dilation", N(self.sin_mask_dilation), "Mask dilation for the SiN layer."),
            p(
                "sidewall_angle",
                N(self.sidewall_angle),
                "Sidewall angle (in degrees) for Si and SiN etching.",
            ),
            p("sio2", M(self.sio2.clone()), "Background medium."),
            p("si", M(self.si.clone()), "Silicon medium."),
            p("sin", M(self.sin.clone()), "Silicon nitride medium."),
        ]
    }

    fn numeric(&self) -> IndexMap<String, Float> {
        self.parameters()
            .into_iter()
            .filter_map(|p| match p.value {
                ParamValue::Number(v) => Some((p.name.to_owned(), v)),
                ParamValue::Medium(_) => None,
            })
            .collect()
    }
}

/// Create the EBeam technology.
///
/// Heaters, metal layers and oxide openings are drawn but not extruded.
pub fn ebeam(params: &EbeamParams) -> Technology {
    let extrude = |layer: LayerId, dilation: Float, medium: &Medium, thickness: Float| ExtrusionSpec {
        mask: MaskSpec { layer, dilation },
        medium: medium.clone(),
        limits: (0.0, thickness),
        sidewall_angle: params.sidewall_angle,
    };

    let extrusion_specs = vec![
        extrude(SI_LAYER, params.si_mask_dilation, &params.si, params.si_thickness),
        extrude(
            SI_SLAB_LAYER,
            params.si_slab_mask_dilation,
            &params.si,
            params.si_slab_thickness,
        ),
        extrude(SIN_LAYER, params.sin_mask_dilation, &params.sin, params.sin_thickness),
    ];

    Technology {
        name: TECHNOLOGY_NAME.to_owned(),
        version: TECHNOLOGY_VERSION.to_owned(),
        layers: ebeam_layers(),
        extrusion_specs,
        ports: ebeam_ports(params.si_thickness, params.sin_thickness),
        background_medium: params.sio2.clone(),
        parametric_kwargs: params.numeric(),
        random_variables: vec![RandomVariable {
            name: "si_thickness".to_owned(),
            value: 0.22,
            stdev: 0.0223 / 6.0,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_technology_contents() {
        let tech = ebeam(&EbeamParams::default());
        assert_eq!(tech.name, TECHNOLOGY_NAME);
        assert!(tech.is_compatible());
        assert_eq!(tech.layers.len(), 26);
        assert_eq!(tech.extrusion_specs.len(), 3);
        assert_eq!(tech.ports.len(), 19);
        assert_eq!(tech.background_medium, Medium::sio2());
        assert_relative_eq!(tech.parametric_kwargs["sidewall_angle"], 8.0);
        assert!(!tech.parametric_kwargs.contains_key("sio2"));
    }

    #[test]
    fn parameters_flow_into_tables() {
        let params = EbeamParams {
            si_thickness: 0.3,
            si_slab_mask_dilation: 0.01,
            sidewall_angle: 0.0,
            ..Default::default()
        };
        let tech = ebeam(&params);
        assert_relative_eq!(tech.extrusion_specs[0].limits.1, 0.3);
        assert_relative_eq!(tech.extrusion_specs[1].mask.dilation, 0.01);
        assert_relative_eq!(tech.extrusion_specs[2].sidewall_angle, 0.0);
        assert_relative_eq!(tech.ports["TE_1550_500"].limits.1, 1.3);
    }

    #[test]
    fn round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let params = EbeamParams {
            si_thickness: 0.2213,
            sin_thickness: 1.0 / 3.0,
            ..Default::default()
        };
        let tech = ebeam(&params);

        for name in ["tech.json", "tech.yaml"] {
            let path = dir.path().join(name);
            tech.save(&path, false).unwrap();
            let loaded = Technology::load(&path).unwrap();
            assert_eq!(loaded.name, tech.name);
            assert_eq!(loaded.version, tech.version);
            assert_eq!(loaded.layers, tech.layers);
            assert_eq!(loaded.ports, tech.ports);
            assert_eq!(loaded.extrusion_specs, tech.extrusion_specs);
            assert_eq!(loaded.background_medium, tech.background_medium);
            assert_eq!(loaded, tech);
        }
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tech = ebeam(&EbeamParams::default());
        let err = tech.save(&dir.path().join("tech.toml"), false).unwrap_err();
        assert!(matches!(err, PdkError::Technology(TechError::FileType(_))));
        assert!(!dir.path().join("tech.toml").exists());
    }

    #[test]
    fn missing_port_spec_is_a_lookup_error() {
        let tech = ebeam(&EbeamParams::default());
        assert!(tech.port("TE_1550_500").is_ok());
        assert!(matches!(tech.port("TE_9999"), Err(TechError::PortSpecNotFound(_))));
    }

    #[test]
    fn media_parse_from_paths() {
        assert_eq!("cSi/Li1993_293K".parse::<Medium>().unwrap(), Medium::si());
        assert!("SiO2".parse::<Medium>().is_err());
    }
}
