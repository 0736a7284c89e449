//! Assembling library components: geometry, ports and simulation model.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gds::{load_cell, Layout, Point};
use crate::port::{GaussianPort, Port, WaveguidePort};
use crate::registry::{merge_config, ComponentEntry, ModelConfig, PortData, Registry};
use crate::technology::{ebeam, EbeamParams, Technology};
use crate::{warnln, Float, PdkError};

/// Name under which the simulation model is attached.
pub const MODEL_NAME: &str = "Tidy3D";

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("{0} is not a library component")]
    NotFound(String),
    #[error("Duplicate port at ({1}, {2}) on {0}")]
    DuplicatePort(String, Float, Float),
}

/// Simulation model handed to the engine, with its keyword configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub config: ModelConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub layout: Layout,
    pub ports: Vec<Port>,
    pub model: Option<Model>,
}

impl Component {
    pub fn new(name: &str, layout: Layout) -> Component {
        Component {
            name: name.to_owned(),
            layout,
            ports: Vec::new(),
            model: None,
        }
    }

    /// Attach a port; two waveguide ports may not share a center.
    pub fn add_port(&mut self, port: Port) -> Result<(), ComponentError> {
        if let Port::Waveguide(new) = &port {
            let taken = self.ports.iter().any(|p| match p {
                Port::Waveguide(old) => old.center == new.center,
                Port::Gaussian(_) => false,
            });
            if taken {
                return Err(ComponentError::DuplicatePort(
                    self.name.clone(),
                    new.center.x,
                    new.center.y,
                ));
            }
        }

        self.ports.push(port);
        Ok(())
    }

    /// Port name in the simulation engine's `P<index>` convention.
    pub fn port_name(index: usize) -> String {
        format!("P{index}")
    }
}

/// The packaged GDS cell library and the registry describing it.
///
/// Cells are read from `<root>/<family>/<library>.gds`.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    registry: Registry,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>) -> Library {
        Library::with_registry(root, Registry::ebeam())
    }

    pub fn with_registry(root: impl Into<PathBuf>, registry: Registry) -> Library {
        Library {
            root: root.into(),
            registry,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gds_path(&self, entry: &ComponentEntry) -> PathBuf {
        self.root
            .join(&entry.family)
            .join(format!("{}.gds", entry.library))
    }
}

/// Names of every component in the EBeam library.
pub fn component_names() -> Vec<String> {
    Registry::ebeam().names().map(str::to_owned).collect()
}

/// Height of fiber ports above the chip.
fn fiber_height(tech: &Technology) -> Float {
    match tech.parametric_kwargs.get("top_oxide_thickness") {
        Some(&z) if z > 0.0 => z + 0.1,
        _ => 1.0,
    }
}

fn build_port(data: &PortData, tech: &Technology, z: Float) -> Result<Port, PdkError> {
    let port = match data {
        PortData::Waveguide {
            center,
            direction,
            spec,
        } => Port::Waveguide(WaveguidePort {
            center: Point::new(center.0, center.1),
            direction: *direction,
            spec_name: spec.clone(),
            spec: tech.port(spec)?.clone(),
        }),
        PortData::Gaussian {
            center,
            direction,
            waist_radius,
            polarization_angle,
        } => Port::Gaussian(GaussianPort {
            center: [center.0, center.1, z],
            direction: *direction,
            waist_radius: *waist_radius,
            polarization_angle: *polarization_angle,
        }),
    };

    Ok(port)
}

/// Load a component from the library.
///
/// Without a technology the default EBeam technology is used. A technology
/// whose name does not identify it as EBeam is accepted with a warning.
/// `overrides` replace keys of the registered model configuration.
///
/// # Arguments
/// * `library` - Library root and registry to look the component up in
/// * `name` - Registered cell name
/// * `technology` - Technology providing port specifications; EBeam when `None`
/// * `overrides` - Model configuration keys to replace
///
/// # Returns
/// * `Ok(Component)` - Layout, ports and model of the cell
/// * `Err(PdkError)` - Unknown name, unreadable GDS file, or a port specification missing from the technology
pub fn component(
    library: &Library,
    name: &str,
    technology: Option<&Technology>,
    overrides: &ModelConfig,
) -> Result<Component, PdkError> {
    let entry = library
        .registry
        .get(name)
        .ok_or_else(|| ComponentError::NotFound(name.to_owned()))?;

    let default;
    let tech = match technology {
        Some(t) => t,
        None => {
            default = ebeam(&EbeamParams::default());
            &default
        }
    };

    if !tech.is_compatible() {
        warnln!(
            "Technology {} does not seem supported by the SiEPIC EBeam component library",
            tech.name
        );
    }

    let layout = load_cell(&library.gds_path(entry), name)?;
    let mut comp = Component::new(name, layout);

    let z = fiber_height(tech);
    for data in &entry.ports {
        comp.add_port(build_port(data, tech, z)?)?;
    }

    if let Some(config) = &entry.model {
        comp.model = Some(Model {
            name: MODEL_NAME.to_owned(),
            config: merge_config(config, overrides),
        });
    }

    Ok(comp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gds::tests::{boundary, cell, library};
    use crate::registry::ModelValue;
    use crate::technology::TechError;
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use std::fs;

    /// Write a GDS file per registry library with a placeholder cell per component.
    fn fake_library(root: &Path, registry: &Registry) {
        let mut files: IndexMap<PathBuf, Vec<String>> = IndexMap::new();
        let lib = Library::with_registry(root, registry.clone());
        for (name, entry) in registry.iter() {
            files
                .entry(lib.gds_path(entry))
                .or_default()
                .push(name.to_owned());
        }

        for (path, names) in files {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let structs = names
                .iter()
                .map(|n| cell(n, vec![boundary((1, 0), 0, -250, 1000, 250)]))
                .collect();
            library(structs).save(&path).unwrap();
        }
    }

    #[test]
    fn every_registered_component_assembles() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::new(dir.path());
        assert_eq!(lib.root(), dir.path());
        fake_library(dir.path(), lib.registry());

        let names = component_names();
        assert_eq!(names.len(), lib.registry().len());

        for name in &names {
            let comp = component(&lib, name, None, &ModelConfig::new()).unwrap();
            let entry = lib.registry().get(name).unwrap();
            assert_eq!(comp.ports.len(), entry.ports.len(), "{name}");
            assert_eq!(comp.model.is_some(), entry.model.is_some(), "{name}");
            assert_eq!(comp.layout.polygon_count(), 1);
        }
    }

    #[test]
    fn unknown_component_fails_before_loading() {
        let lib = Library::new("/nonexistent/library");
        let err = component(&lib, "ebeam_flux_capacitor", None, &ModelConfig::new()).unwrap_err();
        assert!(matches!(err, PdkError::Component(ComponentError::NotFound(_))));
    }

    #[test]
    fn missing_gds_file_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::new(dir.path());
        let err = component(&lib, "ebeam_y_1550", None, &ModelConfig::new()).unwrap_err();
        assert!(!matches!(err, PdkError::Component(_)));
    }

    #[test]
    fn fiber_ports_keep_registry_beam_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::new(dir.path());
        fake_library(dir.path(), lib.registry());

        let mut other = ebeam(&EbeamParams {
            si_thickness: 0.3,
            ..Default::default()
        });
        other.name = "Other foundry".to_owned();
        other.parametric_kwargs.insert("top_oxide_thickness".to_owned(), 2.0);

        for (name, entry) in lib.registry().iter() {
            let declared: Vec<&PortData> = entry
                .ports
                .iter()
                .filter(|p| matches!(p, PortData::Gaussian { .. }))
                .collect();
            if declared.is_empty() {
                continue;
            }

            for tech in [None, Some(&other)] {
                let comp = component(&lib, name, tech, &ModelConfig::new()).unwrap();
                let gaussian: Vec<&GaussianPort> = comp
                    .ports
                    .iter()
                    .filter_map(|p| match p {
                        Port::Gaussian(g) => Some(g),
                        Port::Waveguide(_) => None,
                    })
                    .collect();
                assert_eq!(gaussian.len(), declared.len());

                for (g, d) in gaussian.iter().zip(&declared) {
                    let PortData::Gaussian {
                        center,
                        waist_radius,
                        polarization_angle,
                        ..
                    } = d
                    else {
                        unreachable!()
                    };
                    assert_eq!(g.waist_radius, *waist_radius);
                    assert_eq!(g.polarization_angle, *polarization_angle);
                    assert_eq!((g.center[0], g.center[1]), *center);
                    let z = if tech.is_some() { 2.1 } else { 1.0 };
                    assert_relative_eq!(g.center[2], z);
                }
            }
        }
    }

    #[test]
    fn waveguide_ports_use_the_given_technology() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::new(dir.path());
        fake_library(dir.path(), lib.registry());

        let tech = ebeam(&EbeamParams {
            si_thickness: 0.3,
            ..Default::default()
        });
        let comp = component(&lib, "ebeam_crossing4", Some(&tech), &ModelConfig::new()).unwrap();
        let Port::Waveguide(p) = &comp.ports[2] else {
            panic!("expected a waveguide port");
        };
        assert_eq!(p.spec_name, "TE_1550_500");
        assert_eq!(p.direction, crate::port::Direction::North);
        assert_relative_eq!(p.spec.limits.1, 1.3);
    }

    #[test]
    fn technology_without_the_spec_fails() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::new(dir.path());
        fake_library(dir.path(), lib.registry());

        let mut tech = ebeam(&EbeamParams::default());
        tech.ports.shift_remove("TE_1550_500");
        let err = component(&lib, "ebeam_y_1550", Some(&tech), &ModelConfig::new()).unwrap_err();
        assert!(matches!(
            err,
            PdkError::Technology(TechError::PortSpecNotFound(_))
        ));
    }

    #[test]
    fn caller_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Library::new(dir.path());
        fake_library(dir.path(), lib.registry());

        let mut overrides = ModelConfig::new();
        overrides.insert("symmetry".to_owned(), ModelValue::Vector([0.0, 0.0, 0.0]));
        overrides.insert("run_time".to_owned(), ModelValue::Number(2e-12));

        let comp = component(&lib, "ebeam_gc_te1550", None, &overrides).unwrap();
        let model = comp.model.unwrap();
        assert_eq!(model.name, MODEL_NAME);
        assert_eq!(model.config["symmetry"], ModelValue::Vector([0.0, 0.0, 0.0]));
        assert!(model.config.contains_key("bounds"));
        assert_eq!(model.config["run_time"], ModelValue::Number(2e-12));

        // No model declared: overrides do not create one
        let pad = component(&lib, "ebeam_BondPad", None, &overrides).unwrap();
        assert!(pad.model.is_none());
        assert!(pad.ports.is_empty());
    }

    #[test]
    fn duplicate_waveguide_ports_are_rejected() {
        let mut comp = Component::new("dup", Layout::new("dup"));
        let tech = ebeam(&EbeamParams::default());
        let data = PortData::waveguide(0.0, 0.0, crate::port::Direction::East, "TE_1550_500");
        comp.add_port(build_port(&data, &tech, 1.0).unwrap()).unwrap();
        assert!(comp.add_port(build_port(&data, &tech, 1.0).unwrap()).is_err());
        assert_eq!(Component::port_name(1), "P1");
    }
}
