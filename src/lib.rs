//! SiEPIC EBeam process-development-kit adapter.
//!
//! Loads the EBeam GDSII cell library, resolves photonic ports on each cell and
//! builds the technology (layer, port and extrusion tables) a photonic
//! simulation framework consumes. The offline converters that generate the
//! static tables from KLayout layer properties, waveguide definitions and GDS
//! libraries live here as well.

pub mod component;
pub mod config;
pub mod converter;
pub mod export;
pub mod gds;
pub mod layer;
pub mod lyp;
pub mod matcher;
pub mod port;
pub mod registry;
pub mod technology;
pub mod ui;
pub mod waveguide;

use dialoguer::Confirm;
use thiserror::Error;

pub use component::{component, component_names, Component, Library};
pub use technology::{ebeam, EbeamParams, Technology};

pub type Float = f64;

/// Layer number and datatype pair, as stored in GDSII.
pub type LayerId = (u16, u16);

pub const VER: &str = env!("CARGO_PKG_VERSION");

#[macro_export]
macro_rules! errorln {
    ($literal:literal $(, $args:expr)* $(,)?) => {
        eprintln!(
            concat!("\x1b[31mERROR: ", $literal, "\x1b[0m")
            $(, $args)*
        )
    };
}

#[macro_export]
macro_rules! warnln {
    ($literal:literal $(, $args:expr)* $(,)?) => {
        eprintln!(
            concat!("\x1b[33mWARNING: ", $literal, "\x1b[0m")
            $(, $args)*
        )
    };
}

#[macro_export]
macro_rules! infoln {
    ($literal:literal $(, $args:expr)* $(,)?) => {
        eprintln!(
            concat!("\x1b[32mINFO: ", $literal, "\x1b[0m")
            $(, $args)*
        )
    };
}

#[macro_export]
macro_rules! vprintln {
    ($verbose:expr, $literal:literal $(, $args:expr)* $(,)?) => {
        if $verbose {
            eprintln!($literal $(, $args)*)
        }
    };
}

/// Top-level error for every fallible operation in the crate.
#[derive(Debug, Error)]
pub enum PdkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GDS error: {0}")]
    GdsFile(#[from] gds21::GdsError),
    #[error(transparent)]
    Gds(#[from] gds::GdsError),
    #[error("XML error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error(transparent)]
    Layer(#[from] layer::LayerError),
    #[error(transparent)]
    Lyp(#[from] lyp::LypError),
    #[error(transparent)]
    Waveguide(#[from] waveguide::WaveguideError),
    #[error(transparent)]
    Component(#[from] component::ComponentError),
    #[error(transparent)]
    Technology(#[from] technology::TechError),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryDefault {
    Yes,
    No,
}

/// Ask a yes/no question on the terminal.
///
/// When `interactive` is false the default answer is returned without prompting.
pub fn query(message: &str, interactive: bool, default: QueryDefault) -> Result<bool, PdkError> {
    let default = default == QueryDefault::Yes;
    if !interactive {
        return Ok(default);
    }

    Ok(Confirm::new()
        .with_prompt(message)
        .default(default)
        .interact()?)
}

/// Horizontal separator spanning the terminal (or `width` columns).
pub fn bar(width: Option<usize>, ch: char) -> String {
    let width = width.unwrap_or_else(|| match terminal_size::terminal_size() {
        Some((terminal_size::Width(w), _)) => w as usize,
        None => 80,
    });

    std::iter::repeat(ch).take(width).collect()
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: Float, decimals: i32) -> Float {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Element-wise closeness with the same semantics as numpy's `allclose`.
pub fn allclose(a: &[Float], b: &[Float]) -> bool {
    const RTOL: Float = 1e-5;
    const ATOL: Float = 1e-8;

    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= ATOL + RTOL * y.abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_keeps_three_decimals() {
        assert_eq!(round_to(12.879_6, 3), 12.88);
        assert_eq!(round_to(-0.975_04, 3), -0.975);
    }

    #[test]
    fn allclose_uses_relative_and_absolute_tolerance() {
        assert!(allclose(&[1.0, 2.0], &[1.0 + 1e-9, 2.0]));
        assert!(!allclose(&[1.0, 2.0], &[1.001, 2.0]));
        assert!(!allclose(&[1.0], &[1.0, 2.0]));
    }

    #[test]
    fn bar_with_explicit_width() {
        assert_eq!(bar(Some(4), '-'), "----");
    }
}
