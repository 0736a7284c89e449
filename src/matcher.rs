//! Matching pins on a cell layout against the technology's port specifications.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::gds::{Layout, Point};
use crate::port::{Direction, PortSpec};
use crate::{allclose, warnln, Float};

/// Half-size of the square search window around each pin.
pub const PIN_WINDOW: Float = 0.005;

/// A port specification detected at a pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortCandidate {
    pub pin: Point,
    pub direction: Direction,
    pub spec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinResolution {
    Resolved(PortCandidate),
    /// No specification produces a port at the pin.
    Missing(Point),
    /// More than one specification matches; the caller picks.
    Ambiguous(Point, Vec<PortCandidate>),
}

impl PinResolution {
    pub fn pin(&self) -> Point {
        match self {
            PinResolution::Resolved(c) => c.pin,
            PinResolution::Missing(p) | PinResolution::Ambiguous(p, _) => *p,
        }
    }

    /// Every candidate, in specification order.
    pub fn candidates(&self) -> &[PortCandidate] {
        match self {
            PinResolution::Resolved(c) => std::slice::from_ref(c),
            PinResolution::Missing(_) => &[],
            PinResolution::Ambiguous(_, cs) => cs,
        }
    }
}

/// Candidates for a single pin, in specification order.
pub fn candidates(pin: Point, specs: &IndexMap<String, PortSpec>, layout: &Layout) -> Vec<PortCandidate> {
    let window = (
        Point::new(pin.x - PIN_WINDOW, pin.y - PIN_WINDOW),
        Point::new(pin.x + PIN_WINDOW, pin.y + PIN_WINDOW),
    );

    specs
        .iter()
        .flat_map(|(name, spec)| {
            layout
                .detect_ports(spec, window)
                .into_iter()
                .filter(|port| allclose(&[port.center.x, port.center.y], &[pin.x, pin.y]))
                .map(move |port| PortCandidate {
                    pin,
                    direction: port.direction,
                    spec: name.clone(),
                })
        })
        .collect()
}

/// Resolves one pin against every port specification.
///
/// Missing and ambiguous pins are reported as warnings.
///
/// # Arguments
/// * `pin` - Pin center, in micrometers
/// * `specs` - Port specifications to try, in order
/// * `layout` - Flattened cell the pin belongs to
///
/// # Returns
/// * `PinResolution::Resolved` - Exactly one specification produces a port at the pin
/// * `PinResolution::Missing` - None does
/// * `PinResolution::Ambiguous` - Several do; all are kept, in specification order
pub fn resolve_pin(pin: Point, specs: &IndexMap<String, PortSpec>, layout: &Layout) -> PinResolution {
    let mut found = candidates(pin, specs, layout);

    match found.len() {
        0 => {
            warnln!("Missing port ({}, {}) in {}", pin.x, pin.y, layout.name);
            PinResolution::Missing(pin)
        }
        1 => PinResolution::Resolved(found.remove(0)),
        _ => {
            let names: Vec<&str> = found.iter().map(|c| c.spec.as_str()).collect();
            warnln!(
                "Ambiguous port ({}, {}) in {}: {}",
                pin.x,
                pin.y,
                layout.name,
                names.join(", ")
            );
            PinResolution::Ambiguous(pin, found)
        }
    }
}

/// Resolve every pin of a layout, one result per pin in input order.
pub fn resolve_ports(pins: &[Point], specs: &IndexMap<String, PortSpec>, layout: &Layout) -> Vec<PinResolution> {
    pins.iter()
        .map(|pin| resolve_pin(*pin, specs, layout))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gds::Polygon;
    use crate::port::{ebeam_ports, PathProfile};

    fn y_branch() -> Layout {
        let mut layout = Layout::new("ybranch");
        // Input arm and two output arms
        layout.add((1, 0), Polygon::rect(Point::new(-7.4, -0.25), Point::new(0.0, 0.25)));
        layout.add((1, 0), Polygon::rect(Point::new(0.0, 2.5), Point::new(7.4, 3.0)));
        layout.add((1, 0), Polygon::rect(Point::new(0.0, -3.0), Point::new(7.4, -2.5)));
        layout
    }

    #[test]
    fn resolves_each_pin_with_its_direction() {
        let specs: IndexMap<String, PortSpec> = ebeam_ports(0.22, 0.4)
            .into_iter()
            .filter(|(name, _)| name == "TE_1550_500" || name == "SiN_TE_1550_750")
            .collect();
        let pins = [
            Point::new(-7.4, 0.0),
            Point::new(7.4, -2.75),
            Point::new(7.4, 2.75),
        ];
        let resolved = resolve_ports(&pins, &specs, &y_branch());

        let expected = [Direction::East, Direction::West, Direction::West];
        for (r, dir) in resolved.iter().zip(expected) {
            match r {
                PinResolution::Resolved(c) => {
                    assert_eq!(c.spec, "TE_1550_500");
                    assert_eq!(c.direction, dir);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn pin_without_geometry_is_missing() {
        let specs = ebeam_ports(0.22, 0.4);
        let r = resolve_pin(Point::new(-6.0, 0.0), &specs, &y_branch());
        assert_eq!(r, PinResolution::Missing(Point::new(-6.0, 0.0)));
        assert!(r.candidates().is_empty());
    }

    #[test]
    fn identical_profiles_are_reported_as_ambiguous() {
        // TE and TM strips at 500 nm share the same cross-section.
        let specs = ebeam_ports(0.22, 0.4);
        let pin = Point::new(-7.4, 0.0);
        let r = resolve_pin(pin, &specs, &y_branch());
        assert_eq!(r.pin(), pin);
        match r {
            PinResolution::Ambiguous(_, cs) => {
                let names: Vec<&str> = cs.iter().map(|c| c.spec.as_str()).collect();
                assert_eq!(names, ["TE_1550_500", "TM_1550_500"]);
                assert!(cs.iter().all(|c| c.direction == Direction::East));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn detections_off_the_pin_are_rejected() {
        let mut specs = IndexMap::new();
        specs.insert(
            "narrow".to_owned(),
            PortSpec {
                description: "narrow".into(),
                width: 1.0,
                limits: (-1.0, 1.0),
                num_modes: 1,
                target_neff: 3.5,
                path_profiles: vec![PathProfile::new(0.5, 0.0, (1, 0))],
            },
        );
        // Port center lands 3 nm from the pin: inside the window, not on the pin.
        let r = resolve_pin(Point::new(-7.403, 0.0), &specs, &y_branch());
        assert!(matches!(r, PinResolution::Missing(_)));
    }
}
