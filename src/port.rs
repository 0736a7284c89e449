//! Port specifications and resolved ports.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gds::Point;
use crate::layer::{SIN_LAYER, SI_LAYER, SI_SLAB_LAYER};
use crate::{Float, LayerId};

/// One strip of a waveguide cross-section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathProfile {
    pub width: Float,
    /// Transverse offset from the port center.
    pub offset: Float,
    pub layer: LayerId,
}

impl PathProfile {
    pub fn new(width: Float, offset: Float, layer: LayerId) -> PathProfile {
        PathProfile {
            width,
            offset,
            layer,
        }
    }
}

/// Mode-port cross-section: size of the mode plane, mode count and the
/// waveguide profile expected at the port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub description: String,
    pub width: Float,
    /// Vertical extent of the mode plane.
    pub limits: (Float, Float),
    pub num_modes: u32,
    pub target_neff: Float,
    pub path_profiles: Vec<PathProfile>,
}

/// Input direction of a waveguide port, in degrees counter-clockwise from +x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum Direction {
    East,
    North,
    West,
    South,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::North,
        Direction::West,
        Direction::South,
    ];

    pub fn degrees(&self) -> u16 {
        match self {
            Direction::East => 0,
            Direction::North => 90,
            Direction::West => 180,
            Direction::South => 270,
        }
    }

    pub fn from_degrees(angle: i64) -> Option<Direction> {
        match angle.rem_euclid(360) {
            0 => Some(Direction::East),
            90 => Some(Direction::North),
            180 => Some(Direction::West),
            270 => Some(Direction::South),
            _ => None,
        }
    }

    /// Unit vector along the direction.
    pub fn unit(&self) -> Point {
        match self {
            Direction::East => Point::new(1.0, 0.0),
            Direction::North => Point::new(0.0, 1.0),
            Direction::West => Point::new(-1.0, 0.0),
            Direction::South => Point::new(0.0, -1.0),
        }
    }

    /// Unit vector 90° counter-clockwise; positive profile offsets point this way.
    pub fn transverse(&self) -> Point {
        let u = self.unit();
        Point::new(-u.y, u.x)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

impl From<Direction> for u16 {
    fn from(d: Direction) -> u16 {
        d.degrees()
    }
}

impl TryFrom<u16> for Direction {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Direction::from_degrees(value as i64)
            .ok_or_else(|| format!("{value} is not a multiple of 90 degrees"))
    }
}

/// Waveguide mode port attached to a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveguidePort {
    pub center: Point,
    pub direction: Direction,
    pub spec_name: String,
    pub spec: PortSpec,
}

/// Free-space Gaussian beam port, used for fiber coupling on grating couplers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianPort {
    pub center: [Float; 3],
    /// Unit propagation vector of the incoming beam.
    pub direction: [Float; 3],
    pub waist_radius: Float,
    /// Polarization angle in degrees.
    pub polarization_angle: Float,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Port {
    Waveguide(WaveguidePort),
    Gaussian(GaussianPort),
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Port::Waveguide(p) => write!(
                f,
                "{} at ({}, {}) facing {}°",
                p.spec_name, p.center.x, p.center.y, p.direction
            ),
            Port::Gaussian(p) => write!(
                f,
                "Gaussian at ({}, {}, {}) waist {} pol {}°",
                p.center[0], p.center[1], p.center[2], p.waist_radius, p.polarization_angle
            ),
        }
    }
}

fn strip(
    description: &str,
    width: Float,
    limits: (Float, Float),
    num_modes: u32,
    target_neff: Float,
    path_profiles: &[(Float, Float, LayerId)],
) -> PortSpec {
    PortSpec {
        description: description.to_owned(),
        width,
        limits,
        num_modes,
        target_neff,
        path_profiles: path_profiles
            .iter()
            .map(|&(w, o, l)| PathProfile::new(w, o, l))
            .collect(),
    }
}

/// Port specifications for the EBeam technology.
///
/// Vertical limits follow the core thickness of the silicon and nitride
/// layers, so they are rebuilt whenever those change.
pub fn ebeam_ports(si_thickness: Float, sin_thickness: Float) -> IndexMap<String, PortSpec> {
    let si = SI_LAYER;
    let slab = SI_SLAB_LAYER;
    let sin = SIN_LAYER;
    let si_limits = (-1.0, 1.0 + si_thickness);

    let mut eskid = vec![(0.35, 0.0, si)];
    for offset in [0.265, 0.385, 0.505, 0.625] {
        eskid.push((0.06, offset, si));
        eskid.push((0.06, -offset, si));
    }

    let table = [
        ("TE_1550_500", strip("Strip TE 1550 nm, w=500 nm", 2.0, si_limits, 1, 3.5, &[(0.5, 0.0, si)])),
        ("TE_1310_410", strip("Strip TE 1310 nm, w=410 nm", 2.0, si_limits, 1, 3.5, &[(0.41, 0.0, si)])),
        ("TE_1310_350", strip("Strip TE 1310 nm, w=350 nm", 2.0, si_limits, 1, 3.5, &[(0.35, 0.0, si)])),
        ("TM_1550_500", strip("Strip TM 1550 nm, w=500 nm", 2.5, si_limits, 2, 3.5, &[(0.5, 0.0, si)])),
        ("TE-TM_1550_450", strip("Strip TE-TM 1550, w=450 nm", 2.0, si_limits, 2, 3.5, &[(0.45, 0.0, si)])),
        (
            "MM_TE_1550_2000",
            strip("Multimode Strip TE 1550 nm, w=2000 nm", 6.0, (-2.0, 2.0 + si_thickness), 10, 3.5, &[(2.0, 0.0, si)]),
        ),
        (
            "MM_TE_1550_3000",
            strip("Multimode Strip TE 1550 nm, w=3000 nm", 6.0, (-2.0, 2.0 + si_thickness), 14, 3.5, &[(3.0, 0.0, si)]),
        ),
        (
            "Slot_TE_1550_500",
            strip("Slot TE 1550 nm, w=500 nm, gap=100nm", 2.0, si_limits, 1, 3.5, &[(0.2, -0.15, si), (0.2, 0.15, si)]),
        ),
        ("eskid_TE_1550", strip("eskid TE 1550", 3.31, si_limits, 1, 3.5, &eskid)),
        (
            "Rib_TE_1550_500",
            strip("Rib (90 nm slab) TE 1550 nm, w=500 nm", 2.5, si_limits, 1, 3.5, &[(0.5, 0.0, si), (3.0, 0.0, slab)]),
        ),
        (
            "Rib_TE_1310_350",
            strip("Rib (90 nm slab) TE 1310 nm, w=350 nm", 2.35, si_limits, 1, 3.5, &[(0.35, 0.0, si), (3.0, 0.0, slab)]),
        ),
        (
            "SiN_TE_895_450",
            strip("SiN Strip TE 895 nm, w=450 nm", 4.0, (-2.0, 2.0 + sin_thickness), 2, 2.1, &[(0.45, 0.0, sin)]),
        ),
        (
            "SiN_TE_1550_750",
            strip("SiN Strip TE 1550 nm, w=750 nm", 3.0, (-1.0, 1.0 + sin_thickness), 1, 2.1, &[(0.75, 0.0, sin)]),
        ),
        (
            "SiN_TE_1550_800",
            strip("SiN Strip TE 1550 nm, w=800 nm", 3.0, (-1.0, 1.0 + sin_thickness), 1, 2.1, &[(0.8, 0.0, sin)]),
        ),
        (
            "SiN_TE_1550_1000",
            strip("SiN Strip TE 1550 nm, w=1000 nm", 3.0, (-1.0, 1.0 + sin_thickness), 1, 2.1, &[(1.0, 0.0, sin)]),
        ),
        (
            "SiN_TM_1550_1000",
            strip("SiN Strip TM 1550 nm, w=1000 nm", 3.0, (-1.5, 1.5 + sin_thickness), 2, 2.1, &[(1.0, 0.0, sin)]),
        ),
        (
            "SiN_TE_1310_750",
            strip("SiN Strip TE 1310 nm, w=750 nm", 3.0, (-1.0, 1.0 + sin_thickness), 1, 2.1, &[(0.75, 0.0, sin)]),
        ),
        (
            "SiN_TM_1310_750",
            strip("SiN Strip TM 1310 nm, w=750 nm", 3.0, (-1.5, 1.5 + sin_thickness), 2, 2.1, &[(0.75, 0.0, sin)]),
        ),
        (
            "MM_SiN_TE_1550_3000",
            strip("Multimode SiN Strip TE 1550 nm, w=3000 nm", 8.0, (-2.5, 2.5 + sin_thickness), 6, 2.1, &[(3.0, 0.0, sin)]),
        ),
    ];

    table
        .into_iter()
        .map(|(name, spec)| (name.to_owned(), spec))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn port_table_tracks_thickness() {
        let ports = ebeam_ports(0.22, 0.4);
        assert_eq!(ports.len(), 19);
        assert_relative_eq!(ports["TE_1550_500"].limits.1, 1.22);
        assert_relative_eq!(ports["SiN_TE_895_450"].limits.1, 2.4);

        let thick = ebeam_ports(0.3, 0.5);
        assert_relative_eq!(thick["TM_1550_500"].limits.1, 1.3);
        assert_relative_eq!(thick["MM_SiN_TE_1550_3000"].limits.1, 3.0);
    }

    #[test]
    fn eskid_profile_is_symmetric() {
        let ports = ebeam_ports(0.22, 0.4);
        let profiles = &ports["eskid_TE_1550"].path_profiles;
        assert_eq!(profiles.len(), 9);
        let sum: Float = profiles.iter().map(|p| p.offset).sum();
        assert_relative_eq!(sum, 0.0);
    }

    #[test]
    fn directions_round_trip_through_degrees() {
        for d in Direction::ALL {
            assert_eq!(Direction::from_degrees(d.degrees() as i64), Some(d));
        }
        assert_eq!(Direction::from_degrees(-90), Some(Direction::South));
        assert_eq!(Direction::from_degrees(45), None);
        assert_eq!(serde_json::to_string(&Direction::West).unwrap(), "180");
    }

    #[test]
    fn transverse_is_counter_clockwise() {
        assert_eq!(Direction::East.transverse(), Point::new(0.0, 1.0));
        assert_eq!(Direction::North.transverse(), Point::new(-1.0, 0.0));
    }
}
