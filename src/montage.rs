//! Built-in standard 10-20 montage.
//!
//! Positions are generated from BESA spherical coordinates `(θ, φ)` in
//! degrees: θ is the signed polar angle from Cz (negative = left hemisphere),
//! φ the azimuth from the interaural axis. The head frame is RAS
//! (x → right, y → nasion, z → vertex), scaled to [`HEAD_RADIUS`].
use crate::raw::Info;

/// Head radius in metres (MNE's default sphere).
pub const HEAD_RADIUS: f64 = 0.095;

const STANDARD_1020: &[(&str, f64, f64)] = &[
    ("Fp1", -92.0, -72.0),
    ("Fpz", 92.0, 90.0),
    ("Fp2", 92.0, 72.0),
    ("F7", -92.0, -36.0),
    ("F3", -60.0, -51.0),
    ("Fz", 46.0, 90.0),
    ("F4", 60.0, 51.0),
    ("F8", 92.0, 36.0),
    ("T7", -92.0, 0.0),
    ("C3", -46.0, 0.0),
    ("Cz", 0.0, 0.0),
    ("C4", 46.0, 0.0),
    ("T8", 92.0, 0.0),
    ("P7", -92.0, 36.0),
    ("P3", -60.0, 51.0),
    ("Pz", 46.0, -90.0),
    ("P4", 60.0, -51.0),
    ("P8", 92.0, -36.0),
    ("O1", -92.0, 72.0),
    ("Oz", 92.0, -90.0),
    ("O2", 92.0, -72.0),
    ("A1", -120.0, 0.0),
    ("A2", 120.0, 0.0),
];

/// Old 10-20 names and their modern equivalents.
const ALIASES: &[(&str, &str)] = &[("T3", "T7"), ("T4", "T8"), ("T5", "P7"), ("T6", "P8")];

fn spherical_to_cartesian(theta_deg: f64, phi_deg: f64) -> [f64; 3] {
    let (theta, phi) = (theta_deg.to_radians(), phi_deg.to_radians());
    [
        HEAD_RADIUS * theta.sin() * phi.cos(),
        HEAD_RADIUS * theta.sin() * phi.sin(),
        HEAD_RADIUS * theta.cos(),
    ]
}

/// Position of electrode `name` in metres (case-insensitive), if it is part
/// of the montage.
pub fn position(name: &str) -> Option<[f64; 3]> {
    let canonical = ALIASES
        .iter()
        .find(|(old, _)| old.eq_ignore_ascii_case(name))
        .map(|(_, new)| *new)
        .unwrap_or(name);
    STANDARD_1020
        .iter()
        .find(|(n, _, _)| n.eq_ignore_ascii_case(canonical))
        .map(|&(_, th, ph)| spherical_to_cartesian(th, ph))
}

/// Set positions of all channels found in the montage; others are left
/// untouched. Returns the number of channels positioned.
pub fn set_montage(info: &mut Info) -> usize {
    let mut n = 0;
    for ch in &mut info.channels {
        if let Some(p) = position(&ch.name) {
            ch.pos = Some(p);
            n += 1;
        }
    }
    n
}
