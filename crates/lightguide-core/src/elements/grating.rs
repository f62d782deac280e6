//! Diffraction gratings.
//!
//! A grating with reciprocal vectors $\mathbf{g}_1, \mathbf{g}_2$ shifts the
//! in-plane wavevector of a ray of vacuum wavelength $\lambda$ by
//!
//! $$ \Delta \mathbf{k}_\parallel = \lambda \, (m \mathbf{g}_1 + n \mathbf{g}_2) $$
//!
//! and resolves the normal component in the destination medium:
//!
//! $$ k_z^2 = n_{\text{out}}^2 - |\mathbf{k}_\parallel|^2 $$
//!
//! An order exists only when $k_z^2 > 0$. The destination medium is
//! `materials[1]` for forward-going output and `materials[0]` for
//! backward-going output.

use std::collections::BTreeMap;

use lightguide_materials::Material;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::elements::Interact;
use crate::types::{Direction, Precision, Ray, RayBatch};

#[derive(Debug, Error)]
pub enum GratingError {
    #[error("A grating needs one or two periods, got {0}")]
    PeriodCount(usize),

    #[error("Grating pitch must be positive, got {0}")]
    InvalidPitch(f64),
}

/// One periodic component: pitch (µm) and orientation of its grating vector
/// (degrees). Serialised as `[pitch, angle]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Period {
    pub pitch_um: f64,
    pub angle_deg: f64,
}

impl Period {
    pub fn new(pitch_um: f64, angle_deg: f64) -> Self {
        Self {
            pitch_um,
            angle_deg,
        }
    }

    /// `(cos φ, sin φ) / pitch`; zero for an infinite pitch.
    pub fn reciprocal(&self) -> [f64; 2] {
        let (s, c) = self.angle_deg.to_radians().sin_cos();
        [c / self.pitch_um, s / self.pitch_um]
    }
}

impl From<[f64; 2]> for Period {
    fn from(v: [f64; 2]) -> Self {
        Period::new(v[0], v[1])
    }
}

impl From<Period> for [f64; 2] {
    fn from(p: Period) -> Self {
        [p.pitch_um, p.angle_deg]
    }
}

/// An allowed diffraction order: outgoing direction and integer indices
/// along `g1` and `g2`. Serialised as `[sign, m, n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i32; 3]", into = "[i32; 3]")]
pub struct DiffractionOrder {
    pub outgoing: Direction,
    pub m: i32,
    pub n: i32,
}

impl DiffractionOrder {
    pub fn new(outgoing: Direction, m: i32, n: i32) -> Self {
        Self { outgoing, m, n }
    }
}

impl TryFrom<[i32; 3]> for DiffractionOrder {
    type Error = String;

    fn try_from(v: [i32; 3]) -> Result<Self, Self::Error> {
        Ok(Self::new(Direction::try_from(v[0])?, v[1], v[2]))
    }
}

impl From<DiffractionOrder> for [i32; 3] {
    fn from(o: DiffractionOrder) -> Self {
        [o.outgoing.into(), o.m, o.n]
    }
}

/// Allowed orders keyed by the incoming propagation direction.
///
/// Serialised as a map with keys `"1"` and `"-1"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<DiffractionOrder>>",
    into = "BTreeMap<String, Vec<DiffractionOrder>>"
)]
pub struct OrderTable(BTreeMap<Direction, Vec<DiffractionOrder>>);

impl OrderTable {
    pub fn empty() -> Self {
        OrderTable(BTreeMap::new())
    }

    /// Set the allowed orders for one incoming direction.
    pub fn with(mut self, incoming: Direction, orders: Vec<DiffractionOrder>) -> Self {
        self.0.insert(incoming, orders);
        self
    }

    pub fn get(&self, incoming: Direction) -> &[DiffractionOrder] {
        self.0.get(&incoming).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Direction, &DiffractionOrder)> {
        self.0
            .iter()
            .flat_map(|(d, orders)| orders.iter().map(move |o| (*d, o)))
    }

    /// Distinct `(m, n)` pairs across all entries.
    pub fn unique_mn(&self) -> Vec<[i32; 2]> {
        let mut mn: Vec<[i32; 2]> = self.iter().map(|(_, o)| [o.m, o.n]).collect();
        mn.sort_unstable();
        mn.dedup();
        mn
    }
}

impl Default for OrderTable {
    /// Both incoming directions; reflection and transmission; `m ∈ {−1, 0, 1}`, `n = 0`.
    fn default() -> Self {
        let orders: Vec<DiffractionOrder> = [Direction::Forward, Direction::Backward]
            .into_iter()
            .flat_map(|d| (-1..=1).map(move |m| DiffractionOrder::new(d, m, 0)))
            .collect();
        OrderTable::empty()
            .with(Direction::Forward, orders.clone())
            .with(Direction::Backward, orders)
    }
}

impl TryFrom<BTreeMap<String, Vec<DiffractionOrder>>> for OrderTable {
    type Error = String;

    fn try_from(map: BTreeMap<String, Vec<DiffractionOrder>>) -> Result<Self, Self::Error> {
        let mut table = OrderTable::empty();
        for (key, orders) in map {
            let sign: i32 = key
                .trim()
                .trim_start_matches('+')
                .parse()
                .map_err(|_| format!("order table key must be 1 or -1, got {key:?}"))?;
            table = table.with(Direction::try_from(sign)?, orders);
        }
        Ok(table)
    }
}

impl From<OrderTable> for BTreeMap<String, Vec<DiffractionOrder>> {
    fn from(t: OrderTable) -> Self {
        t.0.into_iter()
            .map(|(d, orders)| (i32::from(d).to_string(), orders))
            .collect()
    }
}

/// How a grating treats transmitted orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GratingMode {
    /// Every allowed order that exists is produced.
    #[default]
    All,
    /// Transmitted orders are produced only for rays whose reflected
    /// counterpart cannot propagate back into the medium they came from.
    #[serde(rename = "T&TIR", alias = "t_tir")]
    TransmitOnTir,
}

/// A one- or two-dimensional diffraction grating between two media.
#[derive(Debug, Clone)]
pub struct Grating {
    name: String,
    periods: [Period; 2],
    reciprocal: [[f64; 2]; 2],
    materials: [Material; 2],
    orders: OrderTable,
    mode: GratingMode,
}

impl Grating {
    /// Build a grating. `materials` is `[backward side, forward side]`.
    pub fn new(
        name: impl Into<String>,
        periods: &[Period],
        materials: [Material; 2],
    ) -> Result<Self, GratingError> {
        let periods = complete_periods(periods)?;
        Ok(Self {
            name: name.into(),
            reciprocal: [periods[0].reciprocal(), periods[1].reciprocal()],
            periods,
            materials,
            orders: OrderTable::default(),
            mode: GratingMode::All,
        })
    }

    pub fn with_orders(mut self, orders: OrderTable) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_mode(mut self, mode: GratingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Both periods; a one-dimensional grating reports an infinite second pitch.
    pub fn periods(&self) -> &[Period; 2] {
        &self.periods
    }

    /// Replace the periods. On error the grating is left unchanged.
    pub fn set_periods(&mut self, periods: &[Period]) -> Result<(), GratingError> {
        let periods = complete_periods(periods)?;
        self.reciprocal = [periods[0].reciprocal(), periods[1].reciprocal()];
        self.periods = periods;
        Ok(())
    }

    pub fn reciprocal(&self) -> &[[f64; 2]; 2] {
        &self.reciprocal
    }

    pub fn materials(&self) -> &[Material; 2] {
        &self.materials
    }

    pub fn orders(&self) -> &OrderTable {
        &self.orders
    }

    pub fn set_orders(&mut self, orders: OrderTable) {
        self.orders = orders;
    }

    pub fn mode(&self) -> GratingMode {
        self.mode
    }

    /// `m·g1 + n·g2` (µm⁻¹).
    pub fn order_vector(&self, m: i32, n: i32) -> [f64; 2] {
        let [g1, g2] = self.reciprocal;
        let (m, n) = (f64::from(m), f64::from(n));
        [m * g1[0] + n * g2[0], m * g1[1] + n * g2[1]]
    }

    /// Medium on the side a ray going in `direction` ends up in.
    pub fn medium(&self, direction: Direction) -> &Material {
        match direction {
            Direction::Forward => &self.materials[1],
            Direction::Backward => &self.materials[0],
        }
    }

    /// Shift `k` by one explicit order and resolve `kz` in `medium`.
    ///
    /// `k` has one row per sample, `[wavelength, kx, ky, kz]`. Rows whose
    /// `kz` is already NaN keep it; rows with `kz² ≤ 0` become NaN. No mode
    /// or direction logic is applied: the result is always forward-going.
    pub fn propagate_order(
        &self,
        k: ArrayView2<'_, f64>,
        order: [i32; 2],
        medium: &Material,
    ) -> Array2<f64> {
        let g = self.order_vector(order[0], order[1]);
        let mut out = k.to_owned();
        for mut row in out.rows_mut() {
            let w = row[0];
            row[1] += w * g[0];
            row[2] += w * g[1];
            if row[3].is_nan() {
                continue;
            }
            let n = medium.index(w);
            let kz_sq = n * n - row[1] * row[1] - row[2] * row[2];
            row[3] = if kz_sq > 0.0 { kz_sq.sqrt() } else { f64::NAN };
        }
        out
    }

    fn diffract(&self, ray: &Ray, order: &DiffractionOrder) -> Option<Ray> {
        let w = ray.wavelength;
        let g = self.order_vector(order.m, order.n);
        let kx = ray.k[0] + w * g[0];
        let ky = ray.k[1] + w * g[1];
        let kxy_sq = kx * kx + ky * ky;

        let n_out = self.medium(order.outgoing).index(w);
        let kz_sq = n_out * n_out - kxy_sq;
        if !(kz_sq > 0.0) {
            return None;
        }

        let incoming = ray.direction();
        if self.mode == GratingMode::TransmitOnTir && order.outgoing == incoming {
            let n_origin = self.medium(incoming.flipped()).index(w);
            if n_origin * n_origin - kxy_sq > 0.0 {
                return None;
            }
        }

        Some(Ray {
            k: [kx, ky, order.outgoing.sign() * kz_sq.sqrt()],
            ..*ray
        })
    }
}

fn complete_periods(periods: &[Period]) -> Result<[Period; 2], GratingError> {
    let periods = match periods {
        [p] => [*p, Period::new(f64::INFINITY, 0.0)],
        [p, q] => [*p, *q],
        other => return Err(GratingError::PeriodCount(other.len())),
    };
    for p in &periods {
        if !(p.pitch_um > 0.0) {
            return Err(GratingError::InvalidPitch(p.pitch_um));
        }
    }
    Ok(periods)
}

impl Interact for Grating {
    fn interact(&mut self, incoming: RayBatch, precision: &Precision) -> RayBatch {
        let mut out = RayBatch::new();
        for ray in incoming.iter() {
            let orders = self.orders.get(ray.direction());
            out.extend(orders.iter().filter_map(|o| self.diffract(ray, o)));
        }
        out.round_dedup(precision);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn glass(n: f64) -> Material {
        Material::new(format!("n{n}"), [n * n - 1.0, 0.0, 0.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn test_single_period_gets_infinite_second() {
        let g = Grating::new("G", &[Period::new(0.4, 0.0)], [Material::air(), glass(1.5)]).unwrap();
        assert!(g.periods()[1].pitch_um.is_infinite());
        assert_relative_eq!(g.reciprocal()[0][0], 2.5);
        assert_eq!(g.reciprocal()[1], [0.0, 0.0]);
    }

    #[test]
    fn test_invalid_periods_rejected() {
        let mats = [Material::air(), glass(1.5)];
        assert!(matches!(
            Grating::new("G", &[], mats.clone()),
            Err(GratingError::PeriodCount(0))
        ));
        assert!(matches!(
            Grating::new("G", &[Period::new(0.0, 0.0)], mats.clone()),
            Err(GratingError::InvalidPitch(_))
        ));
        let mut g = Grating::new("G", &[Period::new(0.4, 0.0)], mats).unwrap();
        assert!(g.set_periods(&[Period::new(-1.0, 0.0)]).is_err());
        assert_relative_eq!(g.periods()[0].pitch_um, 0.4);
    }

    #[test]
    fn test_default_order_table() {
        let t = OrderTable::default();
        assert_eq!(t.get(Direction::Forward).len(), 6);
        assert_eq!(t.get(Direction::Backward).len(), 6);
        assert_eq!(t.unique_mn(), vec![[-1, 0], [0, 0], [1, 0]]);
    }

    #[test]
    fn test_order_table_serde_keys() {
        let t = OrderTable::empty().with(
            Direction::Forward,
            vec![DiffractionOrder::new(Direction::Backward, 1, 0)],
        );
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"{"1":[[-1,1,0]]}"#);
        let back: OrderTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
        assert!(serde_json::from_str::<OrderTable>(r#"{"2":[]}"#).is_err());
    }

    #[test]
    fn test_propagate_order_marks_evanescent() {
        let g = Grating::new("G", &[Period::new(0.35, 0.0)], [Material::air(), glass(1.5)]).unwrap();
        let k = array![[0.525, 0.0, 0.0, 1.0], [0.525, 0.2, 0.0, f64::NAN]];
        let out = g.propagate_order(k.view(), [1, 0], &glass(1.6));
        assert_relative_eq!(out[[0, 1]], 1.5, epsilon = 1e-12);
        assert_relative_eq!(out[[0, 3]], (1.6f64 * 1.6 - 2.25).sqrt(), epsilon = 1e-12);
        // NaN input stays NaN even though the shifted k∥ would propagate
        assert!(out[[1, 3]].is_nan());
        let out = g.propagate_order(k.view(), [1, 0], &glass(1.4));
        assert!(out[[0, 3]].is_nan());
    }

    #[test]
    fn test_zero_order_transmission_keeps_k_parallel() {
        let mut g = Grating::new("G", &[Period::new(0.4, 30.0)], [Material::air(), glass(1.5)])
            .unwrap()
            .with_orders(OrderTable::empty().with(
                Direction::Forward,
                vec![DiffractionOrder::new(Direction::Forward, 0, 0)],
            ));
        let ray = Ray::new(0.525, [0.3, 0.1, (1.0f64 - 0.1).sqrt()], [1.0, 2.0, 0.0]);
        let out = g.interact(RayBatch::from(vec![ray]), &Precision::default()).into_vec();
        assert_eq!(out.len(), 1);
        assert_relative_eq!(out[0].k[0], 0.3);
        assert_relative_eq!(out[0].k[2], (2.25f64 - 0.1).sqrt(), epsilon = 1e-6);
        assert_eq!(out[0].position, [1.0, 2.0, 0.0]);
    }
}
