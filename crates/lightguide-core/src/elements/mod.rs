//! Optical elements.
//!
//! Every element turns a batch of incoming rays into a batch of outgoing
//! rays through [`Interact`]. The scene stores elements as the closed
//! [`OpticalElement`] enum so that per-path snapshots can be cloned and
//! sent across threads.

pub mod filter;
pub mod grating;
pub mod receiver;
pub mod refractive;

pub use filter::SpectralFilter;
pub use grating::{DiffractionOrder, Grating, GratingError, GratingMode, OrderTable, Period};
pub use receiver::Receiver;
pub use refractive::{FresnelCoefficients, RefractiveInterface};

use serde::{Deserialize, Serialize};

use crate::types::{Precision, RayBatch};

/// Capability shared by all optical elements.
pub trait Interact {
    /// Transform incoming rays into outgoing rays.
    ///
    /// Output positions equal input positions; the caller decides where the
    /// outgoing segments start.
    fn interact(&mut self, incoming: RayBatch, precision: &Precision) -> RayBatch;
}

/// Discriminant of an [`OpticalElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Grating,
    RefractiveInterface,
    SpectralFilter,
    Receiver,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ElementKind::Grating => "grating",
            ElementKind::RefractiveInterface => "refractive interface",
            ElementKind::SpectralFilter => "spectral filter",
            ElementKind::Receiver => "receiver",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum OpticalElement {
    Grating(Grating),
    RefractiveInterface(RefractiveInterface),
    SpectralFilter(SpectralFilter),
    Receiver(Receiver),
}

impl OpticalElement {
    pub fn kind(&self) -> ElementKind {
        match self {
            OpticalElement::Grating(_) => ElementKind::Grating,
            OpticalElement::RefractiveInterface(_) => ElementKind::RefractiveInterface,
            OpticalElement::SpectralFilter(_) => ElementKind::SpectralFilter,
            OpticalElement::Receiver(_) => ElementKind::Receiver,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OpticalElement::Grating(e) => e.name(),
            OpticalElement::RefractiveInterface(e) => e.name(),
            OpticalElement::SpectralFilter(e) => e.name(),
            OpticalElement::Receiver(e) => e.name(),
        }
    }

    pub fn as_grating(&self) -> Option<&Grating> {
        match self {
            OpticalElement::Grating(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_grating_mut(&mut self) -> Option<&mut Grating> {
        match self {
            OpticalElement::Grating(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_receiver(&self) -> Option<&Receiver> {
        match self {
            OpticalElement::Receiver(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_receiver_mut(&mut self) -> Option<&mut Receiver> {
        match self {
            OpticalElement::Receiver(r) => Some(r),
            _ => None,
        }
    }
}

impl Interact for OpticalElement {
    fn interact(&mut self, incoming: RayBatch, precision: &Precision) -> RayBatch {
        match self {
            OpticalElement::Grating(e) => e.interact(incoming, precision),
            OpticalElement::RefractiveInterface(e) => e.interact(incoming, precision),
            OpticalElement::SpectralFilter(e) => e.interact(incoming, precision),
            OpticalElement::Receiver(e) => e.interact(incoming, precision),
        }
    }
}

impl From<Grating> for OpticalElement {
    fn from(e: Grating) -> Self {
        OpticalElement::Grating(e)
    }
}

impl From<RefractiveInterface> for OpticalElement {
    fn from(e: RefractiveInterface) -> Self {
        OpticalElement::RefractiveInterface(e)
    }
}

impl From<SpectralFilter> for OpticalElement {
    fn from(e: SpectralFilter) -> Self {
        OpticalElement::SpectralFilter(e)
    }
}

impl From<Receiver> for OpticalElement {
    fn from(e: Receiver) -> Self {
        OpticalElement::Receiver(e)
    }
}
