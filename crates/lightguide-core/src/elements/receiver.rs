//! Terminal absorber.

use crate::elements::Interact;
use crate::types::{Precision, Ray, RayBatch};

/// Absorbs every incoming ray and keeps it for later inspection.
#[derive(Debug, Clone, Default)]
pub struct Receiver {
    name: String,
    absorbed: Vec<Ray>,
}

impl Receiver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            absorbed: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rays absorbed so far, in arrival order.
    pub fn absorbed(&self) -> &[Ray] {
        &self.absorbed
    }

    pub fn take_absorbed(&mut self) -> Vec<Ray> {
        std::mem::take(&mut self.absorbed)
    }

    pub fn clear(&mut self) {
        self.absorbed.clear();
    }
}

impl Extend<Ray> for Receiver {
    fn extend<I: IntoIterator<Item = Ray>>(&mut self, iter: I) {
        self.absorbed.extend(iter);
    }
}

impl Interact for Receiver {
    fn interact(&mut self, incoming: RayBatch, _precision: &Precision) -> RayBatch {
        self.absorbed.extend(incoming);
        RayBatch::new()
    }
}
