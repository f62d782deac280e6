//! The tracing loop.

use std::collections::BTreeMap;

use log::{debug, info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::elements::Interact;
use crate::scene::{PathId, Scene, SceneElement};
use crate::types::{ElementId, Ray, RayBatch};

/// One ray arriving at an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interaction {
    /// Element that emitted the segment; `0` for a source.
    pub from: ElementId,
    /// The ray as it lands: `origin` is the segment start, `position` the
    /// hit point, `element` the element hit.
    pub ray: Ray,
}

/// Bookkeeping for one (wavelength, path) trace.
#[derive(Debug, Clone, Serialize)]
pub struct PathSummary {
    pub path: Option<PathId>,
    pub rounds: usize,
    /// Rays still travelling when the iteration limit was reached.
    pub in_flight: usize,
    pub interactions: usize,
}

/// Everything recorded for one wavelength.
#[derive(Debug, Clone, Serialize)]
pub struct WavelengthTrace {
    pub wavelength: f64,
    /// Launched rays.
    pub sources: Vec<Ray>,
    pub interactions: Vec<Interaction>,
    pub paths: Vec<PathSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceResult {
    pub wavelengths: Vec<WavelengthTrace>,
}

impl TraceResult {
    pub fn get(&self, wavelength: f64) -> Option<&WavelengthTrace> {
        self.wavelengths
            .iter()
            .find(|w| w.wavelength.to_bits() == wavelength.to_bits())
    }

    pub fn interaction_count(&self) -> usize {
        self.wavelengths.iter().map(|w| w.interactions.len()).sum()
    }
}

struct Job {
    wavelength: f64,
    path: Option<PathId>,
}

struct JobOutput {
    wavelength: f64,
    summary: PathSummary,
    interactions: Vec<Interaction>,
    absorbed: Vec<(ElementId, Vec<Ray>)>,
}

impl Scene {
    /// Trace every wavelength under every registered path (or once,
    /// unconstrained, when there are none), for at most `max_iterations`
    /// rounds each.
    pub fn trace(&mut self, max_iterations: usize) -> &TraceResult {
        let precision = self.params.precision;
        let seeds: Vec<Ray> = self
            .sources
            .values()
            .flat_map(|s| {
                s.launch(&self.environment, &precision, self.params.hit_tolerance)
                    .into_vec()
            })
            .collect();
        if seeds.is_empty() {
            warn!("Scene has no source rays; nothing to trace");
        }

        let wavelengths = self.wavelengths();
        let paths: Vec<Option<PathId>> = if self.paths.is_empty() {
            vec![None]
        } else {
            self.paths.keys().copied().map(Some).collect()
        };
        let jobs: Vec<Job> = wavelengths
            .iter()
            .flat_map(|w| {
                paths.iter().map(move |p| Job {
                    wavelength: *w,
                    path: *p,
                })
            })
            .collect();

        #[cfg(feature = "parallel")]
        let outputs: Vec<JobOutput> = jobs
            .par_iter()
            .map(|job| self.run_job(job, &seeds, max_iterations))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let outputs: Vec<JobOutput> = jobs
            .iter()
            .map(|job| self.run_job(job, &seeds, max_iterations))
            .collect();

        let mut result = TraceResult {
            wavelengths: wavelengths
                .iter()
                .map(|w| WavelengthTrace {
                    wavelength: *w,
                    sources: seeds
                        .iter()
                        .filter(|r| r.wavelength.to_bits() == w.to_bits())
                        .copied()
                        .collect(),
                    interactions: Vec::new(),
                    paths: Vec::new(),
                })
                .collect(),
        };
        for out in outputs {
            for (id, rays) in out.absorbed {
                if let Some(r) = self
                    .elements
                    .get_mut(&id)
                    .and_then(|e| e.element.as_receiver_mut())
                {
                    r.extend(rays);
                }
            }
            if let Some(wt) = result
                .wavelengths
                .iter_mut()
                .find(|t| t.wavelength.to_bits() == out.wavelength.to_bits())
            {
                wt.interactions.extend(out.interactions);
                wt.paths.push(out.summary);
            }
        }

        info!(
            "Traced {} wavelength(s) × {} path(s): {} interactions",
            wavelengths.len(),
            paths.len(),
            result.interaction_count()
        );
        self.trace.insert(result)
    }

    fn run_job(&self, job: &Job, seeds: &[Ray], max_iterations: usize) -> JobOutput {
        let precision = self.params.precision;
        let tolerance = self.params.hit_tolerance;

        let mut elements: BTreeMap<ElementId, SceneElement> = self.elements.clone();
        for e in elements.values_mut() {
            if let Some(r) = e.element.as_receiver_mut() {
                r.clear();
            }
        }
        if let Some(overrides) = job.path.and_then(|p| self.paths.get(&p)) {
            for (id, orders) in overrides {
                if let Some(g) = elements.get_mut(id).and_then(|e| e.element.as_grating_mut()) {
                    g.set_orders(orders.clone());
                }
            }
        }

        let mut rays: Vec<Ray> = seeds
            .iter()
            .filter(|r| r.wavelength.to_bits() == job.wavelength.to_bits())
            .copied()
            .collect();
        let mut interactions = Vec::new();
        let mut rounds = 0;

        while rounds < max_iterations && !rays.is_empty() {
            rounds += 1;

            let mut landed: BTreeMap<i64, Vec<Ray>> = BTreeMap::new();
            for ray in rays.drain(..) {
                if let Some((key, position)) = self.advance(&ray) {
                    if self.params.contains(&position) {
                        landed.entry(key).or_default().push(Ray { position, ..ray });
                    }
                }
            }

            let mut next = Vec::new();
            for (key, mut pending) in landed {
                for id in &self.layers[&key].elements {
                    if pending.is_empty() {
                        break;
                    }
                    let Some(target) = elements.get_mut(id) else {
                        continue;
                    };
                    let points: Vec<[f64; 2]> =
                        pending.iter().map(|r| [r.position[0], r.position[1]]).collect();
                    let hits = target.footprint.contains_points(&points, tolerance);
                    let (hit, miss): (Vec<_>, Vec<_>) =
                        pending.into_iter().zip(hits).partition(|(_, h)| *h);
                    pending = miss.into_iter().map(|(r, _)| r).collect();
                    if hit.is_empty() {
                        continue;
                    }

                    let tagged: RayBatch = hit
                        .into_iter()
                        .map(|(r, _)| {
                            let ray = Ray { element: *id, ..r };
                            interactions.push(Interaction {
                                from: r.element,
                                ray,
                            });
                            ray
                        })
                        .collect();
                    let emitted = target.element.interact(tagged, &precision);
                    next.extend(emitted.into_iter().map(|r| Ray {
                        origin: r.position,
                        ..r
                    }));
                }
                next.extend(pending);
            }
            debug!(
                "λ = {} µm, path {:?}, round {rounds}: {} ray(s) in flight",
                job.wavelength,
                job.path,
                next.len()
            );
            rays = next;
        }

        let absorbed = elements
            .iter_mut()
            .filter_map(|(id, e)| e.element.as_receiver_mut().map(|r| (*id, r.take_absorbed())))
            .filter(|(_, rays)| !rays.is_empty())
            .collect();

        JobOutput {
            wavelength: job.wavelength,
            summary: PathSummary {
                path: job.path,
                rounds,
                in_flight: rays.len(),
                interactions: interactions.len(),
            },
            interactions,
            absorbed,
        }
    }

    /// Nearest layer strictly ahead of `ray`, and the landing point there.
    fn advance(&self, ray: &Ray) -> Option<(i64, [f64; 3])> {
        let c = ray.direction_cosines();
        let p = ray.position;
        let (step, key, z) = self
            .layers
            .iter()
            .map(|(key, layer)| ((layer.z - p[2]) / c[2], *key, layer.z))
            .filter(|(step, _, _)| step.is_finite() && *step > 0.0)
            .min_by(|a, b| a.0.total_cmp(&b.0))?;
        let precision = &self.params.precision;
        Some((
            key,
            [
                precision.round_position(p[0] + c[0] * step),
                precision.round_position(p[1] + c[1] * step),
                z,
            ],
        ))
    }
}
