//! Long-range force mesh.
//!
//! Particles are deposited onto a periodic square grid (nearest grid
//! point), the gravitational potential is solved in Fourier space
//! (`phi_k = -coupling * delta_k / k^2`, DC mode zeroed), and the force
//! is a central-difference gradient gathered back at each particle's
//! cell.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftDirection, FftPlanner};

use crate::backend::Accel;
use crate::particles::ParticleSystem;

/// FFT Poisson solver over an `ng x ng` periodic box.
pub struct Mesh {
    ng: usize,
    box_size: f32,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl Mesh {
    pub fn new(ng: usize, box_size: f32) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            ng,
            box_size,
            forward: planner.plan_fft(ng, FftDirection::Forward),
            inverse: planner.plan_fft(ng, FftDirection::Inverse),
        }
    }

    pub fn grid_size(&self) -> usize {
        self.ng
    }

    fn cell_of(&self, x: f32, y: f32) -> usize {
        let ng = self.ng as i64;
        let ix = ((x / self.box_size * self.ng as f32).floor() as i64).rem_euclid(ng);
        let iy = ((y / self.box_size * self.ng as f32).floor() as i64).rem_euclid(ng);
        (ix * ng + iy) as usize
    }

    /// Density contrast `count/mean - 1` per cell.
    fn density_contrast(&self, sys: &ParticleSystem) -> Vec<f64> {
        let mut counts = vec![0.0f64; self.ng * self.ng];
        for (&x, &y) in sys.x.iter().zip(&sys.y) {
            counts[self.cell_of(x, y)] += 1.0;
        }
        let mean = sys.len() as f64 / (self.ng * self.ng) as f64;
        counts.iter().map(|&c| c / mean - 1.0).collect()
    }

    /// In-place 2-D transform: rows, transpose, rows, transpose back.
    fn fft_2d(&self, grid: &mut [Complex<f64>], fft: &Arc<dyn Fft<f64>>) {
        let ng = self.ng;
        for row in grid.chunks_exact_mut(ng) {
            fft.process(row);
        }
        transpose(grid, ng);
        for row in grid.chunks_exact_mut(ng) {
            fft.process(row);
        }
        transpose(grid, ng);
    }

    /// Angular frequency of mesh index `i`, in 2*pi/L units.
    fn freq(&self, i: usize) -> f64 {
        let ng = self.ng;
        let k = if i <= ng / 2 { i as f64 } else { i as f64 - ng as f64 };
        k * std::f64::consts::TAU / self.box_size as f64
    }

    /// Solve the mesh potential and gather per-particle accelerations.
    ///
    /// `coupling` is the `(1 + beta)` source term of the evolving-mass
    /// model; the returned accelerations carry no additional scaling.
    pub fn long_range(&self, sys: &ParticleSystem, coupling: f64) -> Accel {
        let ng = self.ng;
        let mut grid: Vec<Complex<f64>> = self
            .density_contrast(sys)
            .into_iter()
            .map(|d| Complex::new(d, 0.0))
            .collect();

        self.fft_2d(&mut grid, &self.forward);

        for i in 0..ng {
            for j in 0..ng {
                let k_sq = self.freq(i).powi(2) + self.freq(j).powi(2);
                let idx = i * ng + j;
                if k_sq == 0.0 {
                    grid[idx] = Complex::new(0.0, 0.0);
                } else {
                    grid[idx] *= -coupling / k_sq;
                }
            }
        }

        self.fft_2d(&mut grid, &self.inverse);
        let norm = (ng * ng) as f64;
        let phi: Vec<f64> = grid.iter().map(|c| c.re / norm).collect();

        // a = -grad(phi), central differences with periodic wrap.
        let cell = self.box_size as f64 / ng as f64;
        let mut gx = vec![0.0f64; ng * ng];
        let mut gy = vec![0.0f64; ng * ng];
        for i in 0..ng {
            let ip = (i + 1) % ng;
            let im = (i + ng - 1) % ng;
            for j in 0..ng {
                let jp = (j + 1) % ng;
                let jm = (j + ng - 1) % ng;
                gx[i * ng + j] = -(phi[ip * ng + j] - phi[im * ng + j]) / (2.0 * cell);
                gy[i * ng + j] = -(phi[i * ng + jp] - phi[i * ng + jm]) / (2.0 * cell);
            }
        }

        let mut accel = Accel::zeros(sys.len());
        for idx in 0..sys.len() {
            let c = self.cell_of(sys.x[idx], sys.y[idx]);
            accel.ax[idx] = gx[c] as f32;
            accel.ay[idx] = gy[c] as f32;
        }
        accel
    }
}

fn transpose(grid: &mut [Complex<f64>], ng: usize) {
    for i in 0..ng {
        for j in (i + 1)..ng {
            grid.swap(i * ng + j, j * ng + i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_at(points: &[(f32, f32)]) -> ParticleSystem {
        let x = points.iter().map(|p| p.0).collect::<Vec<_>>();
        let y = points.iter().map(|p| p.1).collect::<Vec<_>>();
        let zeros = vec![0.0; points.len()];
        ParticleSystem::from_parts(x, y, zeros.clone(), zeros, 0)
    }

    #[test]
    fn uniform_density_produces_no_force() {
        // One particle per cell: zero contrast everywhere.
        let ng = 16;
        let mut points = Vec::new();
        for i in 0..ng {
            for j in 0..ng {
                points.push((i as f32 * 100.0 / ng as f32, j as f32 * 100.0 / ng as f32));
            }
        }
        let sys = system_at(&points);
        let mesh = Mesh::new(ng, 100.0);
        let accel = mesh.long_range(&sys, 1.0);
        for (ax, ay) in accel.ax.iter().zip(&accel.ay) {
            assert!(ax.abs() < 1e-9 && ay.abs() < 1e-9);
        }
    }

    #[test]
    fn probe_is_pulled_toward_an_overdensity() {
        // A clump left of the probe: the probe should accelerate in -x.
        let mut points = vec![(25.0, 50.0); 256];
        points.push((40.0, 50.0));
        let sys = system_at(&points);
        let mesh = Mesh::new(32, 100.0);
        let accel = mesh.long_range(&sys, 1.0);
        let probe = points.len() - 1;
        assert!(
            accel.ax[probe] < 0.0,
            "probe ax = {}, expected pull toward clump",
            accel.ax[probe]
        );
        assert!(accel.ay[probe].abs() < accel.ax[probe].abs());
    }

    #[test]
    fn coupling_scales_the_force_linearly() {
        let mut points = vec![(25.0, 50.0); 64];
        points.push((40.0, 50.0));
        let sys = system_at(&points);
        let mesh = Mesh::new(32, 100.0);
        let base = mesh.long_range(&sys, 1.0);
        let boosted = mesh.long_range(&sys, 6.0);
        let probe = points.len() - 1;
        let ratio = boosted.ax[probe] / base.ax[probe];
        assert!((ratio - 6.0).abs() < 1e-6, "ratio = {ratio}");
    }

    #[test]
    fn out_of_box_positions_wrap_into_valid_cells() {
        let sys = system_at(&[(-3.0, 105.0)]);
        let mesh = Mesh::new(16, 100.0);
        // Must not panic; index wraps periodically.
        let accel = mesh.long_range(&sys, 1.0);
        assert!(accel.ax[0].is_finite());
    }
}
