//! Small vector helpers, the symmetric Jacobi eigen-solver, and homogeneous
//! point transforms.
//!
//! The helpers are thin wrappers over nalgebra so that the box-fitting and
//! separating-axis code reads like the formulas it implements.

use nalgebra::{Matrix4, Point3, SMatrix, SVector, Vector3, Vector4};
use tracing::warn;

/// Maximum number of Jacobi sweeps before giving up.
pub const MAX_JACOBI_SWEEPS: usize = 20;

#[inline]
pub fn dot(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b)
}

#[inline]
pub fn cross(a: &Vector3<f64>, b: &Vector3<f64>) -> Vector3<f64> {
    a.cross(b)
}

#[inline]
pub fn norm(v: &Vector3<f64>) -> f64 {
    v.norm()
}

/// Unit vector along `v`, or `None` for a zero-length input.
#[inline]
pub fn normalize(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    let len = v.norm();
    if len > 0.0 && len.is_finite() {
        Some(v / len)
    } else {
        None
    }
}

/// Determinant of a row-major 3×3 matrix by cofactor expansion along the
/// first row.
pub fn determinant3x3(m: &[f64; 9]) -> f64 {
    m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
        + m[2] * (m[3] * m[7] - m[4] * m[6])
}

/// Projection of a point onto an infinite line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineProjection {
    /// Parametric position of the foot point: `closest = p1 + t·(p2 − p1)`.
    pub t: f64,
    /// Foot of the perpendicular from the point onto the line.
    pub closest: Point3<f64>,
    /// Squared distance from the point to the line.
    pub distance2: f64,
}

/// Project `x` onto the infinite line through `p1` and `p2`.
///
/// With `p2 = p1 + axis` for a unit `axis`, `t` is the signed distance of the
/// projection from `p1` along `axis`. A degenerate line (`p1 == p2`) projects
/// everything onto `p1`.
pub fn distance_to_line(x: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>) -> LineProjection {
    let dir = p2 - p1;
    let denom = dir.norm_squared();
    let t = if denom > 0.0 {
        (x - p1).dot(&dir) / denom
    } else {
        0.0
    };
    let closest = p1 + dir * t;
    LineProjection {
        t,
        closest,
        distance2: (x - closest).norm_squared(),
    }
}

/// Eigen-decomposition of a symmetric matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricEigen<const N: usize> {
    /// Eigenvalues in descending order.
    pub values: SVector<f64, N>,
    /// Eigenvectors stored as columns, matching `values`.
    pub vectors: SMatrix<f64, N, N>,
    /// Whether the off-diagonal mass reached zero within the sweep budget.
    pub converged: bool,
    /// Number of sweeps performed.
    pub sweeps: usize,
}

impl<const N: usize> SymmetricEigen<N> {
    /// Eigenvector `i` (column `i`).
    #[inline]
    pub fn vector(&self, i: usize) -> SVector<f64, N> {
        self.vectors.column(i).into_owned()
    }
}

/// Jacobi eigen-decomposition of a symmetric N×N matrix.
///
/// Classical cyclic Jacobi with a rotation threshold during the first sweeps
/// and underflow suppression of negligible off-diagonal terms afterwards.
/// Results are sorted by decreasing eigenvalue, and every eigenvector is
/// oriented so that at least half of its components are non-negative, which
/// keeps box axes stable between runs. Only the upper triangle of `input` is
/// read.
pub fn jacobi_eigen<const N: usize>(input: &SMatrix<f64, N, N>) -> SymmetricEigen<N> {
    let mut a = *input;
    let mut v = SMatrix::<f64, N, N>::identity();
    let mut d = SVector::<f64, N>::zeros();
    let mut b = SVector::<f64, N>::zeros();
    let mut z = SVector::<f64, N>::zeros();

    for ip in 0..N {
        d[ip] = a[(ip, ip)];
        b[ip] = d[ip];
    }

    let mut converged = false;
    let mut sweeps = 0;
    while sweeps < MAX_JACOBI_SWEEPS {
        let mut sm = 0.0;
        for ip in 0..N {
            for iq in (ip + 1)..N {
                sm += a[(ip, iq)].abs();
            }
        }
        if sm == 0.0 {
            converged = true;
            break;
        }

        let tresh = if sweeps < 3 {
            0.2 * sm / (N * N) as f64
        } else {
            0.0
        };

        for ip in 0..N {
            for iq in (ip + 1)..N {
                let g = 100.0 * a[(ip, iq)].abs();

                // After four sweeps, skip the rotation if the off-diagonal
                // element is negligible next to both diagonal terms.
                if sweeps > 3 && d[ip].abs() + g == d[ip].abs() && d[iq].abs() + g == d[iq].abs()
                {
                    a[(ip, iq)] = 0.0;
                } else if a[(ip, iq)].abs() > tresh {
                    let h = d[iq] - d[ip];
                    let t = if h.abs() + g == h.abs() {
                        a[(ip, iq)] / h
                    } else {
                        let theta = 0.5 * h / a[(ip, iq)];
                        let t = 1.0 / (theta.abs() + (1.0 + theta * theta).sqrt());
                        if theta < 0.0 { -t } else { t }
                    };
                    let c = 1.0 / (1.0 + t * t).sqrt();
                    let s = t * c;
                    let tau = s / (1.0 + c);
                    let h = t * a[(ip, iq)];
                    z[ip] -= h;
                    z[iq] += h;
                    d[ip] -= h;
                    d[iq] += h;
                    a[(ip, iq)] = 0.0;

                    for j in 0..ip {
                        rotate(&mut a, s, tau, (j, ip), (j, iq));
                    }
                    for j in (ip + 1)..iq {
                        rotate(&mut a, s, tau, (ip, j), (j, iq));
                    }
                    for j in (iq + 1)..N {
                        rotate(&mut a, s, tau, (ip, j), (iq, j));
                    }
                    for j in 0..N {
                        rotate(&mut v, s, tau, (j, ip), (j, iq));
                    }
                }
            }
        }

        for ip in 0..N {
            b[ip] += z[ip];
            d[ip] = b[ip];
            z[ip] = 0.0;
        }
        sweeps += 1;
    }

    if !converged {
        warn!(
            target: "mesh_obb::geometry",
            sweeps = sweeps,
            "Jacobi eigen-solve did not converge; using last approximation"
        );
    }

    // Selection sort into descending order, swapping eigenvector columns along.
    for j in 0..N.saturating_sub(1) {
        let mut k = j;
        for i in (j + 1)..N {
            if d[i] > d[k] {
                k = i;
            }
        }
        if k != j {
            d.swap_rows(j, k);
            v.swap_columns(j, k);
        }
    }

    let ceil_half_n = N.div_ceil(2);
    for j in 0..N {
        let num_pos = (0..N).filter(|&i| v[(i, j)] >= 0.0).count();
        if num_pos < ceil_half_n {
            for i in 0..N {
                v[(i, j)] = -v[(i, j)];
            }
        }
    }

    SymmetricEigen {
        values: d,
        vectors: v,
        converged,
        sweeps,
    }
}

#[inline]
fn rotate<const N: usize>(
    m: &mut SMatrix<f64, N, N>,
    s: f64,
    tau: f64,
    ij: (usize, usize),
    kl: (usize, usize),
) {
    let g = m[ij];
    let h = m[kl];
    m[ij] = g - s * (h + g * tau);
    m[kl] = h + s * (g - h * tau);
}

/// Map a point through a homogeneous 4×4 matrix, dividing by `w`.
///
/// The caller guarantees the matrix does not send the point to infinity
/// (`w != 0`); rigid and affine matrices always satisfy this.
#[inline]
pub fn transform_point(matrix: &Matrix4<f64>, p: &Point3<f64>) -> Point3<f64> {
    let out = matrix * Vector4::new(p.x, p.y, p.z, 1.0);
    Point3::new(out.x / out.w, out.y / out.w, out.z / out.w)
}
