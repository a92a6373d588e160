//! Axial hexagon math on the projected plane (pointy-top layout).

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Axial hex coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Axial {
    pub q: i64,
    pub r: i64,
}

/// Hex containing the planar point `(x, y)` for hexagons of edge length `size`.
pub fn axial_at(x: f64, y: f64, size: f64) -> Axial {
    let q = (SQRT_3 / 3.0 * x - y / 3.0) / size;
    let r = (2.0 / 3.0 * y) / size;
    cube_round(q, r)
}

/// Planar centre of a hexagon.
pub fn center_of(hex: Axial, size: f64) -> (f64, f64) {
    let q = hex.q as f64;
    let r = hex.r as f64;
    let x = size * (SQRT_3 * q + SQRT_3 / 2.0 * r);
    let y = size * (1.5 * r);
    (x, y)
}

fn cube_round(q: f64, r: f64) -> Axial {
    let s = -q - r;
    let mut rq = q.round();
    let mut rr = r.round();
    let rs = s.round();

    let dq = (rq - q).abs();
    let dr = (rr - r).abs();
    let ds = (rs - s).abs();

    // the component with the largest rounding error is rebuilt from the other two
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    Axial { q: rq as i64, r: rr as i64 }
}
