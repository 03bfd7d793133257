//! Seawater state equations used by the CTD parsers: practical salinity
//! (PSS-78), in-situ density (EOS-80), and depth from pressure (UNESCO).
//!
//! Temperatures are ITS-90 degrees Celsius, pressure is decibars,
//! conductivity ratios are relative to C(35,15,0).

/// Conductivity of standard seawater at S=35, T=15, P=0, in mS/cm.
pub const C35150_MS_CM: f64 = 42.914;

/// ITS-90 to IPTS-68, the scale the polynomial coefficients were fit on.
fn t68(t90: f64) -> f64 {
    t90 * 1.00024
}

/// rt(T): conductivity ratio of reference seawater at temperature T.
fn salrt(t: f64) -> f64 {
    let c = [0.6766097, 2.00564e-2, 1.104259e-4, -6.9698e-7, 1.0031e-9];
    c[0] + (c[1] + (c[2] + (c[3] + c[4] * t) * t) * t) * t
}

/// Rp: pressure correction to the conductivity ratio.
fn salrp(r: f64, t: f64, p: f64) -> f64 {
    let d1 = 3.426e-2;
    let d2 = 4.464e-4;
    let d3 = 4.215e-1;
    let d4 = -3.107e-3;
    let e1 = 2.070e-5;
    let e2 = -6.370e-10;
    let e3 = 3.989e-15;
    1.0 + (p * (e1 + e2 * p + e3 * p * p)) / (1.0 + d1 * t + d2 * t * t + (d3 + d4 * t) * r)
}

/// Salinity from Rt and temperature (PSS-78 polynomial).
fn sals(rt: f64, t: f64) -> f64 {
    let a = [0.0080, -0.1692, 25.3851, 14.0941, -7.0261, 2.7081];
    let b = [0.0005, -0.0056, -0.0066, -0.0375, 0.0636, -0.0144];
    let k = 0.0162;

    let rtx = rt.max(0.0).sqrt();
    let del_t = t - 15.0;
    let del_s = (del_t / (1.0 + k * del_t))
        * (b[0] + (b[1] + (b[2] + (b[3] + (b[4] + b[5] * rtx) * rtx) * rtx) * rtx) * rtx);
    a[0] + (a[1] + (a[2] + (a[3] + (a[4] + a[5] * rtx) * rtx) * rtx) * rtx) * rtx + del_s
}

/// Practical salinity (psu) from conductivity ratio `cndr`
/// (= C(S,T,P)/C(35,15,0)), temperature (°C, ITS-90), pressure (db).
///
/// Non-finite inputs yield NaN; the `.max(0.0)` terms in the polynomials
/// would otherwise quietly turn a missing conductivity into ~0 psu.
pub fn salt(cndr: f64, t90: f64, p: f64) -> f64 {
    if !(cndr.is_finite() && t90.is_finite() && p.is_finite()) {
        return f64::NAN;
    }
    let t = t68(t90);
    let rt = cndr / (salrp(cndr, t, p) * salrt(t));
    sals(rt, t)
}

/// Density of standard mean ocean water (pure water), kg/m^3.
fn smow(t: f64) -> f64 {
    let a = [
        999.842594,
        6.793952e-2,
        -9.095290e-3,
        1.001685e-4,
        -1.120083e-6,
        6.536332e-9,
    ];
    a[0] + (a[1] + (a[2] + (a[3] + (a[4] + a[5] * t) * t) * t) * t) * t
}

/// Density of seawater at atmospheric pressure, kg/m^3.
fn dens0(s: f64, t: f64) -> f64 {
    let b = [8.24493e-1, -4.0899e-3, 7.6438e-5, -8.2467e-7, 5.3875e-9];
    let c = [-5.72466e-3, 1.0227e-4, -1.6546e-6];
    let d0 = 4.8314e-4;
    smow(t)
        + (b[0] + (b[1] + (b[2] + (b[3] + b[4] * t) * t) * t) * t) * s
        + (c[0] + (c[1] + c[2] * t) * t) * s * s.max(0.0).sqrt()
        + d0 * s * s
}

/// Secant bulk modulus K(S,T,P); `p` here is in bars.
fn seck(s: f64, t: f64, p: f64) -> f64 {
    // pure water
    let aw = 3.239908 + (1.43713e-3 + (1.16092e-4 - 5.77905e-7 * t) * t) * t;
    let bw = 8.50935e-5 + (-6.12293e-6 + 5.2787e-8 * t) * t;
    let kw = 19652.21 + (148.4206 + (-2.327105 + (1.360477e-2 - 5.155288e-5 * t) * t) * t) * t;

    // seawater terms
    let sr = s.max(0.0).sqrt();
    let a = aw + (2.2838e-3 + (-1.0981e-5 - 1.6078e-6 * t) * t) * s + 1.91075e-4 * s * sr;
    let b = bw + (-9.9348e-7 + (2.0816e-8 + 9.1697e-10 * t) * t) * s;
    let k0 = kw
        + (54.6746 + (-0.603459 + (1.09987e-2 - 6.1670e-5 * t) * t) * t) * s
        + (7.944e-2 + (1.6483e-2 - 5.3009e-4 * t) * t) * s * sr;
    k0 + (a + b * p) * p
}

/// In-situ density (kg/m^3) from salinity (psu), temperature (°C, ITS-90),
/// and pressure (db). Non-finite inputs yield NaN.
pub fn dens(s: f64, t90: f64, p_db: f64) -> f64 {
    if !(s.is_finite() && t90.is_finite() && p_db.is_finite()) {
        return f64::NAN;
    }
    let t = t68(t90);
    let p = p_db / 10.0; // decibars to bars
    dens0(s, t) / (1.0 - p / seck(s, t, p))
}

/// Depth (m, positive down) from pressure (db) and latitude (degrees).
pub fn depth(p_db: f64, lat_deg: f64) -> f64 {
    let x = lat_deg.to_radians().sin();
    let x = x * x;
    let gr = 9.780318 * (1.0 + (5.2788e-3 + 2.36e-5 * x) * x) + 1.092e-6 * p_db;
    ((((-1.82e-15 * p_db + 2.279e-10) * p_db - 2.2512e-5) * p_db + 9.72659) * p_db) / gr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_seawater_is_35_psu() {
        // R = 1 at (35, 15, 0) by definition
        assert!((salt(1.0, 15.0, 0.0) - 35.0).abs() < 5e-3);
    }

    #[test]
    fn unesco_salinity_check_value() {
        // UNESCO TR 44: R = 1.888091, T68 = 40, P = 10000 -> S = 40.0000
        let s = salt(1.888091, 40.0 / 1.00024, 10000.0);
        assert!((s - 40.0).abs() < 5e-3, "got {s}");
    }

    #[test]
    fn surface_density_check_value() {
        // EOS-80 check: dens0(35, 25 deg C T68) = 1023.3431 kg/m^3
        let rho = dens(35.0, 25.0 / 1.00024, 0.0);
        assert!((rho - 1023.3431).abs() < 1e-2, "got {rho}");
    }

    #[test]
    fn density_increases_with_pressure() {
        let surface = dens(35.0, 10.0, 0.0);
        let deep = dens(35.0, 10.0, 4000.0);
        assert!(deep > surface + 15.0);
    }

    #[test]
    fn unesco_depth_check_value() {
        // UNESCO check: P = 10000 db at lat 30 -> 9712.653 m
        let z = depth(10000.0, 30.0);
        assert!((z - 9712.653).abs() < 5e-2, "got {z}");
    }

    #[test]
    fn nan_inputs_propagate() {
        assert!(salt(f64::NAN, 15.0, 0.0).is_nan());
        assert!(dens(f64::NAN, 20.0, 0.0).is_nan());
    }
}
