use std::error::Error;

use approx::assert_abs_diff_eq;
use irreps_array::{
    Irreps, IrrepsArray, IrrepsArrayError, Normalization, concatenate, irreps::wigner, norm, normal,
};
use ndarray::{ArrayD, IxDyn, array};
use rand::{SeedableRng, rngs::StdRng};

fn random(shape: &[usize]) -> ArrayD<f64> {
    ArrayD::from_shape_simple_fn(IxDyn(shape), || fastrand::f64() * 2.0 - 1.0)
}

fn random_angles() -> (f64, f64, f64) {
    let tau = std::f64::consts::TAU;
    (fastrand::f64() * tau, fastrand::f64() * tau, fastrand::f64() * tau)
}

#[test]
fn convert_round_trip() -> Result<(), Box<dyn Error>> {
    let targets = ["1x0e + 2x0e + 1o + 0x2e + 2x1o", "3x0e + 3x1o", "0e + 0e + 0e + 3x1o"];

    let x = IrrepsArray::new("2x0e + 1x0e + 2x1o + 1x1o", random(&[4, 12]))?;
    for target in targets {
        let y = x.convert(target)?.convert(x.irreps())?;
        assert_eq!(y.array(), x.array());
        assert_eq!(y.irreps(), x.irreps());
    }

    let blocks = vec![None, Some(random(&[4, 1, 1])), Some(random(&[4, 2, 3])), None];
    let x = IrrepsArray::from_blocks("2x0e + 1x0e + 2x1o + 1x1o", blocks, &[4])?;
    let buffer = x.array().clone();
    for target in targets {
        let y = x.convert(target)?;
        assert_eq!(x.array(), &buffer);
        let z = y.convert(x.irreps())?;
        assert_eq!(z.array(), &buffer);
    }
    Ok(())
}

#[test]
fn from_blocks_inverse() -> Result<(), Box<dyn Error>> {
    let blocks = vec![Some(random(&[2, 3, 2, 1])), None, Some(random(&[2, 3, 1, 5]))];
    let x = IrrepsArray::from_blocks("2x0e + 1o + 2e", blocks, &[2, 3])?;
    let lazy = IrrepsArray::new(x.irreps(), x.array().clone())?;
    let y = IrrepsArray::from_blocks(x.irreps(), lazy.blocks().to_vec(), &[2, 3])?;
    assert_eq!(y.array(), x.array());
    Ok(())
}

#[test]
fn additive_identity() -> Result<(), Box<dyn Error>> {
    for irreps in ["3x0e", "0e + 1o + 2e", ""] {
        let x = IrrepsArray::new(irreps, random(&[5, irreps_dim(irreps)?]))?;
        let zeros = IrrepsArray::<f64>::zeros(irreps, &[5])?;
        let y = &x + &zeros;
        assert_eq!(y.array(), x.array());
        let y = &zeros + &x;
        assert_eq!(y.array(), x.array());
    }
    Ok(())
}

fn irreps_dim(irreps: &str) -> Result<usize, Box<dyn Error>> {
    Ok(irreps.parse::<Irreps>()?.dim())
}

#[test]
fn rotation_composition() -> Result<(), Box<dyn Error>> {
    let x = IrrepsArray::new("2x1e + 0o + 2e + 3o", random(&[3, 19]))?;
    let (a1, b1, c1) = random_angles();
    let (a2, b2, c2) = random_angles();

    let twice = x
        .transform_by_angles(a1, b1, c1, 0)?
        .transform_by_angles(a2, b2, c2, 1)?;
    let r = wigner::angles_to_matrix(a2, b2, c2).dot(&wigner::angles_to_matrix(a1, b1, c1));
    let once = x.transform_by_matrix(&-r)?;
    assert_abs_diff_eq!(twice.array(), once.array(), epsilon = 1e-8);

    let back = x.transform_by_angles(a1, b1, c1, 1)?.transform_by_matrix(
        &-wigner::angles_to_matrix(a1, b1, c1).t().to_owned(),
    )?;
    assert_abs_diff_eq!(back.array(), x.array(), epsilon = 1e-8);
    Ok(())
}

#[test]
fn rotation_of_vectors() -> Result<(), Box<dyn Error>> {
    let v = random(&[6, 3]);
    let x = IrrepsArray::new("1e", v.clone())?;
    let (a, b, c) = random_angles();
    let y = x.transform_by_angles(a, b, c, 1)?;
    let r = wigner::angles_to_matrix(a, b, c);
    let expected = v.into_dimensionality::<ndarray::Ix2>()?.dot(&r.t());
    assert_abs_diff_eq!(y.array(), &expected.into_dyn(), epsilon = 1e-9);
    Ok(())
}

#[test]
fn norm_invariance() -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(0);
    let x = normal::<f64, _>("2x0e + 1o + 3x2e + 3o", &mut rng, &[4], Normalization::Component)?;
    let expected = norm(&x, false)?;
    for k in [0, 1] {
        let (a, b, c) = random_angles();
        let y = norm(&x.transform_by_angles(a, b, c, k)?, false)?;
        assert_abs_diff_eq!(y.array(), expected.array(), epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn concatenate_split_inverse() -> Result<(), Box<dyn Error>> {
    let x = IrrepsArray::new("3x0e + 2x1e", random(&[2, 9]))?;
    let parts = x.split([1usize])?;
    let y = concatenate(&parts, -1)?;
    assert_eq!(y.array(), x.array());
    assert_eq!(y.irreps(), x.irreps());
    Ok(())
}

#[test]
fn split_scenario() -> Result<(), Box<dyn Error>> {
    let x = IrrepsArray::new("0e+1e", array![1.0, 2.0, 3.0, 4.0].into_dyn())?;
    let irreps: Vec<Irreps> = vec!["0e".parse()?, "1e".parse()?];
    let parts = x.split(irreps)?;
    assert_eq!(parts[0].irreps().to_string(), "1x0e");
    assert_eq!(parts[0].array(), &array![1.0].into_dyn());
    assert_eq!(parts[1].irreps().to_string(), "1x1e");
    assert_eq!(parts[1].array(), &array![2.0, 3.0, 4.0].into_dyn());
    Ok(())
}

#[test]
fn division_by_deterministic_zero() -> Result<(), Box<dyn Error>> {
    let blocks = vec![Some(array![[1.0]].into_dyn()), None];
    let x = IrrepsArray::from_blocks("0e + 0e", blocks, &[])?;
    assert!(matches!(x.try_div(&x), Err(IrrepsArrayError::DivisionByZero(_))));
    Ok(())
}

#[test]
fn zeros_scenario() -> Result<(), Box<dyn Error>> {
    let x = IrrepsArray::<f64>::zeros("2x0e", &[3])?;
    assert_eq!(x.shape(), &[3, 2]);
    assert!(x.array().iter().all(|&x| x == 0.0));
    assert_eq!(x.blocks().len(), 1);
    assert!(x.blocks()[0].is_none());
    Ok(())
}
