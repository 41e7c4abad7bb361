//! End-to-end behaviour of the pretrained Hourglass layout.

use burn::backend::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;

use hourglass::model::pretrained_levels;
use hourglass::weights::{ManifestEntry, WeightArray};
use hourglass::{Hourglass, HourglassConfig, HourglassError, Unseeded, WeightManifest, WeightStore};

type B = NdArray;

fn manifest() -> WeightManifest {
    HourglassConfig::new()
        .manifest::<B>(&Default::default())
        .expect("pretrained layout builds")
}

/// Identity-ish store: every conv emits zeros, every bn is the identity.
fn neutral_store(manifest: &WeightManifest) -> WeightStore {
    manifest.synthesize(|entry: &ManifestEntry| {
        if entry.key.ends_with("moving_variance") || entry.key.ends_with("gamma") {
            1.0
        } else {
            0.0
        }
    })
}

fn to_vec(t: Tensor<B, 2>) -> Vec<f32> {
    t.into_data().to_vec::<f32>().unwrap()
}

// ── weight manifest ──

#[test]
fn every_key_is_bound_once() {
    let manifest = manifest();
    assert!(
        manifest.duplicates().is_empty(),
        "colliding keys: {:?}",
        manifest.duplicates()
    );
}

#[test]
fn deepest_level_keys_follow_nesting_slots() {
    let manifest = manifest();
    // hourglass 3/ > level 4 deep 0/0/3 > level 3 deep 0/0/3 > level 2 deep 0/1/3
    // > level 1 deep 0/1/1, third branch spatial conv.
    let entry = manifest
        .get("3/0/0/3/0/0/3/0/1/3/0/1/1/conv2d_6/kernel")
        .expect("level 1 deep block");
    assert_eq!(entry.shape, vec![7, 7, 32, 64]);

    // level 1 shallow second block
    assert!(manifest
        .get("3/0/0/3/0/0/3/0/1/3/0/0/1/batch_normalization_6/moving_variance")
        .is_some());
    // level 2 shallow second block uses the 3/7/11 table
    assert_eq!(
        manifest.get("3/0/0/3/0/0/3/0/0/1/conv2d_6/kernel").unwrap().shape,
        vec![11, 11, 64, 64]
    );
}

#[test]
fn outer_levels_keep_original_branch_scopes() {
    let manifest = manifest();
    // level 4: deep under 0/0 from slot 1, shallow under 0/1 slot 0
    assert_eq!(
        manifest.get("3/0/0/1/conv2d/kernel").unwrap().shape,
        vec![1, 1, 128, 32]
    );
    assert_eq!(
        manifest.get("3/0/1/0/conv2d_2/kernel").unwrap().shape,
        vec![3, 3, 64, 16]
    );
    assert_eq!(
        manifest.get("3/0/0/5/conv2d_6/kernel").unwrap().shape,
        vec![11, 11, 32, 16]
    );
    assert!(manifest.get("3/0/0/0/conv2d/kernel").is_none());
    assert!(manifest.get("3/0/1/1/conv2d/kernel").is_none());
}

#[test]
fn inception_branches_never_request_scale_or_shift() {
    let manifest = manifest();
    let affine: Vec<&str> = manifest
        .keys()
        .filter(|k| k.ends_with("/gamma") || k.ends_with("/beta"))
        .collect();
    assert_eq!(
        affine,
        vec!["1/batch_normalization/gamma", "1/batch_normalization/beta"]
    );
}

// ── seeded construction ──

#[test]
fn seeded_network_uses_store_constants() {
    let device = Default::default();
    let manifest = manifest();
    let store = neutral_store(&manifest);
    assert_eq!(store.len(), manifest.len());

    let model = Hourglass::<B>::build(Some(&store), true, &device).unwrap();
    let image = Tensor::<B, 3>::random([16, 32, 3], Distribution::Uniform(0.0, 255.0), &device);
    let out = to_vec(model.infer(image).unwrap());

    // Zero convolutions give log-depth 0 everywhere.
    assert_eq!(out.len(), 16 * 32);
    assert!(out.iter().all(|v| *v == 1.0));
}

#[test]
fn missing_key_aborts_construction() {
    let device = Default::default();
    let manifest = manifest();
    let missing = "3/0/0/3/0/1/0/batch_normalization_5/moving_variance";
    assert!(manifest.get(missing).is_some());

    let store: WeightStore = neutral_store(&manifest)
        .keys()
        .filter(|k| *k != missing)
        .map(|k| (k.to_string(), WeightArray::filled(manifest.get(k).unwrap().shape.clone(), 0.0)))
        .collect();

    let err = Hourglass::<B>::build(Some(&store), false, &device).unwrap_err();
    assert_eq!(
        err,
        HourglassError::KeyNotFound {
            key: missing.to_string()
        }
    );
    assert!(err.to_string().contains(missing));
}

#[test]
fn wrong_kernel_shape_aborts_construction() {
    let device = Default::default();
    let manifest = manifest();
    let store: WeightStore = manifest
        .entries
        .iter()
        .map(|e| {
            let shape = if e.key == "4/conv2d/kernel" {
                vec![3, 3, 32, 1]
            } else {
                e.shape.clone()
            };
            (e.key.clone(), WeightArray::filled(shape, 0.0))
        })
        .collect();

    let err = Hourglass::<B>::build(Some(&store), false, &device).unwrap_err();
    assert_eq!(
        err,
        HourglassError::WeightShape {
            key: "4/conv2d/kernel".into(),
            expected: vec![3, 3, 64, 1],
            found: vec![3, 3, 32, 1],
        }
    );
}

#[test]
fn extra_keys_do_not_prevent_loading() {
    let device = Default::default();
    let manifest = manifest();
    let mut entries: Vec<(String, WeightArray)> = manifest
        .entries
        .iter()
        .map(|e| (e.key.clone(), WeightArray::filled(e.shape.clone(), 0.0)))
        .collect();
    entries.push(("5/conv2d/kernel".into(), WeightArray::filled([1], 0.0)));
    let store: WeightStore = entries.into_iter().collect();
    assert!(Hourglass::<B>::build(Some(&store), false, &device).is_ok());
}

// ── inference ──

#[test]
fn inference_is_deterministic() {
    let device = Default::default();
    let model = Hourglass::<B>::build(None, true, &device).unwrap();
    let image = Tensor::<B, 3>::random([32, 16, 3], Distribution::Uniform(0.0, 255.0), &device);
    let first = to_vec(model.infer(image.clone()).unwrap());
    let second = to_vec(model.infer(image).unwrap());
    assert_eq!(first, second);
}

#[test]
fn output_matches_input_resolution() {
    let device = Default::default();
    let model = Hourglass::<B>::build(None, false, &device).unwrap();
    for (h, w) in [(16, 16), (16, 48)] {
        let out = model.infer(Tensor::zeros([h, w, 3], &device)).unwrap();
        assert_eq!(out.dims(), [h, w]);
    }
}

#[test]
fn batch_of_one_is_accepted() {
    let device = Default::default();
    let model = Hourglass::<B>::build(None, false, &device).unwrap();
    let image = Tensor::<B, 4>::zeros([1, 16, 16, 3], &device);
    assert_eq!(model.infer_batched(image).unwrap().dims(), [16, 16]);
}

#[test]
fn default_init_output_is_in_unit_interval() {
    let device = Default::default();
    let model = Hourglass::<B>::build(None, false, &device).unwrap();
    let out = to_vec(model.infer(Tensor::zeros([32, 32, 3], &device)).unwrap());
    assert!(out.iter().all(|v| *v > 0.0 && *v <= 1.0));
    assert_eq!(out.iter().cloned().fold(f32::MIN, f32::max), 1.0);
}

#[test]
fn random_image_at_64x64() {
    let device = Default::default();
    let model = Hourglass::<B>::build(None, true, &device).unwrap();
    let image = Tensor::<B, 3>::random([64, 64, 3], Distribution::Uniform(0.0, 255.0), &device);
    let out = model.infer(image).unwrap();
    assert_eq!(out.dims(), [64, 64]);

    let values = to_vec(out);
    assert!(values.iter().all(|v| *v > 0.0 && *v <= 1.0));
    assert_eq!(values.iter().cloned().fold(f32::MIN, f32::max), 1.0);
}

#[test]
fn normalized_build_matches_prescaled_input() {
    let device = Default::default();
    let store = manifest().synthesize(|entry: &ManifestEntry| {
        if entry.key.ends_with("kernel") {
            0.001
        } else if entry.key.ends_with("moving_variance") || entry.key.ends_with("gamma") {
            1.0
        } else {
            0.0
        }
    });
    let scaled = Hourglass::<B>::build(Some(&store), true, &device).unwrap();
    let plain = Hourglass::<B>::build(Some(&store), false, &device).unwrap();

    let image = Tensor::<B, 4>::random([1, 3, 16, 16], Distribution::Uniform(0.0, 1.0), &device);
    let raw = |model: &Hourglass<B>, x: Tensor<B, 4>| -> Vec<f32> {
        model.forward(x).unwrap().into_data().to_vec().unwrap()
    };
    let a = raw(&scaled, image.clone().mul_scalar(255.0));
    let b = raw(&plain, image);
    assert!(b.iter().any(|v| *v != 0.0));
    for (x, y) in a.iter().zip(&b) {
        assert!((x - y).abs() <= 1e-4 * (1.0 + y.abs()), "{} vs {}", x, y);
    }
}

#[test]
fn unaligned_resolution_is_rejected() {
    let device = Default::default();
    let model = Hourglass::<B>::build(None, false, &device).unwrap();
    let err = model.infer(Tensor::zeros([24, 32, 3], &device)).unwrap_err();
    assert!(matches!(err, HourglassError::InvalidInput(_)));
}

#[test]
#[ignore = "full resolution is slow on the ndarray backend"]
fn full_resolution_zero_image() {
    let device = Default::default();
    let model = HourglassConfig::new().init::<B>(&Unseeded, &device).unwrap();
    let out = model.infer(Tensor::zeros([384, 512, 3], &device)).unwrap();
    assert_eq!(out.dims(), [384, 512]);
    let values = to_vec(out);
    assert!(values.iter().all(|v| *v > 0.0 && *v <= 1.0));
}

// ── configuration ──

#[test]
fn config_round_trips_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hourglass.json");

    let config = HourglassConfig::new().with_normalize_input(true);
    config.save(&path).unwrap();
    let loaded = HourglassConfig::load(&path).unwrap();

    assert!(loaded.normalize_input);
    assert_eq!(loaded.head_channels, 128);
    assert_eq!(loaded.epsilon, 1e-3);
    assert_eq!(loaded.levels, pretrained_levels());
}
